//! CLI entry point for pxi-sync
//!
//! Brings a simulated sync module up from an image and exercises the routing
//! API against it. Real PCI mapping is left to the embedding driver; this
//! binary is for inspecting the topology and the register words a route
//! produces.
//!
//! # Usage
//!
//! ```bash
//! pxi-sync terminals
//! pxi-sync inputs PFI0
//! pxi-sync route PXI_Trig3 PFI1
//! pxi-sync --image logic.bin polarity PFI2 inverted
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use pxi_sync::config::SyncConfig;
use pxi_sync::registry::Commit;
use pxi_sync::sim::{EngineScript, SimulatedBoard};
use pxi_sync::{logging, regs, SyncDevice};

/// Size of the image used when none is given.
const SYNTHETIC_IMAGE_LEN: usize = 1024;

#[derive(Parser)]
#[command(name = "pxi-sync")]
#[command(about = "Route signals on a simulated PXIe timing and sync module", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Programmable-logic image (defaults to the configured firmware, then a synthetic image)
    #[arg(long, global = true)]
    image: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every terminal with its current input
    Terminals,

    /// List the legal inputs of a terminal
    Inputs {
        /// Terminal name, e.g. PFI0
        terminal: String,
    },

    /// Route a terminal from one of its inputs
    Route {
        /// Terminal name
        terminal: String,
        /// Input name
        input: String,
    },

    /// Show or set output polarity
    Polarity {
        /// Terminal name
        terminal: String,
        /// normal or inverted
        value: Option<String>,
    },

    /// Read the live line state
    LineState {
        /// Terminal name
        terminal: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SyncConfig::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(&config.logging)?;

    let image = match cli.image.as_ref().or(config.device.firmware.as_ref()) {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("reading image {}", path.display()))?,
        None => synthetic_image(),
    };

    let board = SimulatedBoard::with_script(EngineScript::accepting(image.len()));
    let device = SyncDevice::attach(board.bars(config.device.window_base), &image, &config)
        .context("attaching simulated device")?;
    let report = device.load_report();
    info!(
        words = report.words_streamed,
        filler_words = report.filler_words,
        "Simulated device ready"
    );

    match cli.command {
        Commands::Terminals => {
            for terminal in device.terminals() {
                println!(
                    "{:<22} {:<16} <- {}",
                    terminal.name(),
                    terminal.descriptor().category().to_string(),
                    terminal.current_input()
                );
            }
        }
        Commands::Inputs { terminal } => {
            for input in device.available_inputs(&terminal)? {
                println!("{input}");
            }
        }
        Commands::Route { terminal, input } => {
            device.set_current_input(&terminal, &input)?;
            let t = device.terminal(&terminal)?;
            println!("{} <- {}", t.name(), t.current_input());
            print_register(&board, t.descriptor().commit());
        }
        Commands::Polarity { terminal, value } => {
            if let Some(value) = value {
                device.set_polarity_str(&terminal, &value)?;
                print_register(&board, device.terminal(&terminal)?.descriptor().commit());
            }
            println!("{}", device.polarity(&terminal)?);
        }
        Commands::LineState { terminal } => {
            println!("{}", u8::from(device.line_state(&terminal)?));
        }
    }

    device.detach();
    Ok(())
}

fn print_register(board: &SimulatedBoard, commit: Commit) {
    match commit {
        Commit::TriggerControl { .. } => {
            println!("trigger control = {:#010x}", board.peek(regs::TRIGGER_CTRL));
        }
        Commit::SharedField { register, .. } => {
            println!("{register:?} = {:#010x}", board.peek(register.offset()));
        }
        Commit::BookkeepingOnly => println!("(no register: selection recorded only)"),
    }
}

fn synthetic_image() -> Vec<u8> {
    (0..SYNTHETIC_IMAGE_LEN).map(|i| (i % 251) as u8).collect()
}
