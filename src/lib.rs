//! # PXI Sync Core Library
//!
//! Routing and bring-up core for PXIe timing and synchronization modules.
//! The module is a fixed crossbar of named terminals (PXI trigger and star
//! lines, PFI lines, clock-source muxes, bank selectors) configured by writing
//! encoded values into a handful of control registers. Those registers only
//! exist once a programmable-logic image has been streamed into the device.
//!
//! ## Crate Structure
//!
//! - **`registry`**: the immutable routing topology, an arena of terminal
//!   descriptors with their legal inputs.
//! - **`regs`**: bit-exact register offsets and field encoders.
//! - **`io`**: the [`RegisterIo`] seam over mapped register regions.
//! - **`loader`**: the configuration-engine handshake that loads the image.
//! - **`calibration`**: PFI threshold DAC programming.
//! - **`terminal`**: per-terminal runtime state (selected input, polarity).
//! - **`encoder`** and **`broker`**: turn selections into register writes,
//!   serializing read-modify-write of shared words.
//! - **`device`**: bring-up, teardown and the name-based API.
//! - **`sim`**: an in-memory board for tests and the CLI.
//! - **`config`** and **`logging`**: layered settings and tracing setup.
//!
//! ## Example
//!
//! ```
//! use pxi_sync::config::SyncConfig;
//! use pxi_sync::sim::{EngineScript, SimulatedBoard};
//! use pxi_sync::SyncDevice;
//!
//! let image = [0u8; 16];
//! let board = SimulatedBoard::with_script(EngineScript::accepting(image.len()));
//! let mut config = SyncConfig::default();
//! config.load.gen_data_poll_interval_ms = 0;
//!
//! let device = SyncDevice::attach(board.bars(0xF000_0000), &image, &config)?;
//! device.set_current_input("PXI_Trig0", "PFI2")?;
//! assert_eq!(device.current_input("PXI_Trig0")?, "PFI2");
//! # Ok::<(), pxi_sync::SyncError>(())
//! ```

pub mod broker;
pub mod calibration;
pub mod config;
pub mod device;
pub mod encoder;
pub mod error;
pub mod io;
pub mod loader;
pub mod logging;
pub mod registry;
pub mod regs;
pub mod sim;
pub mod terminal;

pub use device::SyncDevice;
pub use error::{ErrorKind, Result, SyncError};
pub use io::{DeviceBars, RegisterIo};
pub use loader::{load_configuration, LoadPhase, LoadReport};
pub use registry::{Category, DescriptorRegistry, TerminalId};
pub use terminal::{Polarity, Terminal};
