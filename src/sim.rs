//! Simulated sync module for testing without hardware.
//!
//! [`SimulatedBoard`] backs both BARs with in-memory words, records every
//! write in order, and models the two pieces of hardware that react to
//! writes: the configuration engine handshake and the calibration DAC's
//! busy flag. Everything else behaves like plain memory.
//!
//! # Example
//!
//! ```
//! use pxi_sync::sim::{Completion, EngineScript, SimulatedBoard};
//!
//! let board = SimulatedBoard::with_script(EngineScript {
//!     completion: Completion::AfterWords(3),
//!     ..EngineScript::default()
//! });
//! let bars = board.bars(0xF000_0000);
//! assert_eq!(bars.window_base, 0xF000_0000);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::io::{DeviceBars, RegisterIo};
use crate::regs::{self, ce, CeCommand, CeStatus};

/// Filler words the real engine needs after the image before raising done.
pub const FILLER_WORDS_TO_DONE: usize = 100;

/// When the engine raises a terminal status bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// `CONFIG_DONE` once this many words have entered the FIFO.
    AfterWords(usize),
    /// `CONFIG_ERROR` once this many words have entered the FIFO.
    ErrorAfterWords(usize),
    /// Neither bit is ever raised.
    Never,
}

/// How the calibration DAC serial port reports busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DacBusy {
    /// Never busy.
    #[default]
    Never,
    /// Busy for this many status reads after each write.
    ForReads(u32),
    /// Permanently busy.
    Always,
}

/// Behaviour of the simulated configuration engine.
#[derive(Debug, Clone)]
pub struct EngineScript {
    /// Status the engine reports before any command.
    pub initial_status: CeStatus,
    /// Status polls after `START` before "generating data" asserts.
    /// `None` means it never asserts.
    pub gen_data_after_polls: Option<u32>,
    /// When the download terminates.
    pub completion: Completion,
}

impl Default for EngineScript {
    fn default() -> Self {
        Self {
            initial_status: CeStatus::IN_WAIT_START,
            gen_data_after_polls: Some(2),
            completion: Completion::Never,
        }
    }
}

impl EngineScript {
    /// An engine that accepts an image of `image_len` bytes the way the
    /// real part does: done after the padded image plus the filler cycles.
    pub fn accepting(image_len: usize) -> Self {
        Self {
            completion: Completion::AfterWords(image_len.div_ceil(4) + FILLER_WORDS_TO_DONE),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct Engine {
    script: EngineScript,
    status: CeStatus,
    started: bool,
    polls: u32,
    fifo: Vec<u32>,
    commands: Vec<CeCommand>,
}

impl Engine {
    fn new(script: EngineScript) -> Self {
        Self {
            status: script.initial_status,
            script,
            started: false,
            polls: 0,
            fifo: Vec::new(),
            commands: Vec::new(),
        }
    }

    fn read(&mut self, offset: usize, words: &HashMap<usize, u32>) -> u32 {
        if offset != ce::STATUS {
            return words.get(&(regs::CE_BLOCK_OFFSET + offset)).copied().unwrap_or(0);
        }
        if self.started && !self.status.contains(CeStatus::IN_GEN_DATA) {
            self.polls += 1;
            if let Some(after) = self.script.gen_data_after_polls {
                if self.polls >= after {
                    self.status.remove(CeStatus::IN_WAIT_START);
                    self.status.insert(CeStatus::IN_GEN_DATA);
                }
            }
        }
        self.status.bits()
    }

    fn write(&mut self, offset: usize, value: u32) {
        match offset {
            ce::COMMAND => {
                let command = CeCommand::from_bits_retain(value);
                if command.contains(CeCommand::RESET_FIFO) {
                    self.fifo.clear();
                }
                if command.contains(CeCommand::START_FPGA) {
                    self.started = true;
                }
                self.commands.push(command);
            }
            ce::FIFO if self.status.contains(CeStatus::IN_GEN_DATA) => {
                self.fifo.push(value);
                match self.script.completion {
                    Completion::AfterWords(n) if self.fifo.len() >= n => {
                        self.status.insert(CeStatus::CONFIG_DONE);
                    }
                    Completion::ErrorAfterWords(n) if self.fifo.len() >= n => {
                        self.status.insert(CeStatus::CONFIG_ERROR);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
struct Dac {
    mode: DacBusy,
    remaining: u32,
    words: Vec<u32>,
}

#[derive(Debug)]
struct Window {
    words: HashMap<usize, u32>,
    writes: Vec<(usize, u32)>,
    engine: Engine,
    dac: Dac,
}

#[derive(Debug)]
struct BoardState {
    bridge: Mutex<HashMap<usize, u32>>,
    window: Mutex<Window>,
}

/// In-memory stand-in for one sync module.
#[derive(Clone, Debug)]
pub struct SimulatedBoard {
    state: Arc<BoardState>,
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBoard {
    /// A board whose engine never finishes a download.
    pub fn new() -> Self {
        Self::with_script(EngineScript::default())
    }

    /// A board whose engine follows `script`.
    pub fn with_script(script: EngineScript) -> Self {
        Self {
            state: Arc::new(BoardState {
                bridge: Mutex::new(HashMap::new()),
                window: Mutex::new(Window {
                    words: HashMap::new(),
                    writes: Vec::new(),
                    engine: Engine::new(script),
                    dac: Dac {
                        mode: DacBusy::Never,
                        remaining: 0,
                        words: Vec::new(),
                    },
                }),
            }),
        }
    }

    /// Change how the calibration DAC reports busy.
    pub fn set_dac_busy(&self, mode: DacBusy) {
        let mut window = self.state.window.lock();
        window.dac.mode = mode;
        window.dac.remaining = 0;
    }

    /// Both regions, as handed to an attach.
    pub fn bars(&self, window_base: u32) -> DeviceBars {
        DeviceBars::new(self.bridge(), self.window(), window_base)
    }

    /// The bus-bridge region (BAR0).
    pub fn bridge(&self) -> Arc<dyn RegisterIo> {
        Arc::new(BridgeRegion(self.state.clone()))
    }

    /// The sync window region (BAR1).
    pub fn window(&self) -> Arc<dyn RegisterIo> {
        Arc::new(WindowRegion(self.state.clone()))
    }

    /// Set a BAR1 word without recording a write.
    pub fn preload(&self, offset: usize, value: u32) {
        self.state.window.lock().words.insert(offset, value);
    }

    /// Current value of a plain BAR1 word.
    pub fn peek(&self, offset: usize) -> u32 {
        self.state
            .window
            .lock()
            .words
            .get(&offset)
            .copied()
            .unwrap_or(0)
    }

    /// Current value of a bridge word.
    pub fn peek_bridge(&self, offset: usize) -> u32 {
        self.state.bridge.lock().get(&offset).copied().unwrap_or(0)
    }

    /// Set a bridge word.
    pub fn preload_bridge(&self, offset: usize, value: u32) {
        self.state.bridge.lock().insert(offset, value);
    }

    /// Every BAR1 write, in order.
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.state.window.lock().writes.clone()
    }

    /// Values written to one BAR1 offset, in order.
    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.state
            .window
            .lock()
            .writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Forget recorded writes.
    pub fn clear_writes(&self) {
        self.state.window.lock().writes.clear();
    }

    /// Words accepted by the configuration engine FIFO.
    pub fn fifo_words(&self) -> Vec<u32> {
        self.state.window.lock().engine.fifo.clone()
    }

    /// Commands issued to the configuration engine.
    pub fn engine_commands(&self) -> Vec<CeCommand> {
        self.state.window.lock().engine.commands.clone()
    }

    /// Current configuration engine status.
    pub fn engine_status(&self) -> CeStatus {
        self.state.window.lock().engine.status
    }

    /// Words shifted out to the calibration DAC.
    pub fn dac_words(&self) -> Vec<u32> {
        self.state.window.lock().dac.words.clone()
    }
}

struct BridgeRegion(Arc<BoardState>);

impl RegisterIo for BridgeRegion {
    fn read32(&self, offset: usize) -> u32 {
        self.0.bridge.lock().get(&offset).copied().unwrap_or(0)
    }

    fn write32(&self, offset: usize, value: u32) {
        self.0.bridge.lock().insert(offset, value);
    }
}

struct WindowRegion(Arc<BoardState>);

fn engine_offset(offset: usize) -> Option<usize> {
    offset
        .checked_sub(regs::CE_BLOCK_OFFSET)
        .filter(|o| *o < ce::BLOCK_LEN)
}

impl RegisterIo for WindowRegion {
    fn read32(&self, offset: usize) -> u32 {
        let mut guard = self.0.window.lock();
        let window = &mut *guard;
        if let Some(o) = engine_offset(offset) {
            return window.engine.read(o, &window.words);
        }
        if offset == regs::DAC_CTRL {
            let busy = match window.dac.mode {
                DacBusy::Never => false,
                DacBusy::Always => true,
                DacBusy::ForReads(_) if window.dac.remaining > 0 => {
                    window.dac.remaining -= 1;
                    true
                }
                DacBusy::ForReads(_) => false,
            };
            return if busy { regs::DAC_CTRL_SERIAL_PORT_BUSY } else { 0 };
        }
        window.words.get(&offset).copied().unwrap_or(0)
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut guard = self.0.window.lock();
        let window = &mut *guard;
        window.writes.push((offset, value));
        if let Some(o) = engine_offset(offset) {
            window.words.insert(offset, value);
            window.engine.write(o, value);
            return;
        }
        if offset == regs::DAC_CTRL {
            window.dac.words.push(value);
            if let DacBusy::ForReads(n) = window.dac.mode {
                window.dac.remaining = n;
            }
            return;
        }
        window.words.insert(offset, value);
    }
}
