//! Programmable-logic configuration load.
//!
//! Until an image is streamed into the configuration engine, BAR1 holds only
//! the engine's register block and none of the routing registers exist. The
//! handshake is:
//!
//! 1. open the bridge window onto BAR1
//! 2. check the engine is idle and waiting for start
//! 3. reset the FIFO, program the protocol timing, issue start
//! 4. poll until the engine is generating data
//! 5. stream the image as big-endian words, stopping early on done/error
//! 6. pad a trailing partial word with zeros
//! 7. clock filler words until done/error
//! 8. remap the bridge window for normal operation
//!
//! A loader runs once. A failed load leaves the engine in an unknown state and
//! can only be retried by attaching the device again.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::config::LoadConfig;
use crate::error::{Result, SyncError};
use crate::io::{Block, DeviceBars};
use crate::regs::{
    self, ce, data_config, prog_pulse, start_config, stop_config, CeCommand, CeStatus,
};

/// Word clocked into the engine after the image.
pub const FILLER_WORD: u32 = 0xFFFF_FFFF;

/// Phase of the configuration-load handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// Nothing attempted yet.
    Idle,
    /// Verifying the engine waits for start.
    CheckReady,
    /// Programming protocol timing and issuing start.
    Resetting,
    /// Polling for "generating data".
    AwaitGenData,
    /// Writing whole image words.
    Streaming,
    /// Writing the zero-padded trailing partial word.
    TailPad,
    /// Clocking filler words until done.
    DummyFlush,
    /// Image accepted; bridge remapped.
    Done,
    /// Aborted. Only a fresh attach can retry.
    Failed,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Summary of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    /// Whole image words written, not counting the tail word.
    pub words_streamed: usize,
    /// A zero-padded tail word was written.
    pub tail_padded: bool,
    /// Filler words written after the image.
    pub filler_words: u32,
    /// Status polls spent waiting for the engine to generate data.
    pub gen_data_polls: u32,
}

/// Drives the configuration engine through one image load.
pub struct ConfigLoader {
    bars: DeviceBars,
    engine: Block,
    settings: LoadConfig,
    phase: LoadPhase,
}

impl ConfigLoader {
    /// Create a loader for the device behind `bars`.
    pub fn new(bars: &DeviceBars, settings: LoadConfig) -> Self {
        Self {
            engine: Block::new(bars.window.clone(), regs::CE_BLOCK_OFFSET),
            bars: bars.clone(),
            settings,
            phase: LoadPhase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    fn enter(&mut self, phase: LoadPhase) {
        debug!(from = %self.phase, to = %phase, "Configuration load phase");
        self.phase = phase;
    }

    fn status(&self) -> CeStatus {
        CeStatus::from_raw(self.engine.read(ce::STATUS))
    }

    /// Stream `image` into the engine and bring up the routing register space.
    pub fn load(&mut self, image: &[u8]) -> Result<LoadReport> {
        if self.phase != LoadPhase::Idle {
            return Err(SyncError::io(format!(
                "configuration load already ran (phase {}); re-attach the device to retry",
                self.phase
            )));
        }

        info!(bytes = image.len(), "Loading programmable logic image");
        match self.run(image) {
            Ok(report) => {
                self.enter(LoadPhase::Done);
                self.remap_window();
                info!(
                    words = report.words_streamed,
                    tail_padded = report.tail_padded,
                    filler_words = report.filler_words,
                    "Programmable logic configured"
                );
                Ok(report)
            }
            Err(e) => {
                error!(phase = %self.phase, error = %e, "Configuration load failed");
                self.enter(LoadPhase::Failed);
                Err(e)
            }
        }
    }

    fn run(&mut self, image: &[u8]) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        self.bars.bridge.write32(
            regs::BRIDGE_IODWBSR,
            self.bars.window_base | regs::IODWBSR_WENAB,
        );

        self.enter(LoadPhase::CheckReady);
        let status = self.status();
        if !status.ready_to_start() {
            return Err(SyncError::io(format!(
                "device in invalid state (engine status {:#010x})",
                status.bits()
            )));
        }

        self.enter(LoadPhase::Resetting);
        self.engine.write(ce::COMMAND, CeCommand::RESET_FIFO.bits());
        self.engine.write(ce::FLASH_INFO, 0);
        self.engine.write(
            ce::PROG_PULSE_CONFIG,
            prog_pulse::START_READY_IMMEDIATE
                | prog_pulse::START_DRIVE_UNASSERT
                | prog_pulse::start_len(0x13),
        );
        self.engine.write(
            ce::DATA_CONFIG,
            data_config::data_clks(1) | data_config::ORDER_MSB2LSB | data_config::IS_PARALLEL,
        );
        self.engine.write(ce::START_CONFIG, start_config::clkrdy_delay(1));
        self.engine.write(
            ce::STOP_CONFIG,
            stop_config::post_clks(0x64)
                | stop_config::DONE_HIGH_TRUE
                | stop_config::NOERR_HIGH_TRUE
                | stop_config::DONE_RDY_IMMEDIATE,
        );
        self.engine.write(ce::FLASH_ADDR, 0);
        self.engine.write(ce::COMMAND, CeCommand::START_FPGA.bits());

        self.enter(LoadPhase::AwaitGenData);
        report.gen_data_polls = self.await_gen_data()?;

        self.enter(LoadPhase::Streaming);
        let chunks = image.chunks_exact(4);
        let tail = chunks.remainder();
        let mut status = CeStatus::empty();
        for chunk in chunks {
            let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.engine.write(ce::FIFO, word);
            report.words_streamed += 1;
            status = self.status();
            if status.stop_download() {
                debug!(
                    words = report.words_streamed,
                    "Engine stopped download before end of image"
                );
                break;
            }
        }
        self.check_error(status)?;

        if !status.stop_download() && !tail.is_empty() {
            self.enter(LoadPhase::TailPad);
            let mut padded = [0u8; 4];
            padded[..tail.len()].copy_from_slice(tail);
            self.engine.write(ce::FIFO, u32::from_be_bytes(padded));
            report.tail_padded = true;
            status = self.status();
            self.check_error(status)?;
        }

        if !status.contains(CeStatus::CONFIG_DONE) {
            self.enter(LoadPhase::DummyFlush);
            status = self.dummy_flush(&mut report)?;
        }

        if !status.contains(CeStatus::CONFIG_DONE) || status.contains(CeStatus::CONFIG_ERROR) {
            return Err(SyncError::io(format!(
                "image download failed (engine status {:#010x})",
                status.bits()
            )));
        }
        Ok(report)
    }

    fn await_gen_data(&self) -> Result<u32> {
        let attempts = self.settings.gen_data_polls;
        for attempt in 1..=attempts {
            if self.status().contains(CeStatus::IN_GEN_DATA) {
                return Ok(attempt);
            }
            if attempt < attempts {
                std::thread::sleep(self.settings.gen_data_poll_interval());
            }
        }
        Err(SyncError::Timeout {
            waiting_for: "configuration engine to generate data",
            attempts,
        })
    }

    fn dummy_flush(&self, report: &mut LoadReport) -> Result<CeStatus> {
        let mut status = CeStatus::empty();
        while report.filler_words < self.settings.dummy_flush_words {
            self.engine.write(ce::FIFO, FILLER_WORD);
            report.filler_words += 1;
            status = self.status();
            if status.stop_download() {
                self.check_error(status)?;
                return Ok(status);
            }
        }
        warn!(
            filler_words = report.filler_words,
            "Engine never signalled done during filler cycles"
        );
        Err(SyncError::io(format!(
            "image download failed: no done after {} filler words",
            report.filler_words
        )))
    }

    fn check_error(&self, status: CeStatus) -> Result<()> {
        if status.contains(CeStatus::CONFIG_ERROR) {
            Err(SyncError::io(format!(
                "image download failed: engine reported configuration error (status {:#010x})",
                status.bits()
            )))
        } else {
            Ok(())
        }
    }

    /// Close the load window and map the configured logic's register space.
    fn remap_window(&self) {
        let bridge = &self.bars.bridge;
        let iodwbsr = bridge.read32(regs::BRIDGE_IODWBSR) & !regs::IODWBSR_WENAB;
        bridge.write32(regs::BRIDGE_IODWBSR, iodwbsr);
        bridge.write32(
            regs::BRIDGE_IOWBSR1,
            self.bars.window_base | regs::IOWBSR1_WENAB | regs::IOWBSR1_WSIZE4,
        );
    }
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("phase", &self.phase)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Load `image` into the device behind `bars` with a fresh loader.
pub fn load_configuration(
    bars: &DeviceBars,
    image: &[u8],
    settings: &LoadConfig,
) -> Result<LoadReport> {
    ConfigLoader::new(bars, settings.clone()).load(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Completion, EngineScript, SimulatedBoard};

    const BASE: u32 = 0xF000_0000;

    fn fast() -> LoadConfig {
        LoadConfig {
            gen_data_poll_interval_ms: 0,
            ..LoadConfig::default()
        }
    }

    fn board(completion: Completion) -> SimulatedBoard {
        SimulatedBoard::with_script(EngineScript {
            completion,
            ..EngineScript::default()
        })
    }

    #[test]
    fn test_protocol_constants() {
        let board = board(Completion::AfterWords(1));
        load_configuration(&board.bars(BASE), &[1, 2, 3, 4], &fast()).unwrap();

        let engine_writes = |o: usize| board.writes_to(regs::CE_BLOCK_OFFSET + o);
        assert_eq!(engine_writes(ce::PROG_PULSE_CONFIG), vec![0x0006_0013]);
        assert_eq!(engine_writes(ce::DATA_CONFIG), vec![0x0000_010A]);
        assert_eq!(engine_writes(ce::START_CONFIG), vec![1]);
        assert_eq!(engine_writes(ce::STOP_CONFIG), vec![0x6407_0000]);
        assert_eq!(engine_writes(ce::FLASH_ADDR), vec![0]);
        assert_eq!(
            board.engine_commands(),
            vec![CeCommand::RESET_FIFO, CeCommand::START_FPGA]
        );
    }

    #[test]
    fn test_words_are_big_endian() {
        let board = board(Completion::AfterWords(2));
        let image = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];
        let report = load_configuration(&board.bars(BASE), &image, &fast()).unwrap();
        assert_eq!(board.fifo_words(), vec![0x1234_5678, 0x9ABC_DEF0]);
        assert_eq!(report.words_streamed, 2);
        assert!(!report.tail_padded);
        assert_eq!(report.filler_words, 0);
    }

    #[test]
    fn test_early_done_stops_streaming() {
        let board = board(Completion::AfterWords(2));
        let image = [0u8; 64];
        let report = load_configuration(&board.bars(BASE), &image, &fast()).unwrap();
        assert_eq!(report.words_streamed, 2);
        assert_eq!(board.fifo_words().len(), 2);
    }

    #[test]
    fn test_not_ready_is_io_error() {
        let board = SimulatedBoard::with_script(EngineScript {
            initial_status: CeStatus::IN_RESET | CeStatus::IN_WAIT_START,
            ..EngineScript::default()
        });
        let mut loader = ConfigLoader::new(&board.bars(BASE), fast());
        let err = loader.load(&[0; 8]).unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("invalid state"));
        assert_eq!(loader.phase(), LoadPhase::Failed);
        assert!(board.engine_commands().is_empty());
    }

    #[test]
    fn test_config_error_fails_without_filler() {
        let board = board(Completion::ErrorAfterWords(1));
        let err = load_configuration(&board.bars(BASE), &[0; 10], &fast()).unwrap_err();
        assert!(err.is_io());
        assert_eq!(board.fifo_words().len(), 1);
        assert_eq!(board.peek_bridge(regs::BRIDGE_IOWBSR1), 0);
    }

    #[test]
    fn test_filler_exhaustion_is_io_error() {
        let board = board(Completion::Never);
        let settings = LoadConfig {
            dummy_flush_words: 5,
            ..fast()
        };
        let err = load_configuration(&board.bars(BASE), &[0; 4], &settings).unwrap_err();
        assert!(err.is_io());
        assert!(!err.is_timeout());
        let mut expected = vec![0];
        expected.extend([FILLER_WORD; 5]);
        assert_eq!(board.fifo_words(), expected);
    }

    #[test]
    fn test_bridge_window_remapped_on_done() {
        let board = board(Completion::AfterWords(1));
        load_configuration(&board.bars(BASE), &[0; 4], &fast()).unwrap();
        assert_eq!(board.peek_bridge(regs::BRIDGE_IODWBSR), BASE);
        assert_eq!(board.peek_bridge(regs::BRIDGE_IOWBSR1), BASE | 0x90);
    }

    #[test]
    fn test_loader_runs_once() {
        let board = board(Completion::AfterWords(1));
        let mut loader = ConfigLoader::new(&board.bars(BASE), fast());
        loader.load(&[0; 4]).unwrap();
        assert_eq!(loader.phase(), LoadPhase::Done);
        assert!(loader.load(&[0; 4]).unwrap_err().is_io());
    }
}
