//! PFI threshold calibration DAC.
//!
//! The DAC sits behind a serial port in the sync block. Each word is shifted
//! out by hardware; the port must be idle before the next word is written.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CalibrationConfig;
use crate::error::{Result, SyncError};
use crate::io::RegisterIo;
use crate::registry::PFI_COUNT;
use crate::regs;

/// Select the PFI threshold DAC and its gain.
pub const DAC_SELECT_PFI_THRESHOLD: u32 = 0x800C;
/// LDAC options.
pub const DAC_LDAC: u32 = 0xA000;
/// Power-down control: all channels up.
pub const DAC_POWER: u32 = 0xC000;

/// Channel register write for one PFI comparator.
pub const fn dac_channel_word(pfi: u32, code: u32) -> u32 {
    (pfi << 12) | ((code & 0xFF) << 4)
}

/// Serial writer for the calibration DAC.
pub struct CalibrationDac {
    sync: Arc<dyn RegisterIo>,
    settings: CalibrationConfig,
}

impl CalibrationDac {
    /// Create a writer over the sync register block.
    pub fn new(sync: Arc<dyn RegisterIo>, settings: CalibrationConfig) -> Self {
        Self { sync, settings }
    }

    /// Wait for the serial port to go idle, then write `value`.
    pub fn dac_write(&self, value: u32) -> Result<()> {
        let attempts = self.settings.busy_polls;
        let mut idle = false;
        for attempt in 1..=attempts {
            if self.sync.read32(regs::DAC_CTRL) & regs::DAC_CTRL_SERIAL_PORT_BUSY == 0 {
                idle = true;
                break;
            }
            if attempt < attempts {
                std::thread::sleep(self.settings.busy_poll_interval());
            }
        }
        if !idle {
            warn!(value = format_args!("{:#06x}", value), "DAC serial port stuck busy");
            return Err(SyncError::Timeout {
                waiting_for: "DAC serial port",
                attempts,
            });
        }

        self.sync.write32(regs::DAC_CTRL, value);
        Ok(())
    }

    /// Program the PFI input thresholds.
    pub fn init_threshold_dac(&self) -> Result<()> {
        self.dac_write(DAC_SELECT_PFI_THRESHOLD)?;
        self.dac_write(DAC_LDAC)?;
        self.dac_write(DAC_POWER)?;
        for pfi in 0..PFI_COUNT {
            self.dac_write(dac_channel_word(pfi, self.settings.pfi_threshold_code))?;
        }
        debug!(
            code = self.settings.pfi_threshold_code,
            "PFI threshold DAC initialized"
        );
        Ok(())
    }
}

impl std::fmt::Debug for CalibrationDac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationDac")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
