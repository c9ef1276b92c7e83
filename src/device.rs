//! Device bring-up, teardown and the name-based routing API.
//!
//! [`SyncDevice::attach`] runs the whole bring-up:
//!
//! 1. stream the programmable-logic image ([`crate::loader`])
//! 2. program the PFI threshold DAC ([`crate::calibration`])
//! 3. create every terminal in category order, flushing each default route
//! 4. enable the external clock input
//!
//! Any failure releases whatever was created so far, newest first. A device
//! whose load failed must be attached again from scratch.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, trace, warn};

use crate::calibration::CalibrationDac;
use crate::config::SyncConfig;
use crate::encoder::RoutingEncoder;
use crate::error::{Result, SyncError};
use crate::io::DeviceBars;
use crate::loader::{ConfigLoader, LoadReport};
use crate::registry::{Category, DescriptorRegistry, SharedRegister, TerminalId};
use crate::regs;
use crate::terminal::{Polarity, Terminal};

/// One attached sync module.
pub struct SyncDevice {
    bars: DeviceBars,
    encoder: Arc<RoutingEncoder>,
    /// Creation order.
    terminals: Vec<Terminal>,
    by_id: HashMap<TerminalId, usize>,
    load_report: LoadReport,
}

impl SyncDevice {
    /// Load `image`, calibrate, and create every terminal.
    #[instrument(skip_all, fields(window_base = bars.window_base))]
    pub fn attach(bars: DeviceBars, image: &[u8], config: &SyncConfig) -> Result<Self> {
        let load_report = ConfigLoader::new(&bars, config.load.clone()).load(image)?;

        CalibrationDac::new(bars.window.clone(), config.calibration.clone())
            .init_threshold_dac()?;

        let mut by_id = HashMap::new();
        by_id.try_reserve(DescriptorRegistry::get().terminal_count())?;

        let encoder = Arc::new(RoutingEncoder::new(bars.window.clone()));
        let sync = bars.window.clone();
        let terminals = create_terminals(|id| Terminal::create(id, encoder.clone(), sync.clone()))
            .map_err(|unwound| {
                warn!(released = ?unwound.released, "Bring-up unwound");
                unwound.error
            })?;
        by_id.extend(terminals.iter().enumerate().map(|(i, t)| (t.id(), i)));

        bars.window.write32(regs::CLKIN_CTRL, regs::clkin_ctrl_enable(1));

        info!(terminals = terminals.len(), "Sync module attached");
        Ok(Self {
            bars,
            encoder,
            terminals,
            by_id,
            load_report,
        })
    }

    /// Release every terminal, newest first. Hardware keeps its routing.
    ///
    /// Returns the released terminal names in release order.
    pub fn detach(mut self) -> Vec<&'static str> {
        info!(terminals = self.terminals.len(), "Detaching sync module");
        release(std::mem::take(&mut self.terminals))
    }

    /// Summary of the configuration load performed at attach.
    pub fn load_report(&self) -> LoadReport {
        self.load_report
    }

    /// Register regions this device was attached with.
    pub fn bars(&self) -> &DeviceBars {
        &self.bars
    }

    /// Terminals in creation order.
    pub fn terminals(&self) -> impl Iterator<Item = &Terminal> {
        self.terminals.iter()
    }

    /// Look a terminal up by exact name.
    pub fn terminal(&self, name: &str) -> Result<&Terminal> {
        DescriptorRegistry::get()
            .lookup(name)
            .and_then(|id| self.by_id.get(&id))
            .map(|&i| &self.terminals[i])
            .ok_or_else(|| SyncError::invalid_argument(format!("no terminal named '{name}'")))
    }

    /// Look a terminal up by category and index.
    pub fn terminal_by_category(&self, category: Category, index: u32) -> Option<&Terminal> {
        DescriptorRegistry::get()
            .by_category(category, index)
            .and_then(|id| self.by_id.get(&id))
            .map(|&i| &self.terminals[i])
    }

    /// Name of the input `terminal` is routed from.
    pub fn current_input(&self, terminal: &str) -> Result<&'static str> {
        Ok(self.terminal(terminal)?.current_input())
    }

    /// Route `terminal` from `input`.
    pub fn set_current_input(&self, terminal: &str, input: &str) -> Result<()> {
        self.terminal(terminal)?.set_input(input)
    }

    /// Output polarity of `terminal`.
    pub fn polarity(&self, terminal: &str) -> Result<Polarity> {
        self.terminal(terminal)?.polarity()
    }

    /// Set the output polarity of `terminal`.
    pub fn set_polarity(&self, terminal: &str, polarity: Polarity) -> Result<()> {
        self.terminal(terminal)?.set_polarity(polarity)
    }

    /// Set the output polarity of `terminal` from `"normal"` or `"inverted"`.
    ///
    /// An unsupported terminal is reported before the value is parsed.
    pub fn set_polarity_str(&self, terminal: &str, polarity: &str) -> Result<()> {
        let t = self.terminal(terminal)?;
        t.polarity()?;
        t.set_polarity(polarity.parse()?)
    }

    /// Legal inputs of `terminal` in declared order.
    pub fn available_inputs(&self, terminal: &str) -> Result<Vec<&'static str>> {
        Ok(self.terminal(terminal)?.available_inputs().collect())
    }

    /// Live logic level of `terminal`.
    pub fn line_state(&self, terminal: &str) -> Result<bool> {
        self.terminal(terminal)?.line_state()
    }

    /// Current contents of a shared control word, read under its lock.
    pub fn shared_word(&self, register: SharedRegister) -> u32 {
        self.encoder.broker().read(register)
    }
}

/// A terminal failed to come up. Everything created before it was released.
struct Unwound {
    error: SyncError,
    /// Names released during the unwind, newest first.
    released: Vec<&'static str>,
}

/// Create every terminal in instantiation order with `create`.
///
/// Storage is reserved up front so the only failure past the first
/// allocation is `create` itself.
fn create_terminals<F>(mut create: F) -> std::result::Result<Vec<Terminal>, Unwound>
where
    F: FnMut(TerminalId) -> Result<Terminal>,
{
    let registry = DescriptorRegistry::get();
    let mut terminals = Vec::new();
    if let Err(e) = terminals.try_reserve_exact(registry.terminal_count()) {
        return Err(Unwound {
            error: e.into(),
            released: Vec::new(),
        });
    }

    for id in registry.instantiation_order() {
        match create(id) {
            Ok(terminal) => {
                trace!(
                    terminal = %terminal.name(),
                    input = %terminal.current_input(),
                    "Created terminal"
                );
                terminals.push(terminal);
            }
            Err(error) => {
                warn!(terminal = %registry.name(id), error = %error, "Terminal creation failed");
                return Err(Unwound {
                    error,
                    released: release(terminals),
                });
            }
        }
    }
    Ok(terminals)
}

/// Drop terminals newest first, returning their names in drop order.
fn release(mut terminals: Vec<Terminal>) -> Vec<&'static str> {
    let mut released = Vec::with_capacity(terminals.len());
    while let Some(terminal) = terminals.pop() {
        trace!(terminal = %terminal.name(), "Released terminal");
        released.push(terminal.name());
    }
    released
}

impl Drop for SyncDevice {
    fn drop(&mut self) {
        if !self.terminals.is_empty() {
            release(std::mem::take(&mut self.terminals));
        }
    }
}

impl std::fmt::Debug for SyncDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDevice")
            .field("bars", &self.bars)
            .field("terminals", &self.terminals.len())
            .field("load_report", &self.load_report)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalibrationConfig, LoadConfig};
    use crate::sim::{DacBusy, EngineScript, SimulatedBoard};

    const IMAGE: [u8; 8] = [0xAA; 8];

    fn config() -> SyncConfig {
        SyncConfig {
            load: LoadConfig {
                gen_data_poll_interval_ms: 0,
                ..LoadConfig::default()
            },
            calibration: CalibrationConfig {
                busy_poll_interval_us: 0,
                ..CalibrationConfig::default()
            },
            ..SyncConfig::default()
        }
    }

    fn attached() -> (SimulatedBoard, SyncDevice) {
        let board = SimulatedBoard::with_script(EngineScript::accepting(IMAGE.len()));
        let device = SyncDevice::attach(board.bars(0xF000_0000), &IMAGE, &config()).unwrap();
        (board, device)
    }

    #[test]
    fn test_attach_order_of_side_effects() {
        let (board, device) = attached();
        let writes = board.writes();

        let last_fifo = writes
            .iter()
            .rposition(|(o, _)| *o == regs::CE_BLOCK_OFFSET + crate::regs::ce::FIFO)
            .unwrap();
        let first_dac = writes.iter().position(|(o, _)| *o == regs::DAC_CTRL).unwrap();
        let first_trig = writes
            .iter()
            .position(|(o, _)| *o == regs::TRIGGER_CTRL)
            .unwrap();
        let clkin = writes
            .iter()
            .position(|(o, _)| *o == regs::CLKIN_CTRL)
            .unwrap();

        assert!(last_fifo < first_dac);
        assert!(first_dac < first_trig);
        assert_eq!(clkin, writes.len() - 1);
        assert_eq!(writes[clkin].1, 1 << 1);
        assert_eq!(device.terminals().count(), 56);
    }

    #[test]
    fn test_unknown_terminal_is_invalid_argument() {
        let (_board, device) = attached();
        assert!(device.current_input("PFI9").unwrap_err().is_invalid_argument());
        assert!(device.current_input("floating").unwrap_err().is_invalid_argument());
        assert!(device.terminal_by_category(Category::Pfi, 6).is_none());
    }

    #[test]
    fn test_set_polarity_str_checks_support_first() {
        let (_board, device) = attached();
        assert!(device.set_polarity_str("Bank0", "bogus").unwrap_err().is_unsupported());
        assert!(device.set_polarity_str("PFI0", "bogus").unwrap_err().is_invalid_argument());
        device.set_polarity_str("PFI0", "inverted\n").unwrap();
        assert_eq!(device.polarity("PFI0").unwrap(), Polarity::Inverted);
    }

    #[test]
    fn test_dac_failure_aborts_before_terminals() {
        let board = SimulatedBoard::with_script(EngineScript::accepting(IMAGE.len()));
        board.set_dac_busy(DacBusy::Always);
        let err = SyncDevice::attach(board.bars(0), &IMAGE, &config()).unwrap_err();
        assert!(err.is_timeout());
        assert!(board.writes_to(regs::TRIGGER_CTRL).is_empty());
        assert!(board.writes_to(regs::CLKIN_CTRL).is_empty());
    }

    #[test]
    fn test_detach_leaves_hardware_alone() {
        let (board, device) = attached();
        device.set_current_input("Bank2", "SourceBDividerSelect").unwrap();
        let before = board.writes().len();
        device.detach();
        assert_eq!(board.writes().len(), before);
    }

    #[test]
    fn test_creation_failure_releases_newest_first() {
        let board = SimulatedBoard::with_script(EngineScript::accepting(IMAGE.len()));
        let bars = board.bars(0xF000_0000);
        load_and_calibrate(&bars);
        let encoder = Arc::new(RoutingEncoder::new(bars.window.clone()));
        let registry = DescriptorRegistry::get();
        let failing = registry.lookup("PXI_Star3").unwrap();

        let mut created = Vec::new();
        let unwound = create_terminals(|id| {
            if id == failing {
                return Err(SyncError::io("terminal refused"));
            }
            created.push(registry.name(id));
            Terminal::create(id, encoder.clone(), bars.window.clone())
        })
        .err()
        .unwrap();

        assert!(unwound.error.is_io());
        // 8 trigger lines, 6 PFI lines, PXI_Star0-2.
        assert_eq!(created.len(), 17);
        assert_eq!(created.last(), Some(&"PXI_Star2"));
        created.reverse();
        assert_eq!(unwound.released, created);
    }

    #[test]
    fn test_creation_failure_writes_nothing_after_the_failing_terminal() {
        let board = SimulatedBoard::with_script(EngineScript::accepting(IMAGE.len()));
        let bars = board.bars(0xF000_0000);
        load_and_calibrate(&bars);
        let encoder = Arc::new(RoutingEncoder::new(bars.window.clone()));
        let failing = DescriptorRegistry::get().lookup("SourceB").unwrap();

        let mut writes_at_failure = None;
        let unwound = create_terminals(|id| {
            if id == failing {
                writes_at_failure = Some(board.writes().len());
                return Err(SyncError::io("terminal refused"));
            }
            Terminal::create(id, encoder.clone(), bars.window.clone())
        })
        .err()
        .unwrap();

        assert_eq!(unwound.released.first(), Some(&"SourceA"));
        assert_eq!(unwound.released.last(), Some(&"PXI_Trig0"));
        assert_eq!(Some(board.writes().len()), writes_at_failure);
        assert!(board.writes_to(regs::CLKIN_CTRL).is_empty());
    }

    fn load_and_calibrate(bars: &DeviceBars) {
        let config = config();
        ConfigLoader::new(bars, config.load).load(&IMAGE).unwrap();
        CalibrationDac::new(bars.window.clone(), config.calibration)
            .init_threshold_dac()
            .unwrap();
    }
}
