//! Terminal runtime model.
//!
//! A [`Terminal`] is the mutable half of a descriptor: the input currently
//! selected and, for terminals owning a trigger control word, the output
//! polarity. State lives behind a per-terminal lock which is held across the
//! hardware commit, so a terminal's visible state and its register contents
//! never disagree.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::encoder::RoutingEncoder;
use crate::error::{Result, SyncError};
use crate::io::RegisterIo;
use crate::registry::{DescriptorRegistry, InputIter, TerminalDescriptor, TerminalId};
use crate::regs;

/// Output polarity of a trigger-control terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Signal passes unchanged.
    #[default]
    Normal,
    /// Signal is inverted at the output.
    Inverted,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Inverted => write!(f, "inverted"),
        }
    }
}

impl FromStr for Polarity {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match strip_line_terminator(s) {
            "normal" => Ok(Self::Normal),
            "inverted" => Ok(Self::Inverted),
            other => Err(SyncError::invalid_argument(format!(
                "unknown polarity '{other}', expected 'normal' or 'inverted'"
            ))),
        }
    }
}

/// Drop one trailing `\n` or `\r\n`, as left behind by `echo` into an attribute.
pub fn strip_line_terminator(s: &str) -> &str {
    match s.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => s,
    }
}

#[derive(Debug)]
struct TerminalState {
    /// Index into the descriptor's input list.
    current: usize,
    polarity: Polarity,
}

/// Runtime instance of one routable terminal.
pub struct Terminal {
    id: TerminalId,
    descriptor: &'static TerminalDescriptor,
    state: RwLock<TerminalState>,
    encoder: Arc<RoutingEncoder>,
    sync: Arc<dyn RegisterIo>,
}

impl Terminal {
    /// Create the instance for `id` on its default input and flush that
    /// default to hardware.
    ///
    /// Pseudo-sources have no inputs and cannot be instantiated.
    pub fn create(
        id: TerminalId,
        encoder: Arc<RoutingEncoder>,
        sync: Arc<dyn RegisterIo>,
    ) -> Result<Self> {
        let descriptor = DescriptorRegistry::get().descriptor(id);
        let default = descriptor.default_input().ok_or_else(|| {
            SyncError::invalid_argument(format!(
                "'{}' is not a routable terminal",
                descriptor.name()
            ))
        })?;

        encoder.commit(descriptor, default, Polarity::Normal);

        Ok(Self {
            id,
            descriptor,
            state: RwLock::new(TerminalState {
                current: 0,
                polarity: Polarity::Normal,
            }),
            encoder,
            sync,
        })
    }

    /// Registry id of this terminal.
    pub fn id(&self) -> TerminalId {
        self.id
    }

    /// Terminal name, e.g. `PFI3`.
    pub fn name(&self) -> &'static str {
        self.descriptor.name()
    }

    /// The immutable definition behind this instance.
    pub fn descriptor(&self) -> &'static TerminalDescriptor {
        self.descriptor
    }

    /// Name of the currently selected input.
    pub fn current_input(&self) -> &'static str {
        let current = self.state.read().current;
        let option = &self.descriptor.inputs()[current];
        DescriptorRegistry::get().name(option.source)
    }

    /// Select the input named `name`.
    ///
    /// A trailing line terminator is ignored. Unknown names are rejected with
    /// no change to state or hardware. Bookkeeping-only terminals record the
    /// selection without writing anything.
    pub fn set_input(&self, name: &str) -> Result<()> {
        let wanted = strip_line_terminator(name);
        let registry = DescriptorRegistry::get();
        let position = registry
            .inputs(self.id)
            .position(|(input_name, _)| input_name == wanted)
            .ok_or_else(|| {
                SyncError::invalid_argument(format!(
                    "'{wanted}' is not a valid input for {}",
                    self.name()
                ))
            })?;

        let mut state = self.state.write();
        state.current = position;
        let option = &self.descriptor.inputs()[position];
        let written = self.encoder.commit(self.descriptor, option, state.polarity);
        debug!(
            terminal = %self.name(),
            input = %wanted,
            committed = written.is_some(),
            "Selected input"
        );
        Ok(())
    }

    /// Output polarity. Only terminals owning a trigger control word have one.
    pub fn polarity(&self) -> Result<Polarity> {
        self.require_polarity()?;
        Ok(self.state.read().polarity)
    }

    /// Change the output polarity and re-flush the whole control word.
    pub fn set_polarity(&self, polarity: Polarity) -> Result<()> {
        self.require_polarity()?;
        let mut state = self.state.write();
        state.polarity = polarity;
        let option = &self.descriptor.inputs()[state.current];
        self.encoder.commit(self.descriptor, option, polarity);
        debug!(terminal = %self.name(), %polarity, "Set polarity");
        Ok(())
    }

    fn require_polarity(&self) -> Result<()> {
        if self.descriptor.supports_polarity() {
            Ok(())
        } else {
            Err(SyncError::Unsupported {
                terminal: self.name().to_string(),
                operation: "polarity",
            })
        }
    }

    /// Live logic level of the line.
    pub fn line_state(&self) -> Result<bool> {
        let bit = self
            .descriptor
            .line_state_bit()
            .ok_or_else(|| SyncError::Unsupported {
                terminal: self.name().to_string(),
                operation: "line state",
            })?;
        let offset = regs::trig_read_offset(bit).ok_or_else(|| {
            SyncError::io(format!("line-state bit {bit} of '{}' is not read back", self.name()))
        })?;
        let word = self.sync.read32(offset);
        Ok(word & (1 << (bit % 32)) != 0)
    }

    /// Legal input names in declared order.
    pub fn available_inputs(&self) -> impl Iterator<Item = &'static str> {
        self.input_options().map(|(name, _)| name)
    }

    /// Legal inputs with their encoded values, in declared order.
    pub fn input_options(&self) -> InputIter<'static> {
        DescriptorRegistry::get().inputs(self.id)
    }
}

impl fmt::Debug for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Terminal")
            .field("name", &self.name())
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}
