//! Routing encoder.
//!
//! Turns a terminal's selected input and polarity into register writes.
//! Terminals owning a trigger control word get a full-word overwrite; terminals
//! owning a field of a shared word go through the [`RegisterBroker`].

use std::sync::Arc;

use tracing::trace;

use crate::broker::RegisterBroker;
use crate::io::RegisterIo;
use crate::registry::{Commit, DescriptorRegistry, InputOption, TerminalDescriptor};
use crate::regs::{self, trig};
use crate::terminal::Polarity;

/// Compute the trigger control word for one dedicated-register terminal.
///
/// `ASYNCHRONOUS` is always set. `ENABLED` is set unless the selected input is
/// the floating pseudo-source.
pub fn trigger_control_word(destination: u32, input: &InputOption, polarity: Polarity) -> u32 {
    let floating = input.source == DescriptorRegistry::get().floating();

    let mut word = trig::dest(destination) | trig::src(input.data) | trig::ASYNCHRONOUS;
    if !floating {
        word |= trig::ENABLED;
    }
    if polarity == Polarity::Inverted {
        word |= trig::INVERTED;
    }
    word
}

/// Writes routing selections to the sync block.
pub struct RoutingEncoder {
    sync: Arc<dyn RegisterIo>,
    broker: RegisterBroker,
}

impl RoutingEncoder {
    /// Create an encoder over the sync register block.
    pub fn new(sync: Arc<dyn RegisterIo>) -> Self {
        Self {
            broker: RegisterBroker::new(sync.clone()),
            sync,
        }
    }

    /// The broker serializing shared-word updates.
    pub fn broker(&self) -> &RegisterBroker {
        &self.broker
    }

    /// Flush `input` and `polarity` for `descriptor` to hardware.
    ///
    /// Returns the word written, or `None` for bookkeeping-only terminals.
    pub fn commit(
        &self,
        descriptor: &TerminalDescriptor,
        input: &InputOption,
        polarity: Polarity,
    ) -> Option<u32> {
        match descriptor.commit() {
            Commit::TriggerControl { destination } => {
                let word = trigger_control_word(destination, input, polarity);
                self.sync.write32(regs::TRIGGER_CTRL, word);
                trace!(
                    terminal = %descriptor.name(),
                    value = format_args!("{:#010x}", word),
                    "Wrote trigger control word"
                );
                Some(word)
            }
            Commit::SharedField {
                register,
                field_mask,
            } => Some(self.broker.update_field(register, field_mask, input.data)),
            Commit::BookkeepingOnly => None,
        }
    }
}

impl std::fmt::Debug for RoutingEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEncoder")
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}
