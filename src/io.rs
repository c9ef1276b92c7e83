//! Register access seam.
//!
//! The driver never maps memory itself; whoever attaches the device hands it
//! [`DeviceBars`] holding one [`RegisterIo`] per BAR. Production code backs
//! these with mapped PCI regions, tests and the CLI with
//! [`SimulatedBoard`](crate::sim::SimulatedBoard).

use std::sync::Arc;

/// 32-bit access to one mapped register region.
///
/// Writes have no failure channel: once issued they are assumed to land.
pub trait RegisterIo: Send + Sync {
    /// Read the 32-bit word at `offset` bytes into the region.
    fn read32(&self, offset: usize) -> u32;

    /// Write the 32-bit word at `offset` bytes into the region.
    fn write32(&self, offset: usize, value: u32);
}

/// The register regions handed over at attach time.
#[derive(Clone)]
pub struct DeviceBars {
    /// Bus-bridge registers (BAR0).
    pub bridge: Arc<dyn RegisterIo>,
    /// Sync window (BAR1). Holds the configuration engine until the
    /// programmable logic is loaded, the routing registers afterwards.
    pub window: Arc<dyn RegisterIo>,
    /// Bus address of BAR1, programmed into the bridge window registers.
    pub window_base: u32,
}

impl DeviceBars {
    /// Bundle the two regions of one device.
    pub fn new(bridge: Arc<dyn RegisterIo>, window: Arc<dyn RegisterIo>, window_base: u32) -> Self {
        Self {
            bridge,
            window,
            window_base,
        }
    }
}

impl std::fmt::Debug for DeviceBars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBars")
            .field("window_base", &format_args!("{:#010x}", self.window_base))
            .finish_non_exhaustive()
    }
}

/// A sub-block of a region starting at a fixed offset.
#[derive(Clone)]
pub(crate) struct Block {
    io: Arc<dyn RegisterIo>,
    base: usize,
}

impl Block {
    pub(crate) fn new(io: Arc<dyn RegisterIo>, base: usize) -> Self {
        Self { io, base }
    }

    pub(crate) fn read(&self, offset: usize) -> u32 {
        self.io.read32(self.base + offset)
    }

    pub(crate) fn write(&self, offset: usize, value: u32) {
        self.io.write32(self.base + offset, value)
    }
}
