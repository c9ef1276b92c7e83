//! Register map of the sync module.
//!
//! Three register blocks matter to the driver:
//!
//! - the bus-bridge block in BAR0, which owns the window that maps BAR1,
//! - the configuration engine, visible at [`CE_BLOCK_OFFSET`] in BAR1 only
//!   while the programmable logic is unconfigured,
//! - the sync block at the start of BAR1, valid once the logic is loaded.
//!
//! Offsets are byte offsets within their BAR. Field helpers return the value
//! already shifted into place.

use bitflags::bitflags;

// =============================================================================
// Bus bridge (BAR0)
// =============================================================================

/// I/O device window base/size register.
pub const BRIDGE_IODWBSR: usize = 0xC0;
/// I/O window base/size register 1.
pub const BRIDGE_IOWBSR1: usize = 0xC4;

/// Window enable bit in [`BRIDGE_IODWBSR`].
pub const IODWBSR_WENAB: u32 = 1 << 7;
/// Window enable bit in [`BRIDGE_IOWBSR1`].
pub const IOWBSR1_WENAB: u32 = 1 << 7;
/// 4 KiB window size encoding in [`BRIDGE_IOWBSR1`].
pub const IOWBSR1_WSIZE4: u32 = 1 << 4;

// =============================================================================
// Configuration engine (BAR1 + 0x1000)
// =============================================================================

/// Offset of the configuration engine block inside BAR1.
pub const CE_BLOCK_OFFSET: usize = 0x1000;

/// Configuration engine register offsets, relative to [`CE_BLOCK_OFFSET`].
pub mod ce {
    /// Command word ([`super::CeCommand`]).
    pub const COMMAND: usize = 0x00;
    /// Flash geometry; zero when streaming from the host.
    pub const FLASH_INFO: usize = 0x04;
    /// Program-pulse timing ([`super::prog_pulse`]).
    pub const PROG_PULSE_CONFIG: usize = 0x08;
    /// Data width and bit order ([`super::data_config`]).
    pub const DATA_CONFIG: usize = 0x0C;
    /// Start condition ([`super::start_config`]).
    pub const START_CONFIG: usize = 0x10;
    /// Stop condition ([`super::stop_config`]).
    pub const STOP_CONFIG: usize = 0x14;
    /// Flash start address; zero when streaming from the host.
    pub const FLASH_ADDR: usize = 0x18;
    /// Status word ([`super::CeStatus`]).
    pub const STATUS: usize = 0x1C;
    /// Image data FIFO.
    pub const FIFO: usize = 0x20;

    /// Span of the block in bytes.
    pub const BLOCK_LEN: usize = 0x28;
}

bitflags! {
    /// Commands accepted by the configuration engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CeCommand: u32 {
        /// Flush the data FIFO.
        const RESET_FIFO = 1 << 24;
        /// Begin configuring the programmable logic.
        const START_FPGA = 1 << 2;
    }
}

bitflags! {
    /// Configuration engine status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CeStatus: u32 {
        /// Engine held in reset.
        const IN_RESET = 1 << 31;
        /// Idle, waiting for a start command.
        const IN_WAIT_START = 1 << 24;
        /// Clocking FIFO data into the logic.
        const IN_GEN_DATA = 1 << 12;
        /// The logic reported configuration done.
        const CONFIG_DONE = 1 << 6;
        /// The logic reported a configuration error.
        const CONFIG_ERROR = 1 << 4;

        /// Either terminal condition ends the download.
        const STOP_DOWNLOAD = Self::CONFIG_DONE.bits() | Self::CONFIG_ERROR.bits();
    }
}

impl CeStatus {
    /// Interpret a raw status read, keeping unknown bits.
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bits_retain(raw)
    }

    /// Engine is idle and waiting for a start command.
    pub fn ready_to_start(self) -> bool {
        (self & (Self::IN_RESET | Self::IN_WAIT_START)) == Self::IN_WAIT_START
    }

    /// Either done or error has been raised.
    pub fn stop_download(self) -> bool {
        self.intersects(Self::STOP_DOWNLOAD)
    }
}

/// Program-pulse configuration fields.
pub mod prog_pulse {
    /// Start as soon as ready, without waiting on INIT.
    pub const START_READY_IMMEDIATE: u32 = 1 << 18;
    /// Release PROG after the pulse.
    pub const START_DRIVE_UNASSERT: u32 = 1 << 17;

    /// PROG pulse length in clocks.
    pub const fn start_len(n: u32) -> u32 {
        n
    }
}

/// Data-format configuration fields.
pub mod data_config {
    /// Shift each word out most significant bit first.
    pub const ORDER_MSB2LSB: u32 = 1 << 3;
    /// Parallel (SelectMAP) data bus.
    pub const IS_PARALLEL: u32 = 1 << 1;

    /// Clocks per data word.
    pub const fn data_clks(n: u32) -> u32 {
        n << 8
    }
}

/// Start-condition configuration fields.
pub mod start_config {
    /// Clocks between ready and the first data clock.
    pub const fn clkrdy_delay(n: u32) -> u32 {
        n
    }
}

/// Stop-condition configuration fields.
pub mod stop_config {
    /// DONE is active high.
    pub const DONE_HIGH_TRUE: u32 = 1 << 18;
    /// The no-error line is active high.
    pub const NOERR_HIGH_TRUE: u32 = 1 << 17;
    /// Report done as soon as DONE asserts.
    pub const DONE_RDY_IMMEDIATE: u32 = 1 << 16;

    /// Extra clocks issued after DONE.
    pub const fn post_clks(n: u32) -> u32 {
        n << 24
    }
}

// =============================================================================
// Sync block (BAR1, after configuration)
// =============================================================================

/// Calibration DAC serial control.
pub const DAC_CTRL: usize = 0x24;
/// Set while the DAC serial port is shifting a word out.
pub const DAC_CTRL_SERIAL_PORT_BUSY: u32 = 1 << 31;

/// External clock input control.
pub const CLKIN_CTRL: usize = 0x28;

/// `CLKIN_CTRL` enable field.
pub const fn clkin_ctrl_enable(x: u32) -> u32 {
    x << 1
}

/// First DStarA / clock-source composite control word.
pub const DSTARA_CTRL1: usize = 0x34;
/// Second DStarA / clock-source composite control word.
pub const DSTARA_CTRL2: usize = 0x38;

/// Trigger routing control word.
pub const TRIGGER_CTRL: usize = 0x50;

/// First of the three line-state read-back words.
pub const TRIG_READ_BASE: usize = 0x60;
/// Number of line-state read-back words.
pub const TRIG_READ_WORDS: usize = 3;

/// Offset of the line-state word holding `bit` (counted across all three words).
///
/// `None` past the last read-back word.
pub const fn trig_read_offset(bit: u32) -> Option<usize> {
    let word = bit as usize / 32;
    if word < TRIG_READ_WORDS {
        Some(TRIG_READ_BASE + 4 * word)
    } else {
        None
    }
}

/// Fields of the composite clock-source control words.
pub mod dstara {
    /// Mux code: undriven.
    pub const SRC_FLOATING: u32 = 0;
    /// Mux code: SourceA.
    pub const SRC_SRCA: u32 = 2;
    /// Mux code: SourceB.
    pub const SRC_SRCB: u32 = 3;
    /// Mux code: external clock input.
    pub const SRC_CLKIN: u32 = 7;

    /// SourceA mux: 3 bits at offset 4 of control word 1.
    pub const fn srca_mux2(x: u32) -> u32 {
        x << 4
    }
    /// SourceA mux field.
    pub const SRCA_MUX2_MASK: u32 = srca_mux2(7);

    /// SourceB mux: 3 bits at offset 12 of control word 1.
    pub const fn srcb_mux2(x: u32) -> u32 {
        x << 12
    }
    /// SourceB mux field.
    pub const SRCB_MUX2_MASK: u32 = srcb_mux2(7);

    /// Bank `n` source: 2 bits at offset 16 + 4n of control word 1.
    pub const fn bank(n: u32, x: u32) -> u32 {
        x << (16 + n * 4)
    }
    /// Bank `n` source field.
    pub const fn bank_mask(n: u32) -> u32 {
        bank(n, 3)
    }

    /// SourceA divider select: bit 20 of control word 2.
    pub const fn srca_use_divider(x: u32) -> u32 {
        x << 20
    }

    /// SourceB divider select: bit 21 of control word 2.
    pub const fn srcb_use_divider(x: u32) -> u32 {
        x << 21
    }
}

/// Fields of the trigger routing control word.
pub mod trig {
    /// Destination line: bits 31:24.
    pub const fn dest(x: u32) -> u32 {
        (x & 0xFF) << 24
    }
    /// Destination field.
    pub const DEST_MASK: u32 = dest(0xFF);

    /// Source line: bits 23:16.
    pub const fn src(x: u32) -> u32 {
        (x & 0xFF) << 16
    }
    /// Source field.
    pub const SRC_MASK: u32 = src(0xFF);

    /// Synchronisation clock select: bits 15:14.
    pub const fn sync_clock(x: u32) -> u32 {
        (x & 0x3) << 14
    }
    /// Synchronise to the full-rate clock.
    pub const SYNC_CLOCK_FULL: u32 = 0;
    /// Synchronise to divided clock 1.
    pub const SYNC_CLOCK_DIV1: u32 = 2;
    /// Synchronise to divided clock 2.
    pub const SYNC_CLOCK_DIV2: u32 = 3;

    /// Synchronise on the falling edge.
    pub const EDGE_FALLING: u32 = 1 << 13;
    /// Pass the source through unsynchronised.
    pub const ASYNCHRONOUS: u32 = 1 << 12;
    /// Invert the output.
    pub const INVERTED: u32 = 1 << 11;
    /// Drive the destination.
    pub const ENABLED: u32 = 1 << 10;

    /// PXI trigger delay: bits 9:7.
    pub const fn pxi_delay(x: u32) -> u32 {
        (x & 0x7) << 7
    }

    /// Destination code of PXI_Trig`n`.
    pub const fn dest_pxi_trig(n: u32) -> u32 {
        n + 1
    }
    /// Destination code of PXI_Star`n`.
    pub const fn dest_pxi_star(n: u32) -> u32 {
        n + 9
    }
    /// Destination code of PXIe_DStarB`n`.
    pub const fn dest_pxie_dstarb(n: u32) -> u32 {
        n + 26
    }
    /// Destination code of single-ended PFI`n`.
    pub const fn dest_pfi_se(n: u32) -> u32 {
        n + 43
    }
    /// Destination code of LVDS PFI`n`.
    pub const fn dest_lvds(n: u32) -> u32 {
        n + 49
    }
    /// Destination code of the peripheral star line.
    pub const DEST_STAR_PERIPH: u32 = 52;
    /// Destination code of the peripheral DStarC line.
    pub const DEST_DSTARC_PERIPH: u32 = 53;

    /// Source code: undriven.
    pub const SRC_FLOATING: u32 = 0;
    /// Source code of PXI_Trig`n`.
    pub const fn src_pxi_trig(n: u32) -> u32 {
        n + 1
    }
    /// Source code of PXI_Star`n`.
    pub const fn src_pxi_star(n: u32) -> u32 {
        n + 9
    }
    /// Source code of PXIe_DStarC`n`.
    pub const fn src_pxie_dstarc(n: u32) -> u32 {
        n + 26
    }
    /// Source code of single-ended PFI`n`.
    pub const fn src_pfi_se(n: u32) -> u32 {
        n + 43
    }
    /// Source code of LVDS PFI`n`.
    pub const fn src_lvds(n: u32) -> u32 {
        n + 49
    }
    /// Source code of the peripheral star line.
    pub const SRC_STAR_PERIPH: u32 = 52;
    /// Source code of the peripheral DStarB line.
    pub const SRC_DSTARB_PERIPH: u32 = 53;
    /// Source code of the global software trigger.
    pub const SRC_GLOBAL_SW: u32 = 54;
    /// Source code of the local software trigger.
    pub const SRC_LOCAL_SW: u32 = 55;
    /// Source code of the sync clock.
    pub const SRC_SYNC_CLK: u32 = 56;
    /// Source code: constant high.
    pub const SRC_LOGIC_HIGH: u32 = 57;
    /// Source code: constant low.
    pub const SRC_LOGIC_LOW: u32 = 58;
}

/// Line-state bit positions, counted across the three read-back words.
pub mod line_state {
    /// Bit of PXI_Star`n`.
    pub const fn pxi_star(n: u32) -> u32 {
        n
    }
    /// Bit of PXI_Trig`n`.
    pub const fn pxi_trig(n: u32) -> u32 {
        n + 18
    }
    /// Bit of PFI`n`.
    pub const fn pfi(n: u32) -> u32 {
        n + 26
    }
}
