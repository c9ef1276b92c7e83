//! End-to-end routing against a simulated module.

mod common;

use std::thread;

use pxi_sync::registry::{Category, Commit, DescriptorRegistry, SharedRegister};
use pxi_sync::regs::{self, dstara, trig};
use pxi_sync::Polarity;

#[test]
fn test_every_terminal_starts_on_first_input() {
    let (_board, device) = common::attach();
    let registry = DescriptorRegistry::get();

    for terminal in device.terminals() {
        let first = terminal.descriptor().inputs()[0].source;
        assert_eq!(
            terminal.current_input(),
            registry.name(first),
            "{} did not start on its default",
            terminal.name()
        );
    }
}

#[test]
fn test_every_valid_input_round_trips() {
    let (_board, device) = common::attach();

    for terminal in device.terminals() {
        for input in terminal.available_inputs() {
            device
                .set_current_input(terminal.name(), input)
                .unwrap_or_else(|e| panic!("{} <- {input}: {e}", terminal.name()));
            assert_eq!(device.current_input(terminal.name()).unwrap(), input);
        }
    }
}

#[test]
fn test_invalid_input_leaves_state_and_hardware_alone() {
    let (board, device) = common::attach();
    device.set_current_input("PXI_Trig4", "PFI5").unwrap();
    device.set_current_input("Bank1", "SourceADividerSelect").unwrap();
    board.clear_writes();

    for (terminal, bogus) in [
        ("PXI_Trig4", "not-a-real-input"),
        ("PXI_Trig4", "PXI_Trig4"),
        ("PXI_Trig4", "pfi5"),
        ("Bank1", "SourceA"),
        ("PXIe_DStarA0", "Bank1"),
    ] {
        let err = device.set_current_input(terminal, bogus).unwrap_err();
        assert!(err.is_invalid_argument(), "{terminal} <- {bogus}: {err}");
    }

    assert_eq!(device.current_input("PXI_Trig4").unwrap(), "PFI5");
    assert_eq!(
        device.current_input("Bank1").unwrap(),
        "SourceADividerSelect"
    );
    assert!(board.writes().is_empty());
}

#[test]
fn test_trailing_newline_is_ignored() {
    let (_board, device) = common::attach();
    device.set_current_input("PFI1", "PXI_Star16\n").unwrap();
    assert_eq!(device.current_input("PFI1").unwrap(), "PXI_Star16");
}

#[test]
fn test_dedicated_route_writes_full_control_word() {
    let (board, device) = common::attach();
    device.set_current_input("PXI_Trig3", "PFI1").unwrap();
    assert_eq!(
        board.peek(regs::TRIGGER_CTRL),
        trig::dest(trig::dest_pxi_trig(3))
            | trig::src(trig::src_pfi_se(1))
            | trig::ENABLED
            | trig::ASYNCHRONOUS
    );

    device.set_current_input("PXI_Trig3", "floating").unwrap();
    assert_eq!(
        board.peek(regs::TRIGGER_CTRL),
        trig::dest(trig::dest_pxi_trig(3)) | trig::ASYNCHRONOUS
    );
}

#[test]
fn test_shared_routes_preserve_neighbouring_fields() {
    let (board, device) = common::attach();

    device.set_current_input("Bank0", "SourceADividerSelect").unwrap();
    device.set_current_input("Bank3", "SourceBDividerSelect").unwrap();
    device.set_current_input("Bank0", "floating").unwrap();

    let expected = dstara::srca_mux2(dstara::SRC_CLKIN)
        | dstara::srcb_mux2(dstara::SRC_CLKIN)
        | dstara::bank(3, dstara::SRC_SRCB);
    assert_eq!(board.peek(regs::DSTARA_CTRL1), expected);
    assert_eq!(device.shared_word(SharedRegister::DStarACtrl1), expected);
    assert_eq!(board.peek(regs::DSTARA_CTRL2), 0);
}

#[test]
fn test_concurrent_writers_to_one_shared_word() {
    let (board, device) = common::attach();

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..300 {
                device.set_current_input("SourceA", "ClkIn").unwrap();
            }
        });
        s.spawn(|| {
            for i in 0..300 {
                let input = if i % 2 == 0 {
                    "SourceADividerSelect"
                } else {
                    "SourceBDividerSelect"
                };
                device.set_current_input("Bank0", input).unwrap();
            }
        });
        s.spawn(|| {
            for i in 0..300 {
                let input = if i % 2 == 0 {
                    "SourceBDividerSelect"
                } else {
                    "SourceADividerSelect"
                };
                device.set_current_input("Bank1", input).unwrap();
            }
        });
    });

    assert_eq!(
        board.peek(regs::DSTARA_CTRL1),
        dstara::srca_mux2(dstara::SRC_CLKIN)
            | dstara::srcb_mux2(dstara::SRC_CLKIN)
            | dstara::bank(0, dstara::SRC_SRCB)
            | dstara::bank(1, dstara::SRC_SRCA)
    );
    assert_eq!(device.current_input("Bank0").unwrap(), "SourceBDividerSelect");
    assert_eq!(device.current_input("Bank1").unwrap(), "SourceADividerSelect");
}

#[test]
fn test_available_inputs_follow_declared_order() {
    let (_board, device) = common::attach();
    let registry = DescriptorRegistry::get();

    for terminal in device.terminals() {
        let listed = device.available_inputs(terminal.name()).unwrap();
        let declared: Vec<&str> = terminal
            .descriptor()
            .inputs()
            .iter()
            .map(|o| registry.name(o.source))
            .collect();
        assert_eq!(listed, declared);
        assert!(listed.iter().all(|name| !name.is_empty()));
    }

    assert_eq!(
        device.available_inputs("PXIe_DStarA16").unwrap(),
        vec!["Bank3"]
    );
}

#[test]
fn test_polarity_toggle_flips_only_inverted_bit() {
    let (board, device) = common::attach();
    device.set_current_input("PFI3", "PXI_Trig2").unwrap();
    let before = board.peek(regs::TRIGGER_CTRL);

    device.set_polarity("PFI3", Polarity::Inverted).unwrap();
    let inverted = board.peek(regs::TRIGGER_CTRL);
    assert_eq!(before ^ inverted, trig::INVERTED);
    assert_eq!(device.polarity("PFI3").unwrap(), Polarity::Inverted);

    device.set_polarity("PFI3", Polarity::Normal).unwrap();
    assert_eq!(board.peek(regs::TRIGGER_CTRL), before);

    // Polarity survives a later route change.
    device.set_polarity("PFI3", Polarity::Inverted).unwrap();
    device.set_current_input("PFI3", "logic_high").unwrap();
    assert_ne!(board.peek(regs::TRIGGER_CTRL) & trig::INVERTED, 0);
}

#[test]
fn test_polarity_unsupported_on_shared_and_bookkeeping_terminals() {
    let (board, device) = common::attach();
    board.clear_writes();

    for name in ["SourceA", "SourceBDividerSelect", "Bank2", "PXIe_DStarA3"] {
        assert!(device.polarity(name).unwrap_err().is_unsupported());
        assert!(device
            .set_polarity(name, Polarity::Inverted)
            .unwrap_err()
            .is_unsupported());
    }
    assert!(board.writes().is_empty());
}

#[test]
fn test_pfi0_line_state_is_bit_26_of_first_word() {
    let (board, device) = common::attach();

    board.preload(regs::TRIG_READ_BASE, 1 << 26);
    assert!(device.line_state("PFI0").unwrap());
    assert!(!device.line_state("PFI1").unwrap());
    assert!(!device.line_state("PXI_Star0").unwrap());

    board.preload(regs::TRIG_READ_BASE, !(1 << 26));
    assert!(!device.line_state("PFI0").unwrap());
    assert!(device.line_state("PXI_Trig7").unwrap());
}

#[test]
fn test_line_state_unsupported_without_readback() {
    let (_board, device) = common::attach();
    for name in ["SourceA", "Bank0", "PXIe_DStarA0"] {
        assert!(device.line_state(name).unwrap_err().is_unsupported());
    }
}

#[test]
fn test_bookkeeping_terminal_records_without_writing() {
    let (board, device) = common::attach();
    board.clear_writes();

    device.set_current_input("PXIe_DStarA9", "Bank2").unwrap();

    assert_eq!(device.current_input("PXIe_DStarA9").unwrap(), "Bank2");
    assert!(board.writes().is_empty());
    assert_eq!(
        device.terminal("PXIe_DStarA9").unwrap().descriptor().commit(),
        Commit::BookkeepingOnly
    );
}

#[test]
fn test_lookup_by_category() {
    let (_board, device) = common::attach();
    let t = device.terminal_by_category(Category::PxiStar, 16).unwrap();
    assert_eq!(t.name(), "PXI_Star16");
    assert!(device.terminal_by_category(Category::Source, 0).is_none());
}
