//! Configuration files driving bring-up.

mod common;

use std::io::Write;

use pxi_sync::config::{OutputFormat, SyncConfig};
use pxi_sync::sim::{EngineScript, SimulatedBoard};
use pxi_sync::{ErrorKind, SyncDevice};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"
[device]
window_base = 0xE000_0000
firmware = "/lib/firmware/ni6674t.bin"

[calibration]
pfi_threshold_code = 128

[logging]
level = "warn"
format = "pretty"
"#,
    );

    let config = SyncConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.device.window_base, 0xE000_0000);
    assert_eq!(
        config.device.firmware.as_deref(),
        Some(std::path::Path::new("/lib/firmware/ni6674t.bin"))
    );
    assert_eq!(config.calibration.pfi_threshold_code, 128);
    assert_eq!(config.calibration.busy_polls, 100);
    assert_eq!(config.logging.format, OutputFormat::Pretty);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config, SyncConfig::default());
}

#[test]
fn test_invalid_file_is_configuration_error() {
    let file = write_config("[calibration]\npfi_threshold_code = 300\n");
    let err = SyncConfig::load(Some(file.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let file = write_config("[load]\ngen_data_polls = \"many\"\n");
    let err = SyncConfig::load(Some(file.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_file_settings_reach_the_hardware() {
    let file = write_config(
        r#"
[load]
gen_data_polls = 3
gen_data_poll_interval_ms = 0

[calibration]
busy_poll_interval_us = 0
pfi_threshold_code = 0x10
"#,
    );
    let config = SyncConfig::load(Some(file.path())).unwrap();
    let image = common::image(12);

    let board = SimulatedBoard::with_script(EngineScript::accepting(image.len()));
    let _device = SyncDevice::attach(board.bars(common::WINDOW_BASE), &image, &config).unwrap();
    assert_eq!(board.dac_words()[3], 0x0100);
    assert_eq!(board.dac_words()[8], 0x5100);

    // Three polls are not enough for an engine that needs four.
    let slow = SimulatedBoard::with_script(EngineScript {
        gen_data_after_polls: Some(4),
        ..EngineScript::accepting(image.len())
    });
    let err = SyncDevice::attach(slow.bars(common::WINDOW_BASE), &image, &config).unwrap_err();
    assert!(err.is_timeout());
}
