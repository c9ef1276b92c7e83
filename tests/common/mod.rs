//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use pxi_sync::config::SyncConfig;
use pxi_sync::sim::{EngineScript, SimulatedBoard};
use pxi_sync::SyncDevice;

pub const WINDOW_BASE: u32 = 0xF000_0000;

/// Configuration with every handshake delay removed.
pub fn fast_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.load.gen_data_poll_interval_ms = 0;
    config.calibration.busy_poll_interval_us = 0;
    config
}

/// A small image whose words are distinguishable.
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(1)).collect()
}

/// Bring a simulated board all the way up.
pub fn attach() -> (SimulatedBoard, SyncDevice) {
    let image = image(64);
    let board = SimulatedBoard::with_script(EngineScript::accepting(image.len()));
    let device = SyncDevice::attach(board.bars(WINDOW_BASE), &image, &fast_config())
        .expect("simulated attach");
    (board, device)
}
