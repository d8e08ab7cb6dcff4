//! HID Keyboard LED Latency Benchmark Library
//!
//! This library provides modular components for measuring the round-trip
//! latency between a HID key press and the host-reported LED state change.

pub mod core;
pub mod hid;
pub mod stats;
pub mod ui;

pub use crate::core::run_benchmark;

/// Library version
pub const VERSION: &str = "0.1.0";
