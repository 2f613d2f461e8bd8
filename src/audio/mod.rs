//! Microphone capture and inbound audio level metering.

pub mod capture;
pub mod level;
pub mod meter;

pub use capture::{list_devices, start_capture, CaptureHandle};
pub use level::rms;
pub use meter::LevelMeter;
