//! GPIO arcade joystick driver for Raspberry Pi boards
//!
//! Reads up to two pads wired to the GPIO header and reports them as
//! joystick devices with two three-state axes and nine buttons.

pub mod config;
pub mod controller;
pub mod events;
pub mod gpio;
pub mod pad;

pub use config::DriverConfig;
pub use controller::{Controller, DriverError};
