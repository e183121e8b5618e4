//! Pad configuration model
//!
//! Turns a requested pad identity (and, for custom pads, a pin list) into a
//! validated [`PinAssignment`], and describes the resulting device to the sink.

pub mod error;
pub mod pad_config;

pub use error::ConfigError;
pub use pad_config::{build, PadKind, PadSpec, PinAssignment, Slot, SLOT_COUNT, UNUSED_PIN};

use crate::events::{Axis, Button, DeviceHandle, PadDescriptor, RawSample, AXIS_MAX, AXIS_MIN};
use crate::gpio::{read_pin, RegisterBlock};

/// Maximum number of pads served at the same time
pub const MAX_PADS: usize = 2;

/// A configured pad registered with the input sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pad {
    /// Position in the `pads` option
    pub index: usize,
    pub kind: PadKind,
    pub pins: PinAssignment,
    pub handle: DeviceHandle,
}

impl Pad {
    /// Reads every wired slot; unused slots stay released and are never read
    pub fn sample(&self, block: &RegisterBlock) -> RawSample {
        let mut pressed = [false; SLOT_COUNT];
        for (slot, pin) in self.pins.iter() {
            if let Some(pin) = pin {
                pressed[slot.index()] = read_pin(block, pin);
            }
        }
        RawSample::new(pressed)
    }
}

/// Describes the input device announced for a pad in slot `index`
pub fn descriptor(index: usize, kind: PadKind) -> PadDescriptor {
    PadDescriptor {
        name: kind.device_name().to_string(),
        phys: format!("input{}", index),
        vendor: 0x0001,
        product: kind.code(),
        version: 0x0100,
        axes: vec![(Axis::X, AXIS_MIN, AXIS_MAX), (Axis::Y, AXIS_MIN, AXIS_MAX)],
        buttons: Button::ALL.to_vec(),
    }
}
