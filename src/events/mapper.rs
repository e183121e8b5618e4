//! Raw switch sample to axis/button reports
//!
//! Stateless: every tick reports the full pad state and the sink decides what
//! changed.

use super::{Axis, Button, DeviceHandle, InputSink};
use crate::pad::{Slot, SLOT_COUNT};

/// Pressed state of every slot of one pad, in wiring order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample([bool; SLOT_COUNT]);

impl RawSample {
    pub const fn new(pressed: [bool; SLOT_COUNT]) -> Self {
        Self(pressed)
    }

    /// Sample with exactly the given slots pressed
    pub fn with_pressed(slots: &[Slot]) -> Self {
        let mut pressed = [false; SLOT_COUNT];
        for slot in slots {
            pressed[slot.index()] = true;
        }
        Self(pressed)
    }

    pub fn pressed(&self, slot: Slot) -> bool {
        self.0[slot.index()]
    }
}

/// Axis and button values derived from one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadState {
    pub x: i32,
    pub y: i32,
    pub buttons: [(Button, bool); 9],
}

impl PadState {
    pub fn pressed_buttons(&self) -> impl Iterator<Item = Button> + '_ {
        self.buttons
            .iter()
            .filter(|(_, pressed)| *pressed)
            .map(|(button, _)| *button)
    }
}

// up/left pull toward the minimum, down/right toward the maximum
fn axis_value(low: bool, high: bool) -> i32 {
    i32::from(!low) - i32::from(!high)
}

pub fn map_sample(sample: &RawSample) -> PadState {
    let y = axis_value(sample.pressed(Slot::Up), sample.pressed(Slot::Down));
    let x = axis_value(sample.pressed(Slot::Left), sample.pressed(Slot::Right));

    let button_slots = &Slot::ALL[4..];
    let mut buttons = [(Button::Start, false); 9];
    for ((entry, button), slot) in buttons.iter_mut().zip(Button::ALL).zip(button_slots) {
        *entry = (button, sample.pressed(*slot));
    }

    PadState { x, y, buttons }
}

/// Sends one complete pad frame: Y, X, the nine buttons, then a single flush
pub fn report(sink: &dyn InputSink, handle: DeviceHandle, state: &PadState) {
    sink.report_axis(handle, Axis::Y, state.y);
    sink.report_axis(handle, Axis::X, state.x);
    for (button, pressed) in state.buttons {
        sink.report_button(handle, button, pressed);
    }
    sink.flush(handle);
}
