//! Boundary to the input-event consumer
//!
//! The sink owns device registration and delivery. Reports for one device are
//! buffered by the sink until [`InputSink::flush`], mirroring the Linux input
//! core's report/sync model.

use std::fmt;

/// Lower bound of both axes
pub const AXIS_MIN: i32 = -1;
/// Upper bound of both axes
pub const AXIS_MAX: i32 = 1;

/// Opaque device handle handed out by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u32);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Absolute axes reported by a pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Linux input event code (ABS_X / ABS_Y)
    pub const fn code(self) -> u16 {
        match self {
            Axis::X => 0x00,
            Axis::Y => 0x01,
        }
    }
}

/// Buttons reported by a pad, in slot order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Start,
    Select,
    A,
    B,
    TR,
    Y,
    X,
    TL,
    Mode,
}

impl Button {
    pub const ALL: [Button; 9] = [
        Button::Start,
        Button::Select,
        Button::A,
        Button::B,
        Button::TR,
        Button::Y,
        Button::X,
        Button::TL,
        Button::Mode,
    ];

    /// Linux input event code (BTN_*)
    pub const fn code(self) -> u16 {
        match self {
            Button::Start => 0x13b,
            Button::Select => 0x13a,
            Button::A => 0x130,
            Button::B => 0x131,
            Button::TR => 0x137,
            Button::Y => 0x134,
            Button::X => 0x133,
            Button::TL => 0x136,
            Button::Mode => 0x13c,
        }
    }
}

/// Identity and capabilities of a pad device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadDescriptor {
    pub name: String,
    pub phys: String,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    /// `(axis, min, max)`
    pub axes: Vec<(Axis, i32, i32)>,
    pub buttons: Vec<Button>,
}

impl PadDescriptor {
    /// ABS_* codes of the reported axes
    pub fn axis_codes(&self) -> Vec<u16> {
        self.axes.iter().map(|(axis, _, _)| axis.code()).collect()
    }

    /// BTN_* codes of the reported buttons
    pub fn button_codes(&self) -> Vec<u16> {
        self.buttons.iter().map(|button| button.code()).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to register {name}: {reason}")]
    Registration { name: String, reason: String },
}

/// Consumer of pad reports
///
/// Reporting has no error path: a sink that cannot deliver drops the frame.
pub trait InputSink: Send + Sync {
    fn register_pad(&self, descriptor: &PadDescriptor) -> Result<DeviceHandle, SinkError>;

    fn unregister_pad(&self, handle: DeviceHandle);

    fn report_axis(&self, handle: DeviceHandle, axis: Axis, value: i32);

    fn report_button(&self, handle: DeviceHandle, button: Button, pressed: bool);

    /// Publishes everything reported for `handle` since the last flush
    fn flush(&self, handle: DeviceHandle);
}
