//! Event mapping and the input sink boundary
//!
//! ```text
//! RawSample ──► mapper::map_sample ──► PadState ──► mapper::report ──► InputSink
//!                                                    (axes, buttons, flush)
//! ```

pub mod channel_sink;
pub mod mapper;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use channel_sink::{ChannelSink, PadFrame};
pub use mapper::{map_sample, report, PadState, RawSample};
pub use sink::{
    Axis, Button, DeviceHandle, InputSink, PadDescriptor, SinkError, AXIS_MAX, AXIS_MIN,
};
