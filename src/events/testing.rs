//! In-memory sink that records every call, for unit tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::{Axis, Button, DeviceHandle, InputSink, PadDescriptor, SinkError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Register(DeviceHandle, String),
    Unregister(DeviceHandle),
    Axis(DeviceHandle, Axis, i32),
    Button(DeviceHandle, Button, bool),
    Flush(DeviceHandle),
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    next_handle: AtomicU32,
    /// Registration number (0-based) that fails, if any
    fail_registration: Option<u32>,
}

impl RecordingSink {
    pub fn failing_at(registration: u32) -> Self {
        Self {
            fail_registration: Some(registration),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl InputSink for RecordingSink {
    fn register_pad(&self, descriptor: &PadDescriptor) -> Result<DeviceHandle, SinkError> {
        let n = self.next_handle.fetch_add(1, Ordering::SeqCst);
        if self.fail_registration == Some(n) {
            return Err(SinkError::Registration {
                name: descriptor.name.clone(),
                reason: "out of device slots".to_string(),
            });
        }
        let handle = DeviceHandle(n + 1);
        self.push(SinkCall::Register(handle, descriptor.name.clone()));
        Ok(handle)
    }

    fn unregister_pad(&self, handle: DeviceHandle) {
        self.push(SinkCall::Unregister(handle));
    }

    fn report_axis(&self, handle: DeviceHandle, axis: Axis, value: i32) {
        self.push(SinkCall::Axis(handle, axis, value));
    }

    fn report_button(&self, handle: DeviceHandle, button: Button, pressed: bool) {
        self.push(SinkCall::Button(handle, button, pressed));
    }

    fn flush(&self, handle: DeviceHandle) {
        self.push(SinkCall::Flush(handle));
    }
}
