//! Channel-backed input sink
//!
//! Collects the reports of each device and publishes one [`PadFrame`] per flush
//! on a tokio mpsc channel, the same way the rest of the application hands
//! controller state between tasks.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Axis, Button, DeviceHandle, InputSink, PadDescriptor, SinkError};

/// Complete state of one pad at one tick
#[derive(Debug, Clone, PartialEq)]
pub struct PadFrame {
    pub handle: DeviceHandle,
    pub x: i32,
    pub y: i32,
    /// Buttons in report order
    pub buttons: Vec<(Button, bool)>,
    pub timestamp: DateTime<Local>,
}

impl PadFrame {
    pub fn pressed_buttons(&self) -> Vec<Button> {
        self.buttons
            .iter()
            .filter(|(_, pressed)| *pressed)
            .map(|(button, _)| *button)
            .collect()
    }

    /// True when axes and buttons equal `other`, ignoring the timestamp
    pub fn same_state(&self, other: &PadFrame) -> bool {
        self.x == other.x && self.y == other.y && self.buttons == other.buttons
    }
}

#[derive(Debug, Default)]
struct PendingFrame {
    x: i32,
    y: i32,
    buttons: Vec<(Button, bool)>,
}

pub struct ChannelSink {
    sender: mpsc::Sender<PadFrame>,
    next_handle: AtomicU32,
    devices: Mutex<HashMap<DeviceHandle, PadDescriptor>>,
    pending: Mutex<HashMap<DeviceHandle, PendingFrame>>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<PadFrame>) -> Self {
        Self {
            sender,
            next_handle: AtomicU32::new(1),
            devices: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Descriptor of a registered device
    pub fn descriptor(&self, handle: DeviceHandle) -> Option<PadDescriptor> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    pub fn registered(&self) -> usize {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn with_pending(&self, handle: DeviceHandle, f: impl FnOnce(&mut PendingFrame)) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        f(pending.entry(handle).or_default());
    }
}

impl InputSink for ChannelSink {
    fn register_pad(&self, descriptor: &PadDescriptor) -> Result<DeviceHandle, SinkError> {
        if self.sender.is_closed() {
            return Err(SinkError::Registration {
                name: descriptor.name.clone(),
                reason: "frame receiver dropped".to_string(),
            });
        }
        let handle = DeviceHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        info!(
            "Registered {} ({}) as {}",
            descriptor.name, descriptor.phys, handle
        );
        debug!(
            "{} reports axes {:?} and buttons {:?}",
            handle,
            descriptor.axis_codes(),
            descriptor.button_codes()
        );
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, descriptor.clone());
        Ok(handle)
    }

    fn unregister_pad(&self, handle: DeviceHandle) {
        let removed = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        match removed {
            Some(descriptor) => info!("Unregistered {} ({})", descriptor.name, handle),
            None => warn!("Unregister for unknown {}", handle),
        }
    }

    fn report_axis(&self, handle: DeviceHandle, axis: Axis, value: i32) {
        self.with_pending(handle, |frame| match axis {
            Axis::X => frame.x = value,
            Axis::Y => frame.y = value,
        });
    }

    fn report_button(&self, handle: DeviceHandle, button: Button, pressed: bool) {
        self.with_pending(handle, |frame| frame.buttons.push((button, pressed)));
    }

    fn flush(&self, handle: DeviceHandle) {
        let Some(pending) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
        else {
            debug!("Flush without reports for {}", handle);
            return;
        };

        let frame = PadFrame {
            handle,
            x: pending.x,
            y: pending.y,
            buttons: pending.buttons,
            timestamp: Local::now(),
        };
        match self.sender.try_send(frame) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Frame channel full, dropping frame for {}", handle)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Frame receiver gone, dropping frame for {}", handle)
            }
        }
    }
}
