//! Driver lifecycle and polling
//!
//! # Architecture
//!
//! ```text
//! DriverConfig ──► Controller<Probing> ──probe──► Controller<Running>
//!                                                    │
//!                           open/close ──► PollScheduler ──► tick every interval
//!                                                    │
//!                                   GPLEV ──► map_sample ──► InputSink
//! ```
//!
//! One polling task serves every pad. It runs while at least one device is
//! open and stops with the last close.

pub mod controller_handle;
pub mod poller;

pub use controller_handle::{Controller, ControllerState, DriverError, Probing, Running};
pub use poller::{
    PollScheduler, PollTarget, PollerState, PollerStatus, SchedulerError, DEFAULT_POLL_INTERVAL,
};
