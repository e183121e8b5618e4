//! Reference-counted polling scheduler
//!
//! The first open arms a tokio task that ticks every `interval`; the last close
//! cancels it and waits for it to finish. The next tick is scheduled only after
//! the previous one returned, so a slow tick delays the schedule instead of
//! stacking ticks.
//!
//! ```text
//!            open (0 → 1): arm
//!   Idle ─────────────────────────► Active ──┐
//!    ▲                                │      │ open / close (n ≥ 1)
//!    └────────────────────────────────┘ ◄────┘
//!            close (1 → 0): cancel + join
//! ```

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sampling period of 100 Hz
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Work performed on every tick
pub trait PollTarget: Send + Sync + 'static {
    fn tick(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Active,
}

/// Snapshot of the scheduler for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerStatus {
    pub state: PollerState,
    pub open_count: usize,
    /// Times the polling task was started
    pub arms: u64,
    /// Times the polling task was stopped
    pub disarms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Open interrupted while waiting for the poller lock")]
    Interrupted,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PollerInner {
    open_count: usize,
    task: Option<PollTask>,
    arms: u64,
    disarms: u64,
}

pub struct PollScheduler {
    interval: Duration,
    inner: Mutex<PollerInner>,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            inner: Mutex::new(PollerInner::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Registers one more consumer, starting the polling task on the first
    ///
    /// `target` is only used when this call arms the task. Waiting for the lock
    /// is abandoned when `interrupt` fires, leaving the scheduler untouched.
    pub async fn on_open<T: PollTarget>(
        &self,
        target: T,
        interrupt: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        let mut inner = tokio::select! {
            biased;
            _ = interrupt.cancelled() => {
                warn!("Open interrupted before the poller lock was acquired");
                return Err(SchedulerError::Interrupted);
            }
            guard = self.inner.lock() => guard,
        };

        let previous = inner.open_count;
        inner.open_count += 1;
        if previous == 0 {
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(run_poll_loop(target, self.interval, cancel.clone()));
            inner.task = Some(PollTask { cancel, handle });
            inner.arms += 1;
            info!("Polling started every {:?}", self.interval);
        } else {
            debug!("Poller already active, open count now {}", inner.open_count);
        }
        Ok(())
    }

    /// Drops one consumer; the last one stops polling and waits for the task
    ///
    /// Must be driven to completion: resources are released here.
    pub async fn on_close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.open_count == 0 {
            warn!("Close without matching open ignored");
            return;
        }

        inner.open_count -= 1;
        if inner.open_count == 0 {
            Self::disarm(&mut inner).await;
            info!("Polling stopped");
        } else {
            debug!("Poller still in use, open count now {}", inner.open_count);
        }
    }

    /// Stops polling regardless of outstanding opens
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if inner.open_count > 0 {
            warn!(
                "Stopping poller with {} consumer(s) still open",
                inner.open_count
            );
        }
        inner.open_count = 0;
        Self::disarm(&mut inner).await;
    }

    /// Runs `tick` once unless the polling task is armed
    ///
    /// The guard is held for the duration, so no open can arm the task while
    /// `tick` reads the registers.
    pub async fn tick_if_idle(&self, tick: impl FnOnce()) -> bool {
        let inner = self.inner.lock().await;
        if inner.task.is_some() {
            warn!("Manual tick refused while polling is active");
            return false;
        }
        tick();
        true
    }

    pub async fn status(&self) -> PollerStatus {
        let inner = self.inner.lock().await;
        PollerStatus {
            state: if inner.task.is_some() {
                PollerState::Active
            } else {
                PollerState::Idle
            },
            open_count: inner.open_count,
            arms: inner.arms,
            disarms: inner.disarms,
        }
    }

    async fn disarm(inner: &mut PollerInner) {
        let Some(task) = inner.task.take() else {
            return;
        };
        task.cancel.cancel();
        // a tick in flight completes; no new tick starts after this join
        if let Err(e) = task.handle.await {
            error!("Polling task ended abnormally: {}", e);
        }
        inner.disarms += 1;
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.inner.get_mut().task.take() {
            task.cancel.cancel();
        }
    }
}

async fn run_poll_loop<T: PollTarget>(target: T, interval: Duration, cancel: CancellationToken) {
    debug!("Poll loop running");
    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
        target.tick();
        ticks += 1;
    }
    debug!("Poll loop finished after {} ticks", ticks);
}
