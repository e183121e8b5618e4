//! Controller lifecycle
//!
//! Owns the register block, the registered pads and the poller. Built in two
//! typestate phases:
//!
//! ```text
//! Controller<Probing> ──probe()──► Controller<Running> ──shutdown()──► (released)
//!        │                              │
//!   pads configured and           open / close / tick
//!   registered one by one
//! ```
//!
//! Probing is all-or-nothing: if any requested pad fails, every pad registered
//! so far is unregistered again, newest first, before the error is returned.

use rppal::system::DeviceInfo;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::poller::{PollScheduler, PollTarget, PollerStatus, SchedulerError};
use crate::config::DriverConfig;
use crate::events::{map_sample, report, InputSink, SinkError};
use crate::gpio::pin::check_pull_scheme;
use crate::gpio::{
    detect_board, map_registers, read_cpu_identifier, BoardProfile, GpioError, RegisterBlock,
};
use crate::pad::{self, ConfigError, Pad, PadSpec, MAX_PADS};

/// Errors that keep the driver from entering service
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Unknown board or the GPIO controller could not be mapped
    #[error("No hardware support: {0}")]
    Hardware(#[from] GpioError),

    /// Invalid pad layout or pin list
    #[error("Bad configuration: {0}")]
    Config(#[from] ConfigError),

    /// The input sink refused a device
    #[error("Resource exhaustion: {0}")]
    Sink(#[from] SinkError),

    /// An open was interrupted before it took effect
    #[error("Open failed: {0}")]
    Concurrency(#[from] SchedulerError),
}

#[state]
#[derive(Debug, Clone)]
pub enum ControllerState {
    Probing,
    Running,
}

#[machine]
pub struct Controller<S: ControllerState> {
    profile: BoardProfile,
    block: Arc<RegisterBlock>,
    sink: Arc<dyn InputSink>,
    // registration order
    pads: Vec<Pad>,
    poller: PollScheduler,
}

impl<S: ControllerState> Controller<S> {
    pub fn profile(&self) -> &BoardProfile {
        &self.profile
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }
}

impl Controller<Probing> {
    /// Detects the board, maps the registers and probes every configured pad
    ///
    /// Blocks the calling thread: legacy pull-up configuration sleeps between
    /// register writes. Async callers should run it on a blocking thread.
    pub fn initialize(
        config: &DriverConfig,
        sink: Arc<dyn InputSink>,
    ) -> Result<Controller<Running>, DriverError> {
        let profile = match config.registers.board {
            Some(model) => {
                info!("Board detection skipped, configured as {}", model);
                model.profile()
            }
            None => {
                match DeviceInfo::new() {
                    Ok(info) => info!("Running on {}", info.model()),
                    Err(e) => debug!("Board model unavailable: {}", e),
                }
                let midr = read_cpu_identifier()?;
                match detect_board(midr) {
                    Ok(profile) => profile,
                    Err(e) => {
                        error!("Unable to detect memory base address: {}", e);
                        return Err(e.into());
                    }
                }
            }
        };

        let block = map_registers(
            &profile,
            config.registers.source,
            config.registers.device.as_deref(),
        )?;
        check_pull_scheme(&block, profile.pull_scheme);

        Self::create(profile, block, sink, config.poll_interval()).probe(config)
    }

    pub fn create(
        profile: BoardProfile,
        block: RegisterBlock,
        sink: Arc<dyn InputSink>,
        poll_interval: Duration,
    ) -> Self {
        debug!(
            "Creating controller for {} ({:?} pull registers)",
            profile.model, profile.pull_scheme
        );
        Self::new(
            profile,
            Arc::new(block),
            sink,
            Vec::new(),
            PollScheduler::new(poll_interval),
        )
    }

    /// Sets up the pads listed in `config` and enters service
    pub fn probe(mut self, config: &DriverConfig) -> Result<Controller<Running>, DriverError> {
        if config.pads.len() > MAX_PADS {
            warn!(
                "{} pads requested, only the first {} are used",
                config.pads.len(),
                MAX_PADS
            );
        }

        for (index, spec) in config.pads.iter().take(MAX_PADS).enumerate() {
            if let Err(e) = self.setup_pad(index, spec, config) {
                error!("Pad {} setup failed: {}", index, e);
                self.rollback();
                return Err(e);
            }
        }

        if self.pads.is_empty() {
            error!("No valid devices specified");
            return Err(ConfigError::NoValidDevices.into());
        }

        info!("Controller ready with {} pad(s)", self.pads.len());
        Ok(self.transition())
    }

    fn setup_pad(
        &mut self,
        index: usize,
        spec: &PadSpec,
        config: &DriverConfig,
    ) -> Result<(), DriverError> {
        let Some(kind) = spec.resolve()? else {
            debug!("Pad slot {} left empty", index);
            return Ok(());
        };
        info!("Pad {} type: {}", index, kind);

        let pins = pad::build(kind, config.custom_pins(kind))?;
        pins.configure(&self.block, self.profile.pull_scheme);
        info!("GPIO configured for pad {}", index);

        let handle = self.sink.register_pad(&pad::descriptor(index, kind))?;
        self.pads.push(Pad {
            index,
            kind,
            pins,
            handle,
        });
        Ok(())
    }

    fn rollback(&mut self) {
        while let Some(pad) = self.pads.pop() {
            debug!("Rolling back pad {} ({})", pad.index, pad.handle);
            self.sink.unregister_pad(pad.handle);
        }
    }
}

impl Controller<Running> {
    /// A consumer opened one of the pad devices
    pub async fn open(&self, interrupt: &CancellationToken) -> Result<(), DriverError> {
        self.poller.on_open(self.pad_bank(), interrupt).await?;
        Ok(())
    }

    /// A consumer closed one of the pad devices
    pub async fn close(&self) {
        self.poller.on_close().await;
    }

    /// Samples and reports every pad once, in registration order
    ///
    /// Refused (returns false) while any device is open, since the polling
    /// task is then the only register reader.
    pub async fn tick(&self) -> bool {
        self.poller
            .tick_if_idle(|| poll_pads(&self.block, self.sink.as_ref(), &self.pads))
            .await
    }

    pub fn poll_interval(&self) -> Duration {
        self.poller.interval()
    }

    pub async fn status(&self) -> PollerStatus {
        self.poller.status().await
    }

    /// Stops polling, unregisters every pad and releases the register block
    pub async fn shutdown(self) {
        self.poller.stop().await;
        for pad in &self.pads {
            self.sink.unregister_pad(pad.handle);
        }
        info!("Controller shut down, {} pad(s) released", self.pads.len());
    }

    fn pad_bank(&self) -> PadBank {
        PadBank {
            block: self.block.clone(),
            sink: self.sink.clone(),
            pads: self.pads.clone(),
        }
    }
}

/// What the polling task works on
struct PadBank {
    block: Arc<RegisterBlock>,
    sink: Arc<dyn InputSink>,
    pads: Vec<Pad>,
}

impl PollTarget for PadBank {
    fn tick(&self) {
        poll_pads(&self.block, self.sink.as_ref(), &self.pads);
    }
}

fn poll_pads(block: &RegisterBlock, sink: &dyn InputSink, pads: &[Pad]) {
    for pad in pads {
        let sample = pad.sample(block);
        report(sink, pad.handle, &map_sample(&sample));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::{RecordingSink, SinkCall};
    use crate::events::{Axis, Button, DeviceHandle};
    use crate::gpio::{BoardModel, Pin, PullRegisterScheme, SimulatedWindow};
    use crate::pad::PadKind;

    fn config(toml: &str) -> DriverConfig {
        DriverConfig::from_toml_str(toml).unwrap()
    }

    fn probing(
        model: BoardModel,
        sink: Arc<RecordingSink>,
    ) -> (Arc<SimulatedWindow>, Controller<Probing>) {
        let profile = model.profile();
        let window = Arc::new(SimulatedWindow::new(profile.pull_scheme));
        let block = RegisterBlock::from_window(window.clone());
        let controller = Controller::create(profile, block, sink, Duration::from_millis(10));
        (window, controller)
    }

    fn registrations(calls: &[SinkCall]) -> usize {
        calls
            .iter()
            .filter(|c| matches!(c, SinkCall::Register(..)))
            .count()
    }

    #[test]
    fn probes_pads_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let (_window, controller) = probing(BoardModel::Rpi4, sink.clone());

        let running = controller.probe(&config("pads = [2, 1]")).unwrap();

        let kinds: Vec<_> = running.pads().iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PadKind::BuiltinP2, PadKind::BuiltinP1]);
        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::Register(DeviceHandle(1), "GPIO Controller 2".into()),
                SinkCall::Register(DeviceHandle(2), "GPIO Controller 1".into()),
            ]
        );
    }

    #[test]
    fn probe_configures_pull_ups() {
        let sink = Arc::new(RecordingSink::default());
        let (window, controller) = probing(BoardModel::Rpi4, sink);

        controller.probe(&config("pads = [1]")).unwrap();

        // GPIO4 (up on pad 1): FSEL0 field 4 cleared, GPPUPPDN0 field 4 = pull-up
        assert_eq!(window.word(0) & (0b111 << 12), 0);
        assert_eq!((window.word(57) >> 8) & 0b11, 0b01);
    }

    #[test]
    fn failed_registration_rolls_back() {
        let sink = Arc::new(RecordingSink::failing_at(1));
        let (_window, controller) = probing(BoardModel::Rpi3, sink.clone());

        let result = controller.probe(&config("pads = [1, 2]"));

        assert!(matches!(result, Err(DriverError::Sink(_))));
        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::Register(DeviceHandle(1), "GPIO Controller 1".into()),
                SinkCall::Unregister(DeviceHandle(1)),
            ]
        );
    }

    #[test]
    fn invalid_second_pad_rolls_back_first() {
        let sink = Arc::new(RecordingSink::default());
        let (_window, controller) = probing(BoardModel::Rpi3, sink.clone());

        let result = controller.probe(&config("pads = [1, 3]\ncustom_pins_1 = [4, 17]"));

        match result {
            Err(DriverError::Config(ConfigError::InvalidPinCount { count, .. })) => {
                assert_eq!(count, 2)
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("short pin list accepted"),
        }
        assert_eq!(
            sink.calls().last(),
            Some(&SinkCall::Unregister(DeviceHandle(1)))
        );
    }

    #[test]
    fn unknown_pad_type_is_config_error() {
        let sink = Arc::new(RecordingSink::default());
        let (_window, controller) = probing(BoardModel::Rpi3, sink.clone());

        let result = controller.probe(&config("pads = [7]"));

        assert!(matches!(
            result,
            Err(DriverError::Config(ConfigError::UnknownPadType(_)))
        ));
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn missing_custom_list_is_config_error() {
        let sink = Arc::new(RecordingSink::default());
        let (_window, controller) = probing(BoardModel::Rpi3, sink);

        let result = controller.probe(&config("pads = [\"custom2\"]"));

        assert!(matches!(
            result,
            Err(DriverError::Config(ConfigError::MissingPinList(PadKind::Custom2)))
        ));
    }

    #[test]
    fn empty_slots_only_is_no_valid_devices() {
        for pads in ["pads = []", "pads = [0, \"none\"]"] {
            let sink = Arc::new(RecordingSink::default());
            let (_window, controller) = probing(BoardModel::Rpi01, sink.clone());

            let result = controller.probe(&config(pads));

            assert!(matches!(
                result,
                Err(DriverError::Config(ConfigError::NoValidDevices))
            ));
            assert_eq!(registrations(&sink.calls()), 0);
        }
    }

    #[test]
    fn extra_pads_are_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let (_window, controller) = probing(BoardModel::Rpi2, sink.clone());

        let running = controller.probe(&config("pads = [1, 2, 1]")).unwrap();

        assert_eq!(running.pads().len(), MAX_PADS);
        assert_eq!(registrations(&sink.calls()), MAX_PADS);
    }

    #[tokio::test]
    async fn tick_reports_start_press() {
        let sink = Arc::new(RecordingSink::default());
        let (window, controller) = probing(BoardModel::Rpi4, sink.clone());
        let running = controller.probe(&config("pads = [1]")).unwrap();
        let handle = running.pads()[0].handle;
        window.set_level(Pin::new(10).unwrap(), false);

        assert!(running.tick().await);

        let calls: Vec<_> = sink
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, SinkCall::Register(..)))
            .collect();
        let pressed: Vec<_> = calls
            .iter()
            .filter(|c| matches!(c, SinkCall::Button(_, _, true)))
            .collect();
        assert_eq!(pressed, vec![&SinkCall::Button(handle, Button::Start, true)]);
        assert!(calls.contains(&SinkCall::Axis(handle, Axis::X, 0)));
        assert!(calls.contains(&SinkCall::Axis(handle, Axis::Y, 0)));
        assert_eq!(calls.last(), Some(&SinkCall::Flush(handle)));
        assert_eq!(
            calls.iter().filter(|c| matches!(c, SinkCall::Flush(_))).count(),
            1
        );
    }

    #[tokio::test]
    async fn tick_flushes_pads_in_registration_order() {
        let sink = Arc::new(RecordingSink::default());
        let (_window, controller) = probing(BoardModel::Rpi3, sink.clone());
        let running = controller.probe(&config("pads = [2, 1]")).unwrap();

        assert!(running.tick().await);

        let flushes: Vec<_> = sink
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Flush(handle) => Some(handle),
                _ => None,
            })
            .collect();
        assert_eq!(flushes, vec![DeviceHandle(1), DeviceHandle(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn open_drives_ticks_until_close() {
        let sink = Arc::new(RecordingSink::default());
        let (window, controller) = probing(BoardModel::Rpi3, sink.clone());
        let running = controller.probe(&config("pads = [1]")).unwrap();
        window.set_level(Pin::new(4).unwrap(), false);
        let token = CancellationToken::new();

        running.open(&token).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        running.close().await;

        let calls = sink.calls();
        let flushes = calls
            .iter()
            .filter(|c| matches!(c, SinkCall::Flush(_)))
            .count();
        assert_eq!(flushes, 2);
        assert!(calls.contains(&SinkCall::Axis(DeviceHandle(1), Axis::Y, -1)));

        let status = running.status().await;
        assert_eq!((status.arms, status.disarms), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_tick_refused_while_open() {
        let sink = Arc::new(RecordingSink::default());
        let (_window, controller) = probing(BoardModel::Rpi4, sink.clone());
        let running = controller.probe(&config("pads = [1]")).unwrap();
        let token = CancellationToken::new();

        running.open(&token).await.unwrap();
        let before = sink.calls().len();
        assert!(!running.tick().await);
        assert_eq!(sink.calls().len(), before);
        running.close().await;

        assert!(running.tick().await);
        assert_eq!(running.poll_interval(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn interrupted_open_reports_concurrency_error() {
        let sink = Arc::new(RecordingSink::default());
        let (_window, controller) = probing(BoardModel::Rpi3, sink);
        let running = controller.probe(&config("pads = [1]")).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = running.open(&token).await;

        assert!(matches!(result, Err(DriverError::Concurrency(_))));
        assert_eq!(running.status().await.open_count, 0);
    }

    #[tokio::test]
    async fn shutdown_unregisters_every_pad() {
        let sink = Arc::new(RecordingSink::default());
        let (_window, controller) = probing(BoardModel::Rpi4, sink.clone());
        let running = controller.probe(&config("pads = [1, 2]")).unwrap();
        running.open(&CancellationToken::new()).await.unwrap();

        running.shutdown().await;

        let calls = sink.calls();
        assert_eq!(
            &calls[calls.len() - 2..],
            &[
                SinkCall::Unregister(DeviceHandle(1)),
                SinkCall::Unregister(DeviceHandle(2)),
            ]
        );
    }

    #[test]
    fn legacy_boards_use_clocked_pull_up() {
        let sink = Arc::new(RecordingSink::default());
        let (window, controller) = probing(BoardModel::Rpi3, sink);
        assert_eq!(controller.profile().pull_scheme, PullRegisterScheme::Legacy);

        controller.probe(&config("pads = [1]")).unwrap();

        // GPPUD written high then low once per pin
        let gppud_writes = window.writes().iter().filter(|(w, _)| *w == 37).count();
        assert_eq!(gppud_writes, 2 * 13);
    }
}
