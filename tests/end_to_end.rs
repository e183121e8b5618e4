use mk_arcade_joystick::events::{Button, ChannelSink, DeviceHandle, PadFrame};
use mk_arcade_joystick::gpio::{BoardModel, Pin, RegisterBlock, SimulatedWindow};
use mk_arcade_joystick::pad::{ConfigError, PadKind};
use mk_arcade_joystick::{Controller, DriverConfig, DriverError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn simulated(
    model: BoardModel,
    config: &DriverConfig,
) -> (
    Arc<SimulatedWindow>,
    Arc<ChannelSink>,
    mpsc::Receiver<PadFrame>,
    Result<Controller<mk_arcade_joystick::controller::Running>, DriverError>,
) {
    let profile = model.profile();
    let window = Arc::new(SimulatedWindow::new(profile.pull_scheme));
    let (tx, rx) = mpsc::channel(64);
    let sink = Arc::new(ChannelSink::new(tx));
    let controller = Controller::create(
        profile,
        RegisterBlock::from_window(window.clone()),
        sink.clone(),
        config.poll_interval(),
    )
    .probe(config);
    (window, sink, rx, controller)
}

#[tokio::test]
async fn initialize_with_simulated_registers() {
    let config = DriverConfig::from_toml_str(
        r#"
        pads = ["p1", "p2"]

        [registers]
        source = "simulated"
        board = "rpi4"
        "#,
    )
    .unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let sink = Arc::new(ChannelSink::new(tx));

    let controller = tokio::task::spawn_blocking({
        let sink = sink.clone();
        move || Controller::initialize(&config, sink)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(controller.profile().model, BoardModel::Rpi4);
    assert_eq!(sink.registered(), 2);

    assert!(controller.tick().await);
    for expected in [DeviceHandle(1), DeviceHandle(2)] {
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.handle, expected);
        assert_eq!((frame.x, frame.y), (0, 0));
        assert!(frame.pressed_buttons().is_empty());
    }

    controller.shutdown().await;
    assert_eq!(sink.registered(), 0);
}

#[tokio::test(start_paused = true)]
async fn custom_pad_reports_while_open() {
    let config = DriverConfig::from_toml_str(
        r#"
        pads = [0, "custom1"]
        custom_pins_1 = [4, 17, 27, 22, -1, -1, 2, 3, -1, -1, -1, -1, 18]
        poll_interval_ms = 5
        "#,
    )
    .unwrap();
    let (window, sink, mut rx, controller) = simulated(BoardModel::Rpi3, &config);
    let controller = controller.unwrap();

    let pad = controller.pads()[0];
    assert_eq!((pad.index, pad.kind), (1, PadKind::Custom1));
    let descriptor = sink.descriptor(pad.handle).unwrap();
    assert_eq!(descriptor.phys, "input1");
    assert_eq!(descriptor.product, 3);

    // right and A held, down and mode released
    window.set_level(Pin::new(22).unwrap(), false);
    window.set_level(Pin::new(2).unwrap(), false);

    let interrupt = CancellationToken::new();
    controller.open(&interrupt).await.unwrap();
    let frame = rx.recv().await.unwrap();
    assert_eq!((frame.x, frame.y), (1, 0));
    assert_eq!(frame.pressed_buttons(), vec![Button::A]);

    window.set_level(Pin::new(22).unwrap(), true);
    window.set_level(Pin::new(27).unwrap(), false);
    window.set_level(Pin::new(18).unwrap(), false);
    let frame = loop {
        let frame = rx.recv().await.unwrap();
        if frame.x != 1 {
            break frame;
        }
    };
    assert_eq!(frame.x, -1);
    assert_eq!(frame.pressed_buttons(), vec![Button::A, Button::Mode]);

    controller.close().await;
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn bad_custom_pin_rolls_back() {
    let config = DriverConfig::from_toml_str(
        r#"
        pads = [1, 4]
        custom_pins_2 = [4, 17, 27, 22, 10, 9, 25, 24, 23, 18, 15, 14, 54]
        "#,
    )
    .unwrap();
    let (_window, sink, _rx, controller) = simulated(BoardModel::Rpi2, &config);

    match controller {
        Err(DriverError::Config(ConfigError::InvalidPin { value, .. })) => assert_eq!(value, 54),
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("out of range pin accepted"),
    }
    assert_eq!(sink.registered(), 0);
}
