use color_eyre::{eyre::eyre, Result};
use mk_arcade_joystick::events::{ChannelSink, PadFrame};
use mk_arcade_joystick::{Controller, DriverConfig, DriverError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config().await?;

    let (frame_sender, frame_receiver) = mpsc::channel(1000);
    let sink = Arc::new(ChannelSink::new(frame_sender));

    let frame_logger = tokio::spawn(log_frames(frame_receiver));

    // legacy pull-up setup sleeps between register writes
    let controller = {
        let config = config.clone();
        let sink = sink.clone();
        tokio::task::spawn_blocking(move || Controller::initialize(&config, sink))
            .await?
            .map_err(|e| eyre!("Failed to start driver: {}", e))?
    };

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => warn!("Unable to listen for ctrl-c: {}", e),
            }
            shutdown.cancel();
        }
    });

    // one open per registered device, as a consumer would do
    let mut opened = 0;
    for pad in controller.pads() {
        match controller.open(&shutdown).await {
            Ok(()) => opened += 1,
            Err(DriverError::Concurrency(e)) => {
                warn!("Open of {} abandoned: {}", pad.handle, e);
                break;
            }
            Err(e) => return Err(eyre!("Failed to open {}: {}", pad.handle, e)),
        }
    }
    info!(
        "Polling {} pad(s) every {:?}",
        controller.pads().len(),
        controller.poll_interval()
    );

    shutdown.cancelled().await;

    for _ in 0..opened {
        controller.close().await;
    }
    controller.shutdown().await;

    drop(sink);
    if let Err(e) = frame_logger.await {
        warn!("Frame logger ended abnormally: {}", e);
    }
    Ok(())
}

async fn load_config() -> Result<DriverConfig> {
    let path = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => DriverConfig::default_path()
            .ok_or_else(|| eyre!("No config path given and no config directory available"))?,
    };
    DriverConfig::load(&path).await
}

/// Logs every frame that differs from the previous one of the same device
async fn log_frames(mut receiver: mpsc::Receiver<PadFrame>) {
    let mut last: HashMap<_, PadFrame> = HashMap::new();
    while let Some(frame) = receiver.recv().await {
        let changed = last
            .get(&frame.handle)
            .map_or(true, |previous| !previous.same_state(&frame));
        if changed {
            info!(
                "{} x={} y={} pressed={:?} at {}",
                frame.handle,
                frame.x,
                frame.y,
                frame.pressed_buttons(),
                frame.timestamp.format("%H:%M:%S%.3f")
            );
            last.insert(frame.handle, frame);
        }
    }
    debug!("Frame channel closed");
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
