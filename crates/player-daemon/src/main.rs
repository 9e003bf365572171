mod host;
mod stdio;

use std::time::Duration;

use player_core::sim::SimulatedEngine;
use player_core::{PlayerCore, PlayerEvent, TransportController};
use player_proto::config::Config;
use player_proto::{parse_duration, platform, Catalog};
use tokio::io::BufReader;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::host::HeadlessHost;

/// How often the simulated engine's clock moves forward.
const CLOCK_INTERVAL: Duration = Duration::from_millis(250);

/// Nominal surface for the headless visualizer.
const SURFACE_WIDTH: f64 = 640.0;
const SURFACE_HEIGHT: f64 = 120.0;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Stdout carries the protocol, so logs go to a file only.
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = platform::log_path();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,player_core=debug,player_daemon=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let catalog = Catalog::builtin(config.catalog.artist.clone());
    info!("{} tracks by {}", catalog.len(), catalog.artist());

    // Every input funnels into PlayerCore; notifications fan out from it.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<PlayerEvent>();
    let (notify_tx, notify_rx) = broadcast::channel(256);

    let mut engine = SimulatedEngine::new(event_tx.clone(), config.visualizer.bin_count());
    for track in catalog.tracks() {
        match track.nominal_duration.as_deref().and_then(parse_duration) {
            Some(secs) => engine.set_duration(track.locator.clone(), secs),
            None => warn!("no usable duration for '{}'", track.title),
        }
    }

    let host = HeadlessHost::new(
        event_tx.clone(),
        config.visualizer.frame_interval(),
        SURFACE_WIDTH,
        SURFACE_HEIGHT,
    );

    // notify_rx was subscribed above, so the startup TrackChanged is queued
    // behind Hello rather than lost.
    let controller = TransportController::new(
        catalog,
        engine,
        host,
        &config,
        notify_tx,
        event_tx.clone(),
    );
    let hello = controller.hello();

    let writer = tokio::spawn(stdio::write_notifications(
        tokio::io::stdout(),
        hello,
        notify_rx,
    ));
    let reader_tx = event_tx.clone();
    let reader = tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        if let Err(e) = stdio::read_gestures(stdin, reader_tx.clone()).await {
            warn!("input error: {}", e);
            let _ = reader_tx.send(PlayerEvent::Shutdown);
        }
    });

    let core = PlayerCore::new(controller, event_tx).with_clock(CLOCK_INTERVAL);
    let controller = core.run(event_rx).await?;
    info!(
        "stopped on track {} '{}'",
        controller.current_index(),
        controller.current_track().title
    );

    // Dropping the controller closes the notification channel, which ends
    // the writer after it flushes.
    drop(controller);
    reader.abort();
    writer.await??;

    info!("Shutdown complete");
    Ok(())
}
