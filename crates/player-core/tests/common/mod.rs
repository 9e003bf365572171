//! Shared harness: a controller over the simulated engine and a recording
//! frame host, plus helpers to pump queued engine events and settle timers.
#![allow(dead_code)]

use std::time::Duration;

use player_core::sim::{RecordingHost, SimBehaviour, SimulatedEngine};
use player_core::{PlayerEvent, TransportController};
use player_proto::config::Config;
use player_proto::protocol::Notification;
use player_proto::Catalog;
use tokio::sync::{broadcast, mpsc};

pub type Controller = TransportController<SimulatedEngine, RecordingHost>;

pub struct Harness {
    pub ctl: Controller,
    pub events: mpsc::UnboundedReceiver<PlayerEvent>,
    pub notes: broadcast::Receiver<Notification>,
}

pub fn locator(title: &str) -> String {
    format!("./Audio/{}.mp3", title)
}

impl Harness {
    pub fn new(titles: &[&str]) -> Self {
        Self::with(titles, SimBehaviour::default(), Config::default())
    }

    pub fn with_behaviour(titles: &[&str], behaviour: SimBehaviour) -> Self {
        Self::with(titles, behaviour, Config::default())
    }

    pub fn with(titles: &[&str], behaviour: SimBehaviour, config: Config) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (notify_tx, notes) = broadcast::channel(1024);
        let catalog = Catalog::new(
            "Test Artist",
            titles.iter().map(|t| (*t, locator(t), Some("0:30"))),
        )
        .expect("non-empty catalog");
        let mut engine = SimulatedEngine::new(event_tx.clone(), config.visualizer.bin_count())
            .with_behaviour(behaviour);
        for t in titles {
            engine.set_duration(locator(t), 30.0);
        }
        let host = RecordingHost::new(640.0, 120.0);
        let ctl = TransportController::new(catalog, engine, host, &config, notify_tx, event_tx)
            .with_seed(42);
        Self { ctl, events, notes }
    }

    /// Feed every queued event (and every settle timer that comes due) into
    /// the controller until nothing is left.  Needs a paused clock.
    pub async fn settle(&mut self) {
        loop {
            match tokio::time::timeout(Duration::from_secs(10), self.events.recv()).await {
                Ok(Some(evt)) => self.ctl.handle_event(evt),
                _ => break,
            }
        }
    }

    /// Feed queued events without letting timers run.
    pub fn pump(&mut self) {
        while let Ok(evt) = self.events.try_recv() {
            self.ctl.handle_event(evt);
        }
    }

    pub fn drain_notes(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        loop {
            match self.notes.try_recv() {
                Ok(n) => out.push(n),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }

    /// Click play and let it complete.
    pub async fn start_playing(&mut self) {
        self.ctl.on_transport_button_clicked();
        self.settle().await;
        assert!(self.ctl.is_playing(), "expected playback to start");
    }
}

pub fn errors(notes: &[Notification]) -> Vec<&Notification> {
    notes
        .iter()
        .filter(|n| matches!(n, Notification::Error { .. }))
        .collect()
}

pub fn track_changes(notes: &[Notification]) -> Vec<usize> {
    notes
        .iter()
        .filter_map(|n| match n {
            Notification::TrackChanged { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

pub fn playback_states(notes: &[Notification]) -> Vec<bool> {
    notes
        .iter()
        .filter_map(|n| match n {
            Notification::PlaybackStateChanged { is_playing } => Some(*is_playing),
            _ => None,
        })
        .collect()
}
