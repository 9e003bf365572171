//! Transport controller: which track is active and whether it is playing.
//!
//! States, as seen from outside:
//!
//! ```text
//!   Idle ──load──▶ Loaded/Paused ──play ok──▶ Loaded/Playing
//!                      ▲   ▲                      │    │
//!                      │   └──────── pause ───────┘    │ ended
//!                      └── next index, deferred play ◀─┘
//! ```
//!
//! `is_playing` only changes inside completion handlers.  Each play/resume
//! request carries a `RequestId` and each load a `LoadId`; completions that
//! do not match the request currently outstanding are stale and dropped.
use std::time::Duration;

use player_proto::config::Config;
use player_proto::protocol::{Gesture, Notification, PROTOCOL_VERSION};
use player_proto::{format_duration, Catalog, PlayerError, Track};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::audio::{AudioEngine, EngineEvent, LoadId, RequestId};
use crate::core::PlayerEvent;
use crate::visualizer::{FrameHandle, FrameHost, Visualizer};

/// Playback state owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub current_index: usize,
    pub is_playing: bool,
    pub is_shuffling: bool,
    /// Latched once the first user-initiated play builds the analysis graph.
    pub has_user_gestured: bool,
}

/// The asynchronous request currently in flight, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Resume(RequestId),
    Play(RequestId),
}

pub struct TransportController<E, H> {
    catalog: Catalog,
    engine: E,
    host: H,
    visualizer: Visualizer,
    notify_tx: broadcast::Sender<Notification>,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    state: PlaybackState,
    pending: Option<Pending>,
    /// Load whose deferred play has not fired yet.
    autoplay: Option<LoadId>,
    current_load: LoadId,
    next_load: u64,
    next_request: u64,
    settle_delay: Duration,
    await_ready: bool,
    rewind_threshold_secs: f64,
    error_display: Duration,
    rng: StdRng,
}

impl<E: AudioEngine, H: FrameHost> TransportController<E, H> {
    /// Build the controller and load the first track, paused.
    pub fn new(
        catalog: Catalog,
        engine: E,
        host: H,
        config: &Config,
        notify_tx: broadcast::Sender<Notification>,
        event_tx: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        let mut controller = Self {
            catalog,
            engine,
            host,
            visualizer: Visualizer::new(&config.visualizer),
            notify_tx,
            event_tx,
            state: PlaybackState {
                current_index: 0,
                is_playing: false,
                is_shuffling: false,
                has_user_gestured: false,
            },
            pending: None,
            autoplay: None,
            current_load: LoadId(0),
            next_load: 1,
            next_request: 1,
            settle_delay: config.playback.settle_delay(),
            await_ready: config.playback.await_ready,
            rewind_threshold_secs: config.playback.rewind_threshold_secs,
            error_display: config.notifications.error_display(),
            rng: StdRng::from_entropy(),
        };
        controller.load_index(0, false);
        controller
    }

    /// Replace the shuffle RNG (deterministic tests).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    // ── accessors ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn is_shuffling(&self) -> bool {
        self.state.is_shuffling
    }

    pub fn current_track(&self) -> &Track {
        &self.catalog.tracks()[self.state.current_index]
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn visualizer(&self) -> &Visualizer {
        &self.visualizer
    }

    /// Sender for the loop's event channel, for feeding gestures back in.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<PlayerEvent> {
        self.event_tx.clone()
    }

    /// Generation of the source currently assigned to the engine.
    pub fn current_load(&self) -> LoadId {
        self.current_load
    }

    /// True while a play or resume request is outstanding.
    pub fn request_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Greeting for a newly attached renderer.
    pub fn hello(&self) -> Notification {
        Notification::Hello {
            protocol_version: PROTOCOL_VERSION,
            artist: self.catalog.artist().to_string(),
            tracks: self.catalog.tracks().to_vec(),
        }
    }

    // ── event dispatch ────────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Gesture(g) => self.handle_gesture(g),
            PlayerEvent::Engine(e) => self.handle_engine_event(e),
            PlayerEvent::SettleElapsed(load) => self.on_settle_elapsed(load),
            PlayerEvent::AnimationFrame(handle) => self.on_animation_frame(handle),
            PlayerEvent::ClockTick(elapsed) => self.engine.advance_clock(elapsed),
            PlayerEvent::Shutdown => self.shutdown(),
        }
    }

    pub fn handle_gesture(&mut self, gesture: Gesture) {
        match gesture {
            Gesture::TrackCardClicked { index } => {
                if let Err(e) = self.on_track_card_clicked(index) {
                    warn!("track card: {}", e);
                }
            }
            Gesture::TransportButtonClicked => self.on_transport_button_clicked(),
            Gesture::NextClicked => self.on_next_clicked(),
            Gesture::PreviousClicked => self.on_previous_clicked(),
            Gesture::ShuffleToggleClicked => self.on_shuffle_toggle_clicked(),
            Gesture::PlayAllClicked => self.on_play_all_clicked(),
            Gesture::ProgressDragged { fraction } => self.on_progress_dragged(fraction),
        }
    }

    pub fn on_track_card_clicked(&mut self, index: usize) -> Result<(), PlayerError> {
        self.load_track(index, true)
    }

    pub fn on_transport_button_clicked(&mut self) {
        self.toggle_play_pause(false);
    }

    pub fn on_next_clicked(&mut self) {
        self.next();
    }

    pub fn on_previous_clicked(&mut self) {
        self.previous();
    }

    pub fn on_shuffle_toggle_clicked(&mut self) {
        self.toggle_shuffle();
    }

    pub fn on_play_all_clicked(&mut self) {
        self.play_all();
    }

    pub fn on_progress_dragged(&mut self, fraction: f64) {
        if !fraction.is_finite() {
            debug!("progress drag ignored: {}", fraction);
            return;
        }
        self.engine.seek_to(fraction.clamp(0.0, 1.0));
    }

    // ── transport operations ──────────────────────────────────────────────────

    /// Load `index`.  Playback is re-issued after the settle delay when the
    /// player was playing (or about to) or when `force_play` is set.
    pub fn load_track(&mut self, index: usize, force_play: bool) -> Result<(), PlayerError> {
        self.catalog.track(index)?;
        self.load_index(index, force_play);
        Ok(())
    }

    /// Play when paused (or when forced), pause otherwise.
    pub fn toggle_play_pause(&mut self, force_play: bool) {
        if !self.engine.has_source() {
            self.load_index(0, false);
        }

        let active = self.state.is_playing || self.pending.is_some();
        if active && !force_play {
            self.pause();
            return;
        }

        if !self.state.has_user_gestured {
            if let Err(e) = self.engine.ensure_analysis_graph_initialized() {
                self.report(e);
                return;
            }
            info!("analysis graph initialised");
            self.state.has_user_gestured = true;
        }

        // An explicit play supersedes any deferred one.
        self.autoplay = None;

        let request = self.next_request_id();
        if self.engine.is_suspended() {
            debug!("audio graph suspended, resuming ({:?})", request);
            self.pending = Some(Pending::Resume(request));
            self.engine.resume_if_suspended(request);
        } else {
            self.request_play(request);
        }
    }

    /// Advance to the next track (random other track when shuffling).
    pub fn next(&mut self) {
        self.advance(false);
    }

    /// Restart the current track when past the rewind threshold, otherwise
    /// step back one track.
    pub fn previous(&mut self) {
        let elapsed = self.engine.current_time();
        if elapsed > self.rewind_threshold_secs {
            info!("previous: rewinding '{}' from {:.1}s", self.current_track().title, elapsed);
            self.engine.restart();
            self.notify(Notification::ProgressChanged {
                fraction: 0.0,
                elapsed_secs: 0.0,
            });
            return;
        }
        let n = self.catalog.len();
        let prev = (self.state.current_index + n - 1) % n;
        self.load_index(prev, false);
    }

    pub fn toggle_shuffle(&mut self) {
        self.state.is_shuffling = !self.state.is_shuffling;
        info!("shuffle {}", if self.state.is_shuffling { "on" } else { "off" });
        self.notify(Notification::ShuffleChanged {
            is_shuffling: self.state.is_shuffling,
        });
    }

    /// Start from the first track with shuffle off.
    pub fn play_all(&mut self) {
        self.load_index(0, true);
        if self.state.is_shuffling {
            self.state.is_shuffling = false;
            self.notify(Notification::ShuffleChanged { is_shuffling: false });
        }
    }

    /// Pause and blank the visualizer; used when the session ends.
    pub fn shutdown(&mut self) {
        self.engine.pause();
        self.pending = None;
        self.autoplay = None;
        self.set_playing(false);
        self.visualizer.stop(&mut self.host);
    }

    // ── engine events ─────────────────────────────────────────────────────────

    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::PlayResolved(request) => {
                if self.pending == Some(Pending::Play(request)) {
                    self.pending = None;
                    info!("playing '{}'", self.current_track().title);
                    self.set_playing(true);
                    self.visualizer.start(&mut self.host);
                } else {
                    debug!("stale play completion {:?}", request);
                    // The engine started anyway; keep it in line with our state.
                    if self.pending.is_none() && !self.state.is_playing {
                        self.engine.pause();
                    }
                }
            }
            EngineEvent::PlayRejected(request, reason) => {
                if self.pending == Some(Pending::Play(request)) {
                    self.pending = None;
                    self.report(PlayerError::PlaybackRejected(reason));
                } else {
                    debug!("stale play rejection {:?}: {}", request, reason);
                }
            }
            EngineEvent::ResumeResolved(request) => {
                if self.pending == Some(Pending::Resume(request)) {
                    let play = self.next_request_id();
                    self.request_play(play);
                } else {
                    debug!("stale resume completion {:?}", request);
                }
            }
            EngineEvent::ResumeRejected(request, reason) => {
                if self.pending == Some(Pending::Resume(request)) {
                    self.pending = None;
                    self.report(PlayerError::ResumeRejected(reason));
                } else {
                    debug!("stale resume rejection {:?}: {}", request, reason);
                }
            }
            EngineEvent::Ready(load) => {
                if load == self.current_load && self.await_ready && self.autoplay == Some(load) {
                    debug!("source ready {:?}, starting deferred play", load);
                    self.fire_autoplay();
                }
            }
            EngineEvent::MetadataLoaded {
                load,
                duration_secs,
            } => {
                if load != self.current_load {
                    return;
                }
                if let Some(label) = format_duration(duration_secs) {
                    self.notify(Notification::DurationResolved {
                        index: self.state.current_index,
                        label,
                    });
                }
            }
            EngineEvent::TimeUpdate {
                load,
                current_secs,
                duration_secs,
            } => {
                if load != self.current_load {
                    return;
                }
                if let Some(d) = duration_secs.filter(|d| d.is_finite() && *d > 0.0) {
                    self.notify(Notification::ProgressChanged {
                        fraction: (current_secs / d).clamp(0.0, 1.0),
                        elapsed_secs: current_secs,
                    });
                }
            }
            EngineEvent::Ended(load) => {
                if load != self.current_load {
                    debug!("stale end of track {:?}", load);
                    return;
                }
                // Auto-play only if nobody paused between the end and now.
                let resume = self.state.is_playing || self.pending.is_some();
                info!(
                    "'{}' ended, advancing{}",
                    self.current_track().title,
                    if resume { "" } else { " (paused)" }
                );
                self.set_playing(false);
                self.visualizer.stop(&mut self.host);
                self.advance(resume);
            }
            EngineEvent::LoadFailed(load, reason) => {
                if load != self.current_load {
                    debug!("stale load failure {:?}: {}", load, reason);
                    return;
                }
                self.autoplay = None;
                self.report(PlayerError::LoadFailed(reason));
            }
        }
    }

    pub fn on_settle_elapsed(&mut self, load: LoadId) {
        if self.autoplay == Some(load) && load == self.current_load {
            debug!("settle delay elapsed {:?}, starting deferred play", load);
            self.fire_autoplay();
        }
    }

    pub fn on_animation_frame(&mut self, handle: FrameHandle) {
        if !self.visualizer.owns(handle) {
            return;
        }
        if self.engine.is_paused() {
            debug!("engine paused under a running visualizer");
            self.set_playing(false);
            self.visualizer.stop(&mut self.host);
            return;
        }
        let magnitudes = self.engine.latest_frequency_magnitudes();
        self.visualizer.on_frame(handle, &mut self.host, magnitudes);
    }

    // ── internals ─────────────────────────────────────────────────────────────

    fn load_index(&mut self, index: usize, force_play: bool) {
        let resume = force_play || self.state.is_playing || self.pending.is_some();
        let track = &self.catalog.tracks()[index];

        self.visualizer.stop(&mut self.host);
        self.pending = None;
        self.autoplay = None;

        let load = LoadId(self.next_load);
        self.next_load += 1;
        self.current_load = load;
        self.state.current_index = index;
        info!(
            "loading track {} '{}' [{}] ({:?})",
            track.number_label(),
            track.title,
            self.catalog.credit_line(track.duration_label()),
            load
        );
        self.engine.load_track(&track.locator, load);

        let changed = Notification::TrackChanged {
            index,
            title: track.title.clone(),
            duration_label: track.duration_label().to_string(),
        };
        // A new source stops the old one.
        self.set_playing(false);
        self.notify(changed);
        self.notify(Notification::ProgressChanged {
            fraction: 0.0,
            elapsed_secs: 0.0,
        });

        if resume {
            self.arm_autoplay(load);
        }
    }

    fn advance(&mut self, force_play: bool) {
        let next = self.next_index();
        self.load_index(next, force_play);
    }

    fn next_index(&mut self) -> usize {
        let n = self.catalog.len();
        let current = self.state.current_index;
        if self.state.is_shuffling && n > 1 {
            loop {
                let pick = self.rng.gen_range(0..n);
                if pick != current {
                    return pick;
                }
            }
        }
        (current + 1) % n
    }

    fn pause(&mut self) {
        self.engine.pause();
        self.pending = None;
        self.autoplay = None;
        self.state.is_playing = false;
        self.visualizer.stop(&mut self.host);
        info!("paused");
        self.notify(Notification::PlaybackStateChanged { is_playing: false });
    }

    /// Arm the deferred play for `load`.  The settle timer needs a tokio
    /// runtime; without one only the engine's ready signal can fire it.
    fn arm_autoplay(&mut self, load: LoadId) {
        self.autoplay = Some(load);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime for the settle timer, waiting on ready {:?}", load);
            return;
        };
        let tx = self.event_tx.clone();
        let delay = self.settle_delay;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PlayerEvent::SettleElapsed(load));
        });
    }

    fn fire_autoplay(&mut self) {
        self.autoplay = None;
        self.toggle_play_pause(true);
    }

    fn request_play(&mut self, request: RequestId) {
        debug!("requesting play {:?}", request);
        self.pending = Some(Pending::Play(request));
        self.engine.play(request);
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        id
    }

    fn set_playing(&mut self, playing: bool) {
        if self.state.is_playing != playing {
            self.state.is_playing = playing;
            self.notify(Notification::PlaybackStateChanged {
                is_playing: playing,
            });
        }
    }

    /// Recover from a playback failure: stop, blank, tell the user once.
    fn report(&mut self, err: PlayerError) {
        let Some(kind) = err.kind() else {
            warn!("{}", err);
            return;
        };
        warn!("{:?}: {}", kind, err);
        self.pending = None;
        self.set_playing(false);
        self.visualizer.stop(&mut self.host);
        self.notify(Notification::Error {
            message: err.user_message(),
            kind,
            display_ms: self.error_display.as_millis() as u64,
        });
    }

    fn notify(&self, notification: Notification) {
        // No receivers is fine: the renderer may not be attached yet.
        let _ = self.notify_tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RecordingHost, SimulatedEngine};

    type Controller = TransportController<SimulatedEngine, RecordingHost>;

    fn controller(titles: &[&str]) -> (Controller, broadcast::Receiver<Notification>) {
        let (ctl, notes, _events) = controller_with_events(titles);
        (ctl, notes)
    }

    fn controller_with_events(
        titles: &[&str],
    ) -> (
        Controller,
        broadcast::Receiver<Notification>,
        mpsc::UnboundedReceiver<PlayerEvent>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = broadcast::channel(64);
        let catalog = Catalog::new(
            "Test",
            titles.iter().map(|t| (*t, format!("{}.mp3", t), None)),
        )
        .unwrap();
        let engine = SimulatedEngine::new(event_tx.clone(), 16);
        let host = RecordingHost::new(100.0, 50.0);
        let ctl = TransportController::new(
            catalog,
            engine,
            host,
            &Config::default(),
            notify_tx,
            event_tx,
        )
        .with_seed(7);
        (ctl, notify_rx, event_rx)
    }

    fn pump(ctl: &mut Controller, events: &mut mpsc::UnboundedReceiver<PlayerEvent>) {
        while let Ok(evt) = events.try_recv() {
            ctl.handle_event(evt);
        }
    }

    fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[test]
    fn construction_loads_first_track_paused() {
        let (ctl, mut rx) = controller(&["A", "B"]);
        assert_eq!(ctl.current_index(), 0);
        assert!(!ctl.is_playing());
        assert_eq!(ctl.engine().locator(), Some("A.mp3"));
        let notes = drain(&mut rx);
        assert!(notes.contains(&Notification::TrackChanged {
            index: 0,
            title: "A".into(),
            duration_label: "--:--".into(),
        }));
    }

    #[test]
    fn next_wraps_modulo_catalog_length() {
        let (mut ctl, _rx) = controller(&["A", "B", "C"]);
        let seen: Vec<usize> = (0..4)
            .map(|_| {
                ctl.next();
                ctl.current_index()
            })
            .collect();
        assert_eq!(seen, vec![1, 2, 0, 1]);
    }

    #[test]
    fn previous_wraps_backwards() {
        let (mut ctl, _rx) = controller(&["A", "B", "C"]);
        ctl.previous();
        assert_eq!(ctl.current_index(), 2);
        ctl.previous();
        assert_eq!(ctl.current_index(), 1);
    }

    #[test]
    fn shuffle_never_repeats_current() {
        let (mut ctl, _rx) = controller(&["A", "B", "C", "D"]);
        ctl.toggle_shuffle();
        for _ in 0..200 {
            let before = ctl.current_index();
            ctl.next();
            assert_ne!(ctl.current_index(), before);
        }
    }

    #[test]
    fn shuffle_on_single_track_stays_put() {
        let (mut ctl, _rx) = controller(&["Solo"]);
        ctl.toggle_shuffle();
        ctl.next();
        assert_eq!(ctl.current_index(), 0);
    }

    #[test]
    fn shuffle_toggle_notifies_and_keeps_track() {
        let (mut ctl, mut rx) = controller(&["A", "B"]);
        ctl.next();
        drain(&mut rx);
        ctl.toggle_shuffle();
        assert!(ctl.is_shuffling());
        assert_eq!(ctl.current_index(), 1);
        assert_eq!(
            drain(&mut rx),
            vec![Notification::ShuffleChanged { is_shuffling: true }]
        );
    }

    #[test]
    fn out_of_range_load_is_rejected() {
        let (mut ctl, mut rx) = controller(&["A", "B"]);
        drain(&mut rx);
        assert_eq!(
            ctl.load_track(5, false),
            Err(PlayerError::IndexOutOfRange { index: 5, len: 2 })
        );
        assert_eq!(ctl.current_index(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn hello_lists_catalog() {
        let (ctl, _rx) = controller(&["A", "B"]);
        match ctl.hello() {
            Notification::Hello {
                protocol_version,
                tracks,
                ..
            } => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(tracks.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn forced_load_outside_runtime_plays_on_ready() {
        let (mut ctl, _notes, mut events) = controller_with_events(&["A", "B"]);
        ctl.load_track(1, true).unwrap();
        assert!(!ctl.is_playing());
        pump(&mut ctl, &mut events);
        assert_eq!(ctl.current_index(), 1);
        assert!(ctl.is_playing());
    }

    #[test]
    fn shutdown_announces_pause() {
        let (mut ctl, mut notes, mut events) = controller_with_events(&["A"]);
        ctl.on_transport_button_clicked();
        pump(&mut ctl, &mut events);
        assert!(ctl.is_playing());
        drain(&mut notes);

        ctl.shutdown();
        assert!(!ctl.is_playing());
        assert_eq!(
            drain(&mut notes),
            vec![Notification::PlaybackStateChanged { is_playing: false }]
        );
    }
}
