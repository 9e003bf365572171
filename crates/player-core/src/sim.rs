//! In-memory engine and frame host.
//!
//! `SimulatedEngine` behaves like a browser media element wired to an
//! analyser: completions are queued on the event channel rather than
//! returned, the clock only moves when `advance_clock` is called, and
//! failure modes can be switched on per test.  The headless daemon uses it
//! as its playback backend.
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use player_proto::PlayerError;
use tokio::sync::mpsc;
use tracing::debug;

use crate::audio::{seek_target, AudioEngine, EngineEvent, LoadId, RequestId};
use crate::core::PlayerEvent;
use crate::visualizer::{BarFrame, FrameHandle, FrameHost};

/// Failure switches for the simulated engine.
#[derive(Debug, Clone, Default)]
pub struct SimBehaviour {
    /// Every `play` is refused (autoplay policy / bad source).
    pub reject_play: bool,
    /// The analysis graph cannot be built.
    pub fail_graph: bool,
    /// A freshly built graph starts suspended.
    pub start_suspended: bool,
    /// `resume_if_suspended` is refused.
    pub reject_resume: bool,
    /// Do not emit `Ready` after a load; deferred plays wait for the settle delay.
    pub silent_ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Graph {
    Absent,
    Running,
    Suspended,
}

#[derive(Debug, Clone)]
struct Source {
    locator: String,
    load: LoadId,
    duration: Option<f64>,
    broken: bool,
}

pub struct SimulatedEngine {
    events: mpsc::UnboundedSender<PlayerEvent>,
    behaviour: SimBehaviour,
    durations: HashMap<String, f64>,
    missing: HashSet<String>,
    source: Option<Source>,
    paused: bool,
    current_time: f64,
    graph: Graph,
    graph_builds: usize,
    magnitudes: Vec<u8>,
    plays_requested: usize,
}

impl SimulatedEngine {
    pub fn new(events: mpsc::UnboundedSender<PlayerEvent>, bins: usize) -> Self {
        Self {
            events,
            behaviour: SimBehaviour::default(),
            durations: HashMap::new(),
            missing: HashSet::new(),
            source: None,
            paused: true,
            current_time: 0.0,
            graph: Graph::Absent,
            graph_builds: 0,
            magnitudes: vec![0; bins.max(1)],
            plays_requested: 0,
        }
    }

    pub fn with_behaviour(mut self, behaviour: SimBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn behaviour_mut(&mut self) -> &mut SimBehaviour {
        &mut self.behaviour
    }

    /// Duration reported once `locator` is loaded.
    pub fn set_duration(&mut self, locator: impl Into<String>, secs: f64) {
        self.durations.insert(locator.into(), secs);
    }

    /// Make `locator` fail to load (and refuse to play).
    pub fn mark_missing(&mut self, locator: impl Into<String>) {
        self.missing.insert(locator.into());
    }

    /// Jump the clock without emitting anything.
    pub fn set_current_time(&mut self, secs: f64) {
        self.current_time = secs.max(0.0);
    }

    /// Forget the duration of `locator`; later loads of it report none.
    pub fn clear_duration(&mut self, locator: &str) {
        self.durations.remove(locator);
    }

    /// Play out the rest of the source and emit `Ended`.  No-op without a
    /// source.
    pub fn finish_track(&mut self) {
        let Some(source) = &self.source else {
            return;
        };
        let load = source.load;
        if let Some(d) = source.duration {
            self.current_time = d;
        }
        self.paused = true;
        self.emit(EngineEvent::Ended(load));
    }

    pub fn locator(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.locator.as_str())
    }

    pub fn graph_builds(&self) -> usize {
        self.graph_builds
    }

    pub fn plays_requested(&self) -> usize {
        self.plays_requested
    }

    /// Suspend a running graph, as browsers do when a tab goes idle.
    pub fn suspend(&mut self) {
        if self.graph == Graph::Running {
            self.graph = Graph::Suspended;
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Receiver gone means the session is shutting down.
        let _ = self.events.send(PlayerEvent::Engine(event));
    }

    fn emit_time(&self) {
        let Some(source) = &self.source else {
            return;
        };
        self.emit(EngineEvent::TimeUpdate {
            load: source.load,
            current_secs: self.current_time,
            duration_secs: self.duration(),
        });
    }

    fn synthesize_spectrum(&mut self) {
        let n = self.magnitudes.len() as f64;
        let t = self.current_time;
        for (i, m) in self.magnitudes.iter_mut().enumerate() {
            let falloff = 1.0 - (i as f64 / n);
            let wobble = 0.6 + 0.4 * (t * 3.0 + i as f64 * 0.3).sin().abs();
            *m = (255.0 * falloff * falloff.sqrt() * wobble).round().clamp(0.0, 255.0) as u8;
        }
    }
}

impl AudioEngine for SimulatedEngine {
    fn load_track(&mut self, locator: &str, load: LoadId) {
        self.paused = true;
        self.current_time = 0.0;
        let broken = self.missing.contains(locator);
        let duration = self.durations.get(locator).copied();
        self.source = Some(Source {
            locator: locator.to_string(),
            load,
            duration: if broken { None } else { duration },
            broken,
        });
        debug!("sim: load {:?} {}", load, locator);

        if broken {
            self.emit(EngineEvent::LoadFailed(load, format!("{} not found", locator)));
            return;
        }
        if let Some(d) = duration {
            self.emit(EngineEvent::MetadataLoaded {
                load,
                duration_secs: d,
            });
        }
        if !self.behaviour.silent_ready {
            self.emit(EngineEvent::Ready(load));
        }
    }

    fn has_source(&self) -> bool {
        self.source.is_some()
    }

    fn play(&mut self, request: RequestId) {
        self.plays_requested += 1;
        let refusal = match &self.source {
            None => Some("no source".to_string()),
            Some(s) if s.broken => Some(format!("{} is not playable", s.locator)),
            Some(_) if self.behaviour.reject_play => Some("play() was refused".to_string()),
            Some(_) => None,
        };
        match refusal {
            Some(reason) => self.emit(EngineEvent::PlayRejected(request, reason)),
            None => {
                self.paused = false;
                self.emit(EngineEvent::PlayResolved(request));
            }
        }
    }

    fn pause(&mut self) {
        if self.source.is_some() {
            self.paused = true;
        }
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn seek_to(&mut self, fraction: f64) {
        if let Some(secs) = seek_target(fraction, self.duration()) {
            self.current_time = secs;
            self.emit_time();
        }
    }

    fn restart(&mut self) {
        if self.source.is_some() {
            self.current_time = 0.0;
        }
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn duration(&self) -> Option<f64> {
        self.source
            .as_ref()
            .and_then(|s| s.duration)
            .filter(|d| d.is_finite())
    }

    fn ensure_analysis_graph_initialized(&mut self) -> Result<(), PlayerError> {
        if self.graph != Graph::Absent {
            return Ok(());
        }
        if self.behaviour.fail_graph {
            return Err(PlayerError::InitializationFailed(
                "AudioContext unavailable".to_string(),
            ));
        }
        self.graph = if self.behaviour.start_suspended {
            Graph::Suspended
        } else {
            Graph::Running
        };
        self.graph_builds += 1;
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.graph == Graph::Suspended
    }

    fn resume_if_suspended(&mut self, request: RequestId) {
        if self.graph == Graph::Suspended {
            if self.behaviour.reject_resume {
                self.emit(EngineEvent::ResumeRejected(
                    request,
                    "resume() was refused".to_string(),
                ));
                return;
            }
            self.graph = Graph::Running;
        }
        self.emit(EngineEvent::ResumeResolved(request));
    }

    fn latest_frequency_magnitudes(&mut self) -> &[u8] {
        if self.graph == Graph::Running && !self.paused {
            self.synthesize_spectrum();
        } else {
            self.magnitudes.fill(0);
        }
        &self.magnitudes
    }

    fn advance_clock(&mut self, elapsed: Duration) {
        if self.paused || self.source.is_none() {
            return;
        }
        self.current_time += elapsed.as_secs_f64();
        match self.duration() {
            Some(d) if self.current_time >= d => self.finish_track(),
            _ => self.emit_time(),
        }
    }
}

/// Summary of one painted frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintRecord {
    pub width: f64,
    pub height: f64,
    pub bars: usize,
    pub tallest: f64,
}

/// Frame host that records what it was asked to do.  Frames are never
/// delivered on their own; tests feed handles from `scheduled` back in.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub width: f64,
    pub height: f64,
    pub requested: usize,
    /// Every handle handed out, oldest first.
    pub scheduled: Vec<FrameHandle>,
    pub cancelled: Vec<FrameHandle>,
    pub paints: Vec<PaintRecord>,
    pub clears: usize,
    pub placeholder_visible: bool,
}

impl RecordingHost {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            placeholder_visible: true,
            ..Self::default()
        }
    }

    pub fn last_scheduled(&self) -> Option<FrameHandle> {
        self.scheduled.last().copied()
    }

    /// Handles requested and neither cancelled nor superseded.  With a single
    /// reschedule chain this is at most one.
    pub fn outstanding(&self) -> usize {
        match self.last_scheduled() {
            Some(h) if !self.cancelled.contains(&h) => 1,
            _ => 0,
        }
    }
}

impl FrameHost for RecordingHost {
    fn request_frame(&mut self) -> FrameHandle {
        self.requested += 1;
        let handle = FrameHandle(self.requested as u64);
        self.scheduled.push(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.cancelled.push(handle);
    }

    fn surface_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn paint(&mut self, frame: &BarFrame<'_>) {
        self.placeholder_visible = false;
        self.paints.push(PaintRecord {
            width: frame.width,
            height: frame.height,
            bars: frame.bars.len(),
            tallest: frame.bars.iter().map(|b| b.height).fold(0.0, f64::max),
        });
    }

    fn clear(&mut self) {
        self.clears += 1;
        self.placeholder_visible = true;
    }
}
