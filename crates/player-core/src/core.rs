//! Single-owner event loop for all mutable playback state.
//!
//! Every input (renderer gestures, engine completions, settle timers,
//! animation frames, clock ticks) arrives as a `PlayerEvent` on one channel
//! and is handled to completion before the next one is read.  The
//! `TransportController` inside is the only thing that mutates
//! `PlaybackState` or the visualizer, so no locking is needed.
use std::time::Duration;

use player_proto::protocol::Gesture;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::audio::{AudioEngine, EngineEvent, LoadId};
use crate::transport::TransportController;
use crate::visualizer::{FrameHandle, FrameHost};

// ── PlayerEvent ───────────────────────────────────────────────────────────────

/// All inputs into the PlayerCore loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A gesture forwarded by the renderer.
    Gesture(Gesture),
    /// Completion or notification from the audio engine.
    Engine(EngineEvent),
    /// The settle delay after loading `LoadId` ran out.
    SettleElapsed(LoadId),
    /// The host's per-display-frame callback fired.
    AnimationFrame(FrameHandle),
    /// Wall-clock tick for engines that keep their own clock.
    ClockTick(Duration),
    /// Shutdown requested.
    Shutdown,
}

impl From<Gesture> for PlayerEvent {
    fn from(g: Gesture) -> Self {
        PlayerEvent::Gesture(g)
    }
}

impl From<EngineEvent> for PlayerEvent {
    fn from(e: EngineEvent) -> Self {
        PlayerEvent::Engine(e)
    }
}

// ── PlayerCore ────────────────────────────────────────────────────────────────

pub struct PlayerCore<E, H> {
    controller: TransportController<E, H>,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    clock_interval: Option<Duration>,
}

impl<E: AudioEngine, H: FrameHost> PlayerCore<E, H> {
    pub fn new(
        controller: TransportController<E, H>,
        event_tx: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        Self {
            controller,
            event_tx,
            clock_interval: None,
        }
    }

    /// Post `ClockTick`s every `interval` while the loop runs.
    pub fn with_clock(mut self, interval: Duration) -> Self {
        self.clock_interval = Some(interval);
        self
    }

    pub fn controller(&self) -> &TransportController<E, H> {
        &self.controller
    }

    /// Run until a `Shutdown` event arrives or every sender is dropped.
    /// Hands the controller back so callers can inspect the final state.
    pub async fn run(
        mut self,
        mut event_rx: mpsc::UnboundedReceiver<PlayerEvent>,
    ) -> anyhow::Result<TransportController<E, H>> {
        info!("PlayerCore: starting event loop");

        let ticker = self.clock_interval.map(|interval| {
            let tick_tx = self.event_tx.clone();
            tokio::spawn(async move {
                let mut timer = tokio::time::interval(interval);
                timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                timer.tick().await;
                loop {
                    timer.tick().await;
                    if tick_tx.send(PlayerEvent::ClockTick(interval)).is_err() {
                        break;
                    }
                }
            })
        });

        loop {
            match event_rx.recv().await {
                None => {
                    info!("PlayerCore: event channel closed, shutting down");
                    break;
                }
                Some(PlayerEvent::Shutdown) => {
                    info!("PlayerCore: shutdown requested");
                    break;
                }
                Some(evt) => {
                    if !matches!(evt, PlayerEvent::AnimationFrame(_) | PlayerEvent::ClockTick(_)) {
                        debug!("PlayerCore: event {:?}", evt);
                    }
                    self.controller.handle_event(evt);
                }
            }
        }

        if let Some(t) = ticker {
            t.abort();
        }
        self.controller.shutdown();
        Ok(self.controller)
    }
}
