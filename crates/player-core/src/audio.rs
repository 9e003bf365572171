//! Audio engine adapter.
//!
//! The engine wraps the platform's single playable-media handle and its
//! frequency-analysis tap.  Requests are fire-and-forget: `play`, `resume`
//! and `load_track` return immediately and their outcome arrives later as an
//! [`EngineEvent`] tagged with the id the caller supplied.
//!
//! ```text
//!   controller ── play(RequestId) ──────────▶ engine
//!   controller ◀── PlayResolved / PlayRejected ── engine (via event channel)
//! ```
use std::time::Duration;

use player_proto::PlayerError;

/// Ticket for an asynchronous play or resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Generation of a source assignment.  Every `load_track` gets a new one so
/// late events from a replaced source can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadId(pub u64);

/// Unsolicited notifications and request completions from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PlayResolved(RequestId),
    PlayRejected(RequestId, String),
    ResumeResolved(RequestId),
    ResumeRejected(RequestId, String),
    /// The source can start playing (`canplay`).
    Ready(LoadId),
    /// Real duration became known (`loadedmetadata`).
    MetadataLoaded { load: LoadId, duration_secs: f64 },
    /// Periodic position report (`timeupdate`) for the source of `load`.
    TimeUpdate {
        load: LoadId,
        current_secs: f64,
        duration_secs: Option<f64>,
    },
    /// Playback reached the end of the source assigned by `LoadId`.
    Ended(LoadId),
    /// The source could not be fetched or decoded.
    LoadFailed(LoadId, String),
}

pub trait AudioEngine {
    /// Assign a new source and rewind to zero.  Fetch/decode failures are
    /// reported later as `EngineEvent::LoadFailed(load, ..)`.
    fn load_track(&mut self, locator: &str, load: LoadId);

    fn has_source(&self) -> bool;

    /// Request playback.  Answered with `PlayResolved` / `PlayRejected`.
    fn play(&mut self, request: RequestId);

    /// Synchronous; a no-op when nothing is loaded or already paused.
    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// Seek to `fraction` of the duration.  No-op while the duration is unknown.
    fn seek_to(&mut self, fraction: f64);

    /// Jump back to the start of the current source.
    fn restart(&mut self);

    fn current_time(&self) -> f64;

    /// `None` until the duration is known and finite.
    fn duration(&self) -> Option<f64>;

    fn current_position_fraction(&self) -> Option<f64> {
        let duration = self.duration()?;
        Some((self.current_time() / duration).clamp(0.0, 1.0))
    }

    /// Build the source tap + analyzer once per session.  Only call after a
    /// user gesture; later calls are no-ops.
    fn ensure_analysis_graph_initialized(&mut self) -> Result<(), PlayerError>;

    fn is_suspended(&self) -> bool;

    /// Resume a suspended graph.  Answered with `ResumeResolved` /
    /// `ResumeRejected`; resolves at once when not suspended.
    fn resume_if_suspended(&mut self, request: RequestId);

    /// Frequency magnitudes (0..=255) for the current frame.  Stale when the
    /// graph is not connected.
    fn latest_frequency_magnitudes(&mut self) -> &[u8];

    /// Move the engine's own clock forward.  Platform engines keep time
    /// themselves and ignore this.
    fn advance_clock(&mut self, _elapsed: Duration) {}
}

/// Convert a seek fraction to seconds, or `None` when the duration is not
/// usable (unknown, NaN, infinite or zero).
pub fn seek_target(fraction: f64, duration: Option<f64>) -> Option<f64> {
    let duration = duration.filter(|d| d.is_finite() && *d > 0.0)?;
    if !fraction.is_finite() {
        return None;
    }
    Some(fraction.clamp(0.0, 1.0) * duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_target_requires_known_duration() {
        assert_eq!(seek_target(0.5, None), None);
        assert_eq!(seek_target(0.5, Some(f64::NAN)), None);
        assert_eq!(seek_target(0.5, Some(f64::INFINITY)), None);
        assert_eq!(seek_target(0.5, Some(0.0)), None);
        assert_eq!(seek_target(0.5, Some(60.0)), Some(30.0));
    }

    #[test]
    fn seek_target_clamps_fraction() {
        assert_eq!(seek_target(1.7, Some(10.0)), Some(10.0));
        assert_eq!(seek_target(-0.2, Some(10.0)), Some(0.0));
        assert_eq!(seek_target(f64::NAN, Some(10.0)), None);
    }
}
