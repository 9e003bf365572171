use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Renderers check it in the `Hello` notification.
pub const PROTOCOL_VERSION: u32 = 1;

/// User gestures forwarded by the renderer into the transport controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "gesture")]
pub enum Gesture {
    TrackCardClicked { index: usize },
    TransportButtonClicked,
    NextClicked,
    PreviousClicked,
    ShuffleToggleClicked,
    PlayAllClicked,
    /// Progress bar dragged to `fraction` of the track (0.0..=1.0).
    ProgressDragged { fraction: f64 },
}

/// Notifications emitted by the controller for the renderer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum Notification {
    /// Sent once when a renderer attaches: protocol version + track list.
    Hello {
        protocol_version: u32,
        artist: String,
        tracks: Vec<crate::catalog::Track>,
    },
    TrackChanged {
        index: usize,
        title: String,
        duration_label: String,
    },
    PlaybackStateChanged {
        is_playing: bool,
    },
    ShuffleChanged {
        is_shuffling: bool,
    },
    /// Transient banner; the renderer hides it after `display_ms`.
    Error {
        message: String,
        kind: ErrorKind,
        display_ms: u64,
    },
    /// Playback position.  Only sent once the duration is known, except for
    /// the zero reset on track load / rewind.
    ProgressChanged {
        fraction: f64,
        elapsed_secs: f64,
    },
    /// The engine reported the real duration of the loaded track.
    DurationResolved {
        index: usize,
        label: String,
    },
}

/// Wrapper for stdio communication: one JSON document per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Gesture(Gesture),
    Notification(Notification),
}

impl Message {
    pub fn encode_line(&self) -> anyhow::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn decode_line(line: &str) -> anyhow::Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            anyhow::bail!("empty line");
        }
        Ok(serde_json::from_str(trimmed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gesture_line_decodes() {
        let msg = Message::decode_line(r#"{"gesture":"TrackCardClicked","index":4}"#).unwrap();
        match msg {
            Message::Gesture(Gesture::TrackCardClicked { index }) => assert_eq!(index, 4),
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn unit_gesture_decodes() {
        let msg = Message::decode_line("{\"gesture\":\"NextClicked\"}\n").unwrap();
        assert!(matches!(msg, Message::Gesture(Gesture::NextClicked)));
    }

    #[test]
    fn error_notification_carries_kind() {
        let line = Message::Notification(Notification::Error {
            message: "nope".into(),
            kind: ErrorKind::PlaybackRejected,
            display_ms: 5000,
        })
        .encode_line()
        .unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains(r#""event":"Error""#));
        assert!(line.contains(r#""kind":"PlaybackRejected""#));
    }

    #[test]
    fn blank_line_is_rejected() {
        assert!(Message::decode_line("   ").is_err());
    }
}
