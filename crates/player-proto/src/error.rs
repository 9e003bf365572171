use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories surfaced to the renderer in `Notification::Error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    /// The platform refused to build the analysis graph.
    InitializationFailed,
    /// A suspended audio graph could not be resumed.
    ResumeRejected,
    /// A play request was refused (bad source or autoplay policy).
    PlaybackRejected,
    /// The track resource is missing or undecodable.
    LoadFailed,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlayerError {
    #[error("audio initialisation failed: {0}")]
    InitializationFailed(String),
    #[error("could not resume audio: {0}")]
    ResumeRejected(String),
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),
    #[error("could not load track: {0}")]
    LoadFailed(String),
    #[error("track index {index} out of range (catalog has {len} tracks)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("catalog is empty")]
    EmptyCatalog,
}

impl PlayerError {
    /// Notification kind for the recoverable playback failures.  Programming
    /// errors (bad index, empty catalog) have no user-facing kind.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PlayerError::InitializationFailed(_) => Some(ErrorKind::InitializationFailed),
            PlayerError::ResumeRejected(_) => Some(ErrorKind::ResumeRejected),
            PlayerError::PlaybackRejected(_) => Some(ErrorKind::PlaybackRejected),
            PlayerError::LoadFailed(_) => Some(ErrorKind::LoadFailed),
            PlayerError::IndexOutOfRange { .. } | PlayerError::EmptyCatalog => None,
        }
    }

    /// Message shown in the transient error banner.
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::InitializationFailed(_) => {
                "Could not initialise audio. Make sure your browser supports it.".to_string()
            }
            PlayerError::ResumeRejected(_) => {
                "Could not resume audio. Click play again.".to_string()
            }
            PlayerError::PlaybackRejected(_) => {
                "Playback failed. Check the path of your audio files.".to_string()
            }
            PlayerError::LoadFailed(_) => {
                "Could not load the audio file. It was not found or cannot be decoded.".to_string()
            }
            other => other.to_string(),
        }
    }
}
