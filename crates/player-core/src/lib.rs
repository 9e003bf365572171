pub mod audio;
pub mod core;
pub mod sim;
pub mod transport;
pub mod visualizer;

pub use crate::audio::{AudioEngine, EngineEvent, LoadId, RequestId};
pub use crate::core::{PlayerCore, PlayerEvent};
pub use crate::transport::{PlaybackState, TransportController};
pub use crate::visualizer::{FrameHandle, FrameHost, Visualizer};
