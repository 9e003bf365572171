//! Frame host for running without a screen.
//!
//! Animation frames are paced with a timer and posted back into the event
//! loop.  Painted frames are rendered as a one-line block spectrum at TRACE
//! level so `RUST_LOG=player_daemon=trace` shows the visualizer working.
use std::time::Duration;

use player_core::visualizer::BarFrame;
use player_core::{FrameHandle, FrameHost, PlayerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPECTRUM_COLUMNS: usize = 32;

pub struct HeadlessHost {
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    interval: Duration,
    width: f64,
    height: f64,
    next_handle: u64,
    pending: Option<(FrameHandle, JoinHandle<()>)>,
}

impl HeadlessHost {
    pub fn new(
        event_tx: mpsc::UnboundedSender<PlayerEvent>,
        interval: Duration,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            event_tx,
            interval,
            width,
            height,
            next_handle: 1,
            pending: None,
        }
    }
}

impl FrameHost for HeadlessHost {
    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.next_handle);
        self.next_handle += 1;

        let tx = self.event_tx.clone();
        let interval = self.interval;
        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = tx.send(PlayerEvent::AnimationFrame(handle));
        });
        // The previous callback has already fired by the time the loop asks
        // for the next one.
        self.pending = Some((handle, task));
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Some((pending, task)) = self.pending.take() {
            if pending == handle {
                task.abort();
            } else {
                self.pending = Some((pending, task));
            }
        }
    }

    fn surface_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn paint(&mut self, frame: &BarFrame<'_>) {
        trace!("spectrum |{}|", spectrum_line(frame));
    }

    fn clear(&mut self) {
        debug!("visualizer surface cleared");
    }
}

/// Downsample bar heights into a fixed-width line of block glyphs.
fn spectrum_line(frame: &BarFrame<'_>) -> String {
    if frame.bars.is_empty() || frame.height <= 0.0 {
        return String::new();
    }
    let per_column = frame.bars.len().div_ceil(SPECTRUM_COLUMNS);
    frame
        .bars
        .chunks(per_column)
        .map(|chunk| {
            let peak = chunk.iter().map(|b| b.height).fold(0.0, f64::max);
            let level = (peak / frame.height * 8.0).round().clamp(0.0, 8.0) as usize;
            LEVELS[level]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use player_core::visualizer::{Bar, Gradient};

    fn bar(height: f64) -> Bar {
        Bar {
            x: 0.0,
            y: 100.0 - height,
            width: 1.0,
            height,
        }
    }

    #[test]
    fn spectrum_line_scales_to_surface_height() {
        let bars = [bar(0.0), bar(50.0), bar(100.0)];
        let frame = BarFrame {
            width: 100.0,
            height: 100.0,
            bars: &bars,
            gradient: Gradient::default(),
        };
        assert_eq!(spectrum_line(&frame), " ▄█");
    }

    #[test]
    fn spectrum_line_caps_column_count() {
        let bars = vec![bar(100.0); 128];
        let frame = BarFrame {
            width: 100.0,
            height: 100.0,
            bars: &bars,
            gradient: Gradient::default(),
        };
        assert_eq!(spectrum_line(&frame).chars().count(), SPECTRUM_COLUMNS);
    }

    #[tokio::test(start_paused = true)]
    async fn requested_frame_is_delivered_after_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut host = HeadlessHost::new(tx, Duration::from_millis(16), 64.0, 16.0);
        let handle = host.request_frame();
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rx.try_recv().unwrap(), PlayerEvent::AnimationFrame(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_frame_never_arrives() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut host = HeadlessHost::new(tx, Duration::from_millis(16), 64.0, 16.0);
        let handle = host.request_frame();
        host.cancel_frame(handle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
