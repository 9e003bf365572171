//! Frequency-bar visualizer driven by the host's per-frame callback.
//!
//! Every frame the loop reschedules itself first, then reads the latest
//! magnitudes and repaints the whole surface.  `frame` is `Some` exactly while
//! the loop is running; stopping cancels the pending callback and blanks the
//! surface.
use player_proto::config::VisualizerConfig;
use tracing::{debug, warn};

/// Opaque token for a scheduled animation-frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

/// Two-stop vertical gradient applied to every bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gradient {
    pub top: Rgb,
    pub bottom: Rgb,
}

impl Default for Gradient {
    fn default() -> Self {
        Self {
            top: Rgb { r: 0xff, g: 0xd7, b: 0x00 },
            bottom: Rgb { r: 0xff, g: 0x00, b: 0x00 },
        }
    }
}

/// One bar in surface coordinates (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Paint instruction for one frame.
#[derive(Debug)]
pub struct BarFrame<'a> {
    pub width: f64,
    pub height: f64,
    pub bars: &'a [Bar],
    pub gradient: Gradient,
}

/// The drawing side of the host: frame scheduling plus the draw surface.
pub trait FrameHost {
    /// Schedule one callback for the next display frame.
    fn request_frame(&mut self) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
    /// Current on-screen size of the draw surface.
    fn surface_size(&self) -> (f64, f64);
    /// Clear the surface and draw `frame`; hides any placeholder.
    fn paint(&mut self, frame: &BarFrame<'_>);
    /// Clear the surface and show the placeholder.
    fn clear(&mut self);
}

/// Maps magnitudes to bar rectangles.
#[derive(Debug, Clone)]
pub struct BarLayout {
    pub width_scale: f64,
    pub gap: f64,
    pub gradient: Gradient,
}

impl BarLayout {
    pub fn from_config(config: &VisualizerConfig) -> Self {
        let defaults = Gradient::default();
        let top = Rgb::from_hex(&config.gradient_top).unwrap_or_else(|| {
            warn!("visualizer: bad gradient_top {:?}, using default", config.gradient_top);
            defaults.top
        });
        let bottom = Rgb::from_hex(&config.gradient_bottom).unwrap_or_else(|| {
            warn!(
                "visualizer: bad gradient_bottom {:?}, using default",
                config.gradient_bottom
            );
            defaults.bottom
        });
        Self {
            width_scale: config.bar_width_scale,
            gap: config.bar_gap,
            gradient: Gradient { top, bottom },
        }
    }

    /// Lay out one bar per bin, left to right, bottom-anchored.  Bars past
    /// the right edge are kept; the surface clips them.
    pub fn layout_into(&self, magnitudes: &[u8], width: f64, height: f64, out: &mut Vec<Bar>) {
        out.clear();
        if magnitudes.is_empty() || width <= 0.0 || height <= 0.0 {
            return;
        }
        let bar_width = (width / magnitudes.len() as f64) * self.width_scale;
        let mut x = 0.0;
        for &m in magnitudes {
            let bar_height = (m as f64 / 255.0) * height;
            out.push(Bar {
                x,
                y: height - bar_height,
                width: bar_width,
                height: bar_height,
            });
            x += bar_width + self.gap;
        }
    }
}

pub struct Visualizer {
    frame: Option<FrameHandle>,
    layout: BarLayout,
    bars: Vec<Bar>,
}

impl Visualizer {
    pub fn new(config: &VisualizerConfig) -> Self {
        Self {
            frame: None,
            layout: BarLayout::from_config(config),
            bars: Vec::with_capacity(config.bin_count()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.frame.is_some()
    }

    /// True when `handle` is the callback the loop is waiting for.
    pub fn owns(&self, handle: FrameHandle) -> bool {
        self.frame == Some(handle)
    }

    /// Start the loop.  Idempotent: a running loop keeps its single chain.
    pub fn start<H: FrameHost>(&mut self, host: &mut H) -> bool {
        if self.frame.is_some() {
            return false;
        }
        let handle = host.request_frame();
        debug!("visualizer: start ({:?})", handle);
        self.frame = Some(handle);
        true
    }

    /// Stop the loop and blank the surface.  No-op when not running.
    pub fn stop<H: FrameHost>(&mut self, host: &mut H) -> bool {
        let Some(handle) = self.frame.take() else {
            return false;
        };
        debug!("visualizer: stop ({:?})", handle);
        host.cancel_frame(handle);
        host.clear();
        true
    }

    /// Run one frame.  Returns false for stale callbacks.
    pub fn on_frame<H: FrameHost>(
        &mut self,
        handle: FrameHandle,
        host: &mut H,
        magnitudes: &[u8],
    ) -> bool {
        if !self.owns(handle) {
            return false;
        }
        self.frame = Some(host.request_frame());

        let (width, height) = host.surface_size();
        self.layout
            .layout_into(magnitudes, width, height, &mut self.bars);
        host.paint(&BarFrame {
            width,
            height,
            bars: &self.bars,
            gradient: self.layout.gradient,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingHost;

    fn visualizer() -> Visualizer {
        Visualizer::new(&VisualizerConfig::default())
    }

    #[test]
    fn hex_colours_parse() {
        assert_eq!(Rgb::from_hex("#ffd700"), Some(Rgb { r: 255, g: 215, b: 0 }));
        assert_eq!(Rgb::from_hex("ff0000"), Some(Rgb { r: 255, g: 0, b: 0 }));
        assert_eq!(Rgb::from_hex("#fff"), None);
        assert_eq!(Rgb::from_hex("#gg0000"), None);
    }

    #[test]
    fn layout_matches_canvas_geometry() {
        let layout = BarLayout::from_config(&VisualizerConfig::default());
        let mut bars = Vec::new();
        layout.layout_into(&[255, 0, 51, 102], 400.0, 100.0, &mut bars);
        assert_eq!(bars.len(), 4);
        // (400 / 4) * 2.5
        assert_eq!(bars[0].width, 250.0);
        assert_eq!(bars[0].height, 100.0);
        assert_eq!(bars[0].y, 0.0);
        assert_eq!(bars[1].x, 252.0);
        assert_eq!(bars[1].height, 0.0);
        assert_eq!(bars[2].height, 20.0);
        assert_eq!(bars[2].y, 80.0);
        assert_eq!(bars[3].x, 756.0);
    }

    #[test]
    fn zero_sized_surface_draws_nothing() {
        let layout = BarLayout::from_config(&VisualizerConfig::default());
        let mut bars = vec![Bar { x: 1.0, y: 1.0, width: 1.0, height: 1.0 }];
        layout.layout_into(&[10, 20], 0.0, 100.0, &mut bars);
        assert!(bars.is_empty());
    }

    #[test]
    fn bad_gradient_falls_back() {
        let config = VisualizerConfig {
            gradient_top: "yellow".into(),
            ..VisualizerConfig::default()
        };
        assert_eq!(BarLayout::from_config(&config).gradient, Gradient::default());
    }

    #[test]
    fn start_is_idempotent() {
        let mut host = RecordingHost::new(320.0, 80.0);
        let mut viz = visualizer();
        assert!(viz.start(&mut host));
        assert!(!viz.start(&mut host));
        assert_eq!(host.requested, 1);
        assert_eq!(host.scheduled.len(), 1);
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let mut host = RecordingHost::new(320.0, 80.0);
        let mut viz = visualizer();
        assert!(!viz.stop(&mut host));
        assert_eq!(host.clears, 0);
        assert!(host.cancelled.is_empty());
    }

    #[test]
    fn frame_reschedules_before_painting() {
        let mut host = RecordingHost::new(320.0, 80.0);
        let mut viz = visualizer();
        viz.start(&mut host);
        let first = host.scheduled[0];

        assert!(viz.on_frame(first, &mut host, &[128; 128]));
        assert_eq!(host.paints.len(), 1);
        assert_eq!(host.paints[0].bars, 128);
        assert!(!viz.owns(first));
        assert!(viz.is_running());

        // the old handle is spent
        assert!(!viz.on_frame(first, &mut host, &[128; 128]));
        assert_eq!(host.paints.len(), 1);
    }

    #[test]
    fn stop_cancels_pending_frame_and_clears() {
        let mut host = RecordingHost::new(320.0, 80.0);
        let mut viz = visualizer();
        viz.start(&mut host);
        let handle = host.scheduled[0];
        assert!(viz.stop(&mut host));
        assert_eq!(host.cancelled, vec![handle]);
        assert_eq!(host.clears, 1);
        assert!(host.placeholder_visible);
        assert!(!viz.on_frame(handle, &mut host, &[1, 2, 3]));
    }
}
