//! Diagnostics drawn inside the presentation pass.

use tracing::info;

use pathview_rhi::command::CommandBuffer;

use crate::frame_loop::FrameStats;

/// Appends commands to the presentation pass before it ends.
pub trait Overlay {
    /// Called once per frame while the render pass is open.
    fn record(&mut self, cmd: &CommandBuffer, stats: &FrameStats);
}

/// Reports frame time and FPS through `tracing`.
///
/// Records no GPU commands. Output is throttled to one line per
/// `interval` seconds of accumulated frame time.
#[derive(Debug, Clone)]
pub struct StatsOverlay {
    interval: f64,
    accumulated: f64,
}

impl StatsOverlay {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            accumulated: 0.0,
        }
    }

    /// Feeds one frame of timing; returns the report line when due.
    pub fn observe(&mut self, stats: &FrameStats) -> Option<String> {
        self.accumulated += stats.since_last_frame;
        if self.accumulated < self.interval {
            return None;
        }
        self.accumulated = 0.0;

        Some(format!(
            "Frame Time: {:.3} ms | FPS: {:.1}",
            stats.average_frame_time * 1000.0,
            stats.fps()
        ))
    }
}

impl Default for StatsOverlay {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Overlay for StatsOverlay {
    fn record(&mut self, _cmd: &CommandBuffer, stats: &FrameStats) {
        if let Some(line) = self.observe(stats) {
            info!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(dt: f64) -> FrameStats {
        FrameStats {
            frame_index: 0,
            since_last_frame: dt,
            average_frame_time: dt,
        }
    }

    #[test]
    fn test_report_is_throttled() {
        let mut overlay = StatsOverlay::new(0.1);
        assert!(overlay.observe(&frame(0.04)).is_none());
        assert!(overlay.observe(&frame(0.04)).is_none());
        let line = overlay.observe(&frame(0.04)).expect("interval elapsed");
        assert!(line.starts_with("Frame Time: 40.000 ms"));
        assert!(line.ends_with("FPS: 25.0"));
        assert!(overlay.observe(&frame(0.04)).is_none());
    }

    #[test]
    fn test_zero_interval_reports_every_frame() {
        let mut overlay = StatsOverlay::new(0.0);
        assert!(overlay.observe(&frame(0.0)).is_some());
        assert!(overlay.observe(&frame(0.0)).is_some());
    }
}
