//! Frame timing for the draw loop and the stats overlay.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of frame samples kept for the rolling average.
const SAMPLE_WINDOW: usize = 64;

/// Measures how long each frame takes.
///
/// `frame_start` and `frame_stop` bracket one draw. The timer keeps the
/// last [`SAMPLE_WINDOW`] frame durations to report a smoothed average.
#[derive(Debug)]
pub struct FrameTimer {
    created: Instant,
    frame_begin: Option<Instant>,
    last_frame_begin: Option<Instant>,
    samples: VecDeque<Duration>,
}

impl FrameTimer {
    /// Create a new timer with no recorded frames.
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            frame_begin: None,
            last_frame_begin: None,
            samples: VecDeque::with_capacity(SAMPLE_WINDOW),
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    /// Mark the beginning of a frame.
    pub fn frame_start(&mut self) {
        let now = Instant::now();
        self.last_frame_begin = self.frame_begin.replace(now);
    }

    /// Mark the end of a frame and record its duration.
    ///
    /// Does nothing when no frame was started.
    pub fn frame_stop(&mut self) {
        let Some(begin) = self.frame_begin else {
            return;
        };
        self.push_sample(begin.elapsed());
    }

    /// Seconds between the two most recent `frame_start` calls.
    ///
    /// Returns 0 until two frames have been started.
    pub fn since_last_frame(&self) -> f64 {
        match (self.last_frame_begin, self.frame_begin) {
            (Some(previous), Some(current)) => (current - previous).as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Mean frame duration in seconds over the sample window.
    pub fn average_frame_time(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: Duration = self.samples.iter().sum();
        total.as_secs_f64() / self.samples.len() as f64
    }

    /// Frames per second derived from [`average_frame_time`](Self::average_frame_time).
    pub fn average_fps(&self) -> f64 {
        let frame_time = self.average_frame_time();
        if frame_time > 0.0 { 1.0 / frame_time } else { 0.0 }
    }

    /// Number of frames currently contributing to the average.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn push_sample(&mut self, sample: Duration) {
        if self.samples.len() == SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_timer_reports_zero() {
        let timer = FrameTimer::new();
        assert_eq!(timer.average_frame_time(), 0.0);
        assert_eq!(timer.average_fps(), 0.0);
        assert_eq!(timer.since_last_frame(), 0.0);
    }

    #[test]
    fn test_stop_without_start_is_ignored() {
        let mut timer = FrameTimer::new();
        timer.frame_stop();
        assert_eq!(timer.sample_count(), 0);
    }

    #[test]
    fn test_average_uses_bounded_window() {
        let mut timer = FrameTimer::new();
        for _ in 0..SAMPLE_WINDOW {
            timer.push_sample(Duration::from_millis(10));
        }
        for _ in 0..SAMPLE_WINDOW {
            timer.push_sample(Duration::from_millis(20));
        }
        assert_eq!(timer.sample_count(), SAMPLE_WINDOW);
        assert!((timer.average_frame_time() - 0.020).abs() < 1e-9);
        assert!((timer.average_fps() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_start_stop_records_sample() {
        let mut timer = FrameTimer::new();
        timer.frame_start();
        timer.frame_stop();
        timer.frame_start();
        timer.frame_stop();
        assert_eq!(timer.sample_count(), 2);
        assert!(timer.since_last_frame() >= 0.0);
    }
}
