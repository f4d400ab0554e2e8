//! Progress tracking and cooperative cancellation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default number of latency samples kept for the ETA.
pub const DEFAULT_ETA_WINDOW: usize = 30;

/// ETA from the mean latency of the most recent units.
#[derive(Debug, Clone)]
pub struct RollingEta {
    window: usize,
    samples: VecDeque<f64>,
    sum: f64,
    total_secs: f64,
    completed: u64,
}

impl Default for RollingEta {
    fn default() -> Self {
        Self::new(DEFAULT_ETA_WINDOW)
    }
}

impl RollingEta {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            sum: 0.0,
            total_secs: 0.0,
            completed: 0,
        }
    }

    /// Record the latency of one completed unit.
    pub fn record(&mut self, latency: Duration) {
        let secs = latency.as_secs_f64();
        if self.samples.len() == self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old;
            }
        }
        self.samples.push_back(secs);
        self.sum += secs;
        self.total_secs += secs;
        self.completed += 1;
    }

    /// Units recorded so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Mean latency over the window, in seconds.
    pub fn window_average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            (self.sum / self.samples.len() as f64).max(0.0)
        }
    }

    /// Mean latency over every recorded unit, in seconds.
    pub fn overall_average(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_secs / self.completed as f64
        }
    }

    /// Seconds left for `total` units given how many are done.
    pub fn eta_secs(&self, total: u64) -> f64 {
        total.saturating_sub(self.completed) as f64 * self.window_average()
    }
}

/// Shared flag checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the run stop at the next frame boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
