//! Playback rate governor.
//!
//! Admission control for the play cursor: the frame rate for the next
//! window is capped so that, on average, a window's worth of frames plays
//! out no faster than the previous window took to fetch, and playback is
//! paused outright when a boundary arrives before its window.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::axis::TemporalAxis;

pub struct RateGovernor {
    axis: Arc<dyn TemporalAxis>,
    window_size: usize,
    /// Hardware/UI ceiling, never exceeded whatever the fetch latency says
    fps_cap: f64,
    /// Observed sustainable rates, one per completed fetch
    rate_history: Vec<f64>,
}

impl RateGovernor {
    pub fn new(axis: Arc<dyn TemporalAxis>, window_size: usize, fps_cap: f64) -> Self {
        Self {
            axis,
            window_size,
            fps_cap,
            rate_history: Vec::new(),
        }
    }

    /// Record a completed window fetch and apply the resulting rate to the
    /// temporal axis. Returns the applied frames-per-second.
    pub fn record_fetch(&mut self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let sustainable = self.window_size as f64 / secs;
        let fps = sustainable.min(self.fps_cap);
        self.rate_history.push(sustainable);
        info!(
            fetch_secs = secs,
            sustainable_fps = sustainable,
            applied_fps = fps,
            fps_cap = self.fps_cap,
            "window fetch timed"
        );
        self.axis.set_frame_rate(fps);
        fps
    }

    /// Pause the clock because a boundary was reached before its window.
    /// Not an error: flow control, resumed by the fetch completion.
    pub fn pause(&self) {
        debug!("pausing playback until the pending window arrives");
        self.axis.pause();
    }

    /// Resume after the awaited fetch completed
    pub fn resume(&self) {
        debug!("pending window arrived, resuming playback");
        self.axis.resume();
    }

    pub fn fps_cap(&self) -> f64 {
        self.fps_cap
    }

    pub fn set_fps_cap(&mut self, fps_cap: f64) {
        self.fps_cap = fps_cap;
    }

    pub fn rate_history(&self) -> &[f64] {
        &self.rate_history
    }
}
