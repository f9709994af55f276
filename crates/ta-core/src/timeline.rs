//! Timeline index: maps discrete frame numbers to absolute timestamps.
//!
//! Everything here is an immutable value constructed once per session. The
//! granularity in particular is never mutated after construction; workers
//! and the playback driver all read the same copy.

use anyhow::{ensure, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};

use crate::window::FrameRange;

/// Base time unit of one granularity step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Second,
    Minute,
}

impl TimeUnit {
    pub fn seconds(&self) -> i64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
        }
    }
}

/// Sampling granularity: one frame corresponds to `steps` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Granularity {
    unit: TimeUnit,
    steps: u32,
}

impl Granularity {
    pub fn new(unit: TimeUnit, steps: u32) -> Result<Self> {
        ensure!(steps >= 1, "granularity requires at least one step");
        Ok(Self { unit, steps })
    }

    pub fn seconds(unit_steps: u32) -> Self {
        Self { unit: TimeUnit::Second, steps: unit_steps.max(1) }
    }

    pub fn minutes(unit_steps: u32) -> Self {
        Self { unit: TimeUnit::Minute, steps: unit_steps.max(1) }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Length of one frame step in whole seconds
    pub fn step_seconds(&self) -> i64 {
        self.unit.seconds() * self.steps as i64
    }
}

/// Immutable timeline configuration for one animation session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineConfig {
    start: DateTime<Utc>,
    granularity: Granularity,
    window_size: usize,
    total_frames: usize,
}

impl TimelineConfig {
    pub fn new(
        start: DateTime<Utc>,
        granularity: Granularity,
        window_size: usize,
        total_frames: usize,
    ) -> Result<Self> {
        ensure!(window_size >= 1, "window size must be at least one frame");
        ensure!(total_frames >= window_size, "timeline shorter than one window");
        ensure!(
            total_frames % window_size == 0,
            "total frame count {} is not a multiple of window size {}",
            total_frames,
            window_size
        );
        Ok(Self { start, granularity, window_size, total_frames })
    }

    /// Timeline covering `[start, end]`, rounded up to a whole number of
    /// windows so the last window is always full-sized.
    pub fn covering(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        window_size: usize,
    ) -> Result<Self> {
        ensure!(end >= start, "timeline end precedes start");
        let span_secs = (end - start).num_seconds();
        let mut total = (span_secs / granularity.step_seconds()) as usize + 1;
        let remainder = total % window_size;
        if remainder != 0 {
            total += window_size - remainder;
        }
        Self::new(start, granularity, window_size, total)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn window_count(&self) -> usize {
        self.total_frames / self.window_size
    }

    pub fn last_frame(&self) -> usize {
        self.total_frames - 1
    }

    /// `start + frame x granularity`. Callers clamp to `[0, total_frames)`.
    pub fn frame_to_timestamp(&self, frame: usize) -> DateTime<Utc> {
        self.start + Duration::seconds(self.granularity.step_seconds() * frame as i64)
    }

    /// Floor inverse of [`Self::frame_to_timestamp`]; negative for
    /// timestamps before the session start.
    pub fn timestamp_to_frame(&self, ts: DateTime<Utc>) -> i64 {
        let secs = (ts - self.start).num_seconds();
        secs.div_euclid(self.granularity.step_seconds())
    }

    /// First frame whose grid instant is at or after `ts`
    pub fn frame_at_or_after(&self, ts: DateTime<Utc>) -> i64 {
        let secs = (ts - self.start).num_seconds();
        let step = self.granularity.step_seconds();
        secs.div_euclid(step) + if secs.rem_euclid(step) == 0 { 0 } else { 1 }
    }

    /// Key (= first frame) of the window containing `frame`
    pub fn window_key_for(&self, frame: usize) -> usize {
        frame - frame % self.window_size
    }

    pub fn last_window_key(&self) -> usize {
        self.total_frames - self.window_size
    }

    pub fn window_range(&self, key: usize) -> FrameRange {
        debug_assert!(key % self.window_size == 0 && key < self.total_frames);
        FrameRange::window(key, self.window_size)
    }
}
