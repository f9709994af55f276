//! Trajectory store seam.
//!
//! The engine never talks to a database driver directly; it consumes this
//! trait and receives already-resampled trajectories. Store handles are
//! constructed once per session and passed explicitly to every fetch (no
//! process-wide connector).

use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::geom::{Extent, PointGeom};
use crate::timeline::TimelineConfig;
use crate::window::FrameRange;

/// Opaque stable identifier for a moving object. The ordered id sequence is
/// fixed for the whole session.
pub type ObjectId = String;

/// One object's trajectory resampled onto the session-aligned frame grid,
/// restricted to a window's span.
///
/// `start_offset` is an absolute frame index,
/// `floor((observed_start - session_start) / granularity_seconds)`; the
/// observed span may cover only part of the window. `points` holds one
/// sample per frame from that offset on.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTrajectory {
    /// Index of the object within the queried range (not the session-wide
    /// object index)
    pub row: usize,
    /// Absolute frame of the first sample
    pub start_offset: i64,
    pub points: Vec<PointGeom>,
}

/// Spatiotemporal store serving resampled trajectories.
///
/// Sample instants are aligned to the *session* start, never the window
/// start, so two adjacent windows agree bit-for-bit at their shared edge.
#[async_trait::async_trait]
pub trait TrajectoryStore: Send + Sync {
    /// Ordered, session-stable object id sequence
    async fn object_ids(&self) -> anyhow::Result<Vec<ObjectId>>;

    /// Earliest and latest observation timestamps across all objects
    async fn time_bounds(&self) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)>;

    /// Resample the trajectories of `objects` (indices into the session id
    /// ordering) over `window`'s time span, optionally restricted to a
    /// spatial extent. Objects absent from the span are simply missing from
    /// the result. Query or decode failures surface as one error per call.
    async fn query_span(
        &self,
        objects: Range<usize>,
        window: FrameRange,
        extent: Option<Extent>,
        timeline: &TimelineConfig,
    ) -> anyhow::Result<Vec<SampledTrajectory>>;

    /// Store name for diagnostics
    fn store_name(&self) -> &str;
}
