//! Trajectory store implementations.

pub mod memory_source;
pub mod sqlite_source;

pub use memory_source::MemoryTrajectoryStore;
pub use sqlite_source::SqliteTrajectoryStore;

use chrono::{DateTime, Utc};

use ta_core::{Extent, FrameRange, PointGeom, TimelineConfig};

/// One raw observation: timestamp plus coordinates
pub(crate) type TrackPoint = (DateTime<Utc>, f64, f64);

/// Resample one observed track onto the session-aligned frame grid,
/// restricted to `window`'s time span.
///
/// Sample instants are `session_start + k x granularity` regardless of the
/// window, so adjacent windows agree bit-for-bit at their shared edge.
/// Positions between observations are linearly interpolated (the original
/// store-side `tsample` on linearly-interpolated trajectories). Returns the
/// absolute frame of the first sample plus one sample per grid instant the
/// observed span covers, or `None` when the track is absent from the span.
pub(crate) fn resample_track(
    points: &[TrackPoint],
    window: FrameRange,
    extent: Option<Extent>,
    timeline: &TimelineConfig,
) -> Option<(i64, Vec<PointGeom>)> {
    let filtered: Vec<TrackPoint> = match extent {
        Some(extent) => points
            .iter()
            .filter(|(_, x, y)| extent.contains(*x, *y))
            .copied()
            .collect(),
        None => points.to_vec(),
    };
    let (first_obs, last_obs) = match (filtered.first(), filtered.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => return None,
    };

    let span_start = first_obs.max(timeline.frame_to_timestamp(window.start));
    let span_end = last_obs.min(timeline.frame_to_timestamp(window.end));
    if span_start > span_end {
        return None;
    }

    let first_frame = timeline
        .frame_at_or_after(span_start)
        .max(window.start as i64);
    let last_frame = timeline
        .timestamp_to_frame(span_end)
        .min(window.end as i64);
    if first_frame > last_frame {
        return None;
    }

    let samples = (first_frame..=last_frame)
        .map(|frame| interpolate_at(&filtered, timeline.frame_to_timestamp(frame as usize)))
        .collect();
    Some((first_frame, samples))
}

/// Position at `ts`, linearly interpolated between the surrounding
/// observations. `ts` must lie within the observed span.
fn interpolate_at(points: &[TrackPoint], ts: DateTime<Utc>) -> PointGeom {
    let after = points.partition_point(|(t, _, _)| *t < ts);
    if after == 0 {
        let (_, x, y) = points[0];
        return PointGeom::point(x, y);
    }
    if after == points.len() {
        let (_, x, y) = points[points.len() - 1];
        return PointGeom::point(x, y);
    }
    let (t0, x0, y0) = points[after - 1];
    let (t1, x1, y1) = points[after];
    if t1 == t0 {
        return PointGeom::point(x1, y1);
    }
    let fraction = (ts - t0).num_milliseconds() as f64 / (t1 - t0).num_milliseconds() as f64;
    PointGeom::point(x0 + (x1 - x0) * fraction, y0 + (y1 - y0) * fraction)
}
