//! In-memory trajectory store, used for tests and synthetic demos.

use std::ops::Range;

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ta_core::{Extent, FrameRange, ObjectId, SampledTrajectory, TimelineConfig, TrajectoryStore};

use super::{resample_track, TrackPoint};

/// Trajectory store backed by tracks held in memory.
///
/// Objects are ordered by id, so row assignment is deterministic across
/// queries. Populate with [`insert_track`](Self::insert_track) before
/// sharing the store; queries resample on the fly.
pub struct MemoryTrajectoryStore {
    name: String,
    tracks: Vec<(ObjectId, Vec<TrackPoint>)>,
}

impl MemoryTrajectoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), tracks: Vec::new() }
    }

    /// Insert or replace the track for `id`. Points are sorted by timestamp.
    pub fn insert_track(&mut self, id: impl Into<ObjectId>, mut points: Vec<TrackPoint>) {
        let id = id.into();
        points.sort_by_key(|(ts, _, _)| *ts);
        match self.tracks.binary_search_by(|(existing, _)| existing.cmp(&id)) {
            Ok(i) => self.tracks[i].1 = points,
            Err(i) => self.tracks.insert(i, (id, points)),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[async_trait]
impl TrajectoryStore for MemoryTrajectoryStore {
    async fn object_ids(&self) -> anyhow::Result<Vec<ObjectId>> {
        Ok(self.tracks.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn time_bounds(&self) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
        let mut bounds: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        for (_, points) in &self.tracks {
            let (Some(first), Some(last)) = (points.first(), points.last()) else {
                continue;
            };
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(first.0), hi.max(last.0)),
                None => (first.0, last.0),
            });
        }
        match bounds {
            Some(bounds) => Ok(bounds),
            None => bail!("store '{}' has no observations", self.name),
        }
    }

    async fn query_span(
        &self,
        objects: Range<usize>,
        window: FrameRange,
        extent: Option<Extent>,
        timeline: &TimelineConfig,
    ) -> anyhow::Result<Vec<SampledTrajectory>> {
        if objects.end > self.tracks.len() {
            bail!(
                "object range {:?} out of bounds for {} tracks",
                objects,
                self.tracks.len()
            );
        }

        let mut out = Vec::new();
        for (row, (_, points)) in self.tracks[objects].iter().enumerate() {
            if let Some((start_offset, samples)) = resample_track(points, window, extent, timeline)
            {
                out.push(SampledTrajectory { row, start_offset, points: samples });
            }
        }
        Ok(out)
    }

    fn store_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ta_core::Granularity;

    fn session_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
    }

    fn populated() -> MemoryTrajectoryStore {
        let mut store = MemoryTrajectoryStore::new("mem");
        // Inserted out of id order on purpose
        for row in [2usize, 0, 1] {
            let track: Vec<TrackPoint> = (0..30)
                .map(|s| (session_start() + Duration::seconds(s), s as f64, row as f64))
                .collect();
            store.insert_track(format!("obj-{row}"), track);
        }
        store
    }

    #[tokio::test]
    async fn test_object_ids_sorted() {
        let store = populated();
        let ids = store.object_ids().await.unwrap();
        assert_eq!(ids, vec!["obj-0", "obj-1", "obj-2"]);
    }

    #[tokio::test]
    async fn test_time_bounds_span_all_tracks() {
        let mut store = populated();
        store.insert_track(
            "obj-late",
            vec![(session_start() + Duration::seconds(100), 0.0, 0.0)],
        );
        let (lo, hi) = store.time_bounds().await.unwrap();
        assert_eq!(lo, session_start());
        assert_eq!(hi, session_start() + Duration::seconds(100));
    }

    #[tokio::test]
    async fn test_empty_store_has_no_bounds() {
        let store = MemoryTrajectoryStore::new("empty");
        assert!(store.time_bounds().await.is_err());
    }

    #[tokio::test]
    async fn test_query_rows_relative_to_requested_range() {
        let store = populated();
        let timeline =
            TimelineConfig::new(session_start(), Granularity::seconds(1), 10, 30).unwrap();
        let trajectories = store
            .query_span(1..3, FrameRange::new(0, 9), None, &timeline)
            .await
            .unwrap();
        assert_eq!(trajectories.len(), 2);
        // Row 0 of the result is obj-1, whose y is 1
        assert_eq!(trajectories[0].row, 0);
        assert_eq!(trajectories[0].points[0].xy(), Some((0.0, 1.0)));
        assert_eq!(trajectories[1].row, 1);
    }

    #[tokio::test]
    async fn test_out_of_bounds_range_rejected() {
        let store = populated();
        let timeline =
            TimelineConfig::new(session_start(), Granularity::seconds(1), 10, 30).unwrap();
        assert!(store
            .query_span(0..5, FrameRange::new(0, 9), None, &timeline)
            .await
            .is_err());
    }
}
