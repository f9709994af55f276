//! SQLite trajectory store implementation.

use std::ops::Range;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use tracing::debug;

use ta_core::{Extent, FrameRange, ObjectId, SampledTrajectory, TimelineConfig, TrajectoryStore};

use super::{resample_track, TrackPoint};
use crate::DataError;

/// Required columns: object id, epoch-second timestamp, coordinates
const REQUIRED_COLUMNS: [&str; 4] = ["object_id", "ts", "x", "y"];

/// Trajectory store backed by a SQLite observations table.
///
/// The table holds one row per observation: `object_id TEXT`, `ts INTEGER`
/// (unix epoch seconds), `x REAL`, `y REAL`. Object ids and time bounds are
/// read once at construction; each query opens its own connection, so
/// concurrent fetch workers never contend on a shared handle.
#[derive(Debug)]
pub struct SqliteTrajectoryStore {
    path: PathBuf,
    table_name: String,
    object_ids: Vec<ObjectId>,
    bounds: (DateTime<Utc>, DateTime<Utc>),
}

impl SqliteTrajectoryStore {
    pub fn new<P: AsRef<Path>>(path: P, table_name: impl Into<String>) -> Result<Self, DataError> {
        let path = path.as_ref().to_path_buf();
        let table_name = table_name.into();

        let conn = Connection::open(&path)?;
        Self::validate_schema(&conn, &table_name)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT object_id FROM {} ORDER BY object_id",
            table_name
        ))?;
        let object_ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if object_ids.is_empty() {
            return Err(DataError::Schema(format!(
                "table '{}' has no observations",
                table_name
            )));
        }

        let (min_ts, max_ts): (i64, i64) = conn.query_row(
            &format!("SELECT MIN(ts), MAX(ts) FROM {}", table_name),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let bounds = (epoch_secs(min_ts), epoch_secs(max_ts));

        debug!(
            path = %path.display(),
            table = table_name,
            objects = object_ids.len(),
            "opened trajectory database"
        );
        Ok(Self { path, table_name, object_ids, bounds })
    }

    fn validate_schema(conn: &Connection, table_name: &str) -> Result<(), DataError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table_name))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(DataError::Schema(format!(
                "table '{}' does not exist or has no columns",
                table_name
            )));
        }
        for required in REQUIRED_COLUMNS {
            if !columns.iter().any(|c| c == required) {
                return Err(DataError::Schema(format!(
                    "table '{}' is missing column '{}'",
                    table_name, required
                )));
            }
        }
        Ok(())
    }

    /// Raw observations for a contiguous id range over
    /// `[span_start, span_end]`, grouped per object and ordered by time.
    ///
    /// Object indices map onto a contiguous slice of the sorted id list, so
    /// one range scan covers the whole partition. Besides the in-span rows,
    /// each object gets its nearest observation on either side of the span,
    /// however far away it lies; interpolation at the window edges then sees
    /// exactly the neighbors an unwindowed fetch would.
    fn query_tracks(
        &self,
        conn: &Connection,
        ids: &[ObjectId],
        span_start: i64,
        span_end: i64,
    ) -> Result<AHashMap<ObjectId, Vec<TrackPoint>>, DataError> {
        let (first_id, last_id) = (&ids[0], &ids[ids.len() - 1]);

        // Bare x/y columns next to MAX(ts)/MIN(ts) come from the extremal
        // row, which SQLite defines for single-aggregate queries
        let before = format!(
            "SELECT object_id, MAX(ts), x, y FROM {} \
             WHERE object_id BETWEEN ?1 AND ?2 AND ts < ?3 GROUP BY object_id",
            self.table_name
        );
        let within = format!(
            "SELECT object_id, ts, x, y FROM {} \
             WHERE object_id BETWEEN ?1 AND ?2 AND ts BETWEEN ?3 AND ?4 \
             ORDER BY object_id, ts",
            self.table_name
        );
        let after = format!(
            "SELECT object_id, MIN(ts), x, y FROM {} \
             WHERE object_id BETWEEN ?1 AND ?2 AND ts > ?3 GROUP BY object_id",
            self.table_name
        );

        // Appended in time order: before-span neighbor, in-span rows, then
        // the after-span neighbor
        let mut tracks = AHashMap::new();
        Self::collect_rows(conn, &before, &[first_id, last_id, &span_start], &mut tracks)?;
        Self::collect_rows(
            conn,
            &within,
            &[first_id, last_id, &span_start, &span_end],
            &mut tracks,
        )?;
        Self::collect_rows(conn, &after, &[first_id, last_id, &span_end], &mut tracks)?;
        Ok(tracks)
    }

    fn collect_rows(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
        tracks: &mut AHashMap<ObjectId, Vec<TrackPoint>>,
    ) -> Result<(), DataError> {
        let mut stmt = conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params)?;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let point = (
                epoch_secs(row.get::<_, i64>(1)?),
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            );
            tracks.entry(id).or_default().push(point);
        }
        Ok(())
    }
}

fn epoch_secs(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

#[async_trait]
impl TrajectoryStore for SqliteTrajectoryStore {
    async fn object_ids(&self) -> anyhow::Result<Vec<ObjectId>> {
        Ok(self.object_ids.clone())
    }

    async fn time_bounds(&self) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
        Ok(self.bounds)
    }

    async fn query_span(
        &self,
        objects: Range<usize>,
        window: FrameRange,
        extent: Option<Extent>,
        timeline: &TimelineConfig,
    ) -> anyhow::Result<Vec<SampledTrajectory>> {
        if objects.end > self.object_ids.len() {
            anyhow::bail!(
                "object range {:?} out of bounds for {} objects",
                objects,
                self.object_ids.len()
            );
        }
        if objects.is_empty() {
            return Ok(Vec::new());
        }

        // The span covers the window's grid instants; query_tracks adds the
        // nearest out-of-span observation on each side
        let span_start = timeline.frame_to_timestamp(window.start).timestamp();
        let span_end = timeline.frame_to_timestamp(window.end).timestamp();

        let conn = Connection::open(&self.path).map_err(DataError::Sqlite)?;
        let ids = &self.object_ids[objects];
        let tracks = self.query_tracks(&conn, ids, span_start, span_end)?;

        let mut out = Vec::new();
        for (row, id) in ids.iter().enumerate() {
            let Some(points) = tracks.get(id) else {
                continue;
            };
            if let Some((start_offset, samples)) = resample_track(points, window, extent, timeline)
            {
                out.push(SampledTrajectory { row, start_offset, points: samples });
            }
        }
        Ok(out)
    }

    fn store_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("trajectories.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ta_core::{Granularity, PointGeom};

    fn session_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
    }

    /// Database with `n` objects moving east at 1 unit/s, observed every
    /// 2 seconds for 60 seconds
    fn sample_db(dir: &Path, n: usize) -> PathBuf {
        let path = dir.join("trajectories.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "CREATE TABLE observations (
                object_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL
            )",
            [],
        )
        .unwrap();
        let mut insert = conn
            .prepare("INSERT INTO observations (object_id, ts, x, y) VALUES (?1, ?2, ?3, ?4)")
            .unwrap();
        for row in 0..n {
            for s in (0..=60).step_by(2) {
                let ts = (session_start() + Duration::seconds(s)).timestamp();
                insert
                    .execute(rusqlite::params![
                        format!("vehicle-{row:02}"),
                        ts,
                        s as f64,
                        row as f64
                    ])
                    .unwrap();
            }
        }
        path
    }

    fn timeline() -> TimelineConfig {
        TimelineConfig::new(session_start(), Granularity::seconds(1), 10, 60).unwrap()
    }

    #[tokio::test]
    async fn test_opens_and_lists_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_db(dir.path(), 3);
        let store = SqliteTrajectoryStore::new(&path, "observations").unwrap();

        let ids = store.object_ids().await.unwrap();
        assert_eq!(ids, vec!["vehicle-00", "vehicle-01", "vehicle-02"]);
        let (lo, hi) = store.time_bounds().await.unwrap();
        assert_eq!(lo, session_start());
        assert_eq!(hi, session_start() + Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_missing_table_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_db(dir.path(), 1);
        let err = SqliteTrajectoryStore::new(&path, "no_such_table").unwrap_err();
        assert!(matches!(err, DataError::Schema(_)));
    }

    #[tokio::test]
    async fn test_missing_column_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute("CREATE TABLE observations (object_id TEXT, ts INTEGER)", [])
            .unwrap();
        let err = SqliteTrajectoryStore::new(&path, "observations").unwrap_err();
        assert!(matches!(err, DataError::Schema(_)));
    }

    #[tokio::test]
    async fn test_query_interpolates_between_observations() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_db(dir.path(), 2);
        let store = SqliteTrajectoryStore::new(&path, "observations").unwrap();

        // Observations every 2s, grid every 1s: odd frames interpolate
        let trajectories = store
            .query_span(0..2, FrameRange::new(10, 19), None, &timeline())
            .await
            .unwrap();
        assert_eq!(trajectories.len(), 2);
        for t in &trajectories {
            assert_eq!(t.start_offset, 10);
            assert_eq!(t.points.len(), 10);
            assert_eq!(t.points[0], PointGeom::point(10.0, t.row as f64));
            assert_eq!(t.points[1], PointGeom::point(11.0, t.row as f64));
        }
    }

    #[tokio::test]
    async fn test_windowed_and_unwindowed_fetch_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_db(dir.path(), 1);
        let store = SqliteTrajectoryStore::new(&path, "observations").unwrap();
        let timeline = timeline();

        let windowed = store
            .query_span(0..1, FrameRange::new(10, 19), None, &timeline)
            .await
            .unwrap();
        let unwindowed = store
            .query_span(0..1, FrameRange::new(0, 19), None, &timeline)
            .await
            .unwrap();

        // Session-aligned sampling: the shared frames are bit-identical
        for k in 0..10 {
            assert_eq!(windowed[0].points[k], unwindowed[0].points[10 + k]);
        }
    }

    #[tokio::test]
    async fn test_sparse_gap_across_window_edge_matches_unwindowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "CREATE TABLE observations (
                object_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL
            )",
            [],
        )
        .unwrap();
        // One object observed at 0s, 8s and 15s: the 8s..15s gap straddles
        // the edge between windows [0, 9] and [10, 19]
        for (s, x) in [(0, 0.0), (8, 8.0), (15, 15.0)] {
            conn.execute(
                "INSERT INTO observations (object_id, ts, x, y) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    "walker",
                    (session_start() + Duration::seconds(s)).timestamp(),
                    x,
                    0.0
                ],
            )
            .unwrap();
        }
        drop(conn);

        let store = SqliteTrajectoryStore::new(&path, "observations").unwrap();
        let timeline =
            TimelineConfig::new(session_start(), Granularity::seconds(1), 10, 20).unwrap();

        let unwindowed = store
            .query_span(0..1, FrameRange::new(0, 19), None, &timeline)
            .await
            .unwrap();
        let windowed = store
            .query_span(0..1, FrameRange::new(10, 19), None, &timeline)
            .await
            .unwrap();

        // Frame 10 falls inside the gap; the windowed fetch must interpolate
        // across the edge exactly like the unwindowed one (x moves 1 unit/s)
        assert_eq!(windowed[0].start_offset, 10);
        assert_eq!(windowed[0].points[0], unwindowed[0].points[10]);
        assert_eq!(windowed[0].points[0], PointGeom::point(10.0, 0.0));

        // Trailing edge: frame 9 of [0, 9] interpolates toward the 15s
        // observation, not a clamp to the 8s one
        let leading = store
            .query_span(0..1, FrameRange::new(0, 9), None, &timeline)
            .await
            .unwrap();
        assert_eq!(leading[0].points[9], unwindowed[0].points[9]);
        assert_eq!(leading[0].points[9], PointGeom::point(9.0, 0.0));
    }

    #[tokio::test]
    async fn test_extent_excludes_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_db(dir.path(), 3);
        let store = SqliteTrajectoryStore::new(&path, "observations").unwrap();

        // y in [-0.5, 1.5] keeps rows 0 and 1, drops row 2
        let extent = Extent::new(-1.0, -0.5, 100.0, 1.5);
        let trajectories = store
            .query_span(0..3, FrameRange::new(0, 9), Some(extent), &timeline())
            .await
            .unwrap();
        let rows: Vec<usize> = trajectories.iter().map(|t| t.row).collect();
        assert_eq!(rows, vec![0, 1]);
    }
}
