//! Fetch worker: one partition's share of a window fetch.

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use ta_core::{Extent, FrameRange, PartitionMatrix, TimelineConfig, TrajectoryStore};

use crate::DataError;

/// Query the store for one partition's trajectories over `window` and write
/// the resampled samples into a partition-local matrix.
///
/// The store returns session-aligned absolute frame offsets; they are
/// rebased against the window start here. Any misplaced trajectory fails
/// the whole partition — a partially-wrong matrix is worse than a rejected
/// window.
pub(crate) async fn fetch_partition(
    store: Arc<dyn TrajectoryStore>,
    objects: Range<usize>,
    window: FrameRange,
    extent: Option<Extent>,
    timeline: TimelineConfig,
) -> Result<PartitionMatrix, DataError> {
    let rows = objects.len();
    debug!(
        objects = ?objects,
        window = %window,
        store = store.store_name(),
        "worker fetching partition"
    );

    let trajectories = store
        .query_span(objects, window, extent, &timeline)
        .await
        .map_err(DataError::Store)?;

    let mut matrix = PartitionMatrix::empty(rows, window.len());
    for trajectory in trajectories {
        let rel_offset = trajectory.start_offset - window.start as i64;
        matrix
            .place(trajectory.row, rel_offset, &trajectory.points)
            .map_err(|e| {
                DataError::Decode(format!(
                    "object row {} in window {}: {}",
                    trajectory.row, window, e
                ))
            })?;
    }
    Ok(matrix)
}
