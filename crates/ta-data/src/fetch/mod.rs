//! Window fetch coordinator: fans a window fetch out across worker tasks
//! and delivers exactly one completion message per request.

mod worker;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use ta_core::{
    CompletionSender, Extent, FetchOutcome, FetchRequest, FrameRange, TimelineConfig,
    TrajectoryStore, WindowFetcher, WindowMatrix,
};

use crate::partition::partition_objects;
use crate::DataError;

/// Dispatches window fetches onto a tokio runtime.
///
/// Each request spawns one coordinating task, which spawns one worker task
/// per partition (the independently schedulable units of the chosen
/// executor — core pinning in the original is a tuning knob, not a
/// correctness requirement). The control thread is never blocked; the
/// outcome travels back over the completion channel.
pub struct WindowFetchCoordinator {
    store: Arc<dyn TrajectoryStore>,
    timeline: TimelineConfig,
    object_count: usize,
    partitions: usize,
    extent: Option<Extent>,
    completions: CompletionSender,
    runtime: tokio::runtime::Handle,
}

impl WindowFetchCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TrajectoryStore>,
        timeline: TimelineConfig,
        object_count: usize,
        partitions: usize,
        extent: Option<Extent>,
        completions: CompletionSender,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            store,
            timeline,
            object_count,
            partitions: partitions.max(1),
            extent,
            completions,
            runtime,
        }
    }
}

impl WindowFetcher for WindowFetchCoordinator {
    fn request(&self, request: FetchRequest) {
        let store = self.store.clone();
        let timeline = self.timeline;
        let object_count = self.object_count;
        let partitions = self.partitions;
        let extent = self.extent;
        let completions = self.completions.clone();

        self.runtime.spawn(async move {
            let started = Instant::now();
            let result =
                fetch_window(store, timeline, object_count, partitions, extent, request.window)
                    .await;
            let outcome = FetchOutcome {
                window: request.window,
                generation: request.generation,
                elapsed: started.elapsed(),
                result: result.map_err(Into::into),
            };
            if completions.send(outcome).is_err() {
                // Session already stopped; the result has nowhere to go
                warn!(window = %request.window, "completion channel closed, dropping fetch result");
            }
        });
    }
}

/// Partition, fan out, await all workers, merge in object order. Any
/// worker failure fails the whole window — no partial merge.
async fn fetch_window(
    store: Arc<dyn TrajectoryStore>,
    timeline: TimelineConfig,
    object_count: usize,
    partitions: usize,
    extent: Option<Extent>,
    window: FrameRange,
) -> Result<WindowMatrix, DataError> {
    let ranges = partition_objects(object_count, partitions);
    debug!(
        window = %window,
        partitions = ranges.len(),
        objects = object_count,
        "dispatching window fetch"
    );

    let handles: Vec<_> = ranges
        .into_iter()
        .map(|objects| {
            tokio::spawn(worker::fetch_partition(
                store.clone(),
                objects,
                window,
                extent,
                timeline,
            ))
        })
        .collect();

    let mut matrices = Vec::with_capacity(handles.len());
    for handle in handles {
        matrices.push(handle.await??);
    }
    WindowMatrix::from_partitions(window.len(), matrices).map_err(DataError::Merge)
}
