//! Animation session lifecycle: wires a trajectory store, the fetch
//! coordinator, and the playback driver into one running unit.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use ta_core::{
    completion_channel, Extent, FeatureSink, Granularity, ObjectId, PlaybackDriver, TemporalAxis,
    TimelineConfig, TrajectoryStore,
};

use crate::fetch::WindowFetchCoordinator;

/// Tunables for one animation session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub granularity: Granularity,
    pub window_size: usize,
    /// Upper bound on the frame rate the governor may set
    pub fps_cap: f64,
    /// Fetch parallelism; defaults to the machine's logical core count
    pub partitions: Option<usize>,
    /// Spatial filter applied to every query
    pub extent: Option<Extent>,
    pub start_frame: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::seconds(1),
            window_size: 60,
            fps_cap: 60.0,
            partitions: None,
            extent: None,
            start_frame: 0,
        }
    }
}

/// One running animation over one store.
///
/// Construction is fallible: an unreachable store or an empty object set is
/// a fatal session error, reported to the caller instead of half-starting.
/// Fetch failures after startup are not fatal; they surface through
/// [`PlaybackDriver::last_fetch_error`].
pub struct AnimationSession {
    driver: PlaybackDriver,
    timeline: TimelineConfig,
    object_ids: Vec<ObjectId>,
    store_name: String,
}

impl std::fmt::Debug for AnimationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationSession")
            .field("timeline", &self.timeline)
            .field("object_ids", &self.object_ids)
            .field("store_name", &self.store_name)
            .finish_non_exhaustive()
    }
}

impl AnimationSession {
    pub async fn start(
        config: SessionConfig,
        store: Arc<dyn TrajectoryStore>,
        axis: Arc<dyn TemporalAxis>,
        sink: Arc<dyn FeatureSink>,
        runtime: tokio::runtime::Handle,
    ) -> anyhow::Result<Self> {
        let store_name = store.store_name().to_owned();
        let object_ids = store
            .object_ids()
            .await
            .with_context(|| format!("store '{store_name}' is unavailable"))?;
        anyhow::ensure!(!object_ids.is_empty(), "store '{store_name}' has no objects");

        let (start, end) = store
            .time_bounds()
            .await
            .with_context(|| format!("store '{store_name}' has no time bounds"))?;
        let timeline =
            TimelineConfig::covering(start, end, config.granularity, config.window_size)?;
        anyhow::ensure!(
            config.start_frame <= timeline.last_frame(),
            "start frame {} beyond timeline of {} frames",
            config.start_frame,
            timeline.total_frames()
        );

        let partitions = config
            .partitions
            .unwrap_or_else(num_cpus::get)
            .clamp(1, object_ids.len());
        info!(
            store = store_name,
            objects = object_ids.len(),
            frames = timeline.total_frames(),
            windows = timeline.window_count(),
            partitions,
            "starting animation session"
        );

        let (tx, rx) = completion_channel();
        let coordinator = Arc::new(WindowFetchCoordinator::new(
            store,
            timeline,
            object_ids.len(),
            partitions,
            config.extent,
            tx,
            runtime,
        ));

        let mut driver = PlaybackDriver::new(
            timeline,
            coordinator,
            rx,
            axis,
            sink,
            config.fps_cap,
            config.start_frame,
        );
        driver.start();

        Ok(Self { driver, timeline, object_ids, store_name })
    }

    pub fn driver(&self) -> &PlaybackDriver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut PlaybackDriver {
        &mut self.driver
    }

    /// Apply any landed fetch completions. The session loop calls this
    /// between axis ticks; while the axis is paused it is the only way a
    /// completion can resume playback.
    pub fn pump(&mut self) {
        self.driver.drain_completions();
    }

    pub fn timeline(&self) -> &TimelineConfig {
        &self.timeline
    }

    pub fn object_ids(&self) -> &[ObjectId] {
        &self.object_ids
    }

    /// Tear the session down, releasing all buffered windows.
    pub fn stop(mut self) {
        self.driver.release_buffers();
        info!(store = self.store_name, "animation session stopped");
    }
}
