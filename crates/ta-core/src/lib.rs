//! Core playback engine for animating moving-object trajectories.
//!
//! This crate owns the windowed prefetch machinery: the timeline index, the
//! three-slot window buffer, the tick-driven playback driver, and the rate
//! governor that keeps the play cursor from outrunning its data. Everything
//! that talks to the outside world (the spatiotemporal store, the temporal
//! axis widget, the rendering feature store, the fetch pipeline) sits
//! behind a trait seam defined here.

pub mod axis;
pub mod buffer;
pub mod features;
pub mod fetch;
pub mod geom;
pub mod governor;
pub mod playback;
pub mod store;
pub mod timeline;
pub mod window;

// Re-export commonly used types
pub use axis::TemporalAxis;
pub use buffer::{BufferManager, InstallOutcome, WindowSlot};
pub use features::FeatureSink;
pub use fetch::{
    completion_channel, CompletionReceiver, CompletionSender, FetchOutcome, FetchRequest,
    WindowFetcher,
};
pub use geom::{Extent, PointGeom};
pub use governor::RateGovernor;
pub use playback::{Direction, DriverPhase, PlaybackDriver, PlaybackState};
pub use store::{ObjectId, SampledTrajectory, TrajectoryStore};
pub use timeline::{Granularity, TimeUnit, TimelineConfig};
pub use window::{FrameRange, PartitionMatrix, WindowMatrix};
