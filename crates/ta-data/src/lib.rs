//! Fetch pipeline and trajectory stores for the playback engine.
//!
//! This crate turns `ta-core`'s fetch seam into a working pipeline: the
//! query partitioner, the per-partition fetch workers, the window fetch
//! coordinator, the store implementations behind the
//! [`ta_core::TrajectoryStore`] trait, and the session lifecycle that wires
//! it all together.

pub mod fetch;
pub mod partition;
pub mod session;
pub mod sources;

use thiserror::Error;
use tokio::task::JoinError;

// Re-exports
pub use fetch::WindowFetchCoordinator;
pub use partition::partition_objects;
pub use session::{AnimationSession, SessionConfig};
pub use sources::{MemoryTrajectoryStore, SqliteTrajectoryStore};

/// Errors that can occur in the fetch pipeline and stores
#[derive(Error, Debug)]
pub enum DataError {
    #[error("store query error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("sample decode error: {0}")]
    Decode(String),

    #[error("window merge error: {0}")]
    Merge(#[source] anyhow::Error),

    #[error("worker join error: {0}")]
    Join(#[from] JoinError),

    #[error("invalid store schema: {0}")]
    Schema(String),
}
