//! Window-fetch seam between the playback engine and the fetch pipeline.
//!
//! Fetch completion is delivered as an immutable value over a channel back
//! onto the control thread; no fetch task ever mutates playback or buffer
//! state directly.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::window::{FrameRange, WindowMatrix};

/// One window-fetch attempt.
///
/// `generation` is stamped by the driver and bumped on every seek
/// resynchronization, so a stale fetch re-issued for the same range can
/// still be told apart from the fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub window: FrameRange,
    pub generation: u64,
}

/// Completion message for one fetch attempt. Delivered exactly once per
/// request: success with the merged matrix, or the first worker failure.
#[derive(Debug)]
pub struct FetchOutcome {
    pub window: FrameRange,
    pub generation: u64,
    /// Wall-clock duration of the whole fan-out, merge included
    pub elapsed: Duration,
    pub result: anyhow::Result<WindowMatrix>,
}

pub type CompletionSender = mpsc::UnboundedSender<FetchOutcome>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<FetchOutcome>;

/// Channel carrying fetch completions back to the control thread
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}

/// Dispatches window fetches out-of-band. `request` returns immediately;
/// the outcome arrives later on the completion channel the implementation
/// was constructed with.
pub trait WindowFetcher: Send + Sync {
    fn request(&self, request: FetchRequest);
}
