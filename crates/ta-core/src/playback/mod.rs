//! Playback control: state, direction, and the tick-driven driver.

use serde::{Serialize, Deserialize};

mod driver;

pub use driver::PlaybackDriver;

/// Playback direction, derived from the sign of each frame delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// Mutable playback state. Written only by the driver on its control
/// thread; everyone else gets read-only snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    /// Frame the last processed tick landed on
    pub current_frame: usize,
    pub direction: Direction,
    /// Key of the window the driver considers current
    pub window_key: usize,
    /// Paused by admission control (starvation) or at a timeline end
    pub paused: bool,
}

/// Driver state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    /// Created but not started
    Idle,
    PlayingForward,
    PlayingBackward,
    /// Paused at a boundary (or after a seek) until the needed window lands
    AwaitingFetch,
}
