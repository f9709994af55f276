//! Temporal-axis collaborator seam.

/// The external widget that owns the playback clock: it emits frame-advance
/// ticks and exposes rate and pause controls. The engine drives it, never
/// the rendering state behind it.
pub trait TemporalAxis: Send + Sync {
    /// Halt the clock; ticks stop arriving until [`Self::resume`]
    fn pause(&self);

    /// Resume the clock in its current direction without replaying frames
    fn resume(&self);

    /// Cap the tick rate in frames per second
    fn set_frame_rate(&self, fps: f64);

    /// Frame the clock currently points at
    fn current_frame(&self) -> usize;
}
