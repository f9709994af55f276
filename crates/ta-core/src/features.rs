//! Rendering-side collaborator seam.

use crate::geom::PointGeom;

/// The feature store behind the rendering surface. The engine pushes one
/// geometry per object once per tick; applying them to the feature model
/// (and committing) is entirely the collaborator's business. The engine
/// holds no reference into that model.
pub trait FeatureSink: Send + Sync {
    /// Positions are indexed by session object index; `Empty` cells mean
    /// "not observed at this frame".
    fn set_frame_positions(&self, frame: usize, positions: &[PointGeom]);
}
