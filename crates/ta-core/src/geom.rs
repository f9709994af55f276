//! Point geometry value types

use serde::{Serialize, Deserialize};

/// A point geometry sampled from a trajectory at one frame.
///
/// `Empty` is the sentinel for "object not observed at this frame" and is
/// what every matrix cell starts out as. Absent spans stay `Empty`; objects
/// are never dropped from a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointGeom {
    /// Object not observed at this frame
    Empty,
    /// Observed position
    Point { x: f64, y: f64 },
}

impl PointGeom {
    pub fn point(x: f64, y: f64) -> Self {
        Self::Point { x, y }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Coordinates, if observed
    pub fn xy(&self) -> Option<(f64, f64)> {
        match self {
            Self::Empty => None,
            Self::Point { x, y } => Some((*x, *y)),
        }
    }

    /// Well-known-text rendering for feature sinks that speak WKT
    pub fn to_wkt(&self) -> String {
        match self {
            Self::Empty => "POINT EMPTY".to_string(),
            Self::Point { x, y } => format!("POINT({} {})", x, y),
        }
    }
}

impl Default for PointGeom {
    fn default() -> Self {
        Self::Empty
    }
}

/// Rectangular spatial extent used to restrict fetches to the viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Extent {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wkt_rendering() {
        assert_eq!(PointGeom::point(1.5, -2.0).to_wkt(), "POINT(1.5 -2)");
        assert_eq!(PointGeom::Empty.to_wkt(), "POINT EMPTY");
    }

    #[test]
    fn test_extent_contains() {
        let extent = Extent::new(0.0, 0.0, 10.0, 5.0);
        assert!(extent.contains(10.0, 5.0));
        assert!(extent.contains(0.0, 0.0));
        assert!(!extent.contains(10.1, 2.0));
        assert!(!extent.contains(5.0, -0.1));
    }
}
