//! Window matrices: the decoded [object x frame] position table for one
//! buffered window of the animation.

use anyhow::{bail, Result};
use serde::{Serialize, Deserialize};

use crate::geom::PointGeom;

/// Inclusive range of absolute frame numbers covered by one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
}

impl FrameRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Window starting at `key`, `size` frames long
    pub fn window(key: usize, size: usize) -> Self {
        Self::new(key, key + size - 1)
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, frame: usize) -> bool {
        frame >= self.start && frame <= self.end
    }

    /// Index of `frame` relative to the window start
    pub fn rel_index(&self, frame: usize) -> Option<usize> {
        self.contains(frame).then(|| frame - self.start)
    }
}

impl std::fmt::Display for FrameRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Dense position matrix for one window, indexed
/// [object index][relative frame index].
///
/// Produced once per window fetch and never mutated afterwards; ownership
/// passes to whichever buffer slot it gets installed into.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMatrix {
    object_count: usize,
    window_size: usize,
    cells: Vec<PointGeom>,
}

impl WindowMatrix {
    /// Matrix with every cell set to the empty sentinel
    pub fn empty(object_count: usize, window_size: usize) -> Self {
        Self {
            object_count,
            window_size,
            cells: vec![PointGeom::Empty; object_count * window_size],
        }
    }

    /// Concatenate partition matrices (in object order) into the full matrix.
    ///
    /// Fails when the partition shapes do not add up to the expected window
    /// size; a mismatched merge would silently misplace every later object.
    pub fn from_partitions(window_size: usize, parts: Vec<PartitionMatrix>) -> Result<Self> {
        let mut object_count = 0;
        let mut cells = Vec::new();
        for (i, part) in parts.into_iter().enumerate() {
            if part.window_size != window_size {
                bail!(
                    "partition {} spans {} frames, window expects {}",
                    i, part.window_size, window_size
                );
            }
            object_count += part.rows;
            cells.extend(part.cells);
        }
        Ok(Self { object_count, window_size, cells })
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn at(&self, object: usize, rel_frame: usize) -> PointGeom {
        debug_assert!(object < self.object_count && rel_frame < self.window_size);
        self.cells[object * self.window_size + rel_frame]
    }

    /// One geometry per object at the given relative frame
    pub fn frame_column(&self, rel_frame: usize) -> Vec<PointGeom> {
        (0..self.object_count)
            .map(|obj| self.at(obj, rel_frame))
            .collect()
    }
}

/// Partition-local matrix a fetch worker fills before the merge.
///
/// Each worker owns exactly one of these, so partition-disjoint writes need
/// no locking.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionMatrix {
    rows: usize,
    window_size: usize,
    cells: Vec<PointGeom>,
}

impl PartitionMatrix {
    pub fn empty(rows: usize, window_size: usize) -> Self {
        Self {
            rows,
            window_size,
            cells: vec![PointGeom::Empty; rows * window_size],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Write one resampled trajectory at its frame offset within the window.
    ///
    /// `rel_offset` is the trajectory's first sample frame rebased against
    /// the window start. Out-of-grid writes are rejected rather than
    /// clamped: a misplaced trajectory means the resampling upstream went
    /// wrong, and a partially-wrong matrix is worse than a rejected window.
    pub fn place(&mut self, row: usize, rel_offset: i64, samples: &[PointGeom]) -> Result<()> {
        if row >= self.rows {
            bail!("row {} outside partition of {} objects", row, self.rows);
        }
        if rel_offset < 0 {
            bail!("sample offset {} before window start", rel_offset);
        }
        let start = rel_offset as usize;
        if start + samples.len() > self.window_size {
            bail!(
                "samples [{}, {}) overrun window of {} frames",
                start,
                start + samples.len(),
                self.window_size
            );
        }
        let base = row * self.window_size + start;
        self.cells[base..base + samples.len()].copy_from_slice(samples);
        Ok(())
    }
}
