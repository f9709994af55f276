//! Three-slot window buffer: previous / current / next.
//!
//! Slots shift as playback crosses window boundaries; freshly fetched
//! matrices are installed against an expected frame range so a stale fetch
//! (issued before a direction reversal or seek) lands nowhere instead of in
//! the wrong slot.

use tracing::{debug, warn};

use crate::geom::PointGeom;
use crate::timeline::TimelineConfig;
use crate::window::{FrameRange, WindowMatrix};

/// The three buffered window positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSlot {
    Previous,
    Current,
    Next,
}

/// Result of an install attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(WindowSlot),
    /// No slot expects the matrix's range; the result was discarded
    Stale,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Slot {
    /// Range this slot is meant to cover, `None` past the timeline ends
    expected: Option<FrameRange>,
    /// Installed matrix; exclusively owned by the slot once present
    matrix: Option<WindowMatrix>,
}

impl Slot {
    fn expecting(range: Option<FrameRange>) -> Self {
        Self { expected: range, matrix: None }
    }

    fn covers(&self, frame: usize) -> bool {
        self.matrix.is_some()
            && self.expected.map(|r| r.contains(frame)).unwrap_or(false)
    }
}

/// Owns the three window buffers and nothing else. Mutated only from the
/// control thread.
pub struct BufferManager {
    timeline: TimelineConfig,
    previous: Slot,
    current: Slot,
    next: Slot,
}

impl BufferManager {
    /// Manager with all slots empty, positioned on the window at
    /// `window_key`.
    pub fn new(timeline: TimelineConfig, window_key: usize) -> Self {
        let mut manager = Self {
            timeline,
            previous: Slot::default(),
            current: Slot::default(),
            next: Slot::default(),
        };
        manager.reset(window_key);
        manager
    }

    /// Drop all matrices and re-derive the slot expectations around
    /// `window_key`. Used at session start and on seek resynchronization.
    pub fn reset(&mut self, window_key: usize) {
        let size = self.timeline.window_size();
        self.previous = Slot::expecting(
            (window_key >= size).then(|| self.timeline.window_range(window_key - size)),
        );
        self.current = Slot::expecting(Some(self.timeline.window_range(window_key)));
        self.next = Slot::expecting(
            (window_key + size <= self.timeline.last_window_key())
                .then(|| self.timeline.window_range(window_key + size)),
        );
    }

    /// previous <- current, current <- next, next <- empty. Called exactly
    /// when playback crosses a window boundary moving forward.
    pub fn shift_forward(&mut self) {
        self.previous = std::mem::replace(&mut self.current, std::mem::take(&mut self.next));
        let size = self.timeline.window_size();
        self.next = Slot::expecting(self.current.expected.and_then(|cur| {
            let key = cur.start + size;
            (key <= self.timeline.last_window_key()).then(|| self.timeline.window_range(key))
        }));
    }

    /// next <- current, current <- previous, previous <- empty. Symmetric
    /// case moving backward.
    pub fn shift_backward(&mut self) {
        self.next = std::mem::replace(&mut self.current, std::mem::take(&mut self.previous));
        let size = self.timeline.window_size();
        self.previous = Slot::expecting(self.current.expected.and_then(|cur| {
            (cur.start >= size).then(|| self.timeline.window_range(cur.start - size))
        }));
    }

    /// Bind a freshly fetched matrix to whichever slot expects its range.
    ///
    /// A mismatch (or an already-filled slot) discards the matrix: either
    /// the fetch went stale across a reversal/seek, or a newer result beat
    /// it there. Both cases are logged inconsistencies, not errors.
    pub fn install(&mut self, matrix: WindowMatrix, range: FrameRange) -> InstallOutcome {
        if matrix.window_size() != self.timeline.window_size() {
            warn!(
                window = %range,
                matrix_frames = matrix.window_size(),
                "discarding matrix with mismatched window size"
            );
            return InstallOutcome::Stale;
        }
        for (slot, name) in [
            (&mut self.current, WindowSlot::Current),
            (&mut self.next, WindowSlot::Next),
            (&mut self.previous, WindowSlot::Previous),
        ] {
            if slot.expected == Some(range) {
                if slot.matrix.is_some() {
                    warn!(window = %range, slot = ?name, "slot already filled, discarding older fetch");
                    return InstallOutcome::Stale;
                }
                slot.matrix = Some(matrix);
                debug!(window = %range, slot = ?name, "window installed");
                return InstallOutcome::Installed(name);
            }
        }
        warn!(window = %range, "no slot expects this range, discarding stale fetch");
        InstallOutcome::Stale
    }

    /// Geometry for every object at `frame`, read from whichever slot
    /// covers it. `None` is the visible signal that prefetch fell behind.
    pub fn position_at(&self, frame: usize) -> Option<Vec<PointGeom>> {
        [&self.current, &self.next, &self.previous]
            .into_iter()
            .find_map(|slot| {
                let rel = slot.expected?.rel_index(frame)?;
                slot.matrix.as_ref().map(|m| m.frame_column(rel))
            })
    }

    pub fn covers(&self, frame: usize) -> bool {
        [&self.current, &self.next, &self.previous]
            .iter()
            .any(|slot| slot.covers(frame))
    }

    pub fn has_matrix(&self, slot: WindowSlot) -> bool {
        self.slot(slot).matrix.is_some()
    }

    pub fn slot_range(&self, slot: WindowSlot) -> Option<FrameRange> {
        self.slot(slot).expected
    }

    /// Release every buffered matrix, keeping slot expectations
    pub fn clear(&mut self) {
        self.previous.matrix = None;
        self.current.matrix = None;
        self.next.matrix = None;
    }

    fn slot(&self, slot: WindowSlot) -> &Slot {
        match slot {
            WindowSlot::Previous => &self.previous,
            WindowSlot::Current => &self.current,
            WindowSlot::Next => &self.next,
        }
    }
}
