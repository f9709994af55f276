//! The tick-driven playback driver.
//!
//! Runs on a single control thread: the temporal axis calls `on_tick`, the
//! driver reads/mutates buffers and playback state, and every blocking
//! concern lives out-of-band behind the [`WindowFetcher`] seam. Fetch
//! completions come back as messages and are drained here, never applied
//! from a background task.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{Direction, DriverPhase, PlaybackState};
use crate::axis::TemporalAxis;
use crate::buffer::{BufferManager, InstallOutcome, WindowSlot};
use crate::features::FeatureSink;
use crate::fetch::{CompletionReceiver, FetchRequest, WindowFetcher};
use crate::governor::RateGovernor;
use crate::timeline::TimelineConfig;
use crate::window::FrameRange;

pub struct PlaybackDriver {
    timeline: TimelineConfig,
    buffers: BufferManager,
    governor: RateGovernor,
    fetcher: Arc<dyn WindowFetcher>,
    completions: CompletionReceiver,
    axis: Arc<dyn TemporalAxis>,
    sink: Arc<dyn FeatureSink>,
    state: PlaybackState,
    phase: DriverPhase,
    /// Bumped on every seek resynchronization; outcomes stamped with an
    /// older generation are discarded unseen
    generation: u64,
    /// The single fetch currently in flight, if any
    in_flight: Option<FetchRequest>,
    /// Window the driver is paused for
    awaiting: Option<FrameRange>,
    /// Last failed window in this generation; never auto-retried
    failed: Option<FrameRange>,
    last_error: Option<String>,
}

impl PlaybackDriver {
    pub fn new(
        timeline: TimelineConfig,
        fetcher: Arc<dyn WindowFetcher>,
        completions: CompletionReceiver,
        axis: Arc<dyn TemporalAxis>,
        sink: Arc<dyn FeatureSink>,
        fps_cap: f64,
        start_frame: usize,
    ) -> Self {
        let window_key = timeline.window_key_for(start_frame);
        let governor = RateGovernor::new(axis.clone(), timeline.window_size(), fps_cap);
        Self {
            buffers: BufferManager::new(timeline, window_key),
            governor,
            fetcher,
            completions,
            axis,
            sink,
            state: PlaybackState {
                current_frame: start_frame,
                direction: Direction::Forward,
                window_key,
                paused: false,
            },
            phase: DriverPhase::Idle,
            generation: 0,
            in_flight: None,
            awaiting: None,
            failed: None,
            last_error: None,
            timeline,
        }
    }

    /// Issue the fetch for the starting window and hold playback until it
    /// lands. The window after it is requested once the first one is in
    /// (the governor needs a measured fetch before rating the axis).
    pub fn start(&mut self) {
        info!(
            window_key = self.state.window_key,
            frame = self.state.current_frame,
            "starting playback session"
        );
        self.request_window(self.state.window_key);
        self.pause_awaiting(self.timeline.window_range(self.state.window_key));
    }

    /// Handle one frame-advance notification from the temporal axis.
    /// Non-reentrant: the axis must not tick again while this runs.
    pub fn on_tick(&mut self, frame: usize) {
        self.drain_completions();

        let previous_frame = self.state.current_frame;
        let delta = frame as i64 - previous_frame as i64;
        match delta {
            0 => {
                // Axis re-emitted the frame we already sit on
                self.render(frame);
                return;
            }
            1 => self.set_direction(Direction::Forward),
            -1 => self.set_direction(Direction::Backward),
            _ => {
                // Out-of-band user seek: unsupported transition, full resync
                self.state.current_frame = frame;
                self.resync(frame);
                self.render(frame);
                return;
            }
        }
        self.state.current_frame = frame;

        if frame % self.timeline.window_size() == 0 {
            self.cross_boundary(frame);
        }

        self.render(frame);
        self.pause_at_timeline_ends(frame);
    }

    /// Drain fetch completions onto the control thread. Called at every
    /// tick, and pumped by the session loop while the axis is paused (a
    /// paused axis emits no ticks, but the resume depends on a completion).
    pub fn drain_completions(&mut self) {
        while let Ok(outcome) = self.completions.try_recv() {
            if self
                .in_flight
                .map(|req| req.window == outcome.window && req.generation == outcome.generation)
                .unwrap_or(false)
            {
                self.in_flight = None;
            }
            if outcome.generation != self.generation {
                debug!(
                    window = %outcome.window,
                    generation = outcome.generation,
                    "discarding completion from a superseded generation"
                );
                continue;
            }
            match outcome.result {
                Ok(matrix) => {
                    if let InstallOutcome::Installed(slot) =
                        self.buffers.install(matrix, outcome.window)
                    {
                        self.governor.record_fetch(outcome.elapsed);
                        debug!(window = %outcome.window, slot = ?slot, "fetch completed");
                        if self.awaiting == Some(outcome.window) {
                            self.resume_playback();
                        }
                    }
                }
                Err(err) => {
                    error!(window = %outcome.window, error = %err, "window fetch failed");
                    self.failed = Some(outcome.window);
                    self.last_error = Some(format!("fetch for window {} failed: {err}", outcome.window));
                }
            }
        }
        self.maybe_prefetch();
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// Most recent fetch failure, for callers that surface errors to the
    /// user (failed windows are not retried automatically)
    pub fn last_fetch_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn timeline(&self) -> &TimelineConfig {
        &self.timeline
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    /// Release all buffered windows. The session calls this on teardown.
    pub fn release_buffers(&mut self) {
        self.buffers.clear();
    }

    fn set_direction(&mut self, direction: Direction) {
        if self.state.direction != direction {
            debug!(?direction, frame = self.state.current_frame, "playback direction changed");
        }
        self.state.direction = direction;
        if self.phase != DriverPhase::AwaitingFetch {
            self.phase = match direction {
                Direction::Forward => DriverPhase::PlayingForward,
                Direction::Backward => DriverPhase::PlayingBackward,
            };
        }
    }

    /// Boundary crossing: the tick landed on the first frame of a window.
    fn cross_boundary(&mut self, frame: usize) {
        let size = self.timeline.window_size();
        match self.state.direction {
            Direction::Forward => {
                if self.buffers.slot_range(WindowSlot::Next).map(|r| r.start) == Some(frame) {
                    self.buffers.shift_forward();
                    self.state.window_key = frame;
                    let beyond = frame + size;
                    if beyond <= self.timeline.last_window_key() {
                        self.request_window(beyond);
                    }
                    if !self.buffers.has_matrix(WindowSlot::Current) {
                        // Starvation: the prefetch has not landed yet
                        self.pause_awaiting(self.timeline.window_range(frame));
                    }
                } else if self.state.window_key != frame {
                    // Buffers out of position (reversal played a whole
                    // window out of the next slot); cheaper to re-derive
                    // than to special-case
                    debug!(frame, "buffers out of position at forward crossing");
                    self.resync(frame);
                }
            }
            Direction::Backward => {
                if frame == 0 {
                    return;
                }
                if self.state.window_key == frame {
                    // Leaving the current window downward; the landed frame
                    // stays readable from the next slot after the shift
                    let new_key = frame - size;
                    self.buffers.shift_backward();
                    self.state.window_key = new_key;
                    if new_key >= size {
                        self.request_window(new_key - size);
                    }
                    if !self.buffers.has_matrix(WindowSlot::Current) {
                        self.pause_awaiting(self.timeline.window_range(new_key));
                    }
                } else if self.state.window_key != frame - size {
                    debug!(frame, "buffers out of position at backward crossing");
                    self.resync(frame);
                }
            }
        }
    }

    /// Full resynchronization after an out-of-band seek: new window key,
    /// outstanding fetches invalidated by generation, fresh fetch for the
    /// current window.
    fn resync(&mut self, frame: usize) {
        self.generation += 1;
        self.in_flight = None;
        self.failed = None;
        let key = self.timeline.window_key_for(frame);
        self.state.window_key = key;
        self.buffers.reset(key);
        info!(
            frame,
            window_key = key,
            generation = self.generation,
            "resynchronizing after out-of-band seek"
        );
        self.request_window(key);
        self.pause_awaiting(self.timeline.window_range(key));
    }

    fn request_window(&mut self, key: usize) {
        if let Some(pending) = self.in_flight {
            // One fetch at a time; maybe_prefetch re-issues once it lands
            debug!(key, pending = %pending.window, "fetch already in flight, deferring");
            return;
        }
        let request = FetchRequest {
            window: self.timeline.window_range(key),
            generation: self.generation,
        };
        debug!(window = %request.window, generation = request.generation, "requesting window fetch");
        self.in_flight = Some(request);
        self.fetcher.request(request);
    }

    /// Fill whichever buffered slot the playback direction needs next, if
    /// it is empty, nothing is in flight, and it has not already failed.
    fn maybe_prefetch(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        if !self.buffers.has_matrix(WindowSlot::Current) {
            if let Some(range) = self.buffers.slot_range(WindowSlot::Current) {
                if self.failed != Some(range) {
                    self.request_window(range.start);
                    return;
                }
            }
        }
        let ahead = match self.state.direction {
            Direction::Forward => WindowSlot::Next,
            Direction::Backward => WindowSlot::Previous,
        };
        if !self.buffers.has_matrix(ahead) {
            if let Some(range) = self.buffers.slot_range(ahead) {
                if self.failed != Some(range) {
                    self.request_window(range.start);
                }
            }
        }
    }

    fn render(&mut self, frame: usize) {
        match self.buffers.position_at(frame) {
            Some(positions) => {
                self.sink.set_frame_positions(frame, &positions);
            }
            None if !self.state.paused => {
                // Prefetch fell behind outside a crossing
                warn!(frame, "no buffered window covers frame");
                self.pause_awaiting(
                    self.timeline
                        .window_range(self.timeline.window_key_for(frame)),
                );
            }
            None => {}
        }
    }

    fn pause_awaiting(&mut self, window: FrameRange) {
        if self.awaiting == Some(window) && self.state.paused {
            return;
        }
        info!(window = %window, "playback paused until window is ready");
        self.awaiting = Some(window);
        self.state.paused = true;
        self.phase = DriverPhase::AwaitingFetch;
        self.governor.pause();
    }

    fn resume_playback(&mut self) {
        self.awaiting = None;
        self.state.paused = false;
        self.phase = match self.state.direction {
            Direction::Forward => DriverPhase::PlayingForward,
            Direction::Backward => DriverPhase::PlayingBackward,
        };
        self.governor.resume();
        // Show the frame the pause landed on; the axis continues from it
        // without replaying anything earlier
        self.render(self.state.current_frame);
    }

    fn pause_at_timeline_ends(&mut self, frame: usize) {
        let at_end = match self.state.direction {
            Direction::Forward => frame >= self.timeline.last_frame(),
            Direction::Backward => frame == 0,
        };
        if at_end && !self.state.paused {
            info!(frame, "reached timeline end, pausing");
            self.state.paused = true;
            self.axis.pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{completion_channel, CompletionSender, FetchOutcome};
    use crate::geom::PointGeom;
    use crate::timeline::Granularity;
    use crate::window::{PartitionMatrix, WindowMatrix};
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::time::Duration;

    const OBJECTS: usize = 100;

    fn timeline() -> TimelineConfig {
        TimelineConfig::new(
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
            Granularity::seconds(1),
            10,
            100,
        )
        .unwrap()
    }

    #[derive(Default)]
    struct FakeAxis {
        paused: Mutex<bool>,
        rates: Mutex<Vec<f64>>,
    }

    impl TemporalAxis for FakeAxis {
        fn pause(&self) {
            *self.paused.lock() = true;
        }
        fn resume(&self) {
            *self.paused.lock() = false;
        }
        fn set_frame_rate(&self, fps: f64) {
            self.rates.lock().push(fps);
        }
        fn current_frame(&self) -> usize {
            0
        }
    }

    #[derive(Default)]
    struct FakeSink {
        frames: Mutex<Vec<usize>>,
    }

    impl FeatureSink for FakeSink {
        fn set_frame_positions(&self, frame: usize, positions: &[PointGeom]) {
            assert_eq!(positions.len(), OBJECTS);
            self.frames.lock().push(frame);
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        requests: Mutex<Vec<FetchRequest>>,
    }

    impl WindowFetcher for FakeFetcher {
        fn request(&self, request: FetchRequest) {
            self.requests.lock().push(request);
        }
    }

    struct Harness {
        driver: PlaybackDriver,
        axis: Arc<FakeAxis>,
        sink: Arc<FakeSink>,
        fetcher: Arc<FakeFetcher>,
        tx: CompletionSender,
    }

    fn harness(start_frame: usize) -> Harness {
        let axis = Arc::new(FakeAxis::default());
        let sink = Arc::new(FakeSink::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let (tx, rx) = completion_channel();
        let driver = PlaybackDriver::new(
            timeline(),
            fetcher.clone(),
            rx,
            axis.clone(),
            sink.clone(),
            60.0,
            start_frame,
        );
        Harness { driver, axis, sink, fetcher, tx }
    }

    fn matrix(tag: f64) -> WindowMatrix {
        let mut part = PartitionMatrix::empty(OBJECTS, 10);
        for row in 0..OBJECTS {
            part.place(row, 0, &vec![PointGeom::point(tag, row as f64); 10])
                .unwrap();
        }
        WindowMatrix::from_partitions(10, vec![part]).unwrap()
    }

    fn complete(h: &mut Harness, start: usize, generation: u64) {
        h.tx.send(FetchOutcome {
            window: FrameRange::window(start, 10),
            generation,
            elapsed: Duration::from_millis(50),
            result: Ok(matrix(start as f64)),
        })
        .unwrap();
        h.driver.drain_completions();
    }

    fn requested_windows(h: &Harness) -> Vec<FrameRange> {
        h.fetcher.requests.lock().iter().map(|r| r.window).collect()
    }

    /// Start the session and land the first two windows
    fn warmed_up(start_frame: usize) -> Harness {
        let mut h = harness(start_frame);
        h.driver.start();
        let key = timeline().window_key_for(start_frame);
        complete(&mut h, key, 0);
        // First completion triggers the prefetch of the next window
        complete(&mut h, key + 10, 0);
        h.sink.frames.lock().clear();
        h
    }

    #[test]
    fn test_start_fetches_current_then_next() {
        let mut h = harness(0);
        h.driver.start();
        assert_eq!(h.driver.phase(), DriverPhase::AwaitingFetch);
        assert_eq!(requested_windows(&h), vec![FrameRange::new(0, 9)]);

        complete(&mut h, 0, 0);
        assert_eq!(h.driver.phase(), DriverPhase::PlayingForward);
        assert_eq!(
            requested_windows(&h),
            vec![FrameRange::new(0, 9), FrameRange::new(10, 19)]
        );
        // The measured fetch set an axis rate
        assert_eq!(h.axis.rates.lock().len(), 1);
    }

    #[test]
    fn test_ticks_within_window_trigger_no_fetch() {
        let mut h = warmed_up(0);
        let before = requested_windows(&h).len();
        for frame in 0..=9 {
            h.driver.on_tick(frame);
        }
        assert_eq!(requested_windows(&h).len(), before);
        assert_eq!(*h.sink.frames.lock(), (0..=9).collect::<Vec<_>>());
    }

    #[test]
    fn test_boundary_tick_shifts_and_prefetches() {
        let mut h = warmed_up(0);
        for frame in 0..=9 {
            h.driver.on_tick(frame);
        }
        h.driver.on_tick(10);
        // Tick 10 crossed into [10, 19] and prefetched [20, 29]
        assert_eq!(h.driver.state().window_key, 10);
        assert_eq!(requested_windows(&h).last(), Some(&FrameRange::new(20, 29)));
        assert!(!h.driver.state().paused);
        assert_eq!(h.sink.frames.lock().last(), Some(&10));
    }

    #[test]
    fn test_starvation_pauses_and_resumes_without_replay() {
        let mut h = harness(0);
        h.driver.start();
        complete(&mut h, 0, 0); // current lands, [10, 19] requested but slow

        for frame in 0..=9 {
            h.driver.on_tick(frame);
        }
        h.driver.on_tick(10);
        // Boundary reached before [10, 19] landed
        assert!(h.driver.state().paused);
        assert_eq!(h.driver.phase(), DriverPhase::AwaitingFetch);
        assert!(*h.axis.paused.lock());
        assert!(!h.sink.frames.lock().contains(&10));

        complete(&mut h, 10, 0);
        assert!(!h.driver.state().paused);
        assert!(!*h.axis.paused.lock());
        // Frame 10 shown exactly once, nothing replayed
        let frames = h.sink.frames.lock().clone();
        assert_eq!(frames.iter().filter(|&&f| f == 10).count(), 1);
        assert_eq!(frames, (0..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_failed_fetch_reported_once_and_not_installed() {
        let mut h = warmed_up(20);
        // Prefetch beyond the warmed-up windows fails
        for frame in 21..=30 {
            h.driver.on_tick(frame);
        }
        assert_eq!(requested_windows(&h).last(), Some(&FrameRange::new(40, 49)));

        h.tx.send(FetchOutcome {
            window: FrameRange::new(40, 49),
            generation: 0,
            elapsed: Duration::from_millis(5),
            result: Err(anyhow::anyhow!("partition 2: connection reset")),
        })
        .unwrap();
        h.driver.drain_completions();

        assert!(h.driver.last_fetch_error().unwrap().contains("connection reset"));
        // No retry in this generation
        let count = requested_windows(&h)
            .iter()
            .filter(|r| **r == FrameRange::new(40, 49))
            .count();
        assert_eq!(count, 1);

        // Reaching the failed window starves instead of showing bad data
        for frame in 31..=40 {
            h.driver.on_tick(frame);
        }
        assert!(h.driver.state().paused);
        assert!(!h.sink.frames.lock().contains(&40));
    }

    #[test]
    fn test_seek_resyncs_and_discards_stale_generation() {
        let mut h = warmed_up(0);
        h.driver.on_tick(0);
        h.driver.on_tick(1);

        // Out-of-band jump
        h.driver.on_tick(47);
        assert_eq!(h.driver.state().window_key, 40);
        assert!(h.driver.state().paused);
        let last = *requested_windows(&h).last().unwrap();
        assert_eq!(last, FrameRange::new(40, 49));

        // A slow pre-seek fetch completes afterwards: superseded generation
        h.tx.send(FetchOutcome {
            window: FrameRange::new(20, 29),
            generation: 0,
            elapsed: Duration::from_millis(5),
            result: Ok(matrix(20.0)),
        })
        .unwrap();
        h.driver.drain_completions();
        assert!(h.driver.state().paused);

        complete(&mut h, 40, 1);
        assert!(!h.driver.state().paused);
        assert_eq!(h.sink.frames.lock().last(), Some(&47));
    }

    #[test]
    fn test_backward_crossing_shifts_and_prefetches_below() {
        let mut h = warmed_up(20);
        h.driver.on_tick(21);
        h.driver.on_tick(20);
        // Anticipatory shift: current is now [10, 19], frame 20 still shown
        assert_eq!(h.driver.state().window_key, 10);
        assert_eq!(h.driver.state().direction, Direction::Backward);
        assert_eq!(requested_windows(&h).last(), Some(&FrameRange::new(0, 9)));
        assert_eq!(h.sink.frames.lock().last(), Some(&20));
    }

    #[test]
    fn test_pause_at_timeline_start() {
        let mut h = warmed_up(10);
        h.driver.on_tick(11);
        h.driver.on_tick(10);
        complete(&mut h, 0, 0); // backward prefetch of [0, 9]
        for frame in (0..=9).rev() {
            h.driver.on_tick(frame);
        }
        assert!(h.driver.state().paused);
        assert!(*h.axis.paused.lock());
        assert_eq!(h.sink.frames.lock().last(), Some(&0));
    }
}
