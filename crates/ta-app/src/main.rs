//! Headless trajectory animation demo.
//!
//! Plays a trajectory database through the windowed playback engine,
//! logging frame positions instead of drawing them. Pass a SQLite database
//! path, or run with no arguments to generate and play a sample database.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info};

use ta_core::{FeatureSink, Granularity, PointGeom, TemporalAxis};
use ta_data::{AnimationSession, SessionConfig, SqliteTrajectoryStore};

mod create_sample_db;

/// Simulated temporal axis: the demo's stand-in for an interactive time
/// slider. The playback loop advances it; the driver throttles and pauses
/// it through the `TemporalAxis` seam.
#[derive(Default)]
struct SimAxis {
    inner: Mutex<SimAxisState>,
}

struct SimAxisState {
    frame: usize,
    fps: f64,
    paused: bool,
}

impl Default for SimAxisState {
    fn default() -> Self {
        Self { frame: 0, fps: 10.0, paused: false }
    }
}

impl SimAxis {
    fn advance(&self) -> usize {
        let mut state = self.inner.lock();
        state.frame += 1;
        state.frame
    }

    fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.inner.lock().fps.max(0.1))
    }
}

impl TemporalAxis for SimAxis {
    fn pause(&self) {
        self.inner.lock().paused = true;
    }

    fn resume(&self) {
        self.inner.lock().paused = false;
    }

    fn set_frame_rate(&self, fps: f64) {
        debug!(fps, "axis frame rate adjusted");
        self.inner.lock().fps = fps;
    }

    fn current_frame(&self) -> usize {
        self.inner.lock().frame
    }
}

/// Feature sink that logs a position summary instead of rendering
struct LoggingSink;

impl FeatureSink for LoggingSink {
    fn set_frame_positions(&self, frame: usize, positions: &[PointGeom]) {
        let visible = positions.iter().filter(|p| !p.is_empty()).count();
        if frame % 10 == 0 {
            info!(frame, visible, total = positions.len(), "frame rendered");
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let db_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let path = PathBuf::from("data/trajectories.db");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            create_sample_db::create_sample_database(&path, 50)?;
            path
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let store = Arc::new(SqliteTrajectoryStore::new(&db_path, "observations")?);
    let axis = Arc::new(SimAxis::default());
    let sink = Arc::new(LoggingSink);

    let config = SessionConfig {
        granularity: Granularity::seconds(5),
        window_size: 60,
        fps_cap: 30.0,
        ..SessionConfig::default()
    };

    let mut session = runtime.block_on(AnimationSession::start(
        config,
        store,
        axis.clone(),
        sink,
        runtime.handle().clone(),
    ))?;

    info!(
        objects = session.object_ids().len(),
        frames = session.timeline().total_frames(),
        "playing"
    );
    run_playback(&mut session, &axis);

    if let Some(err) = session.driver().last_fetch_error() {
        tracing::warn!(error = err, "playback ended with a fetch error");
    }
    session.stop();
    Ok(())
}

/// Drive the axis until the timeline end. The driver may pause the axis at
/// any point; pumping the session is what lets a landed fetch resume it.
fn run_playback(session: &mut AnimationSession, axis: &Arc<SimAxis>) {
    let last_frame = session.timeline().last_frame();
    loop {
        session.pump();
        if axis.is_paused() {
            if axis.current_frame() >= last_frame || session.driver().last_fetch_error().is_some()
            {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }
        let frame = axis.advance();
        session.driver_mut().on_tick(frame);
        if frame >= last_frame {
            break;
        }
        std::thread::sleep(axis.frame_interval());
    }
}
