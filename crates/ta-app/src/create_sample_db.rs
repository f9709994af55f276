//! Create a sample trajectory database with demo data

use std::path::Path;

use rusqlite::{Connection, Result};

/// Create and populate a sample observations table: a handful of vehicles
/// wandering around the origin, observed every few seconds for an hour.
pub fn create_sample_database(path: &Path, objects: usize) -> Result<()> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS observations (
            object_id TEXT NOT NULL,
            ts INTEGER NOT NULL,
            x REAL NOT NULL,
            y REAL NOT NULL
        );
        DELETE FROM observations;
        ",
    )?;

    let mut stmt = conn
        .prepare("INSERT INTO observations (object_id, ts, x, y) VALUES (?1, ?2, ?3, ?4)")?;

    let mut rng = 42u32;
    let base_ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp();

    for obj in 0..objects {
        let object_id = format!("VEHICLE_{:03}", obj + 1);
        // Each vehicle starts somewhere in a 1km square and drifts
        let mut x = random_float(&mut rng) * 1000.0;
        let mut y = random_float(&mut rng) * 1000.0;
        let heading = random_float(&mut rng) * std::f64::consts::TAU;
        let speed = 5.0 + random_float(&mut rng) * 10.0;

        // Irregular observation intervals, like a real GPS feed
        let mut ts = base_ts;
        while ts < base_ts + 3600 {
            stmt.execute((&object_id, ts, x, y))?;
            let dt = 2 + (random_int(&mut rng) % 6) as i64;
            let wobble = (random_float(&mut rng) - 0.5) * 0.8;
            x += speed * dt as f64 * (heading + wobble).cos();
            y += speed * dt as f64 * (heading + wobble).sin();
            ts += dt;
        }
    }

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_obs_object_ts ON observations(object_id, ts);
        ",
    )?;

    println!("Sample trajectory database created at {}", path.display());
    Ok(())
}

fn random_float(seed: &mut u32) -> f64 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    (*seed as f64) / (u32::MAX as f64)
}

fn random_int(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}
