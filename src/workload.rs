//! Paced, deterministic workload generation against the source database.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::HarnessError;

/// Largest batch the generator produces.
pub const MAX_BATCH_ROWS: u64 = 20;

/// Rows inserted since the last pause before the generator sleeps.
pub const PACE_THRESHOLD: u64 = 500;

/// Length of the pacing pause.
pub const PACE_PAUSE: Duration = Duration::from_secs(1);

/// Length of each record's random `name` field.
pub const NAME_LEN: usize = 5;

/// Metrics from a workload run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkloadMetrics {
    /// Number of rows inserted. At least the requested count, overshooting
    /// by less than one batch.
    pub rows_inserted: u64,
    /// Number of batches committed.
    pub batches: u64,
    /// Number of pacing pauses taken.
    pub pauses: u64,
    /// Total wall-clock time, pauses included.
    pub duration: Duration,
}

impl WorkloadMetrics {
    /// Calculate rows per second.
    pub fn rows_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.rows_inserted as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Workload generator owning the writer connection and all running state.
///
/// `total_inserted` doubles as the next batch's value offset, which is what
/// keeps the `value` sequence strictly increasing and gap-free across
/// batches. Both counters live here rather than in ambient state, so a
/// generator can be driven incrementally from tests.
pub struct WorkloadGenerator {
    conn: Connection,
    rng: StdRng,
    total_inserted: u64,
    since_pause: u64,
}

impl WorkloadGenerator {
    /// Create a generator over an open writer connection, creating the
    /// dataset table if needed.
    pub fn new(conn: Connection, seed: u64) -> Result<Self, HarnessError> {
        crate::dataset::create_table(&conn)?;
        Ok(Self {
            conn,
            rng: StdRng::seed_from_u64(seed),
            total_inserted: 0,
            since_pause: 0,
        })
    }

    /// Total rows inserted so far.
    pub fn total_inserted(&self) -> u64 {
        self.total_inserted
    }

    /// Insert batches until the cumulative count reaches `target_count`.
    ///
    /// Each batch of 1–20 rows commits as one transaction. Once more than
    /// [`PACE_THRESHOLD`] rows have gone in since the last pause, the
    /// generator sleeps for [`PACE_PAUSE`] so a downstream replica has a
    /// realistic chance to keep up.
    pub async fn run(&mut self, target_count: u64) -> Result<WorkloadMetrics, HarnessError> {
        let start_time = Instant::now();
        let mut metrics = WorkloadMetrics::default();

        info!("Starting workload: at least {target_count} rows");

        while self.total_inserted < target_count {
            let inserted = self.insert_batch()?;
            metrics.batches += 1;
            self.since_pause += inserted;

            if self.since_pause > PACE_THRESHOLD {
                debug!(
                    "Pacing pause after {} rows ({} total)",
                    self.since_pause, self.total_inserted
                );
                tokio::time::sleep(PACE_PAUSE).await;
                self.since_pause = 0;
                metrics.pauses += 1;
            }
        }

        metrics.rows_inserted = self.total_inserted;
        metrics.duration = start_time.elapsed();
        info!(
            "Workload complete: {} rows in {} batches, {} pauses, {:?} ({:.2} rows/sec)",
            metrics.rows_inserted,
            metrics.batches,
            metrics.pauses,
            metrics.duration,
            metrics.rows_per_second()
        );

        Ok(metrics)
    }

    /// Insert one batch, returning the number of rows it contained.
    fn insert_batch(&mut self) -> Result<u64, HarnessError> {
        let batch_size = self.rng.gen_range(1..=MAX_BATCH_ROWS);
        let offset = self.total_inserted;
        let rows: Vec<(String, i64)> = (0..batch_size)
            .map(|i| (random_name(&mut self.rng, NAME_LEN), (offset + i) as i64))
            .collect();

        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT INTO random_data (name, value) VALUES (?1, ?2)")?;
            for (name, value) in &rows {
                stmt.execute(params![name, value])?;
            }
        }
        tx.commit()?;

        self.total_inserted += batch_size;
        Ok(batch_size)
    }
}

/// Generate a random fixed-length ASCII-alphabetic string.
fn random_name<R: Rng>(rng: &mut R, len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fetch_ordered;

    fn memory_generator(seed: u64) -> WorkloadGenerator {
        let conn = Connection::open_in_memory().unwrap();
        WorkloadGenerator::new(conn, seed).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_target_with_bounded_overshoot() {
        let mut generator = memory_generator(42);
        let metrics = generator.run(2).await.unwrap();

        assert!(metrics.rows_inserted >= 2);
        assert!(metrics.rows_inserted - 2 < MAX_BATCH_ROWS);
        assert_eq!(metrics.rows_inserted, generator.total_inserted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_values_are_strictly_increasing_and_gap_free() {
        let mut generator = memory_generator(7);
        let metrics = generator.run(100).await.unwrap();

        let records = fetch_ordered(&generator.conn).unwrap();
        assert_eq!(records.len() as u64, metrics.rows_inserted);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.value, i as i64);
            assert_eq!(record.name.len(), NAME_LEN);
            assert!(record.name.chars().all(|c| c.is_ascii_alphabetic()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_is_deterministic() {
        let mut first = memory_generator(42);
        let mut second = memory_generator(42);
        first.run(50).await.unwrap();
        second.run(50).await.unwrap();

        let a = fetch_ordered(&first.conn).unwrap();
        let b = fetch_ordered(&second.conn).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_pauses() {
        // 600 rows cannot fit in one inter-pause span (threshold 500 plus at
        // most one batch of 20), so at least one pause must trigger.
        let mut generator = memory_generator(42);
        let metrics = generator.run(600).await.unwrap();
        assert!(metrics.pauses >= 1);

        // A short run never crosses the threshold.
        let mut small = memory_generator(42);
        let metrics = small.run(100).await.unwrap();
        assert_eq!(metrics.pauses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_is_resumable() {
        let mut generator = memory_generator(3);
        generator.run(30).await.unwrap();
        let after_first = generator.total_inserted();

        let metrics = generator.run(after_first + 30).await.unwrap();
        assert!(metrics.rows_inserted >= after_first + 30);

        // The value sequence continues across runs without gaps.
        let records = fetch_ordered(&generator.conn).unwrap();
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.value, i as i64);
        }
    }
}
