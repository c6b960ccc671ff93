//! Baseline capture, restore, drain polling and dataset comparison.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::ReplicationAgent;
use crate::dataset::{self, DatasetRecord};
use crate::error::HarnessError;

/// How many differing positions a report records before truncating.
pub const MAX_REPORTED_MISMATCHES: usize = 10;

/// Options for the drain polling loop.
#[derive(Debug, Clone, Copy)]
pub struct DrainOptions {
    /// Total budget before the drain fails.
    pub timeout: Duration,
    /// Delay between probe restores.
    pub poll_interval: Duration,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// One differing position between baseline and restored dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowMismatch {
    /// Zero-based position in value order.
    pub position: usize,
    /// Baseline row at this position, if any.
    pub expected: Option<DatasetRecord>,
    /// Restored row at this position, if any.
    pub actual: Option<DatasetRecord>,
}

/// Outcome of comparing the restored dataset against the baseline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    /// Rows in the baseline.
    pub expected_rows: u64,
    /// Rows in the restored dataset.
    pub actual_rows: u64,
    /// First differing positions, capped at [`MAX_REPORTED_MISMATCHES`].
    pub mismatches: Vec<RowMismatch>,
}

impl VerificationReport {
    /// Whether the restored dataset exactly matches the baseline.
    pub fn is_success(&self) -> bool {
        self.expected_rows == self.actual_rows && self.mismatches.is_empty()
    }

    /// One-line description of the outcome, for error messages and logs.
    pub fn describe(&self) -> String {
        if self.is_success() {
            format!("{} rows match", self.expected_rows)
        } else {
            let first = self
                .mismatches
                .first()
                .map(|m| {
                    format!(
                        ", first difference at position {}: expected {:?}, got {:?}",
                        m.position, m.expected, m.actual
                    )
                })
                .unwrap_or_default();
            format!(
                "expected {} rows, restored {} rows, {} differing position(s){first}",
                self.expected_rows,
                self.actual_rows,
                self.mismatches.len()
            )
        }
    }
}

/// Verifies that data restored from the replicated backend matches what was
/// written to the source database.
pub struct ConsistencyVerifier {
    agent: ReplicationAgent,
    config_path: PathBuf,
    source_db: PathBuf,
    probe_path: PathBuf,
    restore_timeout: Duration,
}

impl ConsistencyVerifier {
    /// Create a verifier.
    ///
    /// `probe_path` is the scratch restore target used only by drain
    /// polling; it must live under the run's working root.
    pub fn new(
        agent: ReplicationAgent,
        config_path: impl Into<PathBuf>,
        source_db: impl Into<PathBuf>,
        probe_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            agent,
            config_path: config_path.into(),
            source_db: source_db.into(),
            probe_path: probe_path.into(),
            restore_timeout: crate::agent::DEFAULT_RESTORE_TIMEOUT,
        }
    }

    /// Override the per-restore timeout.
    pub fn with_restore_timeout(mut self, timeout: Duration) -> Self {
        self.restore_timeout = timeout;
        self
    }

    /// Capture the baseline: every source row, ordered by `value`.
    pub fn capture_baseline(&self) -> Result<Vec<DatasetRecord>, HarnessError> {
        let conn = dataset::open_reader(&self.source_db)?;
        let records = dataset::fetch_ordered(&conn)?;
        info!("Captured baseline of {} rows", records.len());
        Ok(records)
    }

    /// Restore the replicated state into `output` and read it back ordered
    /// by `value`. Any pre-existing file at `output` is replaced.
    pub async fn restore_into(&self, output: &Path) -> Result<Vec<DatasetRecord>, HarnessError> {
        self.agent
            .restore(&self.config_path, &self.source_db, output, self.restore_timeout)
            .await?;
        let conn = dataset::open_reader(output)?;
        let records = dataset::fetch_ordered(&conn)?;
        info!(
            "Restored {} rows into {}",
            records.len(),
            output.display()
        );
        Ok(records)
    }

    /// Poll the replica until it holds at least `expected_rows` rows.
    ///
    /// Each probe is a throwaway restore whose row count serves as the
    /// observable catch-up signal; a probe restore that fails means the
    /// agent has not published a usable snapshot yet and counts as "not
    /// caught up". Returns the time drained, or [`HarnessError::DrainTimeout`]
    /// once the budget is spent. Count equality is only a liveness signal;
    /// correctness is established by the final ordered comparison.
    pub async fn wait_until_replicated(
        &self,
        expected_rows: u64,
        options: DrainOptions,
    ) -> Result<Duration, HarnessError> {
        let start_time = Instant::now();
        let mut observed = 0u64;

        info!("Draining: waiting for replica to reach {expected_rows} rows");

        loop {
            match self.probe_count().await {
                Ok(count) => {
                    observed = count;
                    if count >= expected_rows {
                        let waited = start_time.elapsed();
                        info!("Replica caught up at {count} rows after {waited:?}");
                        return Ok(waited);
                    }
                    debug!("Replica at {count}/{expected_rows} rows");
                }
                Err(e) => debug!("Probe restore not usable yet: {e}"),
            }

            if start_time.elapsed() >= options.timeout {
                warn!("Replica still at {observed}/{expected_rows} rows, giving up");
                return Err(HarnessError::DrainTimeout {
                    waited: start_time.elapsed(),
                    expected: expected_rows,
                    observed,
                });
            }
            tokio::time::sleep(options.poll_interval).await;
        }
    }

    async fn probe_count(&self) -> Result<u64, HarnessError> {
        self.agent
            .restore(
                &self.config_path,
                &self.source_db,
                &self.probe_path,
                self.restore_timeout,
            )
            .await?;
        let conn = dataset::open_reader(&self.probe_path)?;
        dataset::count_rows(&conn)
    }
}

/// Compare baseline and restored datasets position by position.
///
/// Both inputs must already be ordered by `value`. Equality requires
/// identical length and identical `(id, name, value)` tuples at every
/// position.
pub fn compare(expected: &[DatasetRecord], actual: &[DatasetRecord]) -> VerificationReport {
    let mut report = VerificationReport {
        expected_rows: expected.len() as u64,
        actual_rows: actual.len() as u64,
        mismatches: Vec::new(),
    };

    let positions = expected.len().max(actual.len());
    for position in 0..positions {
        if report.mismatches.len() >= MAX_REPORTED_MISMATCHES {
            break;
        }
        let e = expected.get(position);
        let a = actual.get(position);
        if e != a {
            report.mismatches.push(RowMismatch {
                position,
                expected: e.cloned(),
                actual: a.cloned(),
            });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, name: &str, value: i64) -> DatasetRecord {
        DatasetRecord {
            id,
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn test_compare_identical_passes() {
        let rows = vec![record(1, "abcde", 0), record(2, "fghij", 1)];
        let report = compare(&rows, &rows.clone());
        assert!(report.is_success());
        assert_eq!(report.expected_rows, 2);
        assert_eq!(report.actual_rows, 2);
    }

    #[test]
    fn test_compare_reports_missing_tail() {
        let expected = vec![record(1, "abcde", 0), record(2, "fghij", 1)];
        let actual = vec![record(1, "abcde", 0)];

        let report = compare(&expected, &actual);
        assert!(!report.is_success());
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].position, 1);
        assert!(report.mismatches[0].actual.is_none());
    }

    #[test]
    fn test_compare_reports_tuple_difference() {
        let expected = vec![record(1, "abcde", 0)];
        let actual = vec![record(1, "zzzzz", 0)];

        let report = compare(&expected, &actual);
        assert!(!report.is_success());
        assert_eq!(report.mismatches[0].position, 0);
        assert_eq!(
            report.mismatches[0].actual.as_ref().unwrap().name,
            "zzzzz"
        );
    }

    #[test]
    fn test_compare_caps_reported_mismatches() {
        let expected: Vec<_> = (0..50).map(|i| record(i, "aaaaa", i)).collect();
        let actual: Vec<_> = (0..50).map(|i| record(i, "bbbbb", i)).collect();

        let report = compare(&expected, &actual);
        assert_eq!(report.mismatches.len(), MAX_REPORTED_MISMATCHES);
    }

    #[test]
    fn test_describe_carries_both_counts() {
        let expected = vec![record(1, "abcde", 0), record(2, "fghij", 1)];
        let report = compare(&expected, &[]);
        let text = report.describe();
        assert!(text.contains("expected 2 rows"));
        assert!(text.contains("restored 0 rows"));
    }

    #[test]
    fn test_empty_datasets_match() {
        let report = compare(&[], &[]);
        assert!(report.is_success());
    }
}
