//! Run report types.

use std::time::Duration;

use serde::Serialize;

use crate::provision::BackendKind;
use crate::verify::VerificationReport;
use crate::workload::WorkloadMetrics;

/// Overall status of a harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run not started yet.
    Pending,
    /// Run in progress.
    Running,
    /// Restored dataset matched the baseline.
    Passed,
    /// Restored dataset differed from the baseline.
    Failed,
}

/// Summary of the configuration a run executed with.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    /// Replication backend variant.
    pub backend: BackendKind,
    /// Requested minimum record count.
    pub record_count: u64,
    /// Workload RNG seed.
    pub seed: u64,
    /// Agent binary path.
    pub agent: String,
}

/// Result of one end-to-end harness run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Test configuration summary.
    pub config_summary: ConfigSummary,
    /// Workload stage metrics.
    pub workload: WorkloadMetrics,
    /// Time the drain poll waited for the replica to catch up.
    pub drain_duration: Duration,
    /// Comparison outcome.
    pub verification: VerificationReport,
    /// Overall status.
    pub status: RunStatus,
    /// Total run duration.
    pub total_duration: Duration,
}

impl RunReport {
    /// Create a new report.
    pub fn new(config_summary: ConfigSummary) -> Self {
        Self {
            config_summary,
            workload: WorkloadMetrics::default(),
            drain_duration: Duration::ZERO,
            verification: VerificationReport::default(),
            status: RunStatus::Pending,
            total_duration: Duration::ZERO,
        }
    }

    /// Check if the run passed.
    pub fn passed(&self) -> bool {
        matches!(self.status, RunStatus::Passed)
    }

    /// Generate a summary string.
    pub fn summary(&self) -> String {
        let status_str = match self.status {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Passed => "PASSED",
            RunStatus::Failed => "FAILED",
        };

        let mut summary = format!(
            "Replication Check: {}\n\
             ================\n\
             Backend: {}\n\
             Agent: {}\n\
             Requested Rows: {}\n\
             Seed: {}\n\n",
            status_str,
            self.config_summary.backend,
            self.config_summary.agent,
            self.config_summary.record_count,
            self.config_summary.seed
        );

        summary.push_str(&format!(
            "Results:\n\
             - Inserted: {} rows in {} batches ({} pauses)\n\
             - Comparison: {}\n\n",
            self.workload.rows_inserted,
            self.workload.batches,
            self.workload.pauses,
            self.verification.describe()
        ));

        summary.push_str(&format!(
            "Timing:\n\
             - Total Duration: {:?}\n\
             - Workload: {:?} ({:.2} rows/sec)\n\
             - Drain: {:?}\n",
            self.total_duration,
            self.workload.duration,
            self.workload.rows_per_second(),
            self.drain_duration
        ));

        summary
    }
}
