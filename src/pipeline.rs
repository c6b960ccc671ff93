//! End-to-end orchestration of one verification run.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::agent::{ReplicationAgent, DEFAULT_RESTORE_TIMEOUT};
use crate::dataset;
use crate::error::HarnessError;
use crate::provision::{BackendKind, ConfigProvisioner};
use crate::report::{ConfigSummary, RunReport, RunStatus};
use crate::verify::{self, ConsistencyVerifier, DrainOptions};
use crate::workload::WorkloadGenerator;

/// File name of the restored database inside the working root.
pub const RESTORED_DB_FILE: &str = "restored.db";

/// File name of the drain probe restore target.
pub const PROBE_DB_FILE: &str = "drain-probe.db";

/// Phases of one run, entered strictly in order. There is no retry of any
/// phase; the first failure aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Provisioned,
    AgentRunning,
    WorkloadComplete,
    Draining,
    BaselineCaptured,
    AgentStopped,
    Restored,
    Verified,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Provisioned => "provisioned",
            Phase::AgentRunning => "agent-running",
            Phase::WorkloadComplete => "workload-complete",
            Phase::Draining => "draining",
            Phase::BaselineCaptured => "baseline-captured",
            Phase::AgentStopped => "agent-stopped",
            Phase::Restored => "restored",
            Phase::Verified => "verified",
        };
        f.write_str(name)
    }
}

/// Configuration for one harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Minimum number of records to insert.
    pub record_count: u64,
    /// Replication backend variant.
    pub backend: BackendKind,
    /// Path of the agent binary under test.
    pub agent_binary: PathBuf,
    /// Working root, recreated at run start.
    pub work_root: PathBuf,
    /// Directory holding the config templates.
    pub templates_dir: PathBuf,
    /// Workload RNG seed.
    pub seed: u64,
    /// Drain polling options.
    pub drain: DrainOptions,
    /// Budget for each one-shot restore invocation.
    pub restore_timeout: Duration,
}

impl HarnessConfig {
    /// Create a configuration with default paths and timing.
    pub fn new(record_count: u64, backend: BackendKind, agent_binary: impl Into<PathBuf>) -> Self {
        Self {
            record_count,
            backend,
            agent_binary: agent_binary.into(),
            work_root: PathBuf::from(".replicheck"),
            templates_dir: PathBuf::from("templates"),
            seed: 42,
            drain: DrainOptions::default(),
            restore_timeout: DEFAULT_RESTORE_TIMEOUT,
        }
    }

    /// Set the working root.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    /// Set the template directory.
    pub fn with_templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = dir.into();
        self
    }

    /// Set the workload seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the drain polling options.
    pub fn with_drain(mut self, drain: DrainOptions) -> Self {
        self.drain = drain;
        self
    }

    /// Set the restore timeout.
    pub fn with_restore_timeout(mut self, timeout: Duration) -> Self {
        self.restore_timeout = timeout;
        self
    }
}

/// Pipeline running one complete check: provision, replicate under load,
/// drain, stop, restore, compare.
pub struct HarnessPipeline {
    config: HarnessConfig,
    phase: Phase,
}

impl HarnessPipeline {
    /// Create a pipeline in the idle phase.
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
        }
    }

    /// Phase the pipeline last entered.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        info!("Entering phase '{phase}'");
        self.phase = phase;
    }

    /// Run the complete check.
    ///
    /// A verification mismatch yields `Ok` with a failed report; every other
    /// failure aborts immediately as `Err`. The agent child is killed on
    /// drop, so an abort in any phase cannot leak the background process.
    pub async fn run(&mut self) -> Result<RunReport, HarnessError> {
        let start_time = Instant::now();
        let mut report = RunReport::new(self.config_summary());
        report.status = RunStatus::Running;

        let agent = ReplicationAgent::new(&self.config.agent_binary);
        // A previous crashed run may have leaked an agent that would keep
        // replicating into the root this run is about to recreate.
        agent.kill_stale().await;

        let provisioner =
            ConfigProvisioner::new(&self.config.work_root, &self.config.templates_dir);
        let config_path = provisioner.provision(self.config.backend)?;
        let source_db = provisioner.source_db_path();
        self.enter(Phase::Provisioned);

        let mut process = agent.start_replicate(&config_path)?;
        self.enter(Phase::AgentRunning);

        let conn = dataset::open_source(&source_db)?;
        let mut generator = WorkloadGenerator::new(conn, self.config.seed)?;
        let workload = generator.run(self.config.record_count).await?;
        let rows_inserted = workload.rows_inserted;
        report.workload = workload;
        // Close the writer connection so SQLite checkpoints the WAL and the
        // source file is quiescent for everything downstream.
        drop(generator);
        self.enter(Phase::WorkloadComplete);

        self.enter(Phase::Draining);
        let verifier = ConsistencyVerifier::new(
            agent.clone(),
            &config_path,
            &source_db,
            self.config.work_root.join(PROBE_DB_FILE),
        )
        .with_restore_timeout(self.config.restore_timeout);
        report.drain_duration = verifier
            .wait_until_replicated(rows_inserted, self.config.drain)
            .await?;

        let baseline = verifier.capture_baseline()?;
        // The workload is the only writer, so a shorter baseline means the
        // harness itself lost track, not the agent.
        if baseline.len() as u64 != rows_inserted {
            return Err(HarnessError::Verification(format!(
                "baseline has {} rows but the workload inserted {rows_inserted}",
                baseline.len()
            )));
        }
        self.enter(Phase::BaselineCaptured);

        process.stop().await?;
        self.enter(Phase::AgentStopped);

        let restored = verifier
            .restore_into(&self.config.work_root.join(RESTORED_DB_FILE))
            .await?;
        self.enter(Phase::Restored);

        let verification = verify::compare(&baseline, &restored);
        self.enter(Phase::Verified);

        if verification.is_success() {
            info!("Verification passed: {}", verification.describe());
            report.status = RunStatus::Passed;
        } else {
            error!("Verification failed: {}", verification.describe());
            report.status = RunStatus::Failed;
        }
        report.verification = verification;
        report.total_duration = start_time.elapsed();

        Ok(report)
    }

    fn config_summary(&self) -> ConfigSummary {
        ConfigSummary {
            backend: self.config.backend,
            record_count: self.config.record_count,
            seed: self.config.seed,
            agent: self.config.agent_binary.display().to_string(),
        }
    }
}
