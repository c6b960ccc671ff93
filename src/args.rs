//! CLI argument definitions for the harness.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::pipeline::HarnessConfig;
use crate::provision::BackendKind;
use crate::verify::DrainOptions;

/// Drive a replication agent under write load and verify that a restore
/// from the replicated backend matches the source database exactly.
#[derive(Parser, Debug)]
#[command(name = "replicheck", version)]
#[command(about = "Verify a SQLite replication agent end to end")]
pub struct HarnessArgs {
    /// Minimum number of records to insert into the source database
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub record_count: u64,

    /// Replication backend the agent is configured with
    #[arg(value_enum)]
    pub backend: BackendKind,

    /// Path to the replication agent binary
    pub agent: PathBuf,

    /// Working root directory, recreated at the start of the run
    #[arg(long, default_value = ".replicheck")]
    pub root: PathBuf,

    /// Directory holding the backend config templates
    #[arg(long, default_value = "templates")]
    pub templates: PathBuf,

    /// Seed for deterministic workload generation
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Seconds to wait for the replica to catch up before failing
    #[arg(long, default_value = "30")]
    pub drain_timeout_secs: u64,

    /// Milliseconds between drain probes
    #[arg(long, default_value = "500")]
    pub drain_poll_millis: u64,

    /// Seconds a single restore invocation may run before it is killed
    #[arg(long, default_value = "30")]
    pub restore_timeout_secs: u64,

    /// Emit the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl HarnessArgs {
    /// Build the pipeline configuration from the parsed arguments.
    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig::new(self.record_count, self.backend, &self.agent)
            .with_work_root(&self.root)
            .with_templates_dir(&self.templates)
            .with_seed(self.seed)
            .with_drain(DrainOptions {
                timeout: Duration::from_secs(self.drain_timeout_secs),
                poll_interval: Duration::from_millis(self.drain_poll_millis),
            })
            .with_restore_timeout(Duration::from_secs(self.restore_timeout_secs))
    }
}
