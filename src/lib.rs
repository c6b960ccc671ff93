//! replicheck library
//!
//! A black-box correctness harness for SQLite replication agents. The agent
//! under test is consumed only through its command-line surface; the harness
//! provisions a config for it, runs it in `replicate` mode while writing a
//! paced, deterministic workload into the source database, then restores
//! from the replicated backend and compares the restored rows against a
//! baseline captured from the source.
//!
//! # Pipeline
//!
//! 1. Stale-agent sweep and working-root provisioning
//! 2. Agent started in continuous `replicate` mode (background child)
//! 3. Workload written concurrently, paced to bound write rate
//! 4. Drain: bounded polling until the replica's row count catches up
//! 5. Baseline capture, agent stop, one-shot `restore`
//! 6. Bit-exact ordered comparison of baseline and restored rows
//!
//! # CLI Usage
//!
//! ```bash
//! # Insert at least 1000 rows, filesystem backend
//! replicheck 1000 fs /usr/local/bin/agent
//!
//! # Object-store backend, custom drain budget, JSON report
//! replicheck 5000 s3 /usr/local/bin/agent --drain-timeout-secs 60 --json
//! ```

pub mod agent;
pub mod args;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod provision;
pub mod report;
pub mod verify;
pub mod workload;

pub use agent::{AgentProcess, ReplicationAgent};
pub use args::HarnessArgs;
pub use dataset::DatasetRecord;
pub use error::HarnessError;
pub use pipeline::{HarnessConfig, HarnessPipeline, Phase};
pub use provision::{BackendKind, ConfigProvisioner};
pub use report::{RunReport, RunStatus};
pub use verify::{ConsistencyVerifier, DrainOptions, VerificationReport};
pub use workload::{WorkloadGenerator, WorkloadMetrics};
