//! Lifecycle control for the replication agent under test.
//!
//! The agent is consumed strictly through its command-line surface:
//! `replicate` runs continuously until killed, `restore` is one-shot. The
//! harness never parses the replicate process's output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::HarnessError;

/// How long a one-shot restore may run before it is treated as hung.
pub const DEFAULT_RESTORE_TIMEOUT: Duration = Duration::from_secs(30);

/// The replication agent binary and how to invoke it.
#[derive(Debug, Clone)]
pub struct ReplicationAgent {
    binary: PathBuf,
}

impl ReplicationAgent {
    /// Wrap an agent binary path. The path is not validated here; a missing
    /// or non-executable binary surfaces as a spawn error on first use.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Path of the agent binary.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Launch `<agent> --config <file> replicate` as a background child.
    ///
    /// Returns immediately with an owned handle; the agent signals no
    /// readiness, so the caller must not assume replication has begun.
    pub fn start_replicate(&self, config_path: &Path) -> Result<AgentProcess, HarnessError> {
        info!(
            "Starting replication agent {} with config {}",
            self.binary.display(),
            config_path.display()
        );

        let child = Command::new(&self.binary)
            .arg("--config")
            .arg(config_path)
            .arg("replicate")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::Process(format!(
                    "failed to spawn agent {}: {e}",
                    self.binary.display()
                ))
            })?;

        Ok(AgentProcess {
            child,
            stopped: false,
        })
    }

    /// Best-effort sweep of agent instances leaked by a previous run.
    ///
    /// Matches by executable name, so it can only be used before this run's
    /// own agent is started. Finding nothing to kill is success; so is the
    /// sweep failing outright, since a stale agent merely re-replicates into
    /// a working root that is about to be recreated.
    pub async fn kill_stale(&self) {
        let Some(name) = self.binary.file_name().and_then(|n| n.to_str()) else {
            return;
        };

        match Command::new("pkill")
            .arg("-x")
            .arg(name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) if status.success() => info!("Killed stale '{name}' instance(s)"),
            Ok(_) => debug!("No stale '{name}' instance found"),
            Err(e) => debug!("Stale-agent sweep skipped: {e}"),
        }
    }

    /// Run `<agent> --config <file> restore --db <source> --output <output>`
    /// to completion, bounded by `timeout`.
    ///
    /// Any pre-existing file at `output` is removed first, so repeated
    /// invocations recreate it from scratch. A non-zero exit or a timeout is
    /// a [`HarnessError::Process`].
    pub async fn restore(
        &self,
        config_path: &Path,
        source_db: &Path,
        output: &Path,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        match std::fs::remove_file(output) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        debug!("Restoring {} -> {}", source_db.display(), output.display());

        let result = tokio::time::timeout(
            timeout,
            Command::new(&self.binary)
                .arg("--config")
                .arg(config_path)
                .arg("restore")
                .arg("--db")
                .arg(source_db)
                .arg("--output")
                .arg(output)
                .stdin(Stdio::null())
                .output(),
        )
        .await;

        let output_result = match result {
            Ok(r) => r.map_err(|e| {
                HarnessError::Process(format!(
                    "failed to run restore via {}: {e}",
                    self.binary.display()
                ))
            })?,
            Err(_) => {
                return Err(HarnessError::Process(format!(
                    "restore did not finish within {timeout:?}"
                )))
            }
        };

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(HarnessError::Process(format!(
                "restore exited with {}: {}",
                output_result.status,
                stderr.trim()
            )));
        }

        if !output.is_file() {
            return Err(HarnessError::Process(format!(
                "restore reported success but produced no file at {}",
                output.display()
            )));
        }

        Ok(())
    }
}

/// Owned handle to one spawned `replicate` process.
///
/// Stopping acts on this specific child only; unrelated processes sharing
/// the agent's executable name are never touched. The child is killed on
/// drop as a backstop, so an aborted run cannot leak the agent.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    stopped: bool,
}

impl AgentProcess {
    /// Terminate the agent and reap it. Idempotent: stopping an already
    /// stopped or already exited agent is not an error.
    ///
    /// An agent found to have exited before `stop` was requested died on its
    /// own; that is logged loudly because a crashed agent is otherwise
    /// indistinguishable from a running one until verification fails.
    pub async fn stop(&mut self) -> Result<(), HarnessError> {
        if self.stopped {
            return Ok(());
        }

        if let Some(status) = self
            .child
            .try_wait()
            .map_err(|e| HarnessError::Process(format!("failed to poll agent: {e}")))?
        {
            warn!("Replication agent exited early with {status}");
            self.stopped = true;
            return Ok(());
        }

        self.child
            .kill()
            .await
            .map_err(|e| HarnessError::Process(format!("failed to kill agent: {e}")))?;
        self.stopped = true;
        info!("Replication agent stopped");
        Ok(())
    }
}
