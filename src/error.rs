//! Error types for the verification harness.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during a harness run.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration provisioning error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Agent process control error.
    #[error("Process error: {0}")]
    Process(String),

    /// The replica did not catch up with the source within the polling budget.
    #[error("Drain timed out after {waited:?}: replica has {observed} of {expected} rows")]
    DrainTimeout {
        /// How long the drain loop polled before giving up.
        waited: Duration,
        /// Row count the replica was expected to reach.
        expected: u64,
        /// Row count last observed in the probe restore.
        observed: u64,
    },

    /// Restored dataset does not match the baseline.
    #[error("Verification error: {0}")]
    Verification(String),

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
