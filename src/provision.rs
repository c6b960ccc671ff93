//! Working-root provisioning and agent config materialization.
//!
//! One config file is materialized per run, from a backend-specific TOML
//! template carrying a single `{root}` placeholder for the absolute
//! working-root path. The working root is recreated from scratch so no
//! state survives across runs.

use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::HarnessError;

/// Placeholder token substituted with the absolute working-root path.
pub const ROOT_PLACEHOLDER: &str = "{root}";

/// File name of the source database inside the working root.
///
/// Must match the `db` path the templates declare to the agent.
pub const SOURCE_DB_FILE: &str = "source.db";

/// Subdirectory used as the replication target by the fs backend.
pub const REPLICA_DIR: &str = "replica";

/// Subdirectory the agent writes its own logs into.
pub const LOG_DIR: &str = "log";

/// Replication backend variant, selecting which config template is
/// materialized. The two variants differ only in template content, never in
/// orchestration logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Filesystem-backed replica under the working root.
    #[value(name = "fs")]
    Fs,
    /// Object-store-backed replica (S3-compatible endpoint).
    #[value(name = "s3")]
    S3,
}

impl BackendKind {
    /// Short name, matching the CLI spelling and the template file stem.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Fs => "fs",
            BackendKind::S3 => "s3",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Materializes agent configuration into a freshly recreated working root.
pub struct ConfigProvisioner {
    work_root: PathBuf,
    templates_dir: PathBuf,
}

impl ConfigProvisioner {
    /// Create a provisioner for the given working root and template
    /// directory. Nothing is touched until [`provision`](Self::provision).
    pub fn new(work_root: impl Into<PathBuf>, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            templates_dir: templates_dir.into(),
        }
    }

    /// Path the source database will live at once provisioned.
    pub fn source_db_path(&self) -> PathBuf {
        self.work_root.join(SOURCE_DB_FILE)
    }

    /// Recreate the working root and materialize the config for `backend`.
    ///
    /// Returns the path of the written config file. Fails with
    /// [`HarnessError::Config`] when the template is missing, lacks the
    /// `{root}` placeholder, or substitutes into malformed TOML.
    pub fn provision(&self, backend: BackendKind) -> Result<PathBuf, HarnessError> {
        info!(
            "Provisioning working root {} for backend '{}'",
            self.work_root.display(),
            backend
        );

        recreate_dir(&self.work_root)?;
        fs::create_dir_all(self.work_root.join(REPLICA_DIR))?;
        fs::create_dir_all(self.work_root.join(LOG_DIR))?;

        let template_path = self.templates_dir.join(format!("{}.toml", backend.name()));
        let template = fs::read_to_string(&template_path).map_err(|e| {
            HarnessError::Config(format!(
                "cannot read template {}: {e}",
                template_path.display()
            ))
        })?;

        if !template.contains(ROOT_PLACEHOLDER) {
            return Err(HarnessError::Config(format!(
                "template {} has no {ROOT_PLACEHOLDER} placeholder",
                template_path.display()
            )));
        }

        let abs_root = self.work_root.canonicalize()?;
        let content = template.replace(ROOT_PLACEHOLDER, &abs_root.to_string_lossy());

        // The agent parses its config as TOML; catch a broken template here
        // rather than via an opaque agent startup failure later.
        content.parse::<toml::Table>().map_err(|e| {
            HarnessError::Config(format!(
                "materialized config from {} is not valid TOML: {e}",
                template_path.display()
            ))
        })?;

        let config_path = self.work_root.join(format!("{}.toml", backend.name()));
        fs::write(&config_path, content)?;
        debug!("Wrote agent config {}", config_path.display());

        Ok(config_path)
    }
}

/// Delete-if-exists then create. Tolerates an already-absent directory.
fn recreate_dir(path: &Path) -> Result<(), HarnessError> {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_template(dir: &Path, backend: &str, content: &str) {
        fs::write(dir.join(format!("{backend}.toml")), content).unwrap();
    }

    const FS_TEMPLATE: &str = r#"
[log]
level = "Info"
dir = "{root}/log"
to_stderr = true

[[database]]
db = "{root}/source.db"

[[database.replicate]]
name = "fs-replica"

[database.replicate.params]
type = "Fs"
root = "{root}/replica"
"#;

    #[test]
    fn test_provision_substitutes_root() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        fs::create_dir(&templates).unwrap();
        write_template(&templates, "fs", FS_TEMPLATE);

        let root = tmp.path().join("work");
        let provisioner = ConfigProvisioner::new(&root, &templates);
        let config_path = provisioner.provision(BackendKind::Fs).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(!content.contains(ROOT_PLACEHOLDER));
        let abs_root = root.canonicalize().unwrap();
        assert!(content.contains(&*abs_root.to_string_lossy()));
        assert!(root.join(REPLICA_DIR).is_dir());
        assert!(root.join(LOG_DIR).is_dir());
    }

    #[test]
    fn test_provision_recreates_root() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        fs::create_dir(&templates).unwrap();
        write_template(&templates, "fs", FS_TEMPLATE);

        let root = tmp.path().join("work");
        fs::create_dir_all(&root).unwrap();
        let stale = root.join("stale.db");
        fs::write(&stale, b"leftover").unwrap();

        let provisioner = ConfigProvisioner::new(&root, &templates);
        provisioner.provision(BackendKind::Fs).unwrap();

        assert!(!stale.exists());
    }

    #[test]
    fn test_missing_template_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        fs::create_dir(&templates).unwrap();

        let provisioner = ConfigProvisioner::new(tmp.path().join("work"), &templates);
        let err = provisioner.provision(BackendKind::S3).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_template_without_placeholder_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        fs::create_dir(&templates).unwrap();
        write_template(&templates, "fs", "[log]\nlevel = \"Info\"\n");

        let provisioner = ConfigProvisioner::new(tmp.path().join("work"), &templates);
        let err = provisioner.provision(BackendKind::Fs).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_malformed_template_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        fs::create_dir(&templates).unwrap();
        write_template(&templates, "fs", "[[database]\ndb = \"{root}/source.db\"\n");

        let provisioner = ConfigProvisioner::new(tmp.path().join("work"), &templates);
        let err = provisioner.provision(BackendKind::Fs).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_repo_templates_provision_for_both_backends() {
        for backend in [BackendKind::Fs, BackendKind::S3] {
            let tmp = TempDir::new().unwrap();
            let provisioner = ConfigProvisioner::new(tmp.path().join("work"), "templates");
            let config_path = provisioner.provision(backend).unwrap();
            assert!(config_path.is_file());
        }
    }
}
