//! Append-only audit log of deploy requests and their outcomes
//!
//! Each line is written with a single `write_all` while holding an
//! exclusive flock(2), so concurrent appends from this process or any
//! other never interleave.

use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::types::{Error, Result};

/// Kind of audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    DeployRequested,
    DeploySuccess,
    DeployError,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::DeployRequested => "DEPLOY_REQUESTED",
            AuditOutcome::DeploySuccess => "DEPLOY_SUCCESS",
            AuditOutcome::DeployError => "DEPLOY_ERROR",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the audit log
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub deploy_id: String,
    pub image: String,
    pub commit: String,
    pub detail: Option<String>,
}

impl AuditRecord {
    fn new(
        outcome: AuditOutcome,
        deploy_id: &str,
        image: &str,
        commit: &str,
        detail: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            outcome,
            deploy_id: deploy_id.to_string(),
            image: image.to_string(),
            commit: commit.to_string(),
            detail,
        }
    }

    pub fn requested(deploy_id: &str, image: &str, commit: &str) -> Self {
        Self::new(AuditOutcome::DeployRequested, deploy_id, image, commit, None)
    }

    /// Success record; the script's stdout becomes the detail when there is any
    pub fn success(deploy_id: &str, image: &str, commit: &str, stdout: &str) -> Self {
        let stdout = stdout.trim_end();
        let detail = (!stdout.is_empty()).then(|| stdout.to_string());
        Self::new(AuditOutcome::DeploySuccess, deploy_id, image, commit, detail)
    }

    pub fn error(deploy_id: &str, image: &str, commit: &str, detail: impl Into<String>) -> Self {
        Self::new(
            AuditOutcome::DeployError,
            deploy_id,
            image,
            commit,
            Some(detail.into()),
        )
    }

    /// Render the record as a single line without the trailing newline.
    ///
    /// Caller-supplied values are written with Rust string escaping, so an
    /// embedded newline or quote can never start a forged record.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "[{}] {} deploy_id={} image={:?} commit={:?}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.outcome,
            self.deploy_id,
            self.image,
            self.commit,
        );
        if let Some(detail) = &self.detail {
            line.push_str(&format!(" detail={:?}", detail));
        }
        line
    }
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Handle to the audit log file
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Open the audit log, creating the file and its parent directories if needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| audit_error(path, e))?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| audit_error(path, e))?;

        debug!(path = ?path, "Audit log ready");

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a whole line
    pub async fn append(&self, record: &AuditRecord) -> Result<()> {
        let path = self.path.clone();
        let mut line = record.to_line();
        line.push('\n');

        let result = tokio::task::spawn_blocking(move || append_line(&path, line.as_bytes()))
            .await
            .map_err(|e| Error::Application(format!("Audit append task failed: {}", e)))?;

        if let Err(e) = &result {
            error!(
                path = ?self.path,
                outcome = %record.outcome,
                deploy_id = %record.deploy_id,
                error = %e,
                "Failed to append audit record"
            );
            crate::metrics::record_audit_write_failure();
        }

        result
    }
}

fn append_line(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| audit_error(path, e))?;

    FileExt::lock_exclusive(&file).map_err(|e| audit_error(path, e))?;
    let written = file.write_all(bytes).and_then(|_| file.flush());
    // The lock is also dropped with the file handle; release it explicitly first
    let _ = FileExt::unlock(&file);

    written.map_err(|e| audit_error(path, e))
}

fn audit_error(path: &Path, source: std::io::Error) -> Error {
    Error::Audit {
        path: path.display().to_string(),
        source,
    }
}
