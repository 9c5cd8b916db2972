//! Deploy Dispatcher
//!
//! Turns a validated deploy request into one run of the deployment script,
//! bracketed by a `DEPLOY_REQUESTED` record before the run and exactly one
//! terminal record after it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

use crate::audit::{AuditLog, AuditRecord};
use crate::config::DeployConfig;
use crate::execution::ScriptRunner;
use crate::logging::deployment_span;
use crate::metrics::{self, ActiveDeployGuard};
use crate::types::{Error, Result};

/// Commit label written to logs when the request carries none
pub const UNKNOWN_COMMIT: &str = "unknown";

static DEPLOY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Generate a unique deployment ID
pub fn generate_deploy_id() -> String {
    let seq = DEPLOY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "deploy-{}-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S-%3f"),
        seq
    )
}

/// A validated deploy request
#[derive(Debug, Clone)]
pub struct DeployJob {
    pub deploy_id: String,
    pub image: String,
    pub commit: Option<String>,
}

impl DeployJob {
    /// Validate raw request fields; an empty commit counts as absent
    pub fn new(image: Option<String>, commit: Option<String>) -> Result<Self> {
        let image = match image {
            Some(image) if !image.is_empty() => image,
            _ => {
                return Err(Error::Validation {
                    field: "image".to_string(),
                    message: "Image parameter is required".to_string(),
                })
            }
        };

        Ok(Self {
            deploy_id: generate_deploy_id(),
            image,
            commit: commit.filter(|c| !c.is_empty()),
        })
    }

    /// Commit as written to the audit and operational logs
    pub fn commit_label(&self) -> &str {
        self.commit.as_deref().unwrap_or(UNKNOWN_COMMIT)
    }

    /// Commit as passed to the deployment script
    pub fn commit_arg(&self) -> &str {
        self.commit.as_deref().unwrap_or("")
    }
}

/// Result of one deployment script run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Succeeded { stdout: String },
    Failed { details: String },
}

impl DeployOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeployOutcome::Succeeded { .. })
    }
}

pub struct Dispatcher {
    runner: ScriptRunner,
    audit: AuditLog,
}

impl Dispatcher {
    pub fn new(runner: ScriptRunner, audit: AuditLog) -> Self {
        Self { runner, audit }
    }

    /// Build the dispatcher from validated deploy configuration
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        let script = config.require_script()?;
        let log_file = config.require_log_file()?;

        let runner = ScriptRunner::new(script, Duration::from_secs(config.timeout));
        let audit = AuditLog::open(log_file)?;

        info!(
            script = ?script,
            log_file = ?audit.path(),
            timeout_secs = config.timeout,
            "Deploy dispatcher initialized"
        );

        Ok(Self::new(runner, audit))
    }

    /// Record the request, run the script on a worker task and wait for its outcome.
    ///
    /// Returns `Err` only when the request record cannot be written, in which
    /// case the script is never started. Once the script has started, the
    /// worker task runs to completion and writes the terminal record even if
    /// this future is dropped.
    pub async fn dispatch(self: &Arc<Self>, job: DeployJob) -> Result<DeployOutcome> {
        let span = deployment_span(&job.deploy_id);

        async {
            info!(
                image = %job.image,
                commit = %job.commit_label(),
                "Deployment requested"
            );

            self.audit
                .append(&AuditRecord::requested(
                    &job.deploy_id,
                    &job.image,
                    job.commit_label(),
                ))
                .await?;
            metrics::record_deploy_requested();

            let dispatcher = Arc::clone(self);
            let worker = tokio::spawn(
                async move { dispatcher.execute(job).await }.instrument(span.clone()),
            );

            worker
                .await
                .map_err(|e| Error::Application(format!("Deployment task failed: {}", e)))
        }
        .instrument(span.clone())
        .await
    }

    async fn execute(&self, job: DeployJob) -> DeployOutcome {
        let _active = ActiveDeployGuard::new();
        let started = Instant::now();

        let result = self.runner.run(&[&job.image, job.commit_arg()]).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (record, outcome) = match result {
            Ok(output) => {
                if !output.stderr.is_empty() {
                    debug!(stderr = %output.stderr.trim_end(), "Deployment script wrote to stderr");
                }
                info!(
                    duration_ms = output.duration_ms,
                    stdout = %output.stdout.trim_end(),
                    "Deployment succeeded"
                );
                (
                    AuditRecord::success(
                        &job.deploy_id,
                        &job.image,
                        job.commit_label(),
                        &output.stdout,
                    ),
                    DeployOutcome::Succeeded {
                        stdout: output.stdout,
                    },
                )
            }
            Err(e) => {
                let details = e.details();
                warn!(
                    duration_ms = duration_ms,
                    error = %e,
                    details = %details,
                    "Deployment failed"
                );
                (
                    AuditRecord::error(&job.deploy_id, &job.image, job.commit_label(), &details),
                    DeployOutcome::Failed { details },
                )
            }
        };

        metrics::record_deploy_complete(outcome.is_success(), duration_ms);

        if let Err(e) = self.audit.append(&record).await {
            error!(
                outcome = %record.outcome,
                error = %e,
                "Terminal audit record was not written"
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::write_script;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use tempfile::{tempdir, TempDir};

    fn dispatcher_with_script(body: &str, timeout: Duration) -> (Arc<Dispatcher>, PathBuf, TempDir) {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "deploy.sh", body);
        let log_file = dir.path().join("logs/deploy.log");

        let dispatcher = Dispatcher::new(
            ScriptRunner::new(&script, timeout),
            AuditLog::open(&log_file).unwrap(),
        );
        (Arc::new(dispatcher), log_file, dir)
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_job_requires_image() {
        for image in [None, Some(String::new())] {
            match DeployJob::new(image, Some("abc".to_string())) {
                Err(Error::Validation { field, message }) => {
                    assert_eq!(field, "image");
                    assert_eq!(message, "Image parameter is required");
                }
                other => panic!("Expected validation error, got: {:?}", other),
            }
        }
    }

    #[test]
    fn test_job_commit_defaults() {
        let job = DeployJob::new(Some("app:v1".to_string()), None).unwrap();
        assert_eq!(job.commit_label(), "unknown");
        assert_eq!(job.commit_arg(), "");

        let job = DeployJob::new(Some("app:v1".to_string()), Some(String::new())).unwrap();
        assert_eq!(job.commit_label(), "unknown");
        assert_eq!(job.commit_arg(), "");

        let job = DeployJob::new(Some("app:v1".to_string()), Some("abc123".to_string())).unwrap();
        assert_eq!(job.commit_label(), "abc123");
        assert_eq!(job.commit_arg(), "abc123");
    }

    #[test]
    fn test_deploy_ids_are_unique() {
        let first = generate_deploy_id();
        let second = generate_deploy_id();
        assert!(first.starts_with("deploy-"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_successful_dispatch_writes_two_records() {
        let (dispatcher, log_file, _dir) =
            dispatcher_with_script("echo deployed", Duration::from_secs(10));
        let job = DeployJob::new(Some("myapp:1.2.3".to_string()), Some("abc123".to_string()))
            .unwrap();
        let deploy_id = job.deploy_id.clone();

        let outcome = dispatcher.dispatch(job).await.unwrap();
        assert_eq!(
            outcome,
            DeployOutcome::Succeeded {
                stdout: "deployed\n".to_string()
            }
        );

        let lines = read_lines(&log_file);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(&format!("DEPLOY_REQUESTED deploy_id={}", deploy_id)));
        assert!(lines[0].contains("image=\"myapp:1.2.3\" commit=\"abc123\""));
        assert!(lines[1].contains(&format!("DEPLOY_SUCCESS deploy_id={}", deploy_id)));
        assert!(lines[1].ends_with("detail=\"deployed\""));
    }

    #[tokio::test]
    async fn test_failed_dispatch_reports_stderr() {
        let (dispatcher, log_file, _dir) = dispatcher_with_script(
            "echo 'no such image' >&2\nexit 1",
            Duration::from_secs(10),
        );
        let job = DeployJob::new(Some("myapp:1.2.3".to_string()), None).unwrap();

        let outcome = dispatcher.dispatch(job).await.unwrap();
        assert_eq!(
            outcome,
            DeployOutcome::Failed {
                details: "no such image".to_string()
            }
        );

        let lines = read_lines(&log_file);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("commit=\"unknown\""));
        assert!(lines[1].contains("DEPLOY_ERROR"));
        assert!(lines[1].ends_with("detail=\"no such image\""));
    }

    #[tokio::test]
    async fn test_arguments_reach_script_verbatim() {
        let dir = tempdir().unwrap();
        let argv_file = dir.path().join("argv");
        let marker = dir.path().join("pwned");
        let script = write_script(
            dir.path(),
            "deploy.sh",
            &format!("printf '%s\\n' \"$#\" \"$1\" \"$2\" > '{}'", argv_file.display()),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            ScriptRunner::new(&script, Duration::from_secs(10)),
            AuditLog::open(&dir.path().join("deploy.log")).unwrap(),
        ));

        let image = format!("app\"; touch {}; echo \"", marker.display());
        let commit = "$(id) `id` && rm -rf /".to_string();
        let job = DeployJob::new(Some(image.clone()), Some(commit.clone())).unwrap();

        let outcome = dispatcher.dispatch(job).await.unwrap();
        assert!(outcome.is_success());

        let argv = std::fs::read_to_string(&argv_file).unwrap();
        let argv: Vec<&str> = argv.lines().collect();
        assert_eq!(argv, vec!["2", image.as_str(), commit.as_str()]);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_timeout_is_recorded_as_error() {
        let (dispatcher, log_file, _dir) =
            dispatcher_with_script("sleep 5", Duration::from_millis(200));
        let job = DeployJob::new(Some("app:v1".to_string()), None).unwrap();

        let outcome = dispatcher.dispatch(job).await.unwrap();
        match outcome {
            DeployOutcome::Failed { details } => {
                assert!(details.contains("timed out after 200ms"), "{}", details)
            }
            other => panic!("Expected failure, got: {:?}", other),
        }

        let lines = read_lines(&log_file);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("DEPLOY_ERROR"));
    }

    #[tokio::test]
    async fn test_unwritable_log_blocks_script() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = write_script(
            dir.path(),
            "deploy.sh",
            &format!("touch '{}'", marker.display()),
        );
        let log_file = dir.path().join("deploy.log");
        let dispatcher = Arc::new(Dispatcher::new(
            ScriptRunner::new(&script, Duration::from_secs(10)),
            AuditLog::open(&log_file).unwrap(),
        ));

        std::fs::remove_file(&log_file).unwrap();
        std::fs::create_dir(&log_file).unwrap();

        let job = DeployJob::new(Some("app:v1".to_string()), None).unwrap();
        let result = dispatcher.dispatch(job).await;

        assert!(matches!(result, Err(Error::Audit { .. })));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_produce_paired_records() {
        let (dispatcher, log_file, _dir) =
            dispatcher_with_script("sleep 0.1\necho \"$1\"", Duration::from_secs(10));

        let mut handles = Vec::new();
        for i in 0..10 {
            let dispatcher = Arc::clone(&dispatcher);
            handles.push(tokio::spawn(async move {
                let job = DeployJob::new(Some(format!("app:{}", i)), None).unwrap();
                dispatcher.dispatch(job).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }

        let lines = read_lines(&log_file);
        assert_eq!(lines.len(), 20);

        let mut per_id: HashMap<String, Vec<String>> = HashMap::new();
        for line in &lines {
            assert!(line.starts_with('['));
            let id = line
                .split_whitespace()
                .find_map(|part| part.strip_prefix("deploy_id="))
                .unwrap()
                .to_string();
            per_id.entry(id).or_default().push(line.clone());
        }
        assert_eq!(per_id.len(), 10);
        for records in per_id.values() {
            assert_eq!(records.len(), 2);
            assert!(records[0].contains("DEPLOY_REQUESTED"));
            assert!(records[1].contains("DEPLOY_SUCCESS"));
        }
    }

    #[tokio::test]
    async fn test_dropped_request_still_writes_terminal_record() {
        let (dispatcher, log_file, _dir) =
            dispatcher_with_script("sleep 0.3\necho done", Duration::from_secs(10));
        let job = DeployJob::new(Some("app:v1".to_string()), None).unwrap();

        let pending = dispatcher.dispatch(job);
        let _ = tokio::time::timeout(Duration::from_millis(100), pending).await;

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let lines = read_lines(&log_file);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("DEPLOY_SUCCESS"));
    }
}
