use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::types::ExecutionError;

/// Maximum size for captured stdout/stderr to prevent memory issues
const MAX_OUTPUT_SIZE: usize = 10 * 1024; // 10KB per stream

/// Output of a deployment script that exited with status 0
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Runs the configured deployment script with a bounded wall-clock time.
///
/// Arguments are passed as a vector straight to the script, never through a
/// shell, so request values cannot be interpreted as commands.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    script: PathBuf,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new<P: AsRef<Path>>(script: P, timeout: Duration) -> Self {
        Self {
            script: script.as_ref().to_path_buf(),
            timeout,
        }
    }

    /// Run the script with the given positional arguments and wait for it
    pub async fn run(&self, args: &[&str]) -> Result<ScriptOutput, ExecutionError> {
        let command = self.script.display().to_string();

        debug!(
            script = %command,
            args = ?args,
            timeout_secs = self.timeout.as_secs(),
            "Executing deployment script"
        );

        let start_time = Instant::now();

        let mut cmd = Command::new(&self.script);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills the child
        let execution_result = timeout(self.timeout, cmd.output()).await;

        let duration_ms = start_time.elapsed().as_millis() as u64;

        match execution_result {
            Ok(Ok(output)) => {
                let stdout = truncate_output(output.stdout);
                let stderr = truncate_output(output.stderr);

                debug!(
                    script = %command,
                    exit_code = ?output.status.code(),
                    duration_ms = duration_ms,
                    stdout_len = stdout.len(),
                    stderr_len = stderr.len(),
                    "Deployment script completed"
                );

                match output.status.code() {
                    Some(0) => Ok(ScriptOutput {
                        stdout,
                        stderr,
                        duration_ms,
                    }),
                    Some(code) => {
                        warn!(
                            script = %command,
                            exit_code = code,
                            stderr = %stderr,
                            "Deployment script failed with non-zero exit code"
                        );
                        Err(ExecutionError::NonZeroExit {
                            command,
                            code,
                            stderr,
                        })
                    }
                    None => {
                        warn!(
                            script = %command,
                            stderr = %stderr,
                            "Deployment script terminated by signal"
                        );
                        Err(ExecutionError::Killed { command, stderr })
                    }
                }
            }
            Ok(Err(io_error)) => {
                error!(
                    script = %command,
                    error = %io_error,
                    "Failed to start deployment script"
                );
                Err(ExecutionError::StartFailed {
                    command,
                    source: io_error,
                })
            }
            Err(_elapsed) => {
                warn!(
                    script = %command,
                    timeout_ms = self.timeout.as_millis() as u64,
                    duration_ms = duration_ms,
                    "Deployment script timed out"
                );
                Err(ExecutionError::Timeout {
                    command,
                    timeout: self.timeout,
                })
            }
        }
    }
}

/// Truncate script output to prevent memory issues
fn truncate_output(output: Vec<u8>) -> String {
    let output_str = String::from_utf8_lossy(&output);
    if output_str.len() > MAX_OUTPUT_SIZE {
        let mut end = MAX_OUTPUT_SIZE;
        while !output_str.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... [truncated at {} bytes]",
            &output_str[..end],
            MAX_OUTPUT_SIZE
        )
    } else {
        output_str.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::write_script;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_successful_script_execution() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "deploy.sh", "echo \"image=$1 commit=$2\"");
        let runner = ScriptRunner::new(&script, Duration::from_secs(10));

        let output = runner.run(&["app:v1", "abc123"]).await.unwrap();

        assert_eq!(output.stdout.trim(), "image=app:v1 commit=abc123");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_arguments_are_not_shell_interpreted() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("pwned");
        let script = write_script(dir.path(), "deploy.sh", "printf '%s' \"$1\"");
        let runner = ScriptRunner::new(&script, Duration::from_secs(10));

        let hostile = format!("x; touch {}", marker.display());
        let output = runner.run(&[&hostile, ""]).await.unwrap();

        assert_eq!(output.stdout, hostile);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_stderr() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "deploy.sh", "echo 'no such image' >&2\nexit 3");
        let runner = ScriptRunner::new(&script, Duration::from_secs(10));

        let result = runner.run(&["app:v1", ""]).await;

        match result {
            Err(ref e @ ExecutionError::NonZeroExit { code, .. }) => {
                assert_eq!(code, 3);
                assert_eq!(e.details(), "no such image");
            }
            _ => panic!("Expected NonZeroExit error, got: {:?}", result),
        }
    }

    #[tokio::test]
    async fn test_script_killed_by_signal_is_failure() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "deploy.sh", "kill -9 $$");
        let runner = ScriptRunner::new(&script, Duration::from_secs(10));

        let result = runner.run(&[]).await;
        assert!(matches!(result, Err(ExecutionError::Killed { .. })));
    }

    #[tokio::test]
    async fn test_script_timeout() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "deploy.sh", "sleep 5");
        let runner = ScriptRunner::new(&script, Duration::from_millis(200));

        let started = Instant::now();
        let result = runner.run(&[]).await;

        match result {
            Err(ExecutionError::Timeout { command, timeout }) => {
                assert_eq!(command, script.display().to_string());
                assert_eq!(timeout, Duration::from_millis(200));
            }
            _ => panic!("Expected Timeout error, got: {:?}", result),
        }
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_script_fails_to_start() {
        let runner = ScriptRunner::new("/nonexistent/deploy.sh", Duration::from_secs(1));
        let result = runner.run(&[]).await;
        assert!(matches!(result, Err(ExecutionError::StartFailed { .. })));
    }

    #[test]
    fn test_truncate_output() {
        let small_output = b"hello world".to_vec();
        assert_eq!(truncate_output(small_output), "hello world");

        let large_output = "x".repeat(MAX_OUTPUT_SIZE + 100).into_bytes();
        let result = truncate_output(large_output);
        assert!(result.contains("truncated"));
        assert!(result.len() > MAX_OUTPUT_SIZE);
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        let large_output = "é".repeat(MAX_OUTPUT_SIZE).into_bytes();
        let result = truncate_output(large_output);
        assert!(result.ends_with(&format!("[truncated at {} bytes]", MAX_OUTPUT_SIZE)));
    }
}
