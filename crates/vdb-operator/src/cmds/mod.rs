//! Remote command execution inside cluster member pods.
//!
//! Everything the reconcile actors do to a pod goes through [`PodRunner`].
//! The runner always hands back whatever stdout/stderr it captured, even when
//! the command failed, so callers can classify expected failures from the
//! output text.

pub mod fake;
pub mod kube_runner;

use crate::names::MemberName;
use crate::paths::ADMINTOOLS_BIN;
use async_trait::async_trait;
use thiserror::Error;

pub use kube_runner::KubePodRunner;
pub use fake::{CmdHistory, FakePodRunner};

/// Why a command did not complete successfully.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The exec could not be established or the stream broke.
    #[error("exec transport failure: {0}")]
    Transport(String),

    /// The remote process ran and exited non-zero.
    #[error("command exited with code {code:?}: {message}")]
    NonZeroExit { code: Option<i32>, message: String },

    /// Reading the captured output failed.
    #[error("failed to read command output: {0}")]
    Io(String),
}

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<ExecError>,
}

impl ExecOutcome {
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failure(stdout: impl Into<String>, error: ExecError) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Collapse into stdout or the execution error, dropping the output of a
    /// failed command.
    pub fn into_result(self) -> Result<String, ExecError> {
        match self.error {
            None => Ok(self.stdout),
            Some(err) => Err(err),
        }
    }
}

/// Runs commands in a named container of a pod.
///
/// `command` is a literal argument vector. Nothing is shell interpreted
/// unless the caller passes `bash -c` itself. The call suspends until the
/// remote process exits; dropping the future abandons the exec.
#[async_trait]
pub trait PodRunner: Send + Sync {
    async fn exec_in_pod(&self, pod: &MemberName, container: &str, command: &[String])
        -> ExecOutcome;

    /// Run admintools with the given arguments.
    async fn exec_admintools(
        &self,
        pod: &MemberName,
        container: &str,
        args: &[String],
    ) -> ExecOutcome {
        let mut command = Vec::with_capacity(args.len() + 1);
        command.push(ADMINTOOLS_BIN.to_string());
        command.extend_from_slice(args);
        self.exec_in_pod(pod, container, &command).await
    }
}

/// Build the `bash -c` invocation that writes `content` to `path` inside the
/// container.
pub fn write_file_command(path: &str, content: &str) -> Vec<String> {
    vec![
        "bash".to_string(),
        "-c".to_string(),
        format!("cat > {path}<<< '{content}'"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_into_result() {
        assert_eq!(ExecOutcome::success("ok").into_result(), Ok("ok".to_string()));

        let err = ExecError::NonZeroExit {
            code: Some(1),
            message: "boom".to_string(),
        };
        let outcome = ExecOutcome::failure("partial output", err.clone());
        assert!(!outcome.is_success());
        assert_eq!(outcome.into_result(), Err(err));
    }

    #[test]
    fn write_file_command_uses_here_string() {
        let cmd = write_file_command("/tmp/x.sql", "select 1;\n");
        assert_eq!(cmd[0], "bash");
        assert_eq!(cmd[1], "-c");
        assert_eq!(cmd[2], "cat > /tmp/x.sql<<< 'select 1;\n'");
    }

    #[tokio::test]
    async fn exec_admintools_prepends_binary() {
        let runner = FakePodRunner::new();
        let pod = MemberName::new("ns", "pod-0");
        runner
            .exec_admintools(&pod, "server", &["-t".to_string(), "list_db".to_string()])
            .await;

        let history = runner.histories();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].command,
            vec![ADMINTOOLS_BIN.to_string(), "-t".to_string(), "list_db".to_string()]
        );
    }
}
