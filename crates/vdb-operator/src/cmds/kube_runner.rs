//! [`PodRunner`] backed by the pod `exec` subresource.

use super::{ExecError, ExecOutcome, PodRunner};
use crate::names::MemberName;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams};
use kube::Client;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Executes commands through the Kubernetes API server.
#[derive(Clone)]
pub struct KubePodRunner {
    client: Client,
}

impl KubePodRunner {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>) -> Result<String, ExecError> {
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .await
        .map_err(|e| ExecError::Io(e.to_string()))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Map the status the API server sends on the error channel at process exit.
fn status_to_error(status: Option<Status>) -> Option<ExecError> {
    let status = status?;
    if status.status.as_deref() == Some("Success") {
        return None;
    }

    let code = status
        .details
        .as_ref()
        .and_then(|d| d.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|c| c.reason.as_deref() == Some("ExitCode"))
                .and_then(|c| c.message.as_deref())
                .and_then(|m| m.parse::<i32>().ok())
        });
    let message = status.message.unwrap_or_default();

    if status.reason.as_deref() == Some("NonZeroExitCode") || code.is_some() {
        Some(ExecError::NonZeroExit { code, message })
    } else {
        Some(ExecError::Transport(message))
    }
}

#[async_trait]
impl PodRunner for KubePodRunner {
    async fn exec_in_pod(
        &self,
        pod: &MemberName,
        container: &str,
        command: &[String],
    ) -> ExecOutcome {
        debug!(pod = %pod, container, command = ?command, "Executing command in pod");

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = match pods.exec(&pod.name, command.to_vec(), &params).await {
            Ok(attached) => attached,
            Err(e) => {
                warn!(pod = %pod, error = %e, "Failed to start exec");
                return ExecOutcome {
                    error: Some(ExecError::Transport(e.to_string())),
                    ..ExecOutcome::default()
                };
            }
        };

        let status = attached.take_status();
        let stdout_reader = attached.stdout();
        let stderr_reader = attached.stderr();
        let (stdout, stderr) = tokio::join!(read_stream(stdout_reader), read_stream(stderr_reader));
        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        let joined = attached.join().await;

        let (stdout, stdout_err) = match stdout {
            Ok(s) => (s, None),
            Err(e) => (String::new(), Some(e)),
        };
        let (stderr, stderr_err) = match stderr {
            Ok(s) => (s, None),
            Err(e) => (String::new(), Some(e)),
        };

        let error = status_to_error(status)
            .or(stdout_err)
            .or(stderr_err)
            .or_else(|| joined.err().map(|e| ExecError::Transport(e.to_string())));

        if let Some(err) = &error {
            debug!(pod = %pod, error = %err, "Command did not succeed");
        }

        ExecOutcome {
            stdout,
            stderr,
            error,
        }
    }
}
