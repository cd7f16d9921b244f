//! Error types shared by the reconcile actors and the controller glue.

use crate::cmds::ExecError;
use thiserror::Error;

/// Errors that cross an actor boundary.
///
/// Classified command failures (unreachable endpoint, missing bucket, ...) are
/// never turned into an `Error`; they resolve to a requeue inside the actor.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("VerticaDB is missing its name or namespace")]
    MissingObjectKey,

    #[error("Command failed in pod {pod}: {source}")]
    CommandFailed {
        pod: String,
        #[source]
        source: ExecError,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_yaml::Error),
}

impl Error {
    /// Wrap an execution error with the pod it ran in.
    pub fn command_failed(pod: impl ToString, source: ExecError) -> Self {
        Error::CommandFailed {
            pod: pod.to_string(),
            source,
        }
    }
}

/// Result type used throughout the operator.
pub type Result<T, E = Error> = std::result::Result<T, E>;
