//! Kubernetes Event recording for the VerticaDB reconcilers.
//!
//! Events are the user-visible record of what the operator did to a
//! database: create/revive started, succeeded, or is waiting on communal
//! storage. Publishing is fire-and-forget: a failed publish is logged and
//! never fails reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use std::sync::Mutex;
use tracing::warn;

/// Publishes events about a VerticaDB.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event on `resource_ref`.
    ///
    /// * `type_` - Normal or Warning
    /// * `reason` - machine-readable reason, one of [`reasons`]
    /// * `note` - human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: String,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// The controller name is reported as the event's reporting component.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: String,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: actions::RECONCILE.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// One event captured by [`RecordingEventPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub type_: EventType,
    pub reason: String,
    pub note: String,
}

/// Keeps every published event in memory. Used by tests.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: String,
    ) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedEvent {
                type_,
                reason: reason.to_string(),
                note,
            });
    }
}

/// Event reason strings, shown under REASON in `kubectl get events`.
pub mod reasons {
    pub const CREATE_DB_START: &str = "CreateDBStart";
    pub const CREATE_DB_SUCCEEDED: &str = "CreateDBSucceeded";
    pub const CREATE_DB_FAILED: &str = "CreateDBFailed";

    pub const REVIVE_DB_START: &str = "ReviveDBStart";
    pub const REVIVE_DB_SUCCEEDED: &str = "ReviveDBSucceeded";
    pub const REVIVE_DB_FAILED: &str = "ReviveDBFailed";
    /// Nothing to revive at the communal path
    pub const REVIVE_DB_NOT_FOUND: &str = "ReviveDBNotFound";
    /// Another cluster still holds the communal lease
    pub const REVIVE_DB_CLUSTER_IN_USE: &str = "ReviveDBClusterInUse";

    // Communal storage problems surfaced while initializing
    pub const S3_ENDPOINT_ISSUE: &str = "S3EndpointIssue";
    pub const S3_BUCKET_DOES_NOT_EXIST: &str = "S3BucketDoesNotExist";
    pub const COMMUNAL_PATH_IS_NOT_EMPTY: &str = "CommunalPathIsNotEmpty";
    pub const COMMUNAL_CREDS_NOT_FOUND: &str = "CommunalCredsNotFound";
    pub const COMMUNAL_CREDS_WRONG_KEY: &str = "CommunalCredsWrongKey";
}

/// Event action strings.
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RecordingEventPublisher>();
        assert_send_sync::<KubeEventPublisher>();
    }

    #[tokio::test]
    async fn recording_publisher_keeps_events_in_order() {
        let publisher = RecordingEventPublisher::new();
        let obj_ref = ObjectReference::default();
        publisher
            .publish(
                &obj_ref,
                EventType::Normal,
                reasons::CREATE_DB_START,
                "Calling 'admintools -t create_db'".to_string(),
            )
            .await;
        publisher
            .publish(
                &obj_ref,
                EventType::Warning,
                reasons::S3_BUCKET_DOES_NOT_EXIST,
                "The bucket in the S3 path 's3://b/p' does not exist".to_string(),
            )
            .await;

        let events = publisher.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, "CreateDBStart");
        assert_eq!(events[1].type_, EventType::Warning);
        assert_eq!(publisher.with_reason(reasons::S3_BUCKET_DOES_NOT_EXIST).len(), 1);
    }
}
