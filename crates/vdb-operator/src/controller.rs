//! kube-runtime controller for `VerticaDB`.

use crate::cmds::{KubePodRunner, PodRunner};
use crate::config::OperatorConfig;
use crate::credentials::{KubeSecretFetcher, SecretFetcher};
use crate::crds::VerticaDB;
use crate::error::{Error, Result};
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::podfacts::{KubePodLookup, PodLookup};
use crate::reconcile::{ReconcilePass, ReconcileResult};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tracing::{error, info, instrument, Instrument};

/// Shared state handed to every reconcile pass.
pub struct Context {
    pub config: Arc<OperatorConfig>,
    pub runner: Arc<dyn PodRunner>,
    pub lookup: Arc<dyn PodLookup>,
    pub secrets: Arc<dyn SecretFetcher>,
    pub events: Arc<dyn EventPublisher>,
}

impl Context {
    /// Context backed by the Kubernetes API.
    pub fn for_client(client: Client, config: OperatorConfig) -> Self {
        let events = KubeEventPublisher::new(client.clone(), &config.controller_name);
        Self {
            config: Arc::new(config),
            runner: Arc::new(KubePodRunner::new(client.clone())),
            lookup: Arc::new(KubePodLookup::new(client.clone())),
            secrets: Arc::new(KubeSecretFetcher::new(client)),
            events: Arc::new(events),
        }
    }
}

/// Translate the outcome of a pass into the controller's next action.
/// A converged pass is still revisited after the resync period.
pub fn action_for(result: ReconcileResult, config: &OperatorConfig) -> Action {
    match result {
        ReconcileResult::Done => Action::requeue(config.resync()),
        ReconcileResult::RequeueNow => Action::requeue(config.requeue_now()),
        ReconcileResult::RequeueAfter(delay) => Action::requeue(delay),
    }
}

/// One reconcile pass for a VerticaDB.
#[instrument(skip(vdb, ctx), fields(name = %vdb.name_any(), namespace = ?vdb.namespace()))]
pub async fn reconcile_vdb(vdb: Arc<VerticaDB>, ctx: Arc<Context>) -> Result<Action> {
    let pass = ReconcilePass {
        vdb: &vdb,
        runner: ctx.runner.as_ref(),
        lookup: ctx.lookup.as_ref(),
        events: ctx.events.as_ref(),
        secrets: ctx.secrets.as_ref(),
        config: &ctx.config,
    };
    let result = pass.run().await?;
    info!(?result, "Reconcile pass finished");
    Ok(action_for(result, &ctx.config))
}

/// Requeue after the configured backoff on any error.
pub fn error_policy(vdb: Arc<VerticaDB>, err: &Error, ctx: Arc<Context>) -> Action {
    error!(
        error = %err,
        name = %vdb.name_any(),
        "VerticaDB reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue())
}

/// Watch VerticaDBs (and the statefulsets they own) until the stream ends.
/// With no namespace every namespace is watched.
#[instrument(skip(client, config))]
pub async fn run_controller(
    client: Client,
    namespace: Option<String>,
    config: OperatorConfig,
) -> Result<()> {
    let (vdbs, statefulsets): (Api<VerticaDB>, Api<StatefulSet>) = match namespace.as_deref() {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };
    let context = Arc::new(Context::for_client(client, config));
    let watcher_config = Config::default().any_semantic();

    info!("Starting VerticaDB controller");
    Controller::new(vdbs, watcher_config.clone())
        .owns(statefulsets, watcher_config)
        .run(reconcile_vdb, error_policy, context)
        .for_each(|reconciliation_result| {
            let span = tracing::info_span!("vdb_reconciliation_result");
            async move {
                match reconciliation_result {
                    Ok(obj) => info!(resource = ?obj, "VerticaDB reconciliation successful"),
                    Err(e) => error!(error = ?e, "VerticaDB reconciliation error"),
                }
            }
            .instrument(span)
        })
        .await;

    info!("VerticaDB controller shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::FakePodRunner;
    use crate::credentials::InMemorySecretFetcher;
    use crate::events::RecordingEventPublisher;
    use crate::podfacts::FakePodLookup;
    use crate::test_utils::make_vdb;
    use std::time::Duration;

    fn fake_context() -> Arc<Context> {
        Arc::new(Context {
            config: Arc::new(OperatorConfig::default()),
            runner: Arc::new(FakePodRunner::new()),
            lookup: Arc::new(FakePodLookup::new()),
            secrets: Arc::new(InMemorySecretFetcher::new()),
            events: Arc::new(RecordingEventPublisher::new()),
        })
    }

    #[test]
    fn results_map_to_actions() {
        let config = OperatorConfig {
            requeue_now_seconds: 2,
            resync_seconds: 120,
            ..OperatorConfig::default()
        };
        assert_eq!(
            action_for(ReconcileResult::Done, &config),
            Action::requeue(Duration::from_secs(120))
        );
        assert_eq!(
            action_for(ReconcileResult::RequeueNow, &config),
            Action::requeue(Duration::from_secs(2))
        );
        assert_eq!(
            action_for(
                ReconcileResult::RequeueAfter(Duration::from_secs(90)),
                &config
            ),
            Action::requeue(Duration::from_secs(90))
        );
    }

    #[test]
    fn error_policy_uses_configured_backoff() {
        let action = error_policy(
            Arc::new(make_vdb()),
            &Error::MissingObjectKey,
            fake_context(),
        );
        assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn no_pods_yet_requeues() {
        // Nothing can be probed, so create_db fails closed
        let action = reconcile_vdb(Arc::new(make_vdb()), fake_context())
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn vdb_without_namespace_is_an_error() {
        let mut vdb = make_vdb();
        vdb.metadata.namespace = None;
        let result = reconcile_vdb(Arc::new(vdb), fake_context()).await;
        assert!(matches!(result, Err(Error::MissingObjectKey)));
    }
}
