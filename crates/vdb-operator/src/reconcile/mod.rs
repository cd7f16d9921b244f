//! Reconcile actors and the pipeline that runs them.
//!
//! One pass = build a fresh [`PodFacts`], then run each actor in order until
//! one of them asks for a requeue or fails. Later actors rely on earlier ones
//! having converged, so the order in [`ReconcilePass::pipeline`] matters.

pub mod agent;
pub mod create_db;
pub mod init_db;
pub mod revive_db;

use crate::cmds::PodRunner;
use crate::config::OperatorConfig;
use crate::credentials::SecretFetcher;
use crate::crds::VerticaDB;
use crate::error::{Error, Result};
use crate::events::EventPublisher;
use crate::podfacts::{PodFacts, PodFactsBuilder, PodLookup};
use async_trait::async_trait;
use kube::ResourceExt;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};

pub use agent::AgentReconciler;
pub use create_db::CreateDbReconciler;
pub use init_db::{DatabaseInitializer, GenericDatabaseInitializer};
pub use revive_db::ReviveDbReconciler;

/// What an actor wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Converged; the next actor may run.
    Done,
    /// Stop this pass and run another one right away.
    RequeueNow,
    /// Stop this pass and run another one after the delay.
    RequeueAfter(Duration),
}

impl ReconcileResult {
    #[must_use]
    pub fn is_done(self) -> bool {
        self == ReconcileResult::Done
    }

    /// Whether another pass is wanted.
    #[must_use]
    pub fn requeue(self) -> bool {
        !self.is_done()
    }

    /// Delay before the next pass; zero unless `RequeueAfter`.
    #[must_use]
    pub fn requeue_after(self) -> Duration {
        match self {
            ReconcileResult::RequeueAfter(delay) => delay,
            ReconcileResult::Done | ReconcileResult::RequeueNow => Duration::ZERO,
        }
    }
}

/// Identity of the VerticaDB a pass is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub namespace: String,
    pub name: String,
}

impl ReconcileRequest {
    pub fn for_vdb(vdb: &VerticaDB) -> Result<Self> {
        Ok(Self {
            namespace: vdb.namespace().ok_or(Error::MissingObjectKey)?,
            name: vdb.metadata.name.clone().ok_or(Error::MissingObjectKey)?,
        })
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One idempotent reconcile step.
///
/// Invoking an actor again with unchanged cluster state and pod facts must
/// not issue side-effecting commands beyond what the first call found
/// necessary.
#[async_trait]
pub trait ReconcileActor: Send + Sync {
    /// Name used for the actor's tracing span.
    fn name(&self) -> &'static str;

    async fn reconcile(&self, req: &ReconcileRequest) -> Result<ReconcileResult>;
}

/// Ordered list of actors that short-circuits on the first non-`Done` result.
#[derive(Default)]
pub struct ReconcilePipeline<'a> {
    actors: Vec<Box<dyn ReconcileActor + 'a>>,
}

impl<'a> ReconcilePipeline<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self { actors: Vec::new() }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl ReconcileActor + 'a) -> Self {
        self.actors.push(Box::new(actor));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Run the actors in order. The first requeue or error is returned as is.
    pub async fn run(&self, req: &ReconcileRequest) -> Result<ReconcileResult> {
        for actor in &self.actors {
            let span = info_span!("actor", actor = actor.name(), vdb = %req);
            match actor.reconcile(req).instrument(span).await {
                Ok(ReconcileResult::Done) => {}
                Ok(result) => {
                    info!(actor = actor.name(), result = ?result, "Actor requested requeue");
                    return Ok(result);
                }
                Err(e) => {
                    error!(actor = actor.name(), error = %e, "Actor failed");
                    return Err(e);
                }
            }
        }
        Ok(ReconcileResult::Done)
    }
}

/// Everything a pass needs, borrowed for its duration.
pub struct ReconcilePass<'a> {
    pub vdb: &'a VerticaDB,
    pub runner: &'a dyn PodRunner,
    pub lookup: &'a dyn PodLookup,
    pub events: &'a dyn EventPublisher,
    pub secrets: &'a dyn SecretFetcher,
    pub config: &'a OperatorConfig,
}

impl<'a> ReconcilePass<'a> {
    /// Probe every member and assemble this pass's snapshot.
    pub async fn collect_pod_facts(&self) -> PodFacts {
        PodFactsBuilder::new(self.lookup, self.runner)
            .with_probe_timeout(self.config.probe_timeout())
            .collect(self.vdb)
            .await
    }

    /// The actors of a pass, in the order they must run.
    pub fn pipeline<'p>(&'p self, pfacts: &'p PodFacts) -> ReconcilePipeline<'p> {
        ReconcilePipeline::new()
            .with_actor(CreateDbReconciler::new(
                self.vdb,
                self.runner,
                pfacts,
                self.events,
                self.secrets,
            ))
            .with_actor(ReviveDbReconciler::new(
                self.vdb,
                self.runner,
                pfacts,
                self.events,
                self.secrets,
                self.config.cluster_lease_wait(),
            ))
            .with_actor(AgentReconciler::new(self.vdb, self.runner, pfacts))
    }

    /// Run one full pass against a fresh snapshot.
    pub async fn run(&self) -> Result<ReconcileResult> {
        let req = ReconcileRequest::for_vdb(self.vdb)?;
        let pfacts = self.collect_pod_facts().await;
        // Bound so the pipeline is dropped before pfacts
        let result = self.pipeline(&pfacts).run(&req).await;
        result
    }
}
