use super::init_db::{communal_storage_warning, subcluster_pod_list};
use super::{
    DatabaseInitializer, GenericDatabaseInitializer, ReconcileActor, ReconcileRequest,
    ReconcileResult,
};
use crate::classify::{classify, OutputCategory};
use crate::cmds::PodRunner;
use crate::credentials::SecretFetcher;
use crate::crds::{InitPolicy, Subcluster, VerticaDB};
use crate::error::{Error, Result};
use crate::events::{reasons, EventPublisher};
use crate::names::MemberName;
use crate::paths::{self, AUTH_PARMS_FILE, SERVER_CONTAINER};
use crate::podfacts::{PodFact, PodFacts};
use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::Resource;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Revives a database from communal storage when `initPolicy` is Revive.
pub struct ReviveDbReconciler<'a> {
    vdb: &'a VerticaDB,
    runner: &'a dyn PodRunner,
    pfacts: &'a PodFacts,
    events: &'a dyn EventPublisher,
    secrets: &'a dyn SecretFetcher,
    /// How long to wait before retrying when another cluster holds the lease.
    cluster_lease_wait: Duration,
}

impl<'a> ReviveDbReconciler<'a> {
    pub fn new(
        vdb: &'a VerticaDB,
        runner: &'a dyn PodRunner,
        pfacts: &'a PodFacts,
        events: &'a dyn EventPublisher,
        secrets: &'a dyn SecretFetcher,
        cluster_lease_wait: Duration,
    ) -> Self {
        Self {
            vdb,
            runner,
            pfacts,
            events,
            secrets,
            cluster_lease_wait,
        }
    }

    async fn publish(&self, type_: EventType, reason: &str, note: String) {
        self.events
            .publish(&self.vdb.object_ref(&()), type_, reason, note)
            .await;
    }
}

#[async_trait]
impl ReconcileActor for ReviveDbReconciler<'_> {
    fn name(&self) -> &'static str {
        "revive_db"
    }

    async fn reconcile(&self, _req: &ReconcileRequest) -> Result<ReconcileResult> {
        if self.vdb.spec.init_policy != InitPolicy::Revive {
            return Ok(ReconcileResult::Done);
        }
        GenericDatabaseInitializer::new(
            self,
            self.vdb,
            self.runner,
            self.pfacts,
            self.events,
            self.secrets,
        )
        .check_and_run_init()
        .await
    }
}

#[async_trait]
impl DatabaseInitializer for ReviveDbReconciler<'_> {
    /// Every pod of every subcluster; they all rejoin the revived database.
    fn get_pod_list(&self) -> Option<Vec<PodFact>> {
        let subclusters: Vec<&Subcluster> = self.vdb.spec.subclusters.iter().collect();
        subcluster_pod_list(self.vdb, self.pfacts, &subclusters)
    }

    async fn pre_cmd_setup(&self, _at_pod: &MemberName) -> Result<()> {
        Ok(())
    }

    fn gen_cmd(&self, host_list: &[String]) -> Vec<String> {
        let mut cmd = vec![
            "-t".to_string(),
            "revive_db".to_string(),
            format!("--hosts={}", host_list.join(",")),
            format!("--communal-storage-location={}", paths::communal_path(self.vdb)),
            format!("--communal-storage-params={AUTH_PARMS_FILE}"),
            "--database".to_string(),
            self.vdb.spec.db_name.clone(),
        ];
        if self.vdb.spec.ignore_cluster_lease {
            cmd.push("--ignore-cluster-lease".to_string());
        }
        cmd
    }

    fn additional_auth_parms(&self) -> String {
        String::new()
    }

    async fn exec_cmd(&self, at_pod: &MemberName, cmd: &[String]) -> Result<ReconcileResult> {
        self.publish(
            EventType::Normal,
            reasons::REVIVE_DB_START,
            "Calling 'admintools -t revive_db'".to_string(),
        )
        .await;
        let start = Instant::now();
        let outcome = self
            .runner
            .exec_admintools(at_pod, SERVER_CONTAINER, cmd)
            .await;

        let Some(err) = outcome.error else {
            let elapsed = start.elapsed();
            info!(pod = %at_pod, ?elapsed, "Revived database");
            self.publish(
                EventType::Normal,
                reasons::REVIVE_DB_SUCCEEDED,
                format!("Successfully revived database. It took {elapsed:?}"),
            )
            .await;
            return Ok(ReconcileResult::Done);
        };

        let category = classify(&outcome.stdout);
        if let Some((reason, note)) = communal_storage_warning(self.vdb, category) {
            warn!(pod = %at_pod, %category, "revive_db hit a communal storage issue");
            self.publish(EventType::Warning, reason, note).await;
            return Ok(ReconcileResult::RequeueNow);
        }
        match category {
            OutputCategory::DatabaseNotFound => {
                self.publish(
                    EventType::Warning,
                    reasons::REVIVE_DB_NOT_FOUND,
                    format!(
                        "Could not find database '{}' in communal path '{}'",
                        self.vdb.spec.db_name,
                        paths::communal_path(self.vdb)
                    ),
                )
                .await;
                Ok(ReconcileResult::RequeueNow)
            }
            OutputCategory::ClusterLeaseNotExpired => {
                self.publish(
                    EventType::Warning,
                    reasons::REVIVE_DB_CLUSTER_IN_USE,
                    format!(
                        "revive_db failed because the cluster lease has not expired for '{}'",
                        paths::communal_path(self.vdb)
                    ),
                )
                .await;
                Ok(ReconcileResult::RequeueAfter(self.cluster_lease_wait))
            }
            _ => {
                self.publish(
                    EventType::Warning,
                    reasons::REVIVE_DB_FAILED,
                    "Failed to revive the database".to_string(),
                )
                .await;
                Err(Error::command_failed(at_pod, err))
            }
        }
    }
}
