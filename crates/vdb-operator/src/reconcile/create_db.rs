use super::init_db::{communal_storage_warning, subcluster_pod_list};
use super::{
    DatabaseInitializer, GenericDatabaseInitializer, ReconcileActor, ReconcileRequest,
    ReconcileResult,
};
use crate::classify::classify;
use crate::cmds::{write_file_command, PodRunner};
use crate::credentials::SecretFetcher;
use crate::crds::{InitPolicy, KSafety, VerticaDB};
use crate::error::{Error, Result};
use crate::events::{reasons, EventPublisher};
use crate::names::MemberName;
use crate::paths::{self, AUTH_PARMS_FILE, POST_DB_CREATE_SQL_FILE, SERVER_CONTAINER};
use crate::podfacts::{PodFact, PodFacts};
use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::Resource;
use std::time::Instant;
use tracing::{info, warn};

// Lowered for the duration of create_db so an unreachable endpoint fails
// fast. The post-create SQL clears them again.
const TEMP_AWS_CONNECT_TIMEOUT: &str = "20";
const TEMP_AWS_MAX_RETRY_COUNT: &str = "3";

/// Creates the database in the first subcluster when `initPolicy` is Create.
pub struct CreateDbReconciler<'a> {
    vdb: &'a VerticaDB,
    runner: &'a dyn PodRunner,
    pfacts: &'a PodFacts,
    events: &'a dyn EventPublisher,
    secrets: &'a dyn SecretFetcher,
}

impl<'a> CreateDbReconciler<'a> {
    pub fn new(
        vdb: &'a VerticaDB,
        runner: &'a dyn PodRunner,
        pfacts: &'a PodFacts,
        events: &'a dyn EventPublisher,
        secrets: &'a dyn SecretFetcher,
    ) -> Self {
        Self {
            vdb,
            runner,
            pfacts,
            events,
            secrets,
        }
    }

    fn first_subcluster_name(&self) -> &str {
        self.vdb
            .spec
            .first_subcluster()
            .map_or("", |sc| sc.name.as_str())
    }

    /// SQL handed to create_db with `--sql`.
    fn post_create_sql(&self) -> String {
        let mut sql = format!(
            "alter database default clear AWSConnectTimeout;\n\
             alter database default clear AWSMaxRetryCount;\n\
             alter subcluster default_subcluster rename to {};\n",
            self.first_subcluster_name()
        );
        if self.vdb.spec.k_safety == KSafety::KSafety0 {
            sql.push_str("select set_preferred_ksafe(0);\n");
        }
        sql
    }

    async fn publish(&self, type_: EventType, reason: &str, note: String) {
        self.events
            .publish(&self.vdb.object_ref(&()), type_, reason, note)
            .await;
    }
}

#[async_trait]
impl ReconcileActor for CreateDbReconciler<'_> {
    fn name(&self) -> &'static str {
        "create_db"
    }

    async fn reconcile(&self, _req: &ReconcileRequest) -> Result<ReconcileResult> {
        if self.vdb.spec.init_policy != InitPolicy::Create {
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
impl DatabaseInitializer for CreateDbReconciler<'_> {
    /// Every pod of the first subcluster. With k-safety 0 only the first one;
    /// the rest are added to the database later.
    fn get_pod_list(&self) -> Option<Vec<PodFact>> {
        let sc = self.vdb.spec.first_subcluster()?;
        let mut pods = subcluster_pod_list(self.vdb, self.pfacts, &[sc])?;
        if self.vdb.spec.k_safety == KSafety::KSafety0 {
            pods.truncate(1);
        }
        Some(pods)
    }

    async fn pre_cmd_setup(&self, at_pod: &MemberName) -> Result<()> {
        let cmd = write_file_command(POST_DB_CREATE_SQL_FILE, &self.post_create_sql());
        self.runner
            .exec_in_pod(at_pod, SERVER_CONTAINER, &cmd)
            .await
            .into_result()
            .map_err(|e| Error::command_failed(at_pod, e))?;
        Ok(())
    }

    fn gen_cmd(&self, host_list: &[String]) -> Vec<String> {
        vec![
            "-t".to_string(),
            "create_db".to_string(),
            "--skip-fs-checks".to_string(),
            format!("--hosts={}", host_list.join(",")),
            format!("--communal-storage-location={}", paths::communal_path(self.vdb)),
            format!("--communal-storage-params={AUTH_PARMS_FILE}"),
            format!("--sql={POST_DB_CREATE_SQL_FILE}"),
            format!("--shard-count={}", self.vdb.spec.shard_count),
            format!("--depot-path={}", self.vdb.spec.local.depot_path),
            "--database".to_string(),
            self.vdb.spec.db_name.clone(),
            "--force-cleanup-on-failure".to_string(),
            "--noprompt".to_string(),
        ]
    }

    fn additional_auth_parms(&self) -> String {
        format!(
            "AWSConnectTimeout = {TEMP_AWS_CONNECT_TIMEOUT}\nAWSMaxRetryCount = {TEMP_AWS_MAX_RETRY_COUNT}\n"
        )
    }

    async fn exec_cmd(&self, at_pod: &MemberName, cmd: &[String]) -> Result<ReconcileResult> {
        self.publish(
            EventType::Normal,
            reasons::CREATE_DB_START,
            "Calling 'admintools -t create_db'".to_string(),
        )
        .await;
        let start = Instant::now();
        let outcome = self
            .runner
            .exec_admintools(at_pod, SERVER_CONTAINER, cmd)
            .await;

        if let Some(err) = outcome.error {
            let category = classify(&outcome.stdout);
            if let Some((reason, note)) = communal_storage_warning(self.vdb, category) {
                warn!(pod = %at_pod, %category, "create_db hit a communal storage issue");
                self.publish(EventType::Warning, reason, note).await;
                return Ok(ReconcileResult::RequeueNow);
            }
            self.publish(
                EventType::Warning,
                reasons::CREATE_DB_FAILED,
                "Failed to create the database".to_string(),
            )
            .await;
            return Err(Error::command_failed(at_pod, err));
        }

        let elapsed = start.elapsed();
        info!(pod = %at_pod, ?elapsed, "Created database");
        self.publish(
            EventType::Normal,
            reasons::CREATE_DB_SUCCEEDED,
            format!(
                "Successfully created database with subcluster '{}'. It took {elapsed:?}",
                self.first_subcluster_name()
            ),
        )
        .await;
        Ok(ReconcileResult::Done)
    }
}
