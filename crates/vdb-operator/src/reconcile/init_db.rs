//! Shared workflow for bringing a database into existence.
//!
//! Create and revive differ only in which members take part, what is staged
//! before the call, the admintools command line and how its output is
//! interpreted. Those five steps make up [`DatabaseInitializer`]; everything
//! else (existence check, credentials, the auth-parameter file) lives in
//! [`GenericDatabaseInitializer`].

use super::ReconcileResult;
use crate::classify::OutputCategory;
use crate::cmds::{write_file_command, PodRunner};
use crate::credentials::{CommunalCredentials, CredentialLookup, SecretFetcher};
use crate::crds::{Subcluster, VerticaDB};
use crate::error::{Error, Result};
use crate::events::{reasons, EventPublisher};
use crate::names::{MemberName, ResourceNaming};
use crate::paths::{self, AUTH_PARMS_FILE, SERVER_CONTAINER};
use crate::podfacts::{PodFact, PodFacts};
use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::Resource;
use tracing::{info, instrument, warn};

/// The strategy half of database initialization.
#[async_trait]
pub trait DatabaseInitializer: Send + Sync {
    /// Members taking part in the call, ordered by compat21 node name.
    /// `None` when a member the call needs is not in the pod facts.
    fn get_pod_list(&self) -> Option<Vec<PodFact>>;

    /// Stage whatever the command needs in `at_pod`.
    async fn pre_cmd_setup(&self, at_pod: &MemberName) -> Result<()>;

    /// Admintools arguments for the given host list.
    fn gen_cmd(&self, host_list: &[String]) -> Vec<String>;

    /// Extra lines appended to the auth-parameter file for this call only.
    fn additional_auth_parms(&self) -> String;

    /// Run the command and turn its outcome into a reconcile result.
    async fn exec_cmd(&self, at_pod: &MemberName, cmd: &[String]) -> Result<ReconcileResult>;
}

pub struct GenericDatabaseInitializer<'a> {
    initializer: &'a dyn DatabaseInitializer,
    vdb: &'a VerticaDB,
    runner: &'a dyn PodRunner,
    pfacts: &'a PodFacts,
    events: &'a dyn EventPublisher,
    secrets: &'a dyn SecretFetcher,
}

impl<'a> GenericDatabaseInitializer<'a> {
    pub fn new(
        initializer: &'a dyn DatabaseInitializer,
        vdb: &'a VerticaDB,
        runner: &'a dyn PodRunner,
        pfacts: &'a PodFacts,
        events: &'a dyn EventPublisher,
        secrets: &'a dyn SecretFetcher,
    ) -> Self {
        Self {
            initializer,
            vdb,
            runner,
            pfacts,
            events,
            secrets,
        }
    }

    /// Initialize the database unless some member already has one.
    #[instrument(skip_all, fields(db = %self.vdb.spec.db_name))]
    pub async fn check_and_run_init(&self) -> Result<ReconcileResult> {
        if self.pfacts.any_db_exists() {
            info!("Database already exists, skipping initialization");
            return Ok(ReconcileResult::Done);
        }
        self.run_init().await
    }

    async fn run_init(&self) -> Result<ReconcileResult> {
        let Some(pods) = self.initializer.get_pod_list() else {
            info!("Not all pods are in the pod facts yet, requeueing");
            return Ok(ReconcileResult::RequeueNow);
        };
        let Some(host_list) = ready_host_list(&pods) else {
            info!("Not all selected pods are running with an IP, requeueing");
            return Ok(ReconcileResult::RequeueNow);
        };
        let at_pod = &pods[0].name;

        let Some(creds) = self.fetch_credentials().await? else {
            return Ok(ReconcileResult::RequeueNow);
        };

        self.initializer.pre_cmd_setup(at_pod).await?;

        // A write that fails partway can still leave credentials behind, so
        // the file is removed whenever a write was attempted.
        let result = match self.create_auth_parms_file(at_pod, &creds).await {
            Ok(()) => {
                let cmd = self.initializer.gen_cmd(&host_list);
                self.initializer.exec_cmd(at_pod, &cmd).await
            }
            Err(e) => Err(e),
        };

        self.remove_auth_parms_file(at_pod).await;
        result
    }

    /// `Ok(None)` after a warning event when the secret or one of its keys is
    /// missing.
    async fn fetch_credentials(&self) -> Result<Option<CommunalCredentials>> {
        let secret_name = ResourceNaming::communal_credential_secret(self.vdb);
        let data = self.secrets.fetch(&secret_name).await?;
        match CredentialLookup::from_secret_data(data) {
            CredentialLookup::Found(creds) => Ok(Some(creds)),
            CredentialLookup::SecretNotFound => {
                self.publish(
                    EventType::Warning,
                    reasons::COMMUNAL_CREDS_NOT_FOUND,
                    format!("Could not find the communal credential secret '{}'", secret_name.name),
                )
                .await;
                Ok(None)
            }
            CredentialLookup::MissingKey(key) => {
                self.publish(
                    EventType::Warning,
                    reasons::COMMUNAL_CREDS_WRONG_KEY,
                    format!(
                        "The communal credential secret '{}' does not have a key named '{key}'",
                        secret_name.name
                    ),
                )
                .await;
                Ok(None)
            }
        }
    }

    async fn create_auth_parms_file(
        &self,
        at_pod: &MemberName,
        creds: &CommunalCredentials,
    ) -> Result<()> {
        let content = construct_auth_parms(
            self.vdb,
            creds,
            &self.initializer.additional_auth_parms(),
        );
        self.runner
            .exec_in_pod(
                at_pod,
                SERVER_CONTAINER,
                &write_file_command(AUTH_PARMS_FILE, &content),
            )
            .await
            .into_result()
            .map_err(|e| Error::command_failed(at_pod, e))?;
        Ok(())
    }

    async fn remove_auth_parms_file(&self, at_pod: &MemberName) {
        let cmd = vec!["rm".to_string(), AUTH_PARMS_FILE.to_string()];
        if let Err(e) = self
            .runner
            .exec_in_pod(at_pod, SERVER_CONTAINER, &cmd)
            .await
            .into_result()
        {
            warn!(pod = %at_pod, error = %e, "Failed to remove auth parms file");
        }
    }

    async fn publish(&self, type_: EventType, reason: &str, note: String) {
        self.events
            .publish(&self.vdb.object_ref(&()), type_, reason, note)
            .await;
    }
}

/// Pod IPs of `pods`, or `None` if any of them is not running or has no IP.
fn ready_host_list(pods: &[PodFact]) -> Option<Vec<String>> {
    if pods.is_empty() {
        return None;
    }
    pods.iter()
        .map(|pf| if pf.running { pf.pod_ip.clone() } else { None })
        .collect()
}

/// Contents of the auth-parameter file handed to admintools.
pub fn construct_auth_parms(vdb: &VerticaDB, creds: &CommunalCredentials, extra: &str) -> String {
    let endpoint = &vdb.spec.communal.endpoint;
    let (host, https) = if let Some(rest) = endpoint.strip_prefix("http://") {
        (rest, "0")
    } else {
        (endpoint.strip_prefix("https://").unwrap_or(endpoint), "1")
    };
    format!(
        "awsauth = {}:{}\nawsendpoint = {host}\nawsenablehttps = {https}\n{extra}",
        creds.access_key, creds.secret_key
    )
}

/// Pod facts for every pod of `sc`, sorted by compat21 node name. `None` if
/// any of them is missing.
///
/// admintools assigns node numbers in host-list order and restart_db expects
/// them to match the compat21 names, so the sort is required.
pub fn subcluster_pod_list(
    vdb: &VerticaDB,
    pfacts: &PodFacts,
    subclusters: &[&Subcluster],
) -> Option<Vec<PodFact>> {
    let mut pods = Vec::new();
    for sc in subclusters {
        for i in 0..sc.size.max(0) {
            let name = ResourceNaming::pod_name(vdb, sc, i);
            pods.push(pfacts.get(&name)?.clone());
        }
    }
    pods.sort_by(|a, b| a.compat21_node_name.cmp(&b.compat21_node_name));
    Some(pods)
}

/// Warning event for the communal storage failures both strategies retry
/// on, as `(reason, note)`.
pub fn communal_storage_warning(
    vdb: &VerticaDB,
    category: OutputCategory,
) -> Option<(&'static str, String)> {
    match category {
        OutputCategory::EndpointUnreachable => Some((
            reasons::S3_ENDPOINT_ISSUE,
            format!(
                "Unable to write to the bucket in the S3 endpoint '{}'",
                vdb.spec.communal.endpoint
            ),
        )),
        OutputCategory::BucketMissing => Some((
            reasons::S3_BUCKET_DOES_NOT_EXIST,
            format!(
                "The bucket in the S3 path '{}' does not exist",
                paths::communal_path(vdb)
            ),
        )),
        OutputCategory::CommunalPathNotEmpty => Some((
            reasons::COMMUNAL_PATH_IS_NOT_EMPTY,
            format!("The communal path '{}' is not empty", paths::communal_path(vdb)),
        )),
        _ => None,
    }
}
