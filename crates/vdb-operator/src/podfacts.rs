//! Point-in-time snapshot of what each member pod looks like.
//!
//! A [`PodFacts`] is built from scratch at the start of every reconcile pass
//! and dropped when the pass ends. Nothing is carried over between passes: a
//! restarted pass re-probes instead of trusting a previous attempt.

use crate::cmds::PodRunner;
use crate::crds::VerticaDB;
use crate::error::Result;
use crate::names::{MemberName, ResourceNaming};
use crate::paths::{self, ADMINTOOLS_CONF, AGENT_BIN, SERVER_CONTAINER};
use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// An observed flag that may not have been probed yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tristate {
    #[default]
    Unknown,
    True,
    False,
}

impl Tristate {
    #[must_use]
    pub fn is_true(self) -> bool {
        self == Tristate::True
    }

    #[must_use]
    pub fn is_false(self) -> bool {
        self == Tristate::False
    }

    #[must_use]
    pub fn is_unknown(self) -> bool {
        self == Tristate::Unknown
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }
}

/// Address family of a pod's IP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IpFamily {
    #[default]
    Unknown,
    V4,
    V6,
}

impl IpFamily {
    #[must_use]
    pub fn of(ip: Option<&str>) -> Self {
        match ip.and_then(|ip| ip.parse::<IpAddr>().ok()) {
            Some(IpAddr::V4(_)) => IpFamily::V4,
            Some(IpAddr::V6(_)) => IpFamily::V6,
            None => IpFamily::Unknown,
        }
    }
}

/// Observed state of one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodFact {
    pub name: MemberName,
    pub subcluster: String,
    /// `nodeNNNN` name the pod has (or will have) in admintools.conf. Only
    /// used for ordering.
    pub compat21_node_name: String,
    pub running: bool,
    pub db_exists: Tristate,
    pub agent_running: Tristate,
    pub ip_family: IpFamily,
    pub pod_ip: Option<String>,
}

/// Snapshot of every member that could be probed this pass.
///
/// A member missing from the map could not be probed and must be treated as
/// not ready.
#[derive(Debug, Clone, Default)]
pub struct PodFacts {
    detail: BTreeMap<MemberName, PodFact>,
}

impl PodFacts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fact: PodFact) {
        self.detail.insert(fact.name.clone(), fact);
    }

    #[must_use]
    pub fn get(&self, name: &MemberName) -> Option<&PodFact> {
        self.detail.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &MemberName) -> Option<&mut PodFact> {
        self.detail.get_mut(name)
    }

    pub(crate) fn remove(&mut self, name: &MemberName) -> Option<PodFact> {
        self.detail.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PodFact> {
        self.detail.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detail.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detail.is_empty()
    }

    /// `True` if any member is already part of a database.
    #[must_use]
    pub fn any_db_exists(&self) -> bool {
        self.iter().any(|pf| pf.db_exists.is_true())
    }
}

/// What the API server says about a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodStatusSnapshot {
    /// Pod phase is Running and the server container is running.
    pub running: bool,
    pub pod_ip: Option<String>,
}

impl PodStatusSnapshot {
    #[must_use]
    pub fn from_pod(pod: &Pod) -> Self {
        let Some(status) = pod.status.as_ref() else {
            return Self::default();
        };
        let phase_running = status.phase.as_deref() == Some("Running");
        let container_running = status
            .container_statuses
            .as_ref()
            .and_then(|cs| cs.iter().find(|c| c.name == SERVER_CONTAINER))
            .and_then(|c| c.state.as_ref())
            .is_some_and(|s| s.running.is_some());
        Self {
            running: phase_running && container_running,
            pod_ip: status.pod_ip.clone(),
        }
    }
}

/// Looks up pods. `Ok(None)` means the pod does not exist.
#[async_trait]
pub trait PodLookup: Send + Sync {
    async fn get_pod(&self, name: &MemberName) -> Result<Option<PodStatusSnapshot>>;
}

/// Reads pods through the Kubernetes API.
#[derive(Clone)]
pub struct KubePodLookup {
    client: Client,
}

impl KubePodLookup {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodLookup for KubePodLookup {
    async fn get_pod(&self, name: &MemberName) -> Result<Option<PodStatusSnapshot>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &name.namespace);
        Ok(pods
            .get_opt(&name.name)
            .await?
            .map(|pod| PodStatusSnapshot::from_pod(&pod)))
    }
}

/// Pods kept in memory. Used by tests.
#[derive(Default)]
pub struct FakePodLookup {
    pods: Mutex<HashMap<MemberName, PodStatusSnapshot>>,
}

impl FakePodLookup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: MemberName, snapshot: PodStatusSnapshot) {
        self.pods
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name, snapshot);
    }
}

#[async_trait]
impl PodLookup for FakePodLookup {
    async fn get_pod(&self, name: &MemberName) -> Result<Option<PodStatusSnapshot>> {
        Ok(self
            .pods
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned())
    }
}

/// Output of the gather script run in each running pod.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
struct GatherOutput {
    db_exists: bool,
    agent_running: bool,
    #[serde(default)]
    compat21_node: Option<String>,
}

/// Shell script that reports the in-container facts as YAML.
fn gather_script(vdb: &VerticaDB, pod_ip: Option<&str>) -> String {
    let node_lookup = match pod_ip {
        Some(ip) => format!(
            "grep -E '^node[0-9]{{4}} = {ip},' {ADMINTOOLS_CONF} 2>/dev/null | head -1 | cut -d' ' -f1"
        ),
        None => "true".to_string(),
    };
    format!(
        "if ls -d {catalog} >/dev/null 2>&1; then echo 'db-exists: true'; else echo 'db-exists: false'; fi\n\
         if {AGENT_BIN} status >/dev/null 2>&1; then echo 'agent-running: true'; else echo 'agent-running: false'; fi\n\
         echo \"compat21-node: $({node_lookup})\"\n",
        catalog = paths::catalog_glob(vdb),
    )
}

fn parse_gather_output(stdout: &str) -> Result<GatherOutput> {
    let mut out: GatherOutput = serde_yaml::from_str(stdout)?;
    out.compat21_node = out.compat21_node.filter(|n| !n.trim().is_empty());
    Ok(out)
}

/// Builds a [`PodFacts`] by probing every member the spec expects.
pub struct PodFactsBuilder<'a> {
    lookup: &'a dyn PodLookup,
    runner: &'a dyn PodRunner,
    probe_timeout: Duration,
}

impl<'a> PodFactsBuilder<'a> {
    pub fn new(lookup: &'a dyn PodLookup, runner: &'a dyn PodRunner) -> Self {
        Self {
            lookup,
            runner,
            probe_timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Probe every expected member concurrently and wait for all of them.
    /// Members that cannot be probed are left out of the snapshot.
    #[instrument(skip_all, fields(vdb = %vdb.metadata.name.as_deref().unwrap_or_default()))]
    pub async fn collect(&self, vdb: &VerticaDB) -> PodFacts {
        let probes = ResourceNaming::expected_members(vdb)
            .into_iter()
            .map(|(position, sc, name)| async move {
                let probe = self.probe_member(vdb, &sc.name, position, &name);
                match tokio::time::timeout(self.probe_timeout, probe).await {
                    Ok(fact) => fact,
                    Err(_) => {
                        warn!(pod = %name, "Timed out probing pod");
                        None
                    }
                }
            });

        let mut facts = PodFacts::new();
        for fact in join_all(probes).await.into_iter().flatten() {
            facts.insert(fact);
        }
        info!(collected = facts.len(), "Collected pod facts");
        facts
    }

    async fn probe_member(
        &self,
        vdb: &VerticaDB,
        subcluster: &str,
        position: usize,
        name: &MemberName,
    ) -> Option<PodFact> {
        let snapshot = match self.lookup.get_pod(name).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(pod = %name, "Pod not found");
                return None;
            }
            Err(e) => {
                warn!(pod = %name, error = %e, "Failed to look up pod");
                return None;
            }
        };

        let mut fact = PodFact {
            name: name.clone(),
            subcluster: subcluster.to_string(),
            compat21_node_name: format!("node{:04}", position + 1),
            running: snapshot.running,
            db_exists: Tristate::Unknown,
            agent_running: Tristate::Unknown,
            ip_family: IpFamily::of(snapshot.pod_ip.as_deref()),
            pod_ip: snapshot.pod_ip,
        };
        if !fact.running {
            return Some(fact);
        }

        let script = gather_script(vdb, fact.pod_ip.as_deref());
        let command = vec!["bash".to_string(), "-c".to_string(), script];
        let stdout = match self
            .runner
            .exec_in_pod(name, SERVER_CONTAINER, &command)
            .await
            .into_result()
        {
            Ok(stdout) => stdout,
            Err(e) => {
                warn!(pod = %name, error = %e, "Failed to gather facts from pod");
                return None;
            }
        };
        let gathered = match parse_gather_output(&stdout) {
            Ok(gathered) => gathered,
            Err(e) => {
                warn!(pod = %name, error = %e, "Unparseable gather output");
                return None;
            }
        };

        fact.db_exists = gathered.db_exists.into();
        fact.agent_running = gathered.agent_running.into();
        if let Some(node) = gathered.compat21_node {
            fact.compat21_node_name = node;
        }
        Some(fact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::{ExecError, ExecOutcome, FakePodRunner};
    use crate::crds::Subcluster;
    use crate::test_utils::make_vdb;

    fn running(ip: &str) -> PodStatusSnapshot {
        PodStatusSnapshot {
            running: true,
            pod_ip: Some(ip.to_string()),
        }
    }

    #[test]
    fn tristate_from_bool() {
        assert_eq!(Tristate::from(true), Tristate::True);
        assert_eq!(Tristate::from(false), Tristate::False);
        assert!(Tristate::default().is_unknown());
        assert!(!Tristate::Unknown.is_false());
        assert!(!Tristate::Unknown.is_true());
    }

    #[test]
    fn ip_family_detection() {
        assert_eq!(IpFamily::of(Some("10.244.0.7")), IpFamily::V4);
        assert_eq!(IpFamily::of(Some("fd00:10:244::7")), IpFamily::V6);
        assert_eq!(IpFamily::of(Some("not-an-ip")), IpFamily::Unknown);
        assert_eq!(IpFamily::of(None), IpFamily::Unknown);
    }

    #[test]
    fn gather_output_parses_empty_node_as_none() {
        let out = parse_gather_output("db-exists: false\nagent-running: false\ncompat21-node: \n")
            .unwrap();
        assert_eq!(
            out,
            GatherOutput {
                db_exists: false,
                agent_running: false,
                compat21_node: None,
            }
        );

        let out =
            parse_gather_output("db-exists: true\nagent-running: true\ncompat21-node: node0003\n")
                .unwrap();
        assert_eq!(out.compat21_node.as_deref(), Some("node0003"));
    }

    #[test]
    fn gather_script_escapes_regex_braces() {
        let vdb = make_vdb();
        let script = gather_script(&vdb, Some("10.0.0.1"));
        assert!(script.contains("node[0-9]{4} = 10.0.0.1,"));
        assert!(script.contains("/data/vertdb/v_vertdb_node????_catalog"));
        assert!(script.contains("/opt/vertica/sbin/vertica_agent status"));
    }

    #[tokio::test]
    async fn collect_probes_running_pods_and_skips_missing_ones() {
        let mut vdb = make_vdb();
        vdb.spec.subclusters = vec![Subcluster::new("sc", 3)];
        let members: Vec<_> = ResourceNaming::expected_members(&vdb)
            .into_iter()
            .map(|(_, _, n)| n)
            .collect();

        let lookup = FakePodLookup::new();
        lookup.insert(members[0].clone(), running("10.0.0.1"));
        lookup.insert(
            members[1].clone(),
            PodStatusSnapshot {
                running: false,
                pod_ip: None,
            },
        );
        // members[2] was never created

        let runner = FakePodRunner::new();
        runner.push_result(
            &members[0],
            ExecOutcome::success("db-exists: true\nagent-running: false\ncompat21-node: node0007\n"),
        );

        let facts = PodFactsBuilder::new(&lookup, &runner).collect(&vdb).await;
        assert_eq!(facts.len(), 2);

        let first = facts.get(&members[0]).unwrap();
        assert!(first.running);
        assert_eq!(first.db_exists, Tristate::True);
        assert_eq!(first.agent_running, Tristate::False);
        assert_eq!(first.compat21_node_name, "node0007");
        assert_eq!(first.ip_family, IpFamily::V4);

        let second = facts.get(&members[1]).unwrap();
        assert!(!second.running);
        assert_eq!(second.db_exists, Tristate::Unknown);
        assert_eq!(second.compat21_node_name, "node0002");

        assert!(facts.get(&members[2]).is_none());
        // Only the running pod was exec'd into
        assert_eq!(runner.histories().len(), 1);
    }

    /// Hangs on one pod and reports a converged member everywhere else.
    struct HangingRunner {
        stuck: MemberName,
    }

    #[async_trait]
    impl PodRunner for HangingRunner {
        async fn exec_in_pod(
            &self,
            pod: &MemberName,
            _container: &str,
            _command: &[String],
        ) -> ExecOutcome {
            if *pod == self.stuck {
                futures::future::pending::<()>().await;
            }
            ExecOutcome::success("db-exists: true\nagent-running: true\ncompat21-node:\n")
        }
    }

    #[tokio::test]
    async fn hung_probe_times_out_without_holding_up_others() {
        let mut vdb = make_vdb();
        vdb.spec.subclusters = vec![Subcluster::new("sc", 3)];
        let members: Vec<_> = ResourceNaming::expected_members(&vdb)
            .into_iter()
            .map(|(_, _, n)| n)
            .collect();

        let lookup = FakePodLookup::new();
        for (i, name) in members.iter().enumerate() {
            lookup.insert(name.clone(), running(&format!("10.0.0.{}", i + 1)));
        }
        let runner = HangingRunner {
            stuck: members[1].clone(),
        };

        let facts = PodFactsBuilder::new(&lookup, &runner)
            .with_probe_timeout(Duration::from_millis(10))
            .collect(&vdb)
            .await;
        assert_eq!(facts.len(), 2);
        assert!(facts.get(&members[1]).is_none());
        assert!(facts.get(&members[0]).unwrap().db_exists.is_true());
        assert!(facts.get(&members[2]).unwrap().agent_running.is_true());
    }

    #[tokio::test]
    async fn probe_failure_leaves_member_out_without_aborting_others() {
        let mut vdb = make_vdb();
        vdb.spec.subclusters = vec![Subcluster::new("sc", 2)];
        let members: Vec<_> = ResourceNaming::expected_members(&vdb)
            .into_iter()
            .map(|(_, _, n)| n)
            .collect();

        let lookup = FakePodLookup::new();
        lookup.insert(members[0].clone(), running("10.0.0.1"));
        lookup.insert(members[1].clone(), running("10.0.0.2"));

        let runner = FakePodRunner::new();
        runner.push_result(
            &members[0],
            ExecOutcome::failure("", ExecError::Transport("connection reset".to_string())),
        );
        runner.push_result(
            &members[1],
            ExecOutcome::success("db-exists: false\nagent-running: false\ncompat21-node:\n"),
        );

        let facts = PodFactsBuilder::new(&lookup, &runner).collect(&vdb).await;
        assert_eq!(facts.len(), 1);
        let fact = facts.get(&members[1]).unwrap();
        assert_eq!(fact.db_exists, Tristate::False);
        assert_eq!(fact.compat21_node_name, "node0002");
        assert!(!facts.any_db_exists());
    }
}
