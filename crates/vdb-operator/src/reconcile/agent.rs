use super::{ReconcileActor, ReconcileRequest, ReconcileResult};
use crate::cmds::PodRunner;
use crate::crds::VerticaDB;
use crate::error::Result;
use crate::paths::{AGENT_BIN, SERVER_CONTAINER};
use crate::podfacts::{IpFamily, PodFact, PodFacts};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

/// Starts the management agent on members that are part of the database.
pub struct AgentReconciler<'a> {
    vdb: &'a VerticaDB,
    runner: &'a dyn PodRunner,
    pfacts: &'a PodFacts,
}

impl<'a> AgentReconciler<'a> {
    pub fn new(vdb: &'a VerticaDB, runner: &'a dyn PodRunner, pfacts: &'a PodFacts) -> Self {
        Self {
            vdb,
            runner,
            pfacts,
        }
    }

    /// A member needs the agent started when it is running, is not known to
    /// be outside the database, and the agent is not known to be up.
    /// IPv6 members are never started.
    fn needs_agent(pf: &PodFact) -> bool {
        pf.running
            && !pf.db_exists.is_false()
            && !pf.agent_running.is_true()
            && pf.ip_family != IpFamily::V6
    }
}

#[async_trait]
impl ReconcileActor for AgentReconciler<'_> {
    fn name(&self) -> &'static str {
        "agent"
    }

    #[instrument(skip_all, fields(db = %self.vdb.spec.db_name))]
    async fn reconcile(&self, _req: &ReconcileRequest) -> Result<ReconcileResult> {
        let command = vec![AGENT_BIN.to_string(), "start".to_string()];
        for pf in self.pfacts.iter() {
            if !Self::needs_agent(pf) {
                debug!(pod = %pf.name, "Skipping agent start");
                continue;
            }
            let outcome = self
                .runner
                .exec_in_pod(&pf.name, SERVER_CONTAINER, &command)
                .await;
            match outcome.into_result() {
                Ok(_) => info!(pod = %pf.name, "Started agent"),
                // Not fatal; the next pass will see the agent still down.
                Err(e) => warn!(pod = %pf.name, error = %e, "Failed to start agent"),
            }
        }
        Ok(ReconcileResult::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::{ExecError, ExecOutcome, FakePodRunner};
    use crate::names::ResourceNaming;
    use crate::podfacts::Tristate;
    use crate::test_utils::{make_pod_facts, make_vdb};

    fn req() -> ReconcileRequest {
        ReconcileRequest {
            namespace: "default".to_string(),
            name: "vertica-sample".to_string(),
        }
    }

    async fn reconcile_and_find_agent_start(vdb: &VerticaDB, pfacts: &PodFacts) -> usize {
        let runner = FakePodRunner::new();
        let actor = AgentReconciler::new(vdb, &runner, pfacts);
        assert_eq!(
            actor.reconcile(&req()).await.unwrap(),
            ReconcileResult::Done
        );
        runner.find_commands(&[AGENT_BIN, "start"]).len()
    }

    #[tokio::test]
    async fn starts_agent_when_not_running() {
        let mut vdb = make_vdb();
        vdb.spec.subclusters[0].size = 2;
        let pfacts = make_pod_facts(&vdb);

        assert_eq!(reconcile_and_find_agent_start(&vdb, &pfacts).await, 2);
    }

    #[tokio::test]
    async fn skips_ipv6_members() {
        let mut vdb = make_vdb();
        vdb.spec.subclusters[0].size = 3;
        let mut pfacts = make_pod_facts(&vdb);
        for (i, (_, _, name)) in ResourceNaming::expected_members(&vdb).iter().enumerate() {
            let pf = pfacts.get_mut(name).unwrap();
            pf.pod_ip = Some(format!("fd00:10:244::{}", i + 1));
            pf.ip_family = IpFamily::V6;
        }

        assert_eq!(reconcile_and_find_agent_start(&vdb, &pfacts).await, 0);
    }

    #[tokio::test]
    async fn skips_members_outside_the_database() {
        let mut vdb = make_vdb();
        vdb.spec.subclusters[0].size = 1;
        let mut pfacts = make_pod_facts(&vdb);
        let name = ResourceNaming::pod_name(&vdb, &vdb.spec.subclusters[0], 0);
        pfacts.get_mut(&name).unwrap().db_exists = Tristate::False;

        assert_eq!(reconcile_and_find_agent_start(&vdb, &pfacts).await, 0);
    }

    #[tokio::test]
    async fn unknown_db_state_still_starts_agent() {
        let mut vdb = make_vdb();
        vdb.spec.subclusters[0].size = 2;
        let mut pfacts = make_pod_facts(&vdb);
        let first = ResourceNaming::pod_name(&vdb, &vdb.spec.subclusters[0], 0);
        let second = ResourceNaming::pod_name(&vdb, &vdb.spec.subclusters[0], 1);
        pfacts.get_mut(&first).unwrap().db_exists = Tristate::Unknown;
        pfacts.get_mut(&second).unwrap().agent_running = Tristate::True;

        assert_eq!(reconcile_and_find_agent_start(&vdb, &pfacts).await, 1);
    }

    #[tokio::test]
    async fn start_failure_is_not_fatal() {
        let mut vdb = make_vdb();
        vdb.spec.subclusters[0].size = 2;
        let pfacts = make_pod_facts(&vdb);
        let first = ResourceNaming::pod_name(&vdb, &vdb.spec.subclusters[0], 0);

        let runner = FakePodRunner::new();
        runner.push_result(
            &first,
            ExecOutcome::failure(
                "",
                ExecError::NonZeroExit {
                    code: Some(1),
                    message: "agent failed".to_string(),
                },
            ),
        );
        let actor = AgentReconciler::new(&vdb, &runner, &pfacts);

        assert_eq!(
            actor.reconcile(&req()).await.unwrap(),
            ReconcileResult::Done
        );
        assert_eq!(runner.find_commands(&[AGENT_BIN, "start"]).len(), 2);
    }
}
