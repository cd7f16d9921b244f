//! In-memory [`PodRunner`] that records every invocation.
//!
//! Results are queued per pod and handed out in order. A pod with no queued
//! result gets an empty successful outcome.

use super::{ExecOutcome, PodRunner};
use crate::names::MemberName;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdHistory {
    pub pod: MemberName,
    pub container: String,
    pub command: Vec<String>,
}

#[derive(Default)]
pub struct FakePodRunner {
    histories: Mutex<Vec<CmdHistory>>,
    results: Mutex<HashMap<MemberName, VecDeque<ExecOutcome>>>,
}

impl FakePodRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next command run in `pod`.
    pub fn push_result(&self, pod: &MemberName, outcome: ExecOutcome) {
        self.results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(pod.clone())
            .or_default()
            .push_back(outcome);
    }

    /// Every command run so far, in call order.
    pub fn histories(&self) -> Vec<CmdHistory> {
        self.histories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Commands whose space-joined argv contains the space-joined `partial`.
    pub fn find_commands(&self, partial: &[&str]) -> Vec<CmdHistory> {
        let needle = partial.join(" ");
        self.histories()
            .into_iter()
            .filter(|h| h.command.join(" ").contains(&needle))
            .collect()
    }

    pub fn clear_histories(&self) {
        self.histories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl PodRunner for FakePodRunner {
    async fn exec_in_pod(
        &self,
        pod: &MemberName,
        container: &str,
        command: &[String],
    ) -> ExecOutcome {
        self.histories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(CmdHistory {
                pod: pod.clone(),
                container: container.to_string(),
                command: command.to_vec(),
            });

        self.results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(pod)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::ExecError;

    #[tokio::test]
    async fn results_are_returned_in_order_then_default() {
        let runner = FakePodRunner::new();
        let pod = MemberName::new("ns", "p-0");
        runner.push_result(&pod, ExecOutcome::success("first"));
        runner.push_result(
            &pod,
            ExecOutcome::failure("second", ExecError::Transport("gone".to_string())),
        );

        let cmd = vec!["ls".to_string()];
        assert_eq!(runner.exec_in_pod(&pod, "server", &cmd).await.stdout, "first");
        assert!(!runner.exec_in_pod(&pod, "server", &cmd).await.is_success());
        assert_eq!(
            runner.exec_in_pod(&pod, "server", &cmd).await,
            ExecOutcome::default()
        );
    }

    #[tokio::test]
    async fn find_commands_matches_argument_sequence() {
        let runner = FakePodRunner::new();
        let pod = MemberName::new("ns", "p-0");
        let start = vec!["/opt/vertica/sbin/vertica_agent".to_string(), "start".to_string()];
        let status = vec!["/opt/vertica/sbin/vertica_agent".to_string(), "status".to_string()];
        runner.exec_in_pod(&pod, "server", &start).await;
        runner.exec_in_pod(&pod, "server", &status).await;

        assert_eq!(
            runner
                .find_commands(&["/opt/vertica/sbin/vertica_agent", "start"])
                .len(),
            1
        );
        assert_eq!(runner.find_commands(&["vertica_agent"]).len(), 2);

        runner.clear_histories();
        assert!(runner.histories().is_empty());
    }
}
