//! Run report - every node's outcome, in finish order

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::outcome::ExecutionOutcome;
use crate::context::NodeKind;

/// Counts per node kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub tests_succeeded: usize,
    pub tests_failed: usize,
    pub containers_succeeded: usize,
    pub containers_failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    outcomes: Vec<Arc<ExecutionOutcome>>,
}

impl RunReport {
    pub(crate) fn push(&mut self, outcome: Arc<ExecutionOutcome>) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[Arc<ExecutionOutcome>] {
        &self.outcomes
    }

    /// Outcome by rendered unique id
    pub fn outcome(&self, unique_id: &str) -> Option<&Arc<ExecutionOutcome>> {
        self.outcomes
            .iter()
            .find(|o| o.unique_id().to_string() == unique_id)
    }

    /// First outcome whose node has this name
    pub fn by_name(&self, name: &str) -> Option<&Arc<ExecutionOutcome>> {
        self.outcomes.iter().find(|o| o.unique_id().name() == name)
    }

    pub fn tests(&self) -> impl Iterator<Item = &Arc<ExecutionOutcome>> {
        self.outcomes
            .iter()
            .filter(|o| o.node_kind() == NodeKind::Test)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for outcome in &self.outcomes {
            match (outcome.node_kind(), outcome.is_success()) {
                (NodeKind::Test, true) => summary.tests_succeeded += 1,
                (NodeKind::Test, false) => summary.tests_failed += 1,
                (_, true) => summary.containers_succeeded += 1,
                (_, false) => summary.containers_failed += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_success())
    }

    pub fn to_json(&self) -> Value {
        json!({
            "summary": self.summary(),
            "outcomes": self.outcomes.iter().map(|o| o.to_json()).collect::<Vec<_>>(),
        })
    }
}
