//! Node outcomes and failure collection

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::context::{NodeKind, UniqueId};
use crate::error::{classify, panic_message, Category, FailureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Successful,
    Failed,
}

/// One classified failure, attributed to the category it happened in
#[derive(Debug, Clone)]
pub struct RecordedFailure {
    pub category: Category,
    pub kind: FailureKind,
    pub error: Arc<anyhow::Error>,
}

impl RecordedFailure {
    /// Full message including causes
    pub fn message(&self) -> String {
        format!("{:#}", self.error)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "category": self.category,
            "kind": self.kind,
            "message": self.message(),
        })
    }
}

/// Terminal report of one node
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    unique_id: UniqueId,
    failures: Vec<RecordedFailure>,
    duration: Duration,
}

impl ExecutionOutcome {
    pub fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    pub fn node_kind(&self) -> NodeKind {
        self.unique_id.kind()
    }

    pub fn status(&self) -> Status {
        if self.failures.is_empty() {
            Status::Successful
        } else {
            Status::Failed
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// First failure encountered
    pub fn primary(&self) -> Option<&RecordedFailure> {
        self.failures.first()
    }

    /// Failures after the primary one, in the order they happened
    pub fn suppressed(&self) -> &[RecordedFailure] {
        self.failures.get(1..).unwrap_or_default()
    }

    pub fn failures(&self) -> &[RecordedFailure] {
        &self.failures
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn to_json(&self) -> Value {
        json!({
            "unique_id": self.unique_id.to_string(),
            "node": self.node_kind(),
            "status": self.status(),
            "duration_ms": self.duration.as_millis() as u64,
            "primary": self.primary().map(RecordedFailure::to_json),
            "suppressed": self.suppressed().iter().map(RecordedFailure::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Collects the failures of one node while it runs. Nothing a callback does
/// escapes it: errors and panics alike become recorded failures.
pub(crate) struct FailureCollector {
    unique_id: UniqueId,
    started: Instant,
    failures: Vec<RecordedFailure>,
}

impl FailureCollector {
    pub(crate) fn new(unique_id: UniqueId) -> Self {
        Self {
            unique_id,
            started: Instant::now(),
            failures: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, category: Category, error: anyhow::Error) -> FailureKind {
        let kind = classify(&error);
        debug!(
            node = %self.unique_id,
            %category,
            %kind,
            error = %format!("{error:#}"),
            "lifecycle failure recorded"
        );
        self.failures.push(RecordedFailure {
            category,
            kind,
            error: Arc::new(error),
        });
        kind
    }

    /// Run `work`, recording a failure. Returns the value on success.
    pub(crate) fn capture<T>(
        &mut self,
        category: Category,
        work: impl FnOnce() -> anyhow::Result<T>,
    ) -> Option<T> {
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                self.record(category, error);
                None
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.record(category, anyhow::anyhow!("panicked: {message}"));
                None
            }
        }
    }

    /// Like `capture` for work without a value; `true` on success
    pub(crate) fn execute(
        &mut self,
        category: Category,
        work: impl FnOnce() -> anyhow::Result<()>,
    ) -> bool {
        self.capture(category, work).is_some()
    }

    /// First internal failure, if any
    pub(crate) fn internal(&self) -> Option<&RecordedFailure> {
        self.failures
            .iter()
            .find(|f| f.kind == FailureKind::Internal)
    }

    pub(crate) fn finish(self) -> ExecutionOutcome {
        ExecutionOutcome {
            unique_id: self.unique_id,
            failures: self.failures,
            duration: self.started.elapsed(),
        }
    }
}
