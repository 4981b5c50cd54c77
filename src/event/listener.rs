//! ExecutionListener - outcome reporting hook
//!
//! The engine calls a listener when a node starts and when it finishes.
//! Reporting layers implement it; `NoopListener` is for callers that only
//! read the `RunReport`.

use crate::context::ExtensionContext;
use crate::runtime::ExecutionOutcome;

pub trait ExecutionListener: Send + Sync {
    /// The node is about to run its own lifecycle. Tests whose instance could
    /// not be set up never start.
    fn execution_started(&self, _cx: &ExtensionContext) {}

    /// The node finished, with its terminal outcome
    fn execution_finished(&self, _cx: &ExtensionContext, _outcome: &ExecutionOutcome) {}
}

/// Listener that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl ExecutionListener for NoopListener {}
