//! Error types with error codes and fix suggestions
//!
//! Error code ranges:
//! - CAD-000-009: Configuration errors
//! - CAD-010-019: Duration parsing errors
//! - CAD-020-029: Store errors
//! - CAD-040-049: Timeout errors
//! - CAD-050-059: Internal errors
//!
//! Callback failures carry whatever error the user callback returned; they are
//! classified by [`classify`] rather than wrapped in a variant here.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;
use crate::timeout::{DurationParseError, TimeoutError};

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Phase of a node's lifecycle a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Node configuration checks that run before any callback
    Prepare,
    BeforeAll,
    PreConstruct,
    Instantiation,
    PostProcess,
    BeforeEach,
    TestBody,
    AfterEach,
    PreDestroy,
    AfterAll,
    /// Releasing the node's store (closeable values)
    Teardown,
}

impl Category {
    /// Categories that keep running every registered hook after a failure
    pub fn is_best_effort(self) -> bool {
        matches!(
            self,
            Category::AfterEach | Category::PreDestroy | Category::AfterAll | Category::Teardown
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Prepare => "prepare",
            Category::BeforeAll => "before-all",
            Category::PreConstruct => "pre-construct",
            Category::Instantiation => "instantiation",
            Category::PostProcess => "post-process",
            Category::BeforeEach => "before-each",
            Category::TestBody => "test-body",
            Category::AfterEach => "after-each",
            Category::PreDestroy => "pre-destroy",
            Category::AfterAll => "after-all",
            Category::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Error taxonomy used in node outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Detected before lifecycle work began; fatal to the node
    Configuration,
    /// A registered hook or the test body failed
    Callback,
    /// Synthesized by a timeout wrapper
    Timeout,
    /// Programming error inside the engine; stops the run
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Configuration => f.write_str("configuration"),
            FailureKind::Callback => f.write_str("callback"),
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::Internal => f.write_str("internal"),
        }
    }
}

/// Engine-level errors.
#[derive(Error, Debug)]
pub enum LifecycleError {
    // ═══════════════════════════════════════════
    // CONFIGURATION ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[CAD-001] Missing required argument: {argument}")]
    MissingArgument { argument: &'static str },

    #[error("[CAD-002] Conflicting instance factories registered for '{container}': {factories}")]
    ConflictingInstanceFactories { container: String, factories: String },

    #[error("[CAD-003] Invalid configuration value for '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("[CAD-004] No parameter resolver supports parameter [{index}] '{name}' of '{test}'")]
    NoParameterResolver {
        test: String,
        index: usize,
        name: String,
    },

    #[error("[CAD-005] Parameter [{index}] '{name}' of '{test}' is claimed by several resolvers: {resolvers}")]
    AmbiguousParameterResolvers {
        test: String,
        index: usize,
        name: String,
        resolvers: String,
    },

    #[error("[CAD-006] An invocation interceptor for '{test}' returned without proceeding")]
    InvocationNotProceeded { test: String },

    #[error("[CAD-007] Unknown orderer '{name}'")]
    UnknownOrderer { name: String },

    #[error(transparent)]
    Duration(#[from] DurationParseError),

    // ═══════════════════════════════════════════
    // STORE / TIMEOUT
    // ═══════════════════════════════════════════
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("[CAD-042] Instance of '{container}' still locked after {waited_ms} ms, likely by an abandoned timeout worker")]
    InstanceHeld { container: String, waited_ms: u64 },

    // ═══════════════════════════════════════════
    // INTERNAL ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[CAD-050] Extension context '{unique_id}' used after its node closed")]
    ContextClosed { unique_id: String },

    #[error("[CAD-051] Fatal internal error in '{unique_id}': {message}")]
    Fatal { unique_id: String, message: String },

    #[error("[CAD-052] Timeout worker for '{description}' terminated without reporting a result")]
    WorkerLost { description: String },
}

impl LifecycleError {
    /// Stable error code, e.g. `CAD-002`
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::MissingArgument { .. } => "CAD-001",
            LifecycleError::ConflictingInstanceFactories { .. } => "CAD-002",
            LifecycleError::InvalidConfig { .. } => "CAD-003",
            LifecycleError::NoParameterResolver { .. } => "CAD-004",
            LifecycleError::AmbiguousParameterResolvers { .. } => "CAD-005",
            LifecycleError::InvocationNotProceeded { .. } => "CAD-006",
            LifecycleError::UnknownOrderer { .. } => "CAD-007",
            LifecycleError::Duration(e) => e.code(),
            LifecycleError::Store(e) => e.code(),
            LifecycleError::Timeout(_) => "CAD-040",
            LifecycleError::InstanceHeld { .. } => "CAD-042",
            LifecycleError::ContextClosed { .. } => "CAD-050",
            LifecycleError::Fatal { .. } => "CAD-051",
            LifecycleError::WorkerLost { .. } => "CAD-052",
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            LifecycleError::MissingArgument { .. }
            | LifecycleError::ConflictingInstanceFactories { .. }
            | LifecycleError::InvalidConfig { .. }
            | LifecycleError::NoParameterResolver { .. }
            | LifecycleError::AmbiguousParameterResolvers { .. }
            | LifecycleError::InvocationNotProceeded { .. }
            | LifecycleError::UnknownOrderer { .. }
            | LifecycleError::Duration(_) => FailureKind::Configuration,
            LifecycleError::Timeout(_) | LifecycleError::InstanceHeld { .. } => FailureKind::Timeout,
            LifecycleError::WorkerLost { .. } => FailureKind::Callback,
            LifecycleError::Store(StoreError::TypeMismatch { .. }) => FailureKind::Callback,
            LifecycleError::Store(StoreError::Closed { .. })
            | LifecycleError::ContextClosed { .. }
            | LifecycleError::Fatal { .. } => FailureKind::Internal,
        }
    }
}

impl FixSuggestion for LifecycleError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            LifecycleError::MissingArgument { .. } => {
                Some("Supply every required argument before building the invocation")
            }
            LifecycleError::ConflictingInstanceFactories { .. } => {
                Some("Register at most one instance factory per container level")
            }
            LifecycleError::InvalidConfig { .. } => {
                Some("Check the configuration key and value format")
            }
            LifecycleError::NoParameterResolver { .. } => {
                Some("Register a parameter resolver that supports this parameter")
            }
            LifecycleError::AmbiguousParameterResolvers { .. } => {
                Some("Make resolvers claim disjoint parameters")
            }
            LifecycleError::InvocationNotProceeded { .. } => {
                Some("Interceptors must call proceed() exactly once or return an error")
            }
            LifecycleError::UnknownOrderer { .. } => {
                Some("Use one of: default, name, display_name, declared_order, random")
            }
            LifecycleError::Duration(e) => e.fix_suggestion(),
            LifecycleError::Store(e) => e.fix_suggestion(),
            LifecycleError::Timeout(_) => {
                Some("Make the work finish sooner or raise the configured timeout")
            }
            LifecycleError::InstanceHeld { .. } => {
                Some("Do not keep the test instance borrowed across work that can outlive a preemptive timeout")
            }
            LifecycleError::ContextClosed { .. } => {
                Some("Do not retain extension contexts beyond their node's execution")
            }
            LifecycleError::Fatal { .. } => None,
            LifecycleError::WorkerLost { .. } => None,
        }
    }
}

/// Classify an error returned by a callback, body or engine step.
///
/// The first typed engine error found in the cause chain decides; anything
/// else is an ordinary callback failure.
pub fn classify(error: &anyhow::Error) -> FailureKind {
    for cause in error.chain() {
        if cause.downcast_ref::<TimeoutError>().is_some() {
            return FailureKind::Timeout;
        }
        if cause.downcast_ref::<DurationParseError>().is_some() {
            return FailureKind::Configuration;
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return match e {
                StoreError::Closed { .. } => FailureKind::Internal,
                StoreError::TypeMismatch { .. } => FailureKind::Callback,
            };
        }
        if let Some(e) = cause.downcast_ref::<LifecycleError>() {
            return e.kind();
        }
    }
    FailureKind::Callback
}

/// Message carried by a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with a non-string payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout::{TimeUnit, TimeoutDuration};

    #[test]
    fn codes_are_embedded_in_messages() {
        let err = LifecycleError::ConflictingInstanceFactories {
            container: "Outer".into(),
            factories: "a, b".into(),
        };
        assert!(err.to_string().starts_with("[CAD-002]"));
        assert_eq!(err.code(), "CAD-002");
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn classify_walks_the_cause_chain() {
        let duration = TimeoutDuration::new(5, TimeUnit::Milliseconds).unwrap();
        let timeout = anyhow::Error::new(TimeoutError::new("work()", duration))
            .context("while running the test body");
        assert_eq!(classify(&timeout), FailureKind::Timeout);

        let closed = anyhow::Error::new(LifecycleError::ContextClosed {
            unique_id: "[engine:cadence]".into(),
        });
        assert_eq!(classify(&closed), FailureKind::Internal);

        let plain = anyhow::anyhow!("assertion failed");
        assert_eq!(classify(&plain), FailureKind::Callback);
    }

    #[test]
    fn best_effort_categories() {
        assert!(Category::AfterEach.is_best_effort());
        assert!(Category::PreDestroy.is_best_effort());
        assert!(!Category::BeforeEach.is_best_effort());
        assert!(!Category::PostProcess.is_best_effort());
    }
}
