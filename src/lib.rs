//! Cadence - extensible test lifecycle engine
//!
//! Runs a tree of containers and tests through a fixed sequence of lifecycle
//! categories, dispatching each to the extensions registered along the path.
//! Extensions share state through a namespaced store scoped to every node,
//! and a built-in extension enforces per-test timeouts on the calling thread
//! or on a dedicated worker.

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod extension;
pub mod order;
pub mod runtime;
pub mod store;
pub mod timeout;

pub use config::EngineConfig;
pub use context::{Element, ExtensionContext, NodeKind, UniqueId};
pub use error::{Category, FailureKind, FixSuggestion, LifecycleError, Result};
pub use event::{Event, EventKind, EventLog, ExecutionListener};
pub use extension::{Extension, FnExtension, InvocationContext, Lifecycle, TestInstance};
pub use order::{Orderer, OrdererKind, RandomOrderer};
pub use runtime::{ContainerNode, Engine, ExecutionOutcome, RunReport, Status, TestCase, TestNode};
pub use store::{CloseableResource, Namespace, NamespacedStore};
pub use timeout::{ThreadMode, TimeoutDuration};
