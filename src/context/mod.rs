//! Extension Context Tree
//!
//! One `ExtensionContext` per execution node (engine root, container, test),
//! each wrapping its own `StoreNode` chained to the parent's. Element,
//! display name and tags are fixed when the context is created.
//!
//! Key types:
//! - `ExtensionContext`: What extensions see of the node they run for
//! - `UniqueId`: Path of the node from the engine root
//! - `Element`: The container or test a context belongs to

mod id;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::error::{LifecycleError, Result};
use crate::extension::TestInstances;
use crate::runtime::ExecutionOutcome;
use crate::store::{Namespace, NamespacedStore, StoreNode};

pub use id::{NodeKind, UniqueId};

/// Name of the engine root segment
pub const ENGINE_ID: &str = "cadence";

/// Test-tree element behind a context; the engine root has none
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Container { name: String },
    Test { name: String },
}

impl Element {
    pub fn name(&self) -> &str {
        match self {
            Element::Container { name } | Element::Test { name } => name,
        }
    }
}

pub struct ExtensionContext {
    unique_id: UniqueId,
    element: Option<Element>,
    display_name: String,
    tags: BTreeSet<String>,
    parent: Option<Arc<ExtensionContext>>,
    store: Arc<StoreNode>,
    config: Arc<EngineConfig>,
    outcome: OnceCell<Arc<ExecutionOutcome>>,
    test_instances: RwLock<Option<TestInstances>>,
    closed: AtomicBool,
}

impl ExtensionContext {
    pub(crate) fn engine_root(config: Arc<EngineConfig>) -> Arc<Self> {
        let unique_id = UniqueId::engine(ENGINE_ID);
        Arc::new(Self {
            store: StoreNode::root(unique_id.to_string()),
            unique_id,
            element: None,
            display_name: ENGINE_ID.to_string(),
            tags: BTreeSet::new(),
            parent: None,
            config,
            outcome: OnceCell::new(),
            test_instances: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn child(
        self: &Arc<Self>,
        element: Element,
        display_name: impl Into<String>,
        tags: BTreeSet<String>,
    ) -> Arc<Self> {
        let kind = match element {
            Element::Container { .. } => NodeKind::Container,
            Element::Test { .. } => NodeKind::Test,
        };
        let unique_id = self.unique_id.append(kind, element.name());
        Arc::new(Self {
            store: self.store.child(unique_id.to_string()),
            unique_id,
            element: Some(element),
            display_name: display_name.into(),
            tags,
            parent: Some(Arc::clone(self)),
            config: Arc::clone(&self.config),
            outcome: OnceCell::new(),
            test_instances: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    /// Absent only at the engine root
    pub fn parent(&self) -> Option<&Arc<ExtensionContext>> {
        self.parent.as_ref()
    }

    pub fn root(&self) -> &ExtensionContext {
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            current = parent;
        }
        current
    }

    pub fn element(&self) -> Option<&Element> {
        self.element.as_ref()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Namespace-bound view of this node's store.
    ///
    /// Fails once the node has closed.
    pub fn store(&self, namespace: Namespace) -> Result<NamespacedStore> {
        self.ensure_open()?;
        Ok(self.store.scoped(namespace))
    }

    /// Outcome recorded when the node finished; absent while it runs
    pub fn execution_outcome(&self) -> Option<Arc<ExecutionOutcome>> {
        self.outcome.get().cloned()
    }

    /// Instances visible to this node, outermost first
    pub fn test_instances(&self) -> Option<TestInstances> {
        if let Some(instances) = self.test_instances.read().clone() {
            return Some(instances);
        }
        self.parent.as_ref().and_then(|parent| parent.test_instances())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(LifecycleError::ContextClosed {
                unique_id: self.unique_id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn set_test_instances(&self, instances: Option<TestInstances>) {
        *self.test_instances.write() = instances;
    }

    pub(crate) fn record_outcome(&self, outcome: Arc<ExecutionOutcome>) {
        // First recording wins; a node finishes once.
        let _ = self.outcome.set(outcome);
    }

    /// Close the node's store, releasing its values. Returns close failures.
    pub(crate) fn close(&self) -> Vec<anyhow::Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        self.test_instances.write().take();
        self.store.close()
    }
}

impl std::fmt::Debug for ExtensionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionContext")
            .field("unique_id", &self.unique_id)
            .field("display_name", &self.display_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (Arc<ExtensionContext>, Arc<ExtensionContext>, Arc<ExtensionContext>) {
        let root = ExtensionContext::engine_root(Arc::new(EngineConfig::default()));
        let container = root.child(
            Element::Container {
                name: "Outer".into(),
            },
            "Outer suite",
            BTreeSet::from(["slow".to_string()]),
        );
        let test = container.child(
            Element::Test {
                name: "works".into(),
            },
            "works()",
            BTreeSet::new(),
        );
        (root, container, test)
    }

    #[test]
    fn navigation_and_snapshots() {
        let (root, container, test) = tree();
        assert!(root.parent().is_none());
        assert!(root.element().is_none());
        assert_eq!(
            test.parent().unwrap().unique_id(),
            container.unique_id()
        );
        assert_eq!(test.root().unique_id(), root.unique_id());
        assert_eq!(container.display_name(), "Outer suite");
        assert!(container.tags().contains("slow"));
        assert_eq!(test.element().unwrap().name(), "works");
    }

    #[test]
    fn stores_chain_to_parent_contexts() {
        let (root, _container, test) = tree();
        let ns = Namespace::create(["ctx"]);
        root.store(ns.clone()).unwrap().put("answer", 42_u32).unwrap();

        let seen = test.store(ns.clone()).unwrap().get::<u32>("answer").unwrap();
        assert_eq!(*seen.unwrap(), 42);

        test.store(ns.clone()).unwrap().put("local", 1_u8).unwrap();
        assert!(root.store(ns).unwrap().get_value("local").unwrap().is_none());
    }

    #[test]
    fn closed_context_is_an_internal_error() {
        let (_root, _container, test) = tree();
        assert!(test.close().is_empty());
        let err = test.store(Namespace::global()).unwrap_err();
        assert!(matches!(err, LifecycleError::ContextClosed { .. }));
        assert_eq!(err.kind(), crate::error::FailureKind::Internal);
    }
}
