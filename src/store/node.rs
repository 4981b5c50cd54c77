//! Hierarchical store nodes
//!
//! One `StoreNode` exists per execution node. Lookups fall back to the parent
//! chain, writes always land locally. Closing a node releases its entries and
//! closes every closeable value in reverse creation order.

use std::any::{type_name, Any};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{debug, warn};

use super::namespace::Namespace;
use crate::error::FixSuggestion;

/// Type-erased stored value
pub type StoreValue = Arc<dyn Any + Send + Sync>;

/// Values that release something when their owning node closes
pub trait CloseableResource: Send + Sync {
    fn close(&self) -> anyhow::Result<()>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("[CAD-020] Store '{node}' is closed")]
    Closed { node: String },

    #[error("[CAD-021] Value for '{key}' in {namespace} is a {actual}, not a {expected}")]
    TypeMismatch {
        namespace: String,
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Closed { .. } => "CAD-020",
            StoreError::TypeMismatch { .. } => "CAD-021",
        }
    }
}

impl FixSuggestion for StoreError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            StoreError::Closed { .. } => {
                Some("Only use a store while its execution node is running")
            }
            StoreError::TypeMismatch { .. } => {
                Some("Use a dedicated namespace or key per value type")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CompositeKey {
    namespace: Namespace,
    key: Arc<str>,
}

struct Slot {
    value: StoreValue,
    closer: Option<Arc<dyn CloseableResource>>,
    type_name: &'static str,
}

impl Slot {
    fn plain<V: Any + Send + Sync>(value: V) -> Self {
        Self {
            value: Arc::new(value),
            closer: None,
            type_name: type_name::<V>(),
        }
    }

    fn resource<R: CloseableResource + Any>(resource: Arc<R>) -> Self {
        Self {
            value: resource.clone(),
            closer: Some(resource),
            type_name: type_name::<R>(),
        }
    }
}

/// Entry with its creation sequence; the cell is empty while a computation
/// for it is still running.
struct StoredValue {
    sequence: u64,
    cell: OnceCell<Slot>,
}

/// One node of the hierarchical store
pub struct StoreNode {
    id: Arc<str>,
    parent: Option<Weak<StoreNode>>,
    entries: DashMap<CompositeKey, Arc<StoredValue>>,
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl StoreNode {
    pub fn root(id: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self::new(id.into(), None))
    }

    /// Child node holding a non-owning reference to `self`
    pub fn child(self: &Arc<Self>, id: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self::new(id.into(), Some(Arc::downgrade(self))))
    }

    fn new(id: Arc<str>, parent: Option<Weak<StoreNode>>) -> Self {
        Self {
            id,
            parent,
            entries: DashMap::new(),
            sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<Arc<StoreNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed {
                node: self.id.to_string(),
            });
        }
        Ok(())
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn local(&self, key: &CompositeKey) -> Option<Arc<StoredValue>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Local node first, then ancestors
    fn lookup(&self, key: &CompositeKey) -> Option<(StoreValue, &'static str)> {
        if let Some(stored) = self.local(key) {
            if let Some(slot) = stored.cell.get() {
                return Some((slot.value.clone(), slot.type_name));
            }
        }
        let mut ancestor = self.parent();
        while let Some(node) = ancestor {
            if let Some(slot) = node.local(key).and_then(|s| {
                s.cell
                    .get()
                    .map(|slot| (slot.value.clone(), slot.type_name))
            }) {
                return Some(slot);
            }
            ancestor = node.parent();
        }
        None
    }

    fn insert(&self, key: CompositeKey, slot: Slot) -> Option<StoreValue> {
        let stored = StoredValue {
            sequence: self.next_sequence(),
            cell: OnceCell::with_value(slot),
        };
        self.entries
            .insert(key, Arc::new(stored))
            .and_then(|previous| previous.cell.get().map(|slot| slot.value.clone()))
    }

    fn get_or_compute(
        &self,
        key: CompositeKey,
        compute: impl FnOnce() -> anyhow::Result<Slot>,
    ) -> anyhow::Result<(StoreValue, &'static str)> {
        self.ensure_open()?;

        match self.local(&key) {
            Some(stored) => {
                if let Some(slot) = stored.cell.get() {
                    return Ok((slot.value.clone(), slot.type_name));
                }
                // Another caller is computing this entry right now; join it below.
            }
            None => {
                if let Some(found) = self.lookup(&key) {
                    return Ok(found);
                }
            }
        }

        let stored = Arc::clone(
            self.entries
                .entry(key.clone())
                .or_insert_with(|| {
                    Arc::new(StoredValue {
                        sequence: self.next_sequence(),
                        cell: OnceCell::new(),
                    })
                })
                .value(),
        );

        match stored.cell.get_or_try_init(compute) {
            Ok(slot) => Ok((slot.value.clone(), slot.type_name)),
            Err(err) => {
                // Leave no placeholder behind so a later caller can retry.
                self.entries.remove_if(&key, |_, current| {
                    Arc::ptr_eq(current, &stored) && current.cell.get().is_none()
                });
                Err(err)
            }
        }
    }

    /// Close the node: drop every entry and close closeable values, newest
    /// first. Close failures are collected, not swallowed. Closing twice is a
    /// no-op.
    pub fn close(&self) -> Vec<anyhow::Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }

        let mut stored: Vec<Arc<StoredValue>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.entries.clear();
        stored.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        let mut failures = Vec::new();
        for value in stored {
            let Some(slot) = value.cell.get() else { continue };
            let Some(closer) = &slot.closer else { continue };
            debug!(node = %self.id, value = slot.type_name, "closing store value");
            if let Err(err) = closer.close() {
                warn!(node = %self.id, value = slot.type_name, error = %err, "failed to close store value");
                failures.push(err.context(format!(
                    "failed to close {} stored in '{}'",
                    slot.type_name, self.id
                )));
            }
        }
        failures
    }

    /// Namespace-bound view over this node
    pub fn scoped(self: &Arc<Self>, namespace: Namespace) -> NamespacedStore {
        NamespacedStore {
            node: Arc::clone(self),
            namespace,
        }
    }
}

impl std::fmt::Debug for StoreNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreNode")
            .field("id", &self.id)
            .field("entries", &self.entries.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A store node seen through one namespace.
///
/// Reads delegate to ancestors; writes and removals stay on the node.
#[derive(Clone, Debug)]
pub struct NamespacedStore {
    node: Arc<StoreNode>,
    namespace: Namespace,
}

impl NamespacedStore {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn key(&self, key: &str) -> CompositeKey {
        CompositeKey {
            namespace: self.namespace.clone(),
            key: Arc::from(key),
        }
    }

    fn downcast<V: Any + Send + Sync>(
        &self,
        key: &str,
        value: StoreValue,
        actual: &'static str,
    ) -> Result<Arc<V>, StoreError> {
        value.downcast::<V>().map_err(|_| StoreError::TypeMismatch {
            namespace: self.namespace.to_string(),
            key: key.to_string(),
            expected: type_name::<V>(),
            actual,
        })
    }

    /// Untyped lookup through the parent chain
    pub fn get_value(&self, key: &str) -> Result<Option<StoreValue>, StoreError> {
        self.node.ensure_open()?;
        Ok(self.node.lookup(&self.key(key)).map(|(value, _)| value))
    }

    pub fn get<V: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<V>>, StoreError> {
        self.node.ensure_open()?;
        match self.node.lookup(&self.key(key)) {
            Some((value, actual)) => self.downcast(key, value, actual).map(Some),
            None => Ok(None),
        }
    }

    /// Store locally; returns the previous local value, if any
    pub fn put<V: Any + Send + Sync>(
        &self,
        key: &str,
        value: V,
    ) -> Result<Option<StoreValue>, StoreError> {
        self.node.ensure_open()?;
        Ok(self.node.insert(self.key(key), Slot::plain(value)))
    }

    /// Store a value that is closed when this node closes
    pub fn put_resource<R: CloseableResource + Any>(
        &self,
        key: &str,
        resource: R,
    ) -> Result<Arc<R>, StoreError> {
        self.node.ensure_open()?;
        let resource = Arc::new(resource);
        self.node
            .insert(self.key(key), Slot::resource(Arc::clone(&resource)));
        Ok(resource)
    }

    /// Remove a local value. Removed values are not closed.
    pub fn remove<V: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<V>>, StoreError> {
        self.node.ensure_open()?;
        let Some((_, stored)) = self.node.entries.remove(&self.key(key)) else {
            return Ok(None);
        };
        match stored.cell.get() {
            Some(slot) => self
                .downcast(key, slot.value.clone(), slot.type_name)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Return the visible value or compute, store and return a new one.
    ///
    /// Concurrent callers racing on the same key at the same node run the
    /// computation once and all observe its result. A failed computation
    /// stores nothing.
    pub fn get_or_compute<V, F>(&self, key: &str, compute: F) -> anyhow::Result<Arc<V>>
    where
        V: Any + Send + Sync,
        F: FnOnce() -> anyhow::Result<V>,
    {
        let (value, actual) = self
            .node
            .get_or_compute(self.key(key), || compute().map(Slot::plain))?;
        Ok(self.downcast(key, value, actual)?)
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for closeable values
    pub fn get_or_compute_resource<R, F>(&self, key: &str, compute: F) -> anyhow::Result<Arc<R>>
    where
        R: CloseableResource + Any,
        F: FnOnce() -> anyhow::Result<R>,
    {
        let (value, actual) = self.node.get_or_compute(self.key(key), || {
            compute().map(|resource| Slot::resource(Arc::new(resource)))
        })?;
        Ok(self.downcast(key, value, actual)?)
    }
}
