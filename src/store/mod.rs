//! Store Module - namespaced hierarchical state
//!
//! Backs extension state sharing across parent/child execution nodes.
//! Uses DashMap for concurrent access within a node.
//!
//! Key types:
//! - `StoreNode`: One node per execution node, parent-delegating lookups
//! - `NamespacedStore`: Typed view of a node through one `Namespace`
//! - `CloseableResource`: Values released when their node closes

mod namespace;
mod node;

// Re-export all public types
pub use namespace::Namespace;
pub use node::{CloseableResource, NamespacedStore, StoreError, StoreNode, StoreValue};
