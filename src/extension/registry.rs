//! Parent-linked extension registrations

use std::sync::Arc;

use crate::error::{LifecycleError, Result};

use super::Extension;

/// Extensions registered on one level of the tree, chained to the enclosing
/// level's registry
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    parent: Option<Arc<ExtensionRegistry>>,
    local: Vec<Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(parent: &Arc<ExtensionRegistry>, local: Vec<Arc<dyn Extension>>) -> Self {
        Self {
            parent: Some(Arc::clone(parent)),
            local,
        }
    }

    pub fn register(&mut self, extension: Arc<dyn Extension>) {
        self.local.push(extension);
    }

    /// Every visible registration, outermost level first
    pub fn all(&self) -> Vec<Arc<dyn Extension>> {
        let mut levels = Vec::new();
        let mut current = Some(self);
        while let Some(registry) = current {
            levels.push(registry.local.as_slice());
            current = registry.parent.as_deref();
        }
        levels.into_iter().rev().flatten().cloned().collect()
    }

    /// Visible registrations having the capability picked by `has`
    pub fn all_with<F>(&self, has: F) -> Vec<Arc<dyn Extension>>
    where
        F: Fn(&dyn Extension) -> bool,
    {
        self.all()
            .into_iter()
            .filter(|extension| has(extension.as_ref()))
            .collect()
    }

    /// Local registrations having the capability picked by `has`
    pub fn local_with<F>(&self, has: F) -> Vec<Arc<dyn Extension>>
    where
        F: Fn(&dyn Extension) -> bool,
    {
        self.local
            .iter()
            .filter(|extension| has(extension.as_ref()))
            .cloned()
            .collect()
    }

    /// Effective instance factory: the innermost level registering one wins.
    /// Two factories on that level are a configuration error.
    pub fn resolve_instance_factory(&self, container: &str) -> Result<Option<Arc<dyn Extension>>> {
        let mut current = Some(self);
        while let Some(registry) = current {
            let factories = registry.local_with(|e| e.as_instance_factory().is_some());
            match factories.len() {
                0 => current = registry.parent.as_deref(),
                1 => return Ok(factories.into_iter().next()),
                _ => {
                    return Err(LifecycleError::ConflictingInstanceFactories {
                        container: container.to_string(),
                        factories: factories
                            .iter()
                            .map(|f| f.name().to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                }
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("local", &self.local)
            .field("depth", &self.all().len())
            .finish()
    }
}
