//! Test instances and how they are constructed

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};

/// How long an accessor waits for the instance lock. Only a worker abandoned
/// by a preemptive timeout keeps it longer.
const LOCK_GRACE: Duration = Duration::from_millis(100);

/// How many instances a container creates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// A fresh instance for every test
    #[default]
    PerTest,
    /// One instance shared by all tests of the container
    PerContainer,
}

/// Default construction for a container's instance; receives the enclosing
/// container's instance when nested
pub type Constructor =
    Arc<dyn Fn(Option<&TestInstance>) -> anyhow::Result<Box<dyn Any + Send>> + Send + Sync>;

/// Shared handle to one constructed instance
#[derive(Clone)]
pub struct TestInstance {
    container: Arc<str>,
    type_name: &'static str,
    value: Arc<Mutex<Box<dyn Any + Send>>>,
}

impl TestInstance {
    pub fn new(container: &str, value: Box<dyn Any + Send>) -> Self {
        Self {
            container: Arc::from(container),
            type_name: "<dyn Any>",
            value: Arc::new(Mutex::new(value)),
        }
    }

    pub fn of<V: Any + Send>(container: &str, value: V) -> Self {
        Self {
            type_name: type_name::<V>(),
            ..Self::new(container, Box::new(value))
        }
    }

    /// Container that created the instance
    pub fn container(&self) -> &str {
        &self.container
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Any + Send>>> {
        self.value
            .try_lock_for(LOCK_GRACE)
            .ok_or_else(|| LifecycleError::InstanceHeld {
                container: self.container.to_string(),
                waited_ms: LOCK_GRACE.as_millis() as u64,
            })
    }

    pub fn is<V: Any>(&self) -> Result<bool> {
        let guard = self.lock()?;
        let value: &(dyn Any + Send) = &**guard;
        Ok(value.is::<V>())
    }

    /// Borrow the instance as `V`; `Ok(None)` when it is another type.
    ///
    /// Fails with `InstanceHeld` instead of blocking when another thread
    /// keeps the instance locked past the grace period.
    pub fn with<V: Any, R>(&self, f: impl FnOnce(&V) -> R) -> Result<Option<R>> {
        let guard = self.lock()?;
        let value: &(dyn Any + Send) = &**guard;
        Ok(value.downcast_ref::<V>().map(f))
    }

    pub fn with_mut<V: Any, R>(&self, f: impl FnOnce(&mut V) -> R) -> Result<Option<R>> {
        let mut guard = self.lock()?;
        let value: &mut (dyn Any + Send) = &mut **guard;
        Ok(value.downcast_mut::<V>().map(f))
    }

    pub fn ptr_eq(&self, other: &TestInstance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for TestInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestInstance")
            .field("container", &self.container)
            .field("type", &self.type_name)
            .finish()
    }
}

/// Instances enclosing a test, outermost first
#[derive(Debug, Clone, Default)]
pub struct TestInstances {
    instances: Vec<TestInstance>,
}

impl TestInstances {
    pub fn new(instances: Vec<TestInstance>) -> Self {
        Self { instances }
    }

    pub fn innermost(&self) -> Option<&TestInstance> {
        self.instances.last()
    }

    pub fn all(&self) -> &[TestInstance] {
        &self.instances
    }

    pub fn for_container(&self, container: &str) -> Option<&TestInstance> {
        self.instances.iter().find(|i| i.container() == container)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// What an instance factory is asked to build
#[derive(Debug, Clone)]
pub struct InstanceFactoryContext {
    pub container: String,
    pub outer_instance: Option<TestInstance>,
}
