//! Invocations and what interceptors see of them

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::context::ExtensionContext;
use crate::error::Result;
use crate::timeout::EffectiveTimeout;

use super::instance::TestInstances;

type Work<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

/// Deferred unit of work; `proceed` runs it
pub struct Invocation<T> {
    work: Work<T>,
}

impl<T> Invocation<T> {
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            work: Box::new(work),
        }
    }

    pub fn proceed(self) -> anyhow::Result<T> {
        (self.work)()
    }
}

impl<T> fmt::Debug for Invocation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invocation")
    }
}

/// Declared parameter of a test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub index: usize,
    pub name: String,
    type_id: Option<TypeId>,
    type_name: &'static str,
}

impl ParameterDescriptor {
    /// Untyped parameter
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            type_id: None,
            type_name: "_",
        }
    }

    /// Parameter that expects a `V`
    pub fn of<V: Any>(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            type_id: Some(TypeId::of::<V>()),
            type_name: type_name::<V>(),
        }
    }

    pub fn is<V: Any>(&self) -> bool {
        self.type_id == Some(TypeId::of::<V>())
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Resolved arguments, in parameter order
#[derive(Clone, Default)]
pub struct Arguments {
    values: Vec<Arc<dyn Any + Send + Sync>>,
}

impl Arguments {
    pub(crate) fn new(values: Vec<Arc<dyn Any + Send + Sync>>) -> Self {
        Self { values }
    }

    pub fn get<V: Any>(&self, index: usize) -> Option<&V> {
        self.values.get(index).and_then(|value| value.downcast_ref::<V>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Everything a test body and its interceptors get to see
#[derive(Debug, Clone)]
pub struct InvocationContext {
    test_name: Arc<str>,
    extension_context: Arc<ExtensionContext>,
    instances: TestInstances,
    arguments: Arguments,
    timeout: Option<EffectiveTimeout>,
}

impl InvocationContext {
    pub(crate) fn new(
        test_name: &str,
        extension_context: Arc<ExtensionContext>,
        instances: TestInstances,
        arguments: Arguments,
        timeout: Option<EffectiveTimeout>,
    ) -> Self {
        Self {
            test_name: Arc::from(test_name),
            extension_context,
            instances,
            arguments,
            timeout,
        }
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn extension_context(&self) -> &Arc<ExtensionContext> {
        &self.extension_context
    }

    pub fn instances(&self) -> &TestInstances {
        &self.instances
    }

    /// Run `f` against the innermost instance if it is a `V`
    pub fn with_instance<V: Any, R>(&self, f: impl FnOnce(&mut V) -> R) -> Result<Option<R>> {
        match self.instances.innermost() {
            Some(instance) => instance.with_mut(f),
            None => Ok(None),
        }
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Deadline that applies to this test, if any
    pub fn timeout(&self) -> Option<&EffectiveTimeout> {
        self.timeout.as_ref()
    }
}
