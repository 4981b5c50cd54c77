//! Extension Module - capability-typed lifecycle callbacks
//!
//! An extension declares which lifecycle categories it takes part in through
//! its `as_*` accessors; the engine dispatches by capability.
//!
//! Key types:
//! - `Extension`: Named bundle of capabilities
//! - `ExtensionRegistry`: Parent-linked registrations, outer to inner
//! - `FnExtension`: Closure-backed extension for quick registration
//! - `Invocation` / `InvocationContext`: What interceptors wrap and see

mod function;
mod instance;
mod invocation;
mod registry;

use std::any::Any;
use std::sync::Arc;

use crate::context::ExtensionContext;

pub use function::FnExtension;
pub use instance::{Constructor, InstanceFactoryContext, Lifecycle, TestInstance, TestInstances};
pub use invocation::{Arguments, Invocation, InvocationContext, ParameterDescriptor};
pub use registry::ExtensionRegistry;

/// Callback result; any error is recorded against the node
pub type CallbackResult = anyhow::Result<()>;

pub trait BeforeAllCallback: Send + Sync {
    fn before_all(&self, cx: &ExtensionContext) -> CallbackResult;
}

pub trait AfterAllCallback: Send + Sync {
    fn after_all(&self, cx: &ExtensionContext) -> CallbackResult;
}

pub trait BeforeEachCallback: Send + Sync {
    fn before_each(&self, cx: &ExtensionContext) -> CallbackResult;
}

pub trait AfterEachCallback: Send + Sync {
    fn after_each(&self, cx: &ExtensionContext) -> CallbackResult;
}

/// Runs before an instance is constructed
pub trait PreConstructCallback: Send + Sync {
    fn pre_construct(&self, factory: &InstanceFactoryContext, cx: &ExtensionContext) -> CallbackResult;
}

/// Replaces default construction for the containers it is registered on
pub trait InstanceFactory: Send + Sync {
    fn create_instance(
        &self,
        factory: &InstanceFactoryContext,
        cx: &ExtensionContext,
    ) -> anyhow::Result<Box<dyn Any + Send>>;
}

pub trait TestInstancePostProcessor: Send + Sync {
    fn post_process(&self, instance: &TestInstance, cx: &ExtensionContext) -> CallbackResult;
}

pub trait PreDestroyCallback: Send + Sync {
    fn pre_destroy(&self, instance: &TestInstance, cx: &ExtensionContext) -> CallbackResult;
}

/// Wraps the test body. Must call `invocation.proceed()` exactly once, or
/// fail.
pub trait InvocationInterceptor: Send + Sync {
    fn intercept_test(&self, invocation: Invocation<()>, cx: &InvocationContext) -> CallbackResult;
}

pub trait ParameterResolver: Send + Sync {
    fn supports(&self, parameter: &ParameterDescriptor, cx: &ExtensionContext) -> bool;

    fn resolve(
        &self,
        parameter: &ParameterDescriptor,
        cx: &ExtensionContext,
    ) -> anyhow::Result<Arc<dyn Any + Send + Sync>>;
}

/// A registered extension. Every capability defaults to absent.
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    fn as_before_all(&self) -> Option<&dyn BeforeAllCallback> {
        None
    }

    fn as_after_all(&self) -> Option<&dyn AfterAllCallback> {
        None
    }

    fn as_before_each(&self) -> Option<&dyn BeforeEachCallback> {
        None
    }

    fn as_after_each(&self) -> Option<&dyn AfterEachCallback> {
        None
    }

    fn as_pre_construct(&self) -> Option<&dyn PreConstructCallback> {
        None
    }

    fn as_instance_factory(&self) -> Option<&dyn InstanceFactory> {
        None
    }

    fn as_post_processor(&self) -> Option<&dyn TestInstancePostProcessor> {
        None
    }

    fn as_pre_destroy(&self) -> Option<&dyn PreDestroyCallback> {
        None
    }

    fn as_invocation_interceptor(&self) -> Option<&dyn InvocationInterceptor> {
        None
    }

    fn as_parameter_resolver(&self) -> Option<&dyn ParameterResolver> {
        None
    }
}

impl std::fmt::Debug for dyn Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Extension({})", self.name())
    }
}
