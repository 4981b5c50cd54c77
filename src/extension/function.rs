//! Closure-backed extensions
//!
//! ```ignore
//! let ext = FnExtension::new("db")
//!     .before_all(|cx| { /* connect */ Ok(()) })
//!     .after_all(|cx| { /* disconnect */ Ok(()) });
//! ```

use std::any::Any;
use std::sync::Arc;

use crate::context::ExtensionContext;

use super::{
    AfterAllCallback, AfterEachCallback, BeforeAllCallback, BeforeEachCallback, CallbackResult,
    Extension, InstanceFactory, InstanceFactoryContext, Invocation, InvocationContext,
    InvocationInterceptor, ParameterDescriptor, ParameterResolver, PreConstructCallback,
    PreDestroyCallback, TestInstance, TestInstancePostProcessor,
};

type ContextFn = Arc<dyn Fn(&ExtensionContext) -> CallbackResult + Send + Sync>;
type FactoryHookFn =
    Arc<dyn Fn(&InstanceFactoryContext, &ExtensionContext) -> CallbackResult + Send + Sync>;
type FactoryFn = Arc<
    dyn Fn(&InstanceFactoryContext, &ExtensionContext) -> anyhow::Result<Box<dyn Any + Send>>
        + Send
        + Sync,
>;
type InstanceFn = Arc<dyn Fn(&TestInstance, &ExtensionContext) -> CallbackResult + Send + Sync>;
type InterceptFn = Arc<dyn Fn(Invocation<()>, &InvocationContext) -> CallbackResult + Send + Sync>;
type SupportsFn = Arc<dyn Fn(&ParameterDescriptor, &ExtensionContext) -> bool + Send + Sync>;
type ResolveFn = Arc<
    dyn Fn(&ParameterDescriptor, &ExtensionContext) -> anyhow::Result<Arc<dyn Any + Send + Sync>>
        + Send
        + Sync,
>;

/// Extension whose capabilities are the closures it was given
#[derive(Clone)]
pub struct FnExtension {
    name: String,
    before_all: Option<ContextFn>,
    after_all: Option<ContextFn>,
    before_each: Option<ContextFn>,
    after_each: Option<ContextFn>,
    pre_construct: Option<FactoryHookFn>,
    factory: Option<FactoryFn>,
    post_process: Option<InstanceFn>,
    pre_destroy: Option<InstanceFn>,
    intercept: Option<InterceptFn>,
    resolver: Option<(SupportsFn, ResolveFn)>,
}

impl FnExtension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before_all: None,
            after_all: None,
            before_each: None,
            after_each: None,
            pre_construct: None,
            factory: None,
            post_process: None,
            pre_destroy: None,
            intercept: None,
            resolver: None,
        }
    }

    pub fn before_all<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExtensionContext) -> CallbackResult + Send + Sync + 'static,
    {
        self.before_all = Some(Arc::new(f));
        self
    }

    pub fn after_all<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExtensionContext) -> CallbackResult + Send + Sync + 'static,
    {
        self.after_all = Some(Arc::new(f));
        self
    }

    pub fn before_each<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExtensionContext) -> CallbackResult + Send + Sync + 'static,
    {
        self.before_each = Some(Arc::new(f));
        self
    }

    pub fn after_each<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExtensionContext) -> CallbackResult + Send + Sync + 'static,
    {
        self.after_each = Some(Arc::new(f));
        self
    }

    pub fn pre_construct<F>(mut self, f: F) -> Self
    where
        F: Fn(&InstanceFactoryContext, &ExtensionContext) -> CallbackResult + Send + Sync + 'static,
    {
        self.pre_construct = Some(Arc::new(f));
        self
    }

    pub fn instance_factory<F>(mut self, f: F) -> Self
    where
        F: Fn(&InstanceFactoryContext, &ExtensionContext) -> anyhow::Result<Box<dyn Any + Send>>
            + Send
            + Sync
            + 'static,
    {
        self.factory = Some(Arc::new(f));
        self
    }

    pub fn post_process<F>(mut self, f: F) -> Self
    where
        F: Fn(&TestInstance, &ExtensionContext) -> CallbackResult + Send + Sync + 'static,
    {
        self.post_process = Some(Arc::new(f));
        self
    }

    pub fn pre_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&TestInstance, &ExtensionContext) -> CallbackResult + Send + Sync + 'static,
    {
        self.pre_destroy = Some(Arc::new(f));
        self
    }

    pub fn intercept<F>(mut self, f: F) -> Self
    where
        F: Fn(Invocation<()>, &InvocationContext) -> CallbackResult + Send + Sync + 'static,
    {
        self.intercept = Some(Arc::new(f));
        self
    }

    pub fn resolve_parameters<S, R>(mut self, supports: S, resolve: R) -> Self
    where
        S: Fn(&ParameterDescriptor, &ExtensionContext) -> bool + Send + Sync + 'static,
        R: Fn(&ParameterDescriptor, &ExtensionContext) -> anyhow::Result<Arc<dyn Any + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        self.resolver = Some((Arc::new(supports), Arc::new(resolve)));
        self
    }
}

impl std::fmt::Debug for FnExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExtension").field("name", &self.name).finish()
    }
}

impl BeforeAllCallback for FnExtension {
    fn before_all(&self, cx: &ExtensionContext) -> CallbackResult {
        self.before_all.as_ref().map_or(Ok(()), |f| f(cx))
    }
}

impl AfterAllCallback for FnExtension {
    fn after_all(&self, cx: &ExtensionContext) -> CallbackResult {
        self.after_all.as_ref().map_or(Ok(()), |f| f(cx))
    }
}

impl BeforeEachCallback for FnExtension {
    fn before_each(&self, cx: &ExtensionContext) -> CallbackResult {
        self.before_each.as_ref().map_or(Ok(()), |f| f(cx))
    }
}

impl AfterEachCallback for FnExtension {
    fn after_each(&self, cx: &ExtensionContext) -> CallbackResult {
        self.after_each.as_ref().map_or(Ok(()), |f| f(cx))
    }
}

impl PreConstructCallback for FnExtension {
    fn pre_construct(&self, factory: &InstanceFactoryContext, cx: &ExtensionContext) -> CallbackResult {
        self.pre_construct.as_ref().map_or(Ok(()), |f| f(factory, cx))
    }
}

impl InstanceFactory for FnExtension {
    fn create_instance(
        &self,
        factory: &InstanceFactoryContext,
        cx: &ExtensionContext,
    ) -> anyhow::Result<Box<dyn Any + Send>> {
        match &self.factory {
            Some(f) => f(factory, cx),
            None => anyhow::bail!("extension '{}' has no instance factory", self.name),
        }
    }
}

impl TestInstancePostProcessor for FnExtension {
    fn post_process(&self, instance: &TestInstance, cx: &ExtensionContext) -> CallbackResult {
        self.post_process.as_ref().map_or(Ok(()), |f| f(instance, cx))
    }
}

impl PreDestroyCallback for FnExtension {
    fn pre_destroy(&self, instance: &TestInstance, cx: &ExtensionContext) -> CallbackResult {
        self.pre_destroy.as_ref().map_or(Ok(()), |f| f(instance, cx))
    }
}

impl InvocationInterceptor for FnExtension {
    fn intercept_test(&self, invocation: Invocation<()>, cx: &InvocationContext) -> CallbackResult {
        match &self.intercept {
            Some(f) => f(invocation, cx),
            None => invocation.proceed(),
        }
    }
}

impl ParameterResolver for FnExtension {
    fn supports(&self, parameter: &ParameterDescriptor, cx: &ExtensionContext) -> bool {
        self.resolver
            .as_ref()
            .is_some_and(|(supports, _)| supports(parameter, cx))
    }

    fn resolve(
        &self,
        parameter: &ParameterDescriptor,
        cx: &ExtensionContext,
    ) -> anyhow::Result<Arc<dyn Any + Send + Sync>> {
        match &self.resolver {
            Some((_, resolve)) => resolve(parameter, cx),
            None => anyhow::bail!("extension '{}' resolves no parameters", self.name),
        }
    }
}

impl Extension for FnExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_before_all(&self) -> Option<&dyn BeforeAllCallback> {
        self.before_all.as_ref().map(|_| self as &dyn BeforeAllCallback)
    }

    fn as_after_all(&self) -> Option<&dyn AfterAllCallback> {
        self.after_all.as_ref().map(|_| self as &dyn AfterAllCallback)
    }

    fn as_before_each(&self) -> Option<&dyn BeforeEachCallback> {
        self.before_each.as_ref().map(|_| self as &dyn BeforeEachCallback)
    }

    fn as_after_each(&self) -> Option<&dyn AfterEachCallback> {
        self.after_each.as_ref().map(|_| self as &dyn AfterEachCallback)
    }

    fn as_pre_construct(&self) -> Option<&dyn PreConstructCallback> {
        self.pre_construct.as_ref().map(|_| self as &dyn PreConstructCallback)
    }

    fn as_instance_factory(&self) -> Option<&dyn InstanceFactory> {
        self.factory.as_ref().map(|_| self as &dyn InstanceFactory)
    }

    fn as_post_processor(&self) -> Option<&dyn TestInstancePostProcessor> {
        self.post_process.as_ref().map(|_| self as &dyn TestInstancePostProcessor)
    }

    fn as_pre_destroy(&self) -> Option<&dyn PreDestroyCallback> {
        self.pre_destroy.as_ref().map(|_| self as &dyn PreDestroyCallback)
    }

    fn as_invocation_interceptor(&self) -> Option<&dyn InvocationInterceptor> {
        self.intercept.as_ref().map(|_| self as &dyn InvocationInterceptor)
    }

    fn as_parameter_resolver(&self) -> Option<&dyn ParameterResolver> {
        self.resolver.as_ref().map(|_| self as &dyn ParameterResolver)
    }
}
