//! Engine - depth-first lifecycle orchestration
//!
//! Walks the test tree on the calling thread. For every node it opens an
//! extension context chained to the parent's, runs the lifecycle categories
//! in order, records failures instead of propagating them, and closes the
//! context again.
//!
//! Container: prepare → instantiate (per-container lifecycle) → before-all →
//! children → after-all → pre-destroy → teardown.
//! Test: prepare → pre-construct → instantiate → post-process → before-each →
//! body (through interceptors) → after-each → pre-destroy → teardown.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{debug, error, info, instrument, warn};

use super::node::{describe, ContainerNode, TestBody, TestCase, TestNode};
use super::outcome::FailureCollector;
use super::report::RunReport;
use crate::config::{EngineConfig, OrderConfig};
use crate::context::{Element, ExtensionContext};
use crate::error::{Category, LifecycleError, Result};
use crate::event::{EventKind, EventLog, ExecutionListener, NoopListener};
use crate::extension::{
    Arguments, CallbackResult, Constructor, Extension, ExtensionRegistry, InstanceFactoryContext,
    Invocation, InvocationContext, Lifecycle, ParameterDescriptor, ParameterResolver,
    TestInstance, TestInstances,
};
use crate::order::{self, Orderer, OrdererKind, RandomOrderer};
use crate::timeout::{resolve_timeout, EffectiveTimeout, TimeoutDeclaration, TimeoutDuration, TimeoutExtension};

/// Executes test trees against a fixed configuration and extension set
pub struct Engine {
    config: Arc<EngineConfig>,
    registry: ExtensionRegistry,
    listener: Arc<dyn ExecutionListener>,
    event_log: EventLog,
}

impl Engine {
    /// Engine with the built-in timeout extension registered at the root
    pub fn new(config: EngineConfig) -> Self {
        let mut registry = ExtensionRegistry::new();
        registry.register(Arc::new(TimeoutExtension));
        Self {
            config: Arc::new(config),
            registry,
            listener: Arc::new(NoopListener),
            event_log: EventLog::new(),
        }
    }

    /// Register an extension for every node of the tree
    pub fn with_extension(mut self, extension: impl Extension + 'static) -> Self {
        self.registry.register(Arc::new(extension));
        self
    }

    pub fn with_listener(mut self, listener: impl ExecutionListener + 'static) -> Self {
        self.listener = Arc::new(listener);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Run one traversal of `roots`.
    ///
    /// Node failures end up in the report. Only an internal failure makes
    /// this return an error, after every open node has been cleaned up.
    #[instrument(skip_all)]
    pub fn execute<I, N>(&self, roots: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = N>,
        N: Into<TestNode>,
    {
        let roots: Vec<TestNode> = roots.into_iter().map(Into::into).collect();
        info!(roots = roots.len(), "starting execution");

        let cx = ExtensionContext::engine_root(Arc::clone(&self.config));
        let (test_orderer, container_orderer) = root_orderers(&self.config.order);
        let scope = Scope {
            cx: Arc::clone(&cx),
            registry: Arc::new(self.registry.clone()),
            frames: Vec::new(),
            timeout: None,
            test_orderer,
            container_orderer,
        };

        let mut run = Run {
            engine: self,
            report: RunReport::default(),
            fatal: None,
        };
        let mut failures = FailureCollector::new(cx.unique_id().clone());
        run.node_started(&cx);
        run.run_children(&scope, roots);
        for err in cx.close() {
            failures.record(Category::Teardown, err);
        }
        run.finish_node(&cx, failures);

        let summary = run.report.summary();
        info!(
            tests_succeeded = summary.tests_succeeded,
            tests_failed = summary.tests_failed,
            containers_failed = summary.containers_failed,
            "execution finished"
        );
        match run.fatal {
            Some(fatal) => Err(fatal),
            None => Ok(run.report),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

fn root_orderers(config: &OrderConfig) -> (Arc<dyn Orderer>, Arc<dyn Orderer>) {
    let uses_random = config.tests == OrdererKind::Random || config.containers == OrdererKind::Random;
    let random = match config.seed {
        Some(seed) => RandomOrderer::new(seed),
        None if uses_random => RandomOrderer::generated(),
        None => RandomOrderer::new(0),
    };
    (config.tests.build(random), config.containers.build(random))
}

/// One enclosing container's instance slot
#[derive(Clone)]
struct InstanceFrame {
    container: Arc<str>,
    registry: Arc<ExtensionRegistry>,
    constructor: Option<Constructor>,
    instance: Option<TestInstance>,
}

/// What a node inherits from its parent
struct Scope {
    cx: Arc<ExtensionContext>,
    registry: Arc<ExtensionRegistry>,
    /// Enclosing containers, outermost first
    frames: Vec<InstanceFrame>,
    /// Nearest container timeout declaration
    timeout: Option<TimeoutDeclaration>,
    test_orderer: Arc<dyn Orderer>,
    container_orderer: Arc<dyn Orderer>,
}

fn visible_instances(frames: &[InstanceFrame]) -> TestInstances {
    TestInstances::new(frames.iter().filter_map(|f| f.instance.clone()).collect())
}

fn node_id(cx: &ExtensionContext) -> Arc<str> {
    Arc::from(cx.unique_id().to_string())
}

fn empty_instance() -> Box<dyn Any + Send> {
    Box::new(())
}

/// State of one traversal
struct Run<'e> {
    engine: &'e Engine,
    report: RunReport,
    fatal: Option<LifecycleError>,
}

impl Run<'_> {
    fn emit(&self, kind: EventKind) {
        self.engine.event_log.emit(kind);
    }

    fn node_started(&self, cx: &ExtensionContext) {
        self.emit(EventKind::NodeStarted {
            unique_id: node_id(cx),
            node: cx.unique_id().kind(),
        });
        self.engine.listener.execution_started(cx);
    }

    /// Log the call, then run it under the collector
    fn invoke(
        &self,
        failures: &mut FailureCollector,
        category: Category,
        cx: &ExtensionContext,
        extension: &Arc<dyn Extension>,
        work: impl FnOnce() -> anyhow::Result<()>,
    ) -> bool {
        self.emit(EventKind::CallbackInvoked {
            unique_id: node_id(cx),
            category,
            extension: Arc::from(extension.name()),
        });
        failures.execute(category, work)
    }

    /// Invoke one category over `extensions` in iteration order, skipping
    /// those without the capability. Short-circuit categories stop at the
    /// first failure; best-effort ones run every hook. Returns `false` if
    /// any hook failed.
    fn dispatch<'x>(
        &self,
        failures: &mut FailureCollector,
        category: Category,
        cx: &ExtensionContext,
        extensions: impl IntoIterator<Item = &'x Arc<dyn Extension>>,
        supports: impl Fn(&dyn Extension) -> bool,
        mut call: impl FnMut(&dyn Extension) -> CallbackResult,
    ) -> bool {
        let mut succeeded = true;
        for extension in extensions {
            if !supports(&**extension) {
                continue;
            }
            if !self.invoke(failures, category, cx, extension, || call(&**extension)) {
                succeeded = false;
                if !category.is_best_effort() {
                    break;
                }
            }
        }
        succeeded
    }

    fn finish_node(&mut self, cx: &ExtensionContext, failures: FailureCollector) {
        if self.fatal.is_none() {
            if let Some(internal) = failures.internal() {
                error!(node = %cx.unique_id(), error = %internal.message(), "internal failure; stopping traversal");
                self.fatal = Some(LifecycleError::Fatal {
                    unique_id: cx.unique_id().to_string(),
                    message: internal.message(),
                });
            }
        }

        let outcome = Arc::new(failures.finish());
        cx.record_outcome(Arc::clone(&outcome));
        self.emit(EventKind::NodeFinished {
            unique_id: node_id(cx),
            status: outcome.status(),
            failures: outcome.failures().len(),
            duration_ms: outcome.duration().as_millis() as u64,
        });
        debug!(node = %cx.unique_id(), status = ?outcome.status(), "node finished");
        self.engine.listener.execution_finished(cx, &outcome);
        self.report.push(outcome);
    }

    /// Tests first, then nested containers; each group ordered on its own
    fn run_children(&mut self, scope: &Scope, children: Vec<TestNode>) {
        let parent = scope.cx.unique_id();
        let (tests, containers): (Vec<TestNode>, Vec<TestNode>) = children
            .into_iter()
            .partition(|child| matches!(child, TestNode::Test(_)));
        let tests = order::apply(scope.test_orderer.as_ref(), parent, tests, describe);
        let containers = order::apply(scope.container_orderer.as_ref(), parent, containers, describe);

        for child in tests.into_iter().chain(containers) {
            if self.fatal.is_some() {
                warn!(skipped = child.name(), "not starting node after internal failure");
                continue;
            }
            match child {
                TestNode::Test(test) => self.run_test(scope, test),
                TestNode::Container(container) => self.run_container(scope, container),
            }
        }
    }

    #[instrument(skip_all, fields(container = %node.name))]
    fn run_container(&mut self, parent: &Scope, node: ContainerNode) {
        let ContainerNode {
            name,
            display_name,
            tags,
            lifecycle,
            constructor,
            extensions,
            timeout,
            test_orderer,
            container_orderer,
            children,
            ..
        } = node;

        let display_name = display_name.unwrap_or_else(|| name.clone());
        let cx = parent
            .cx
            .child(Element::Container { name: name.clone() }, display_name, tags);
        let mut failures = FailureCollector::new(cx.unique_id().clone());
        self.node_started(&cx);

        let registry = Arc::new(ExtensionRegistry::child(&parent.registry, extensions));
        let lifecycle = lifecycle.unwrap_or(self.engine.config.instance.lifecycle);
        let timeouts_enabled = self.engine.config.timeout.enabled;

        let prepared = failures.execute(Category::Prepare, || {
            registry.resolve_instance_factory(&name)?;
            if let (true, Some(declared)) = (timeouts_enabled, &timeout) {
                TimeoutDuration::parse(&declared.text)?;
            }
            Ok(())
        });

        if prepared {
            let mut frames = parent.frames.clone();
            frames.push(InstanceFrame {
                container: Arc::from(name.as_str()),
                registry: Arc::clone(&registry),
                constructor,
                instance: None,
            });
            let mut owned = Vec::new();

            let mut ready = true;
            if lifecycle == Lifecycle::PerContainer {
                ready = self.instantiate(&cx, &mut frames, &mut owned, &mut failures);
                cx.set_test_instances(Some(visible_instances(&frames)));
            }
            if ready {
                ready = self.dispatch(
                    &mut failures,
                    Category::BeforeAll,
                    &cx,
                    &registry.all(),
                    |e| e.as_before_all().is_some(),
                    |e| e.as_before_all().map_or(Ok(()), |callback| callback.before_all(&cx)),
                );
            }
            if ready {
                let scope = Scope {
                    cx: Arc::clone(&cx),
                    registry: Arc::clone(&registry),
                    frames: frames.clone(),
                    timeout: timeout.or_else(|| parent.timeout.clone()),
                    test_orderer: test_orderer.unwrap_or_else(|| Arc::clone(&parent.test_orderer)),
                    container_orderer: container_orderer
                        .unwrap_or_else(|| Arc::clone(&parent.container_orderer)),
                };
                self.run_children(&scope, children);
            }

            self.dispatch(
                &mut failures,
                Category::AfterAll,
                &cx,
                registry.all().iter().rev(),
                |e| e.as_after_all().is_some(),
                |e| e.as_after_all().map_or(Ok(()), |callback| callback.after_all(&cx)),
            );
            self.destroy(&cx, &frames, &owned, &mut failures);
        }

        for err in cx.close() {
            failures.record(Category::Teardown, err);
        }
        self.finish_node(&cx, failures);
    }

    #[instrument(skip_all, fields(test = %test.name))]
    fn run_test(&mut self, parent: &Scope, test: TestCase) {
        let TestCase {
            name,
            display_name,
            tags,
            body,
            parameters,
            extensions,
            timeout,
            ..
        } = test;

        let display_name = display_name.unwrap_or_else(|| name.clone());
        let cx = parent
            .cx
            .child(Element::Test { name: name.clone() }, display_name, tags);
        let mut failures = FailureCollector::new(cx.unique_id().clone());
        let registry = Arc::new(ExtensionRegistry::child(&parent.registry, extensions));

        let effective = failures.capture(Category::Prepare, || {
            Ok(resolve_timeout(
                timeout.as_ref(),
                parent.timeout.as_ref(),
                &self.engine.config.timeout,
            )?)
        });

        if let Some(effective) = effective {
            let mut frames = parent.frames.clone();
            let mut owned = Vec::new();

            if self.instantiate(&cx, &mut frames, &mut owned, &mut failures) {
                let instances = visible_instances(&frames);
                cx.set_test_instances(Some(instances.clone()));
                self.node_started(&cx);

                let extensions = registry.all();
                let ready = self.dispatch(
                    &mut failures,
                    Category::BeforeEach,
                    &cx,
                    &extensions,
                    |e| e.as_before_each().is_some(),
                    |e| e.as_before_each().map_or(Ok(()), |callback| callback.before_each(&cx)),
                );

                if ready {
                    let target = BodyTarget {
                        name: &name,
                        parameters: &parameters,
                        body: &body,
                        instances,
                        timeout: effective,
                    };
                    self.invoke_body(&cx, &registry, target, &mut failures);
                }

                self.dispatch(
                    &mut failures,
                    Category::AfterEach,
                    &cx,
                    extensions.iter().rev(),
                    |e| e.as_after_each().is_some(),
                    |e| e.as_after_each().map_or(Ok(()), |callback| callback.after_each(&cx)),
                );
            }
            self.destroy(&cx, &frames, &owned, &mut failures);
        }

        for err in cx.close() {
            failures.record(Category::Teardown, err);
        }
        self.finish_node(&cx, failures);
    }

    /// Create every missing instance, outermost first: pre-construct hooks,
    /// factory or constructor, then post-processors. Frames created here are
    /// appended to `owned`. Returns `false` at the first failure.
    fn instantiate(
        &self,
        cx: &ExtensionContext,
        frames: &mut [InstanceFrame],
        owned: &mut Vec<usize>,
        failures: &mut FailureCollector,
    ) -> bool {
        for index in 0..frames.len() {
            if frames[index].instance.is_some() {
                continue;
            }
            let frame = frames[index].clone();
            let outer = frames[..index].iter().rev().find_map(|f| f.instance.clone());
            let factory_cx = InstanceFactoryContext {
                container: frame.container.to_string(),
                outer_instance: outer.clone(),
            };
            let extensions = frame.registry.all();

            if !self.dispatch(
                failures,
                Category::PreConstruct,
                cx,
                &extensions,
                |e| e.as_pre_construct().is_some(),
                |e| {
                    e.as_pre_construct()
                        .map_or(Ok(()), |callback| callback.pre_construct(&factory_cx, cx))
                },
            ) {
                return false;
            }

            let created = failures.capture(Category::Instantiation, || {
                match frame.registry.resolve_instance_factory(&frame.container)? {
                    Some(extension) => {
                        self.emit(EventKind::CallbackInvoked {
                            unique_id: node_id(cx),
                            category: Category::Instantiation,
                            extension: Arc::from(extension.name()),
                        });
                        match extension.as_instance_factory() {
                            Some(factory) => factory.create_instance(&factory_cx, cx),
                            None => Ok(empty_instance()),
                        }
                    }
                    None => match &frame.constructor {
                        Some(construct) => construct(outer.as_ref()),
                        None => Ok(empty_instance()),
                    },
                }
            });
            let Some(value) = created else {
                return false;
            };

            let instance = TestInstance::new(&frame.container, value);
            frames[index].instance = Some(instance.clone());
            owned.push(index);
            self.emit(EventKind::InstanceCreated {
                unique_id: node_id(cx),
                container: Arc::clone(&frame.container),
            });

            if !self.dispatch(
                failures,
                Category::PostProcess,
                cx,
                &extensions,
                |e| e.as_post_processor().is_some(),
                |e| {
                    e.as_post_processor()
                        .map_or(Ok(()), |processor| processor.post_process(&instance, cx))
                },
            ) {
                return false;
            }
        }
        true
    }

    /// Pre-destroy every owned instance, innermost first; every hook runs
    fn destroy(
        &self,
        cx: &ExtensionContext,
        frames: &[InstanceFrame],
        owned: &[usize],
        failures: &mut FailureCollector,
    ) {
        for &index in owned.iter().rev() {
            let frame = &frames[index];
            let Some(instance) = &frame.instance else {
                continue;
            };
            self.dispatch(
                failures,
                Category::PreDestroy,
                cx,
                frame.registry.all().iter().rev(),
                |e| e.as_pre_destroy().is_some(),
                |e| e.as_pre_destroy().map_or(Ok(()), |callback| callback.pre_destroy(instance, cx)),
            );
            self.emit(EventKind::InstanceDestroyed {
                unique_id: node_id(cx),
                container: Arc::clone(&frame.container),
            });
        }
    }

    /// Resolve parameters, then run the body wrapped by every interceptor,
    /// outermost registration outermost
    fn invoke_body(
        &self,
        cx: &Arc<ExtensionContext>,
        registry: &ExtensionRegistry,
        target: BodyTarget<'_>,
        failures: &mut FailureCollector,
    ) {
        let Some(arguments) = failures.capture(Category::TestBody, || {
            resolve_arguments(registry, cx, target.name, target.parameters)
        }) else {
            return;
        };

        let icx = InvocationContext::new(
            target.name,
            Arc::clone(cx),
            target.instances,
            arguments,
            target.timeout,
        );
        let proceeded = Arc::new(AtomicBool::new(false));

        let mut invocation = {
            let body = Arc::clone(target.body);
            let icx = icx.clone();
            let proceeded = Arc::clone(&proceeded);
            let log = self.engine.event_log.clone();
            let unique_id = node_id(cx);
            Invocation::new(move || {
                proceeded.store(true, Ordering::SeqCst);
                log.emit(EventKind::TestBodyInvoked { unique_id });
                body(&icx)
            })
        };

        for extension in registry.all().into_iter().rev() {
            if extension.as_invocation_interceptor().is_none() {
                continue;
            }
            let inner = invocation;
            let icx = icx.clone();
            let log = self.engine.event_log.clone();
            let unique_id = node_id(cx);
            invocation = Invocation::new(move || {
                log.emit(EventKind::CallbackInvoked {
                    unique_id,
                    category: Category::TestBody,
                    extension: Arc::from(extension.name()),
                });
                match extension.as_invocation_interceptor() {
                    Some(interceptor) => interceptor.intercept_test(inner, &icx),
                    None => inner.proceed(),
                }
            });
        }

        failures.execute(Category::TestBody, || {
            invocation.proceed()?;
            if !proceeded.load(Ordering::SeqCst) {
                return Err(LifecycleError::InvocationNotProceeded {
                    test: target.name.to_string(),
                }
                .into());
            }
            Ok(())
        });
    }
}

/// The test a body invocation is built for
struct BodyTarget<'a> {
    name: &'a str,
    parameters: &'a [ParameterDescriptor],
    body: &'a TestBody,
    instances: TestInstances,
    timeout: Option<EffectiveTimeout>,
}

/// Exactly one resolver must claim each parameter
fn resolve_arguments(
    registry: &ExtensionRegistry,
    cx: &ExtensionContext,
    test: &str,
    parameters: &[ParameterDescriptor],
) -> anyhow::Result<Arguments> {
    if parameters.is_empty() {
        return Ok(Arguments::default());
    }
    let resolvers = registry.all_with(|e| e.as_parameter_resolver().is_some());
    let mut values = Vec::with_capacity(parameters.len());

    for parameter in parameters {
        let supporting: Vec<(&Arc<dyn Extension>, &dyn ParameterResolver)> = resolvers
            .iter()
            .filter_map(|extension| {
                extension
                    .as_parameter_resolver()
                    .filter(|resolver| resolver.supports(parameter, cx))
                    .map(|resolver| (extension, resolver))
            })
            .collect();

        match supporting.as_slice() {
            [] => {
                return Err(LifecycleError::NoParameterResolver {
                    test: test.to_string(),
                    index: parameter.index,
                    name: parameter.name.clone(),
                }
                .into())
            }
            [(_, resolver)] => values.push(resolver.resolve(parameter, cx).with_context(|| {
                format!(
                    "failed to resolve parameter [{}] '{}' of '{test}'",
                    parameter.index, parameter.name
                )
            })?),
            many => {
                return Err(LifecycleError::AmbiguousParameterResolvers {
                    test: test.to_string(),
                    index: parameter.index,
                    name: parameter.name.clone(),
                    resolvers: many
                        .iter()
                        .map(|(extension, _)| extension.name())
                        .collect::<Vec<_>>()
                        .join(", "),
                }
                .into())
            }
        }
    }
    Ok(Arguments::new(values))
}
