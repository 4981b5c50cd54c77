//! Test tree descriptors handed to the engine

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::extension::{Constructor, Extension, InvocationContext, Lifecycle, ParameterDescriptor, TestInstance};
use crate::order::{Orderer, OrderingDescriptor};
use crate::timeout::{ThreadMode, TimeoutDeclaration};

/// Zero-argument test invocation; everything it needs comes through the
/// invocation context
pub type TestBody = Arc<dyn Fn(&InvocationContext) -> anyhow::Result<()> + Send + Sync>;

/// Node of the test tree
pub enum TestNode {
    Container(ContainerNode),
    Test(TestCase),
}

impl TestNode {
    pub fn name(&self) -> &str {
        match self {
            TestNode::Container(c) => &c.name,
            TestNode::Test(t) => &t.name,
        }
    }
}

impl From<ContainerNode> for TestNode {
    fn from(node: ContainerNode) -> Self {
        TestNode::Container(node)
    }
}

impl From<TestCase> for TestNode {
    fn from(node: TestCase) -> Self {
        TestNode::Test(node)
    }
}

/// Group of tests and nested containers sharing an instance type
pub struct ContainerNode {
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) order: Option<i32>,
    pub(crate) lifecycle: Option<Lifecycle>,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) extensions: Vec<Arc<dyn Extension>>,
    pub(crate) timeout: Option<TimeoutDeclaration>,
    pub(crate) test_orderer: Option<Arc<dyn Orderer>>,
    pub(crate) container_orderer: Option<Arc<dyn Orderer>>,
    pub(crate) children: Vec<TestNode>,
}

impl ContainerNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            tags: BTreeSet::new(),
            order: None,
            lifecycle: None,
            constructor: None,
            extensions: Vec::new(),
            timeout: None,
            test_orderer: None,
            container_orderer: None,
            children: Vec::new(),
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Declared order among sibling containers
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Overrides `instance.lifecycle`
    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Default construction; receives the enclosing container's instance
    pub fn constructor<V, F>(mut self, construct: F) -> Self
    where
        V: Any + Send,
        F: Fn(Option<&TestInstance>) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(move |outer: Option<&TestInstance>| {
            construct(outer).map(|value| Box::new(value) as Box<dyn Any + Send>)
        }));
        self
    }

    pub fn extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    /// Deadline for every test inside, unless a test declares its own
    pub fn timeout(mut self, text: impl Into<String>) -> Self {
        self.timeout = Some(TimeoutDeclaration::new(text));
        self
    }

    pub fn timeout_with_mode(mut self, text: impl Into<String>, mode: ThreadMode) -> Self {
        self.timeout = Some(TimeoutDeclaration::new(text).with_thread_mode(mode));
        self
    }

    /// Orders this container's tests instead of `order.tests`
    pub fn test_orderer(mut self, orderer: impl Orderer + 'static) -> Self {
        self.test_orderer = Some(Arc::new(orderer));
        self
    }

    /// Orders this container's nested containers instead of `order.containers`
    pub fn container_orderer(mut self, orderer: impl Orderer + 'static) -> Self {
        self.container_orderer = Some(Arc::new(orderer));
        self
    }

    pub fn test(mut self, test: TestCase) -> Self {
        self.children.push(TestNode::Test(test));
        self
    }

    pub fn container(mut self, container: ContainerNode) -> Self {
        self.children.push(TestNode::Container(container));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ContainerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerNode")
            .field("name", &self.name)
            .field("lifecycle", &self.lifecycle)
            .field("children", &self.children.len())
            .finish()
    }
}

pub struct TestCase {
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) order: Option<i32>,
    pub(crate) body: TestBody,
    pub(crate) parameters: Vec<ParameterDescriptor>,
    pub(crate) extensions: Vec<Arc<dyn Extension>>,
    pub(crate) timeout: Option<TimeoutDeclaration>,
}

impl TestCase {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&InvocationContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            display_name: None,
            tags: BTreeSet::new(),
            order: None,
            body: Arc::new(body),
            parameters: Vec::new(),
            extensions: Vec::new(),
            timeout: None,
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Declared order among sibling tests
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Declare the next parameter, `V` typed
    pub fn parameter<V: Any>(mut self, name: impl Into<String>) -> Self {
        let index = self.parameters.len();
        self.parameters.push(ParameterDescriptor::of::<V>(index, name));
        self
    }

    /// Extension registered for this test only
    pub fn extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    pub fn timeout(mut self, text: impl Into<String>) -> Self {
        self.timeout = Some(TimeoutDeclaration::new(text));
        self
    }

    pub fn timeout_with_mode(mut self, text: impl Into<String>, mode: ThreadMode) -> Self {
        self.timeout = Some(TimeoutDeclaration::new(text).with_thread_mode(mode));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Ordering snapshot of a sibling
pub(crate) fn describe(index: usize, node: &TestNode) -> OrderingDescriptor {
    let (name, display_name, order) = match node {
        TestNode::Container(c) => (&c.name, &c.display_name, c.order),
        TestNode::Test(t) => (&t.name, &t.display_name, t.order),
    };
    OrderingDescriptor {
        name: name.clone(),
        display_name: display_name.clone().unwrap_or_else(|| name.clone()),
        order,
        discovery_index: index,
    }
}
