//! # Instance Lifecycle Tests
//!
//! - per-test vs per-container instances
//! - pre-construct → construct → post-process, mirrored by pre-destroy
//! - nested instances and the enclosing instance handed to constructors
//! - instance factories: innermost wins, conflicts rejected up front

mod common;

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cadence::{
    Category, ContainerNode, Engine, EngineConfig, FailureKind, FnExtension, Lifecycle, TestCase,
    TestInstance,
};
use common::{body, hooks, init_tracing, instance_hooks, Journal};
use pretty_assertions::assert_eq;

fn engine() -> Engine {
    init_tracing();
    Engine::new(EngineConfig::default())
}

fn counting_constructor(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(Option<&TestInstance>) -> anyhow::Result<u32> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_: Option<&TestInstance>| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

fn bump(journal: &Journal, name: &'static str) -> TestCase {
    let journal = journal.clone();
    TestCase::new(name, move |cx| {
        let seen = cx.with_instance(|n: &mut u32| {
            *n += 1;
            *n
        })?;
        journal.push(format!("body:{name}:{seen:?}"));
        Ok(())
    })
}

// ============================================================================
// LIFECYCLE POLICY
// ============================================================================

#[test]
fn per_test_lifecycle_builds_a_fresh_instance_each_time() {
    let journal = Journal::new();
    let constructed = Arc::new(AtomicUsize::new(0));
    let tree = ContainerNode::new("Suite")
        .constructor(counting_constructor(&constructed))
        .extension(instance_hooks(&journal, "ih"))
        .test(bump(&journal, "a"))
        .test(bump(&journal, "b"));

    let report = engine().execute([tree]).unwrap();

    assert!(report.is_success());
    assert_eq!(constructed.load(Ordering::SeqCst), 2);
    assert_eq!(
        journal.entries(),
        vec![
            "ih:pre_construct:Suite",
            "ih:post_process:Suite",
            "body:a:Some(1)",
            "ih:pre_destroy:Suite",
            "ih:pre_construct:Suite",
            "ih:post_process:Suite",
            "body:b:Some(1)",
            "ih:pre_destroy:Suite",
        ]
    );
}

#[test]
fn per_container_lifecycle_shares_one_instance() {
    let journal = Journal::new();
    let constructed = Arc::new(AtomicUsize::new(0));
    let tree = ContainerNode::new("Suite")
        .lifecycle(Lifecycle::PerContainer)
        .constructor(counting_constructor(&constructed))
        .extension(instance_hooks(&journal, "ih"))
        .extension(hooks(&journal, "h"))
        .test(bump(&journal, "a"))
        .test(bump(&journal, "b"));

    let report = engine().execute([tree]).unwrap();

    assert!(report.is_success());
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert_eq!(
        journal.entries(),
        vec![
            "ih:pre_construct:Suite",
            "ih:post_process:Suite",
            "h:before_all:Suite",
            "h:before_each",
            "body:a:Some(1)",
            "h:after_each",
            "h:before_each",
            "body:b:Some(2)",
            "h:after_each",
            "h:after_all:Suite",
            "ih:pre_destroy:Suite",
        ]
    );
}

#[test]
fn configured_lifecycle_applies_when_container_is_silent() {
    let journal = Journal::new();
    let constructed = Arc::new(AtomicUsize::new(0));
    let config = EngineConfig::from_parameters([("instance.lifecycle", "per_container")]).unwrap();
    let tree = ContainerNode::new("Suite")
        .constructor(counting_constructor(&constructed))
        .test(bump(&journal, "a"))
        .test(bump(&journal, "b"));

    Engine::new(config).execute([tree]).unwrap();

    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert_eq!(journal.entries(), vec!["body:a:Some(1)", "body:b:Some(2)"]);
}

// ============================================================================
// NESTING
// ============================================================================

#[test]
fn nested_instances_are_built_outer_first_and_destroyed_inner_first() {
    let journal = Journal::new();
    let tree = ContainerNode::new("Outer")
        .extension(instance_hooks(&journal, "outer"))
        .container(
            ContainerNode::new("Inner")
                .extension(instance_hooks(&journal, "inner"))
                .test(body(&journal, "t")),
        );

    engine().execute([tree]).unwrap();

    // The outer registration sees both instances, so its pre-destroy fires twice.
    assert_eq!(
        journal.entries(),
        vec![
            "outer:pre_construct:Outer",
            "outer:post_process:Outer",
            "outer:pre_construct:Inner",
            "inner:pre_construct:Inner",
            "outer:post_process:Inner",
            "inner:post_process:Inner",
            "body:t",
            "inner:pre_destroy:Inner",
            "outer:pre_destroy:Inner",
            "outer:pre_destroy:Outer",
        ]
    );
}

#[test]
fn inner_constructor_receives_enclosing_instance() {
    let journal = Journal::new();
    let j = journal.clone();
    let tree = ContainerNode::new("Outer")
        .constructor(|_| Ok(String::from("fixture")))
        .container(
            ContainerNode::new("Inner")
                .constructor(|outer| {
                    let base = outer
                        .map(|o| o.with(|s: &String| s.clone()))
                        .transpose()?
                        .flatten()
                        .unwrap_or_default();
                    Ok(format!("{base}+inner"))
                })
                .test(TestCase::new("t", move |cx| {
                    let outer = cx
                        .instances()
                        .for_container("Outer")
                        .map(|i| i.with(|s: &String| s.clone()))
                        .transpose()?
                        .flatten();
                    let inner = cx.with_instance(|s: &mut String| s.clone())?;
                    j.push(format!("{outer:?} {inner:?}"));
                    Ok(())
                })),
        );

    engine().execute([tree]).unwrap();

    assert_eq!(
        journal.entries(),
        vec![r#"Some("fixture") Some("fixture+inner")"#]
    );
}

#[test]
fn shared_outer_instance_is_reused_by_nested_tests() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let journal = Journal::new();
    let tree = ContainerNode::new("Outer")
        .lifecycle(Lifecycle::PerContainer)
        .constructor(counting_constructor(&constructed))
        .container(ContainerNode::new("InnerA").test(body(&journal, "a")))
        .container(ContainerNode::new("InnerB").test(body(&journal, "b")));

    let report = engine().execute([tree]).unwrap();

    assert!(report.is_success());
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
}

// ============================================================================
// FACTORIES
// ============================================================================

fn factory(name: &'static str, value: u32) -> FnExtension {
    FnExtension::new(name)
        .instance_factory(move |_, _| Ok(Box::new(value) as Box<dyn Any + Send>))
}

fn reads_u32(journal: &Journal, name: &'static str) -> TestCase {
    let journal = journal.clone();
    TestCase::new(name, move |cx| {
        let value = cx.with_instance(|n: &mut u32| *n)?;
        journal.push(format!("{name}:{value:?}"));
        Ok(())
    })
}

#[test]
fn factory_replaces_default_construction() {
    let journal = Journal::new();
    let engine = engine();
    let tree = ContainerNode::new("Suite")
        .constructor(|_| Ok(1_u32))
        .extension(factory("di", 99))
        .test(reads_u32(&journal, "t"));

    engine.execute([tree]).unwrap();

    assert_eq!(journal.entries(), vec!["t:Some(99)"]);
    assert!(engine
        .event_log()
        .callback_sequence()
        .contains(&(Category::Instantiation, Arc::from("di"))));
}

#[test]
fn innermost_factory_wins() {
    let journal = Journal::new();
    let tree = ContainerNode::new("Outer")
        .extension(factory("outer-di", 1))
        .container(
            ContainerNode::new("Inner")
                .extension(factory("inner-di", 2))
                .test(reads_u32(&journal, "t")),
        );

    let report = engine().execute([tree]).unwrap();

    assert!(report.is_success());
    assert_eq!(journal.entries(), vec!["t:Some(2)"]);
}

#[test]
fn conflicting_factories_fail_before_any_hook() {
    let journal = Journal::new();
    let constructed = Arc::new(AtomicUsize::new(0));
    let tree = ContainerNode::new("Suite")
        .constructor(counting_constructor(&constructed))
        .extension(hooks(&journal, "h"))
        .extension(instance_hooks(&journal, "ih"))
        .extension(factory("a", 1))
        .extension(factory("b", 2))
        .test(body(&journal, "t"));

    let report = engine().execute([tree]).unwrap();

    assert!(journal.entries().is_empty());
    assert_eq!(constructed.load(Ordering::SeqCst), 0);
    assert!(report.by_name("t").is_none());
    let primary = report.by_name("Suite").unwrap().primary().unwrap().clone();
    assert_eq!(primary.category, Category::Prepare);
    assert_eq!(primary.kind, FailureKind::Configuration);
    assert!(primary.message().contains("CAD-002"));
}

// ============================================================================
// FAILURES DURING CONSTRUCTION
// ============================================================================

#[test]
fn post_process_failure_still_destroys_the_instance() {
    let journal = Journal::new();
    let (j1, j2, j3) = (journal.clone(), journal.clone(), journal.clone());
    let tree = ContainerNode::new("Suite")
        .extension(FnExtension::new("inject").post_process(move |_, _| {
            j1.push("inject:post_process");
            anyhow::bail!("missing dependency")
        }))
        .extension(FnExtension::new("later").post_process(move |_, _| {
            j2.push("later:post_process");
            Ok(())
        }))
        .extension(FnExtension::new("cleanup").pre_destroy(move |_, _| {
            j3.push("cleanup:pre_destroy");
            Ok(())
        }))
        .extension(hooks(&journal, "h"))
        .test(body(&journal, "t"));

    let report = engine().execute([tree]).unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            "h:before_all:Suite",
            "inject:post_process",
            "cleanup:pre_destroy",
            "h:after_all:Suite",
        ]
    );
    let primary = report.by_name("t").unwrap().primary().unwrap().clone();
    assert_eq!(primary.category, Category::PostProcess);
}

#[test]
fn pre_construct_failure_skips_construction_and_destruction() {
    let journal = Journal::new();
    let constructed = Arc::new(AtomicUsize::new(0));
    let j = journal.clone();
    let tree = ContainerNode::new("Suite")
        .constructor(counting_constructor(&constructed))
        .extension(FnExtension::new("guard").pre_construct(move |_, _| {
            j.push("guard:pre_construct");
            anyhow::bail!("not allowed")
        }))
        .extension(instance_hooks(&journal, "ih"))
        .test(body(&journal, "t"));

    let report = engine().execute([tree]).unwrap();

    assert_eq!(journal.entries(), vec!["guard:pre_construct"]);
    assert_eq!(constructed.load(Ordering::SeqCst), 0);
    let primary = report.by_name("t").unwrap().primary().unwrap().clone();
    assert_eq!(primary.category, Category::PreConstruct);
}

#[test]
fn constructor_failure_is_an_instantiation_failure() {
    let journal = Journal::new();
    let tree = ContainerNode::new("Suite")
        .constructor(|_| -> anyhow::Result<u32> { anyhow::bail!("no database") })
        .extension(instance_hooks(&journal, "ih"))
        .test(body(&journal, "t"));

    let report = engine().execute([tree]).unwrap();

    assert_eq!(journal.entries(), vec!["ih:pre_construct:Suite"]);
    let primary = report.by_name("t").unwrap().primary().unwrap().clone();
    assert_eq!(primary.category, Category::Instantiation);
    assert_eq!(primary.message(), "no database");
}
