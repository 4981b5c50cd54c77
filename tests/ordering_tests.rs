//! # Ordering Tests
//!
//! Sibling ordering as the engine applies it:
//! - configured strategies for tests and containers
//! - per-container overrides
//! - reproducible seeded shuffles

mod common;

use cadence::order::{NameOrderer, OrderingDescriptor};
use cadence::{ContainerNode, Engine, EngineConfig, Orderer, TestCase, UniqueId};
use common::{body, init_tracing, Journal};
use pretty_assertions::assert_eq;

fn run(config: EngineConfig, tree: ContainerNode) {
    init_tracing();
    let report = Engine::new(config).execute([tree]).unwrap();
    assert!(report.is_success());
}

fn config(parameters: &[(&str, &str)]) -> EngineConfig {
    EngineConfig::from_parameters(parameters.iter().copied()).unwrap()
}

fn suite(journal: &Journal, names: &[&'static str]) -> ContainerNode {
    names
        .iter()
        .fold(ContainerNode::new("Suite"), |suite, name| suite.test(body(journal, *name)))
}

fn bodies(journal: &Journal) -> Vec<String> {
    journal
        .with_prefix("body:")
        .into_iter()
        .map(|entry| entry.trim_start_matches("body:").to_string())
        .collect()
}

#[test]
fn default_keeps_discovery_order() {
    let journal = Journal::new();
    run(EngineConfig::default(), suite(&journal, &["C", "A", "B"]));
    assert_eq!(bodies(&journal), vec!["C", "A", "B"]);
}

#[test]
fn name_orders_lexicographically() {
    let journal = Journal::new();
    run(config(&[("order.tests", "name")]), suite(&journal, &["C", "A", "B"]));
    assert_eq!(bodies(&journal), vec!["A", "B", "C"]);
}

#[test]
fn display_name_orders_by_rendered_name() {
    let journal = Journal::new();
    let tree = ContainerNode::new("Suite")
        .test(body(&journal, "first").display_name("zebra"))
        .test(body(&journal, "second").display_name("aardvark"));
    run(config(&[("order.tests", "display_name")]), tree);
    assert_eq!(bodies(&journal), vec!["second", "first"]);
}

#[test]
fn declared_order_falls_back_to_discovery_for_unordered() {
    let journal = Journal::new();
    let tree = ContainerNode::new("Suite")
        .test(body(&journal, "unordered"))
        .test(body(&journal, "ten").order(10))
        .test(body(&journal, "two").order(2));
    run(config(&[("order.tests", "declared_order")]), tree);
    assert_eq!(bodies(&journal), vec!["two", "ten", "unordered"]);
}

#[test]
fn seeded_random_order_is_reproducible() {
    let names = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
    let orders: Vec<Vec<String>> = (0..2)
        .map(|_| {
            let journal = Journal::new();
            run(
                config(&[("order.tests", "random"), ("order.random.seed", "42")]),
                suite(&journal, &names),
            );
            bodies(&journal)
        })
        .collect();

    assert_eq!(orders[0], orders[1]);
    let mut sorted = orders[0].clone();
    sorted.sort();
    assert_eq!(sorted, names);
}

#[test]
fn containers_run_after_tests_and_are_ordered_separately() {
    let journal = Journal::new();
    let tree = ContainerNode::new("Root")
        .container(ContainerNode::new("Zeta").test(body(&journal, "zeta_test")))
        .test(body(&journal, "root_b"))
        .container(ContainerNode::new("Alpha").test(body(&journal, "alpha_test")))
        .test(body(&journal, "root_a"));
    run(
        config(&[("order.containers", "name"), ("order.tests", "name")]),
        tree,
    );
    assert_eq!(
        bodies(&journal),
        vec!["root_a", "root_b", "alpha_test", "zeta_test"]
    );
}

#[test]
fn container_orderer_overrides_configuration() {
    let journal = Journal::new();
    let tree = suite(&journal, &["C", "A", "B"]).test_orderer(NameOrderer);
    run(EngineConfig::default(), tree);
    assert_eq!(bodies(&journal), vec!["A", "B", "C"]);
}

#[test]
fn override_is_inherited_by_nested_containers() {
    let journal = Journal::new();
    let tree = ContainerNode::new("Outer")
        .test_orderer(NameOrderer)
        .container(suite(&journal, &["y", "x"]));
    run(EngineConfig::default(), tree);
    assert_eq!(bodies(&journal), vec!["x", "y"]);
}

/// Orderer that duplicates the first sibling
struct Duplicating;

impl Orderer for Duplicating {
    fn name(&self) -> &str {
        "duplicating"
    }

    fn order(&self, _parent: &UniqueId, siblings: &mut [OrderingDescriptor]) {
        if siblings.len() > 1 {
            siblings[1] = siblings[0].clone();
        }
    }
}

#[test]
fn broken_orderer_leaves_discovery_order() {
    let journal = Journal::new();
    let tree = ContainerNode::new("Suite")
        .test_orderer(Duplicating)
        .test(body(&journal, "b"))
        .test(body(&journal, "a"))
        .test(TestCase::new("c", {
            let journal = journal.clone();
            move |_| {
                journal.push("body:c");
                Ok(())
            }
        }));
    run(EngineConfig::default(), tree);
    assert_eq!(bodies(&journal), vec!["b", "a", "c"]);
}
