//! Order Module - sibling ordering strategies
//!
//! Orderers rearrange one group of direct siblings (the tests of a container,
//! or its nested containers). They never move a node across groups.
//!
//! Key types:
//! - `Orderer`: Strategy over `OrderingDescriptor` snapshots
//! - `OrdererKind`: Built-in strategy ids used in configuration
//! - `RandomOrderer`: Seeded shuffle, reproducible per parent node

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::context::UniqueId;
use crate::error::LifecycleError;

/// Rank given to siblings without a declared order; sorts after typical
/// explicit orders while leaving room on both sides
pub const DEFAULT_ORDER: i32 = i32::MAX / 2;

/// Snapshot of one sibling, used only while ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingDescriptor {
    pub name: String,
    pub display_name: String,
    pub order: Option<i32>,
    /// Position in discovery order
    pub discovery_index: usize,
}

pub trait Orderer: Send + Sync {
    fn name(&self) -> &str;

    /// Reorder `siblings` in place. Must keep the same elements.
    fn order(&self, parent: &UniqueId, siblings: &mut [OrderingDescriptor]);
}

/// Keeps discovery order
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOrderer;

impl Orderer for DefaultOrderer {
    fn name(&self) -> &str {
        "default"
    }

    fn order(&self, _parent: &UniqueId, siblings: &mut [OrderingDescriptor]) {
        siblings.sort_by_key(|d| d.discovery_index);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NameOrderer;

impl Orderer for NameOrderer {
    fn name(&self) -> &str {
        "name"
    }

    fn order(&self, _parent: &UniqueId, siblings: &mut [OrderingDescriptor]) {
        siblings.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DisplayNameOrderer;

impl Orderer for DisplayNameOrderer {
    fn name(&self) -> &str {
        "display_name"
    }

    fn order(&self, _parent: &UniqueId, siblings: &mut [OrderingDescriptor]) {
        siblings.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    }
}

/// Ascending declared order; ties keep discovery order
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredOrderOrderer;

impl Orderer for DeclaredOrderOrderer {
    fn name(&self) -> &str {
        "declared_order"
    }

    fn order(&self, _parent: &UniqueId, siblings: &mut [OrderingDescriptor]) {
        siblings.sort_by_key(|d| (d.order.unwrap_or(DEFAULT_ORDER), d.discovery_index));
    }
}

/// Seeded shuffle. Each parent node gets its own sub-seed derived from the
/// configured seed, so sibling groups are shuffled independently and two
/// orderers with the same seed always agree.
#[derive(Debug, Clone, Copy)]
pub struct RandomOrderer {
    seed: u64,
}

impl RandomOrderer {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Orderer with a time-derived seed, logged so the run can be reproduced
    pub fn generated() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        info!(seed, "using generated seed for random ordering; set order.random.seed to reproduce");
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Orderer for RandomOrderer {
    fn name(&self) -> &str {
        "random"
    }

    fn order(&self, parent: &UniqueId, siblings: &mut [OrderingDescriptor]) {
        // Start from a canonical order so the result depends only on the set.
        siblings.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.discovery_index.cmp(&b.discovery_index))
        });
        let sub_seed = xxh3_64_with_seed(parent.to_string().as_bytes(), self.seed);
        let mut rng = ChaCha8Rng::seed_from_u64(sub_seed);
        siblings.shuffle(&mut rng);
    }
}

/// Built-in orderers by configuration id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrdererKind {
    #[default]
    Default,
    Name,
    DisplayName,
    DeclaredOrder,
    Random,
}

impl OrdererKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OrdererKind::Default => "default",
            OrdererKind::Name => "name",
            OrdererKind::DisplayName => "display_name",
            OrdererKind::DeclaredOrder => "declared_order",
            OrdererKind::Random => "random",
        }
    }

    /// Instantiate; `random` uses `random` as its seed source
    pub fn build(self, random: RandomOrderer) -> Arc<dyn Orderer> {
        match self {
            OrdererKind::Default => Arc::new(DefaultOrderer),
            OrdererKind::Name => Arc::new(NameOrderer),
            OrdererKind::DisplayName => Arc::new(DisplayNameOrderer),
            OrdererKind::DeclaredOrder => Arc::new(DeclaredOrderOrderer),
            OrdererKind::Random => Arc::new(random),
        }
    }
}

impl fmt::Display for OrdererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrdererKind {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "default" => Ok(OrdererKind::Default),
            "name" | "method_name" => Ok(OrdererKind::Name),
            "display_name" => Ok(OrdererKind::DisplayName),
            "declared_order" | "order_annotation" => Ok(OrdererKind::DeclaredOrder),
            "random" => Ok(OrdererKind::Random),
            _ => Err(LifecycleError::UnknownOrderer {
                name: s.to_string(),
            }),
        }
    }
}

/// Order `items` with `orderer`. An orderer that adds, drops or duplicates
/// elements is ignored and discovery order is kept.
pub fn apply<T, F>(orderer: &dyn Orderer, parent: &UniqueId, items: Vec<T>, describe: F) -> Vec<T>
where
    F: Fn(usize, &T) -> OrderingDescriptor,
{
    if items.len() < 2 {
        return items;
    }
    let mut descriptors: Vec<OrderingDescriptor> = items
        .iter()
        .enumerate()
        .map(|(index, item)| describe(index, item))
        .collect();
    orderer.order(parent, &mut descriptors);

    let mut seen = vec![false; items.len()];
    let permutation_ok = descriptors.iter().all(|d| {
        d.discovery_index < seen.len() && !std::mem::replace(&mut seen[d.discovery_index], true)
    });
    if !permutation_ok {
        warn!(orderer = orderer.name(), parent = %parent, "orderer changed the sibling set; keeping discovery order");
        return items;
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    descriptors
        .iter()
        .filter_map(|d| slots[d.discovery_index].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeKind;

    fn parent() -> UniqueId {
        UniqueId::engine("cadence").append(NodeKind::Container, "Suite")
    }

    fn descriptors(names: &[&str]) -> Vec<OrderingDescriptor> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| OrderingDescriptor {
                name: name.to_string(),
                display_name: name.to_lowercase(),
                order: None,
                discovery_index: i,
            })
            .collect()
    }

    fn names(descriptors: &[OrderingDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn by_name() {
        let mut siblings = descriptors(&["C", "A", "B"]);
        NameOrderer.order(&parent(), &mut siblings);
        assert_eq!(names(&siblings), vec!["A", "B", "C"]);
    }

    #[test]
    fn by_display_name() {
        let mut siblings = descriptors(&["x", "y"]);
        siblings[0].display_name = "zeta".into();
        siblings[1].display_name = "alpha".into();
        DisplayNameOrderer.order(&parent(), &mut siblings);
        assert_eq!(names(&siblings), vec!["y", "x"]);
    }

    #[test]
    fn declared_order_with_fallback() {
        let mut siblings = descriptors(&["unordered", "ten", "two", "also_unordered"]);
        siblings[1].order = Some(10);
        siblings[2].order = Some(2);
        DeclaredOrderOrderer.order(&parent(), &mut siblings);
        assert_eq!(
            names(&siblings),
            vec!["two", "ten", "unordered", "also_unordered"]
        );
    }

    #[test]
    fn random_is_reproducible_with_explicit_seed() {
        let input = descriptors(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let mut first = input.clone();
        let mut second = input.clone();
        second.reverse();

        RandomOrderer::new(42).order(&parent(), &mut first);
        RandomOrderer::new(42).order(&parent(), &mut second);
        assert_eq!(names(&first), names(&second));

        let mut sorted = names(&first);
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d", "e", "f", "g", "h"]);
    }

    #[test]
    fn random_sub_seeds_differ_per_parent() {
        let input = descriptors(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]);
        let orderer = RandomOrderer::new(7);
        let other_parent = UniqueId::engine("cadence").append(NodeKind::Container, "Other");

        let orders: Vec<Vec<String>> = [parent(), other_parent]
            .iter()
            .map(|p| {
                let mut siblings = input.clone();
                orderer.order(p, &mut siblings);
                siblings.into_iter().map(|d| d.name).collect()
            })
            .collect();
        assert_ne!(orders[0], orders[1]);
    }

    #[test]
    fn apply_rearranges_items() {
        let items = vec!["C", "A", "B"];
        let ordered = apply(&NameOrderer, &parent(), items, |i, name| OrderingDescriptor {
            name: name.to_string(),
            display_name: name.to_string(),
            order: None,
            discovery_index: i,
        });
        assert_eq!(ordered, vec!["A", "B", "C"]);
    }

    struct Dropping;

    impl Orderer for Dropping {
        fn name(&self) -> &str {
            "dropping"
        }

        fn order(&self, _parent: &UniqueId, siblings: &mut [OrderingDescriptor]) {
            let first = siblings[0].clone();
            for sibling in siblings.iter_mut() {
                *sibling = first.clone();
            }
        }
    }

    #[test]
    fn apply_ignores_orderers_that_change_the_set() {
        let ordered = apply(&Dropping, &parent(), vec![3, 1, 2], |i, n| OrderingDescriptor {
            name: n.to_string(),
            display_name: n.to_string(),
            order: None,
            discovery_index: i,
        });
        assert_eq!(ordered, vec![3, 1, 2]);
    }

    #[test]
    fn kinds_parse_from_ids() {
        assert_eq!("random".parse::<OrdererKind>().unwrap(), OrdererKind::Random);
        assert_eq!(
            "display-name".parse::<OrdererKind>().unwrap(),
            OrdererKind::DisplayName
        );
        assert_eq!("bogus".parse::<OrdererKind>().unwrap_err().code(), "CAD-007");
    }
}
