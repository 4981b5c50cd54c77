//! Runtime Module - Lifecycle execution
//!
//! Contains the execution components:
//! - `engine`: Depth-first orchestration of the test tree
//! - `node`: Container and test descriptors
//! - `outcome`: Failure collection and per-node outcomes
//! - `report`: Outcomes of a whole run
//!
//! This module represents the "how". Extension points live in `extension`.

mod engine;
mod node;
mod outcome;
mod report;

// Re-export public types
pub use engine::Engine;
pub use node::{ContainerNode, TestBody, TestCase, TestNode};
pub use outcome::{ExecutionOutcome, RecordedFailure, Status};
pub use report::{RunReport, Summary};
