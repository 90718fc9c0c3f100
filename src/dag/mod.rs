// src/dag/mod.rs

//! Dependency graph and wave planning.
//!
//! - [`graph`] holds the index-based dependency graph over the closure of a
//!   request.
//! - [`scheduler`] performs the layered topological sort and names cycles.
//! - [`plan`] is the resulting wave list handed to the engine.

pub mod graph;
pub mod plan;
pub mod scheduler;

pub use graph::DagGraph;
pub use plan::{ExecutionPlan, Wave};
pub use scheduler::Scheduler;
