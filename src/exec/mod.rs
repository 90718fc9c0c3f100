// src/exec/mod.rs

//! Analyzer execution capability.
//!
//! - [`backend`] defines the `Analyzer` trait the engine dispatches to, the
//!   per-run `RunContext`, and a closure adapter.
//! - [`command`] provides `CommandAnalyzer`, which runs a shell command and
//!   uses its stdout as the artifact payload.

pub mod backend;
pub mod command;

pub use backend::{Analyzer, AnalyzerFuture, FnAnalyzer, RunContext, analyzer_fn};
pub use command::CommandAnalyzer;
