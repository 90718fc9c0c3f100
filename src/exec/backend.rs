// src/exec/backend.rs

//! Pluggable analyzer abstraction.
//!
//! The engine only ever talks to `dyn Analyzer`. Production analyzers shell
//! out (see [`super::command::CommandAnalyzer`]); tests plug in fakes that
//! record invocations or fail on demand.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cache::Artifact;
use crate::types::{AnalyzerId, Target};

/// Boxed future returned by [`Analyzer::run`]. The payload is opaque bytes,
/// usually JSON.
pub type AnalyzerFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + 'a>>;

/// Everything a single analyzer invocation gets to see.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub target: Target,
    pub analyzer: AnalyzerId,
    /// Latest artifacts of the analyzer's declared dependencies.
    pub inputs: BTreeMap<AnalyzerId, Artifact>,
    /// Fires when the job is cancelled or this run times out.
    pub cancel: CancellationToken,
    pub timeout: Duration,
}

/// Capability implemented once per analyzer.
pub trait Analyzer: Send + Sync {
    fn run(&self, ctx: RunContext) -> AnalyzerFuture<'_>;
}

/// Adapter turning an async closure into an [`Analyzer`].
pub struct FnAnalyzer<F> {
    f: F,
}

pub fn analyzer_fn<F, Fut>(f: F) -> FnAnalyzer<F>
where
    F: Fn(RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    FnAnalyzer { f }
}

impl<F, Fut> Analyzer for FnAnalyzer<F>
where
    F: Fn(RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    fn run(&self, ctx: RunContext) -> AnalyzerFuture<'_> {
        Box::pin((self.f)(ctx))
    }
}
