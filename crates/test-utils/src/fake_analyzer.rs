use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::watch;

use scandag::exec::{Analyzer, AnalyzerFuture, RunContext};
use scandag::types::{AnalyzerId, Target};

/// One-shot latch shared between a test and the analyzers it holds back.
/// Once opened it stays open, so late arrivals pass straight through.
#[derive(Debug, Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// What a [`FakeAnalyzer`] does when invoked.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Return a small JSON payload naming analyzer, target and inputs.
    Succeed,
    Payload(Vec<u8>),
    Fail(String),
    /// Sleep, then succeed.
    Sleep(Duration),
    /// Block until the run's cancellation token fires, then fail.
    WaitForCancel,
    /// Block until the gate opens, then succeed.
    Gate(Gate),
}

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub analyzer: AnalyzerId,
    pub target: Target,
    /// Ids of the dependency artifacts handed to the run.
    pub inputs: Vec<AnalyzerId>,
}

#[derive(Debug, Default)]
struct RunLogInner {
    calls: Mutex<Vec<Call>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Shared record of fake analyzer invocations, including how many ran at
/// the same time.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    inner: Arc<RunLogInner>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Analyzer ids in invocation order.
    pub fn order(&self) -> Vec<AnalyzerId> {
        self.calls().into_iter().map(|c| c.analyzer).collect()
    }

    pub fn count(&self, analyzer: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.analyzer == analyzer)
            .count()
    }

    pub fn was_called(&self, analyzer: &str) -> bool {
        self.count(analyzer) > 0
    }

    /// Runs in progress right now.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Highest number of runs observed in progress at once.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    fn enter(&self, call: Call) -> ActiveGuard {
        self.inner.calls.lock().unwrap().push(call);
        let now = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        ActiveGuard {
            log: self.clone(),
        }
    }
}

/// Decrements the active count when a run ends, including when its future
/// is dropped by a timeout.
struct ActiveGuard {
    log: RunLog,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.log.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scriptable [`Analyzer`] for engine and queue tests.
#[derive(Debug, Clone)]
pub struct FakeAnalyzer {
    behaviour: Behaviour,
    log: RunLog,
}

impl FakeAnalyzer {
    pub fn new(behaviour: Behaviour, log: RunLog) -> Self {
        Self { behaviour, log }
    }
}

impl Analyzer for FakeAnalyzer {
    fn run(&self, ctx: RunContext) -> AnalyzerFuture<'_> {
        Box::pin(async move {
            let inputs: Vec<AnalyzerId> = ctx.inputs.keys().cloned().collect();
            let _guard = self.log.enter(Call {
                analyzer: ctx.analyzer.clone(),
                target: ctx.target.clone(),
                inputs: inputs.clone(),
            });

            let default_payload = || {
                format!(
                    r#"{{"analyzer":"{}","target":"{}","inputs":{:?}}}"#,
                    ctx.analyzer, ctx.target, inputs
                )
                .into_bytes()
            };

            match &self.behaviour {
                Behaviour::Succeed => Ok(default_payload()),
                Behaviour::Payload(bytes) => Ok(bytes.clone()),
                Behaviour::Fail(msg) => Err(anyhow!("{msg}")),
                Behaviour::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(default_payload())
                }
                Behaviour::WaitForCancel => {
                    ctx.cancel.cancelled().await;
                    Err(anyhow!("cancelled"))
                }
                Behaviour::Gate(gate) => {
                    gate.wait().await;
                    Ok(default_payload())
                }
            }
        })
    }
}
