// src/exec/command.rs

//! Analyzer backed by a shell command.

use std::collections::BTreeMap;
use std::process::Stdio;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::backend::{Analyzer, AnalyzerFuture, RunContext};

/// Env var carrying the target identifier into the child process.
pub const TARGET_ENV: &str = "SCANDAG_TARGET";
/// Env var carrying the analyzer id into the child process.
pub const ANALYZER_ENV: &str = "SCANDAG_ANALYZER";

/// Lines of stderr kept for the failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Runs `cmd` through the platform shell.
///
/// - stdin receives a JSON object mapping each dependency id to its payload
///   (parsed as JSON when possible, otherwise as a string).
/// - stdout becomes the artifact payload.
/// - a non-zero exit fails the run with the tail of stderr.
/// - cancellation kills the child.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    cmd: String,
}

impl CommandAnalyzer {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }
}

impl Analyzer for CommandAnalyzer {
    fn run(&self, ctx: RunContext) -> AnalyzerFuture<'_> {
        Box::pin(run_command(&self.cmd, ctx))
    }
}

fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

fn encode_inputs(ctx: &RunContext) -> Result<Vec<u8>> {
    let inputs: BTreeMap<&str, serde_json::Value> = ctx
        .inputs
        .iter()
        .map(|(id, artifact)| {
            let value = artifact.payload_json().unwrap_or_else(|| {
                serde_json::Value::String(String::from_utf8_lossy(&artifact.payload).into_owned())
            });
            (id.as_str(), value)
        })
        .collect();
    serde_json::to_vec(&inputs).context("encoding dependency inputs")
}

async fn run_command(cmd: &str, ctx: RunContext) -> Result<Vec<u8>> {
    info!(
        scan_target = %ctx.target,
        analyzer = %ctx.analyzer,
        cmd = %cmd,
        "starting analyzer process"
    );

    let input = encode_inputs(&ctx)?;

    let mut command = shell_command(cmd);
    command
        .env(TARGET_ENV, &ctx.target)
        .env(ANALYZER_ENV, &ctx.analyzer)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for analyzer '{}'", ctx.analyzer))?;

    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            // The child may exit without reading stdin; a broken pipe is fine.
            let _ = stdin.write_all(&input).await;
        });
    }

    let stdout_task = child.stdout.take().map(|mut stdout| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| buf)
        })
    });

    let stderr_task = child.stderr.take().map(|stderr| {
        let analyzer = ctx.analyzer.clone();
        tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(analyzer = %analyzer, "stderr: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail
        })
    });

    let status = tokio::select! {
        status_res = child.wait() => {
            status_res.with_context(|| {
                format!("waiting for process of analyzer '{}'", ctx.analyzer)
            })?
        }
        _ = ctx.cancel.cancelled() => {
            info!(
                scan_target = %ctx.target,
                analyzer = %ctx.analyzer,
                "cancellation requested; killing analyzer process"
            );
            if let Err(e) = child.kill().await {
                warn!(analyzer = %ctx.analyzer, error = %e, "failed to kill analyzer process");
            }
            bail!("analyzer '{}' cancelled", ctx.analyzer);
        }
    };

    let stdout = match stdout_task {
        Some(task) => task
            .await
            .context("joining stdout reader")?
            .context("reading analyzer stdout")?,
        None => Vec::new(),
    };
    let stderr_tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    let code = status.code().unwrap_or(-1);
    info!(
        scan_target = %ctx.target,
        analyzer = %ctx.analyzer,
        exit_code = code,
        success = status.success(),
        bytes = stdout.len(),
        "analyzer process exited"
    );

    if !status.success() {
        let detail = if stderr_tail.is_empty() {
            String::new()
        } else {
            format!(": {}", stderr_tail.join("\n"))
        };
        return Err(anyhow!("exited with status {code}{detail}"));
    }

    Ok(stdout)
}
