// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::HumanDuration;
use crate::registry::AnalyzerSelection;
use crate::types::CachePolicy;

/// Command-line arguments for `scandag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scandag",
    version,
    about = "Run dependent repository analyzers with caching and bounded concurrency.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$SCANDAG_CONFIG`, else `scandag.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCANDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Scan a target and wait for the result.
    Scan {
        /// Target identifier, e.g. `owner/repo`.
        target: String,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Reuse stale (not only fresh) artifacts.
        #[arg(long, conflicts_with = "force")]
        best_effort: bool,

        /// Ignore cached artifacts and run everything in the plan.
        #[arg(long)]
        force: bool,

        /// Print the plan without running anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the wave plan for a selection.
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// List registered analyzers and profiles.
    Analyzers,

    /// Show the stored artifact for one analyzer.
    Artifact {
        target: String,
        analyzer: String,

        /// TTL to judge freshness against, e.g. `6h`.
        #[arg(long, value_name = "DURATION")]
        ttl: Option<HumanDuration>,
    },

    /// Show how fresh each analyzer's artifact is for a target.
    Status { target: String },

    /// Remove stored artifacts for a target.
    Invalidate {
        target: String,

        /// Only this analyzer; all analyzers if omitted.
        #[arg(long, value_name = "ID")]
        analyzer: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct SelectionArgs {
    /// Named profile from the config.
    #[arg(long, value_name = "NAME", conflicts_with_all = ["analyzer", "all"])]
    pub profile: Option<String>,

    /// Explicit analyzer id (repeatable).
    #[arg(long, value_name = "ID", conflicts_with = "all")]
    pub analyzer: Vec<String>,

    /// Every registered analyzer.
    #[arg(long)]
    pub all: bool,
}

impl SelectionArgs {
    pub fn to_selection(&self) -> AnalyzerSelection {
        if let Some(profile) = &self.profile {
            AnalyzerSelection::Profile(profile.clone())
        } else if !self.analyzer.is_empty() {
            AnalyzerSelection::Analyzers(self.analyzer.clone())
        } else if self.all {
            AnalyzerSelection::All
        } else {
            AnalyzerSelection::Default
        }
    }
}

pub fn cache_policy(best_effort: bool, force: bool) -> CachePolicy {
    if force {
        CachePolicy::Force
    } else if best_effort {
        CachePolicy::BestEffort
    } else {
        CachePolicy::Default
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
