// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::{AnalyzerId, JobId, JobStatus, Target};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("analyzer '{0}' is already registered")]
    DuplicateId(AnalyzerId),

    #[error("unknown analyzer '{0}'")]
    UnknownId(AnalyzerId),

    #[error("analyzer '{id}' depends on unregistered analyzer '{missing}'")]
    UnknownDependency { id: AnalyzerId, missing: AnalyzerId },

    #[error("dependency cycle detected among analyzers: {}", ids.join(", "))]
    CycleDetected { ids: Vec<AnalyzerId> },

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("selection resolved to no analyzers")]
    EmptySelection,

    #[error("job queue is full ({capacity} jobs already waiting)")]
    QueueFull { capacity: usize },

    #[error("analyzer '{analyzer}' is already running for target '{target}'")]
    ConflictingRun { target: Target, analyzer: AnalyzerId },

    #[error("job '{0}' not found")]
    NotFound(JobId),

    #[error("job '{id}' already finished with status {status}")]
    AlreadyTerminal { id: JobId, status: JobStatus },

    #[error("no artifact from analyzer '{analyzer}' for target '{target}'")]
    ArtifactNotFound { target: Target, analyzer: AnalyzerId },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ScanError>;
