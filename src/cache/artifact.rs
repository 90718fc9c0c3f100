// src/cache/artifact.rs

use std::fmt;
use std::time::Duration;

use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_between;
use crate::types::{AnalyzerId, Target};

/// Outcome recorded alongside an artifact payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Ok,
    Error,
}

/// Storage key: one artifact per (target, analyzer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub target: Target,
    pub analyzer: AnalyzerId,
}

impl ArtifactKey {
    pub fn new(target: impl Into<Target>, analyzer: impl Into<AnalyzerId>) -> Self {
        Self {
            target: target.into(),
            analyzer: analyzer.into(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.target, self.analyzer)
    }
}

/// Output of one analyzer run against one target. Never mutated after it is
/// written; a re-run replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub analyzer: AnalyzerId,
    pub target: Target,
    pub produced_at: DateTime<Utc>,
    pub status: ArtifactStatus,
    /// blake3 hex digest of `payload`.
    pub digest: String,
    pub payload: Vec<u8>,
}

impl Artifact {
    pub fn new(
        target: impl Into<Target>,
        analyzer: impl Into<AnalyzerId>,
        payload: Vec<u8>,
        produced_at: DateTime<Utc>,
        status: ArtifactStatus,
    ) -> Self {
        Self {
            analyzer: analyzer.into(),
            target: target.into(),
            produced_at,
            status,
            digest: digest_of(&payload),
            payload,
        }
    }

    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::new(self.target.clone(), self.analyzer.clone())
    }

    /// Age relative to `now`; zero if `produced_at` lies in the future.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        elapsed_between(self.produced_at, now)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ArtifactStatus::Ok
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn payload_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

pub fn digest_of(payload: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize().to_hex().to_string()
}
