// src/cache/mod.rs

//! Artifact persistence and freshness decisions.
//!
//! - [`artifact`] is the stored record and its key.
//! - [`freshness`] classifies artifact age against a TTL.
//! - [`store`] provides file and memory backends behind `ArtifactStore`.
//! - [`manager`] combines the two into HIT / STALE / MISS decisions and
//!   guards against concurrent runs of the same key.

pub mod artifact;
pub mod freshness;
pub mod manager;
pub mod store;

pub use artifact::{Artifact, ArtifactKey, ArtifactStatus};
pub use freshness::{FreshnessLevel, FreshnessThresholds, age_string};
pub use manager::{CacheDecision, CacheManager, CacheSettings, DEFAULT_TTL, RunClaim};
pub use store::{ArtifactStore, FileArtifactStore, MemoryArtifactStore};
