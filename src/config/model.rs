// src/config/model.rs

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheSettings, DEFAULT_TTL, FreshnessThresholds};
use crate::config::duration::HumanDuration;
use crate::engine::{DEFAULT_TIMEOUT, EngineSettings};
use crate::job::QueueSettings;
use crate::registry::{AnalyzerDescriptor, Profile, ProfileResolver};
use crate::types::{AnalyzerId, StorageMode};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [settings]
/// parallel_scanners = 2
/// default_profile = "quick"
///
/// [ttl]
/// vulns = "1h"
///
/// [analyzer.sbom]
/// cmd = "syft . -o json"
/// ttl = "24h"
///
/// [analyzer.vulns]
/// cmd = "grype sbom:-"
/// after = ["sbom"]
///
/// [profile.quick]
/// analyzers = ["vulns", "code-*"]
/// ```
///
/// All sections are optional except that at least one analyzer is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub settings: SettingsSection,

    /// Per-analyzer TTL overrides from `[ttl]`.
    #[serde(default)]
    pub ttl: BTreeMap<String, HumanDuration>,

    /// Per-analyzer timeout overrides from `[timeout]`.
    #[serde(default)]
    pub timeout: BTreeMap<String, HumanDuration>,

    /// All analyzers from `[analyzer.<id>]`.
    #[serde(default)]
    pub analyzer: BTreeMap<String, AnalyzerConfig>,

    /// All profiles from `[profile.<name>]`.
    #[serde(default)]
    pub profile: BTreeMap<String, ProfileConfig>,
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsSection {
    /// Jobs (targets) scanned at the same time.
    pub parallel_repos: usize,
    /// Analyzers of one job running at the same time.
    pub parallel_scanners: usize,
    pub default_timeout: HumanDuration,
    /// TTL for analyzers that declare none.
    pub default_ttl: HumanDuration,
    pub default_profile: Option<String>,
    /// Jobs allowed to wait for a free slot.
    pub queue_capacity: usize,
    /// How long finished jobs remain visible.
    pub retention: HumanDuration,
    pub stale_multiplier: u32,
    pub very_stale_multiplier: u32,
    pub storage: StorageMode,
    pub storage_path: PathBuf,
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            parallel_repos: 1,
            parallel_scanners: 4,
            default_timeout: HumanDuration(DEFAULT_TIMEOUT),
            default_ttl: HumanDuration(DEFAULT_TTL),
            default_profile: None,
            queue_capacity: 100,
            retention: HumanDuration(Duration::from_secs(24 * 60 * 60)),
            stale_multiplier: 7,
            very_stale_multiplier: 30,
            storage: StorageMode::File,
            storage_path: PathBuf::from(".scandag"),
        }
    }
}

/// `[analyzer.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Shell command producing the artifact on stdout.
    pub cmd: String,

    /// Analyzers whose artifacts this one consumes.
    #[serde(default)]
    pub after: Vec<String>,

    pub ttl: Option<HumanDuration>,
    pub timeout: Option<HumanDuration>,
    pub description: Option<String>,
}

/// `[profile.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub description: Option<String>,
    /// Analyzer ids or glob patterns.
    #[serde(default)]
    pub analyzers: Vec<String>,
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: SettingsSection,
    pub ttl: BTreeMap<String, HumanDuration>,
    pub timeout: BTreeMap<String, HumanDuration>,
    pub analyzer: BTreeMap<String, AnalyzerConfig>,
    pub profile: BTreeMap<String, ProfileConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            settings: raw.settings,
            ttl: raw.ttl,
            timeout: raw.timeout,
            analyzer: raw.analyzer,
            profile: raw.profile,
        }
    }

    /// Descriptor and command for every analyzer, in id order.
    pub fn analyzer_descriptors(&self) -> Vec<(AnalyzerDescriptor, String)> {
        self.analyzer
            .iter()
            .map(|(id, cfg)| {
                let ttl = cfg.ttl.unwrap_or(self.settings.default_ttl).as_duration();
                let mut descriptor =
                    AnalyzerDescriptor::new(id.clone(), ttl).with_dependencies(cfg.after.iter().cloned());
                if let Some(timeout) = cfg.timeout {
                    descriptor = descriptor.with_timeout(timeout.as_duration());
                }
                if let Some(desc) = &cfg.description {
                    descriptor = descriptor.with_description(desc.clone());
                }
                (descriptor, cfg.cmd.clone())
            })
            .collect()
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            thresholds: FreshnessThresholds {
                stale_multiplier: self.settings.stale_multiplier,
                very_stale_multiplier: self.settings.very_stale_multiplier,
            },
            ttl_overrides: to_duration_map(&self.ttl),
            default_ttl: self.settings.default_ttl.as_duration(),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            parallel_scanners: self.settings.parallel_scanners,
            default_timeout: self.settings.default_timeout.as_duration(),
            timeouts: to_duration_map(&self.timeout),
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            parallel_repos: self.settings.parallel_repos,
            capacity: self.settings.queue_capacity,
            retention: self.settings.retention.as_duration(),
        }
    }

    pub fn profile_resolver(&self) -> ProfileResolver {
        let mut resolver = ProfileResolver::new();
        for (name, cfg) in &self.profile {
            let mut profile = Profile::new(name.clone(), cfg.analyzers.iter().cloned());
            if let Some(desc) = &cfg.description {
                profile = profile.with_description(desc.clone());
            }
            resolver.insert(profile);
        }
        match &self.settings.default_profile {
            Some(name) => resolver.with_default(name.clone()),
            None => resolver,
        }
    }
}

fn to_duration_map(map: &BTreeMap<String, HumanDuration>) -> HashMap<AnalyzerId, Duration> {
    map.iter()
        .map(|(id, d)| (id.clone(), d.as_duration()))
        .collect()
}
