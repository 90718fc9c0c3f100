#![allow(dead_code)]

use std::time::Duration;

use scandag::config::{
    AnalyzerConfig, ConfigFile, HumanDuration, ProfileConfig, RawConfigFile, SettingsSection,
};
use scandag::errors::Result;
use scandag::registry::{AnalyzerDescriptor, AnalyzerRegistry};

use crate::fake_analyzer::{Behaviour, FakeAnalyzer, RunLog};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_analyzer(mut self, id: &str, analyzer: AnalyzerConfig) -> Self {
        self.config.analyzer.insert(id.to_string(), analyzer);
        self
    }

    pub fn with_profile(mut self, name: &str, analyzers: &[&str]) -> Self {
        self.config.profile.insert(
            name.to_string(),
            ProfileConfig {
                description: None,
                analyzers: analyzers.iter().map(|a| a.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_default_profile(mut self, name: &str) -> Self {
        self.config.settings.default_profile = Some(name.to_string());
        self
    }

    pub fn with_ttl(mut self, id: &str, ttl: Duration) -> Self {
        self.config.ttl.insert(id.to_string(), HumanDuration(ttl));
        self
    }

    pub fn with_timeout(mut self, id: &str, timeout: Duration) -> Self {
        self.config.timeout.insert(id.to_string(), HumanDuration(timeout));
        self
    }

    pub fn with_settings(mut self, f: impl FnOnce(&mut SettingsSection)) -> Self {
        f(&mut self.config.settings);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `AnalyzerConfig`.
pub struct AnalyzerConfigBuilder {
    analyzer: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            analyzer: AnalyzerConfig {
                cmd: cmd.to_string(),
                after: vec![],
                ttl: None,
                timeout: None,
                description: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.analyzer.after.push(dep.to_string());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.analyzer.ttl = Some(HumanDuration(ttl));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.analyzer.timeout = Some(HumanDuration(timeout));
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.analyzer.description = Some(text.to_string());
        self
    }

    pub fn build(self) -> AnalyzerConfig {
        self.analyzer
    }
}

/// Builds an `AnalyzerRegistry` of [`FakeAnalyzer`]s that all report into
/// one shared [`RunLog`].
pub struct RegistryBuilder {
    registry: AnalyzerRegistry,
    log: RunLog,
    default_ttl: Duration,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            registry: AnalyzerRegistry::new(),
            log: RunLog::new(),
            default_ttl: Duration::from_secs(60 * 60),
        }
    }

    /// TTL given to analyzers added through [`analyzer`](Self::analyzer).
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn analyzer(self, id: &str, deps: &[&str], behaviour: Behaviour) -> Self {
        let descriptor = AnalyzerDescriptor::new(id, self.default_ttl)
            .with_dependencies(deps.iter().copied());
        self.descriptor(descriptor, behaviour)
    }

    pub fn descriptor(mut self, descriptor: AnalyzerDescriptor, behaviour: Behaviour) -> Self {
        let fake = FakeAnalyzer::new(behaviour, self.log.clone());
        self.registry
            .register(descriptor, fake)
            .expect("Failed to register fake analyzer");
        self
    }

    pub fn log(&self) -> RunLog {
        self.log.clone()
    }

    pub fn build(self) -> (AnalyzerRegistry, RunLog) {
        (self.registry, self.log)
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
