// src/registry/profiles.rs

use std::collections::{BTreeMap, HashSet};

use globset::Glob;

use crate::errors::{Result, ScanError};
use crate::registry::AnalyzerRegistry;
use crate::types::AnalyzerId;

/// What the caller asked to run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnalyzerSelection {
    /// The resolver's default profile, or every analyzer if none is set.
    #[default]
    Default,
    Profile(String),
    Analyzers(Vec<AnalyzerId>),
    All,
}

/// Named, ordered list of analyzer ids or glob patterns (`code-*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub description: Option<String>,
    pub analyzers: Vec<String>,
}

impl Profile {
    pub fn new<I, S>(name: impl Into<String>, analyzers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            analyzers: analyzers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub(crate) fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '[', '{'])
}

#[derive(Debug, Clone, Default)]
pub struct ProfileResolver {
    profiles: BTreeMap<String, Profile>,
    default_profile: Option<String>,
}

impl ProfileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: Profile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.insert(profile);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_profile = Some(name.into());
        self
    }

    pub fn default_profile(&self) -> Option<&str> {
        self.default_profile.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> + '_ {
        self.profiles.values()
    }

    /// Turn a selection into a de-duplicated list of registered analyzer ids.
    ///
    /// Literal entries keep their listed order; glob entries expand in
    /// registry order.
    pub fn resolve(
        &self,
        selection: &AnalyzerSelection,
        registry: &AnalyzerRegistry,
    ) -> Result<Vec<AnalyzerId>> {
        let entries: Vec<String> = match selection {
            AnalyzerSelection::Default => match &self.default_profile {
                Some(name) => self.profile_entries(name)?,
                None => registry.ids().map(str::to_string).collect(),
            },
            AnalyzerSelection::Profile(name) => self.profile_entries(name)?,
            AnalyzerSelection::Analyzers(ids) => ids.clone(),
            AnalyzerSelection::All => registry.ids().map(str::to_string).collect(),
        };

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for entry in entries {
            for id in expand_entry(&entry, registry)? {
                if seen.insert(id.clone()) {
                    resolved.push(id);
                }
            }
        }

        if resolved.is_empty() {
            return Err(ScanError::EmptySelection);
        }
        Ok(resolved)
    }

    fn profile_entries(&self, name: &str) -> Result<Vec<String>> {
        self.profiles
            .get(name)
            .map(|p| p.analyzers.clone())
            .ok_or_else(|| ScanError::UnknownProfile(name.to_string()))
    }
}

fn expand_entry(entry: &str, registry: &AnalyzerRegistry) -> Result<Vec<AnalyzerId>> {
    if !is_glob(entry) {
        if !registry.contains(entry) {
            return Err(ScanError::UnknownId(entry.to_string()));
        }
        return Ok(vec![entry.to_string()]);
    }

    let matcher = Glob::new(entry)
        .map_err(|e| ScanError::ConfigError(format!("invalid analyzer pattern '{entry}': {e}")))?
        .compile_matcher();
    Ok(registry
        .ids()
        .filter(|id| matcher.is_match(id))
        .map(str::to_string)
        .collect())
}
