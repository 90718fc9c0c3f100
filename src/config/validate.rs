// src/config/validate.rs

use globset::Glob;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, ScanError};
use crate::registry::profiles::is_glob;

const ANALYZER_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ScanError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_analyzers(cfg)?;
    validate_settings(cfg)?;
    validate_analyzer_ids(cfg)?;
    validate_dependencies(cfg)?;
    validate_dag(cfg)?;
    validate_overrides(cfg)?;
    validate_profiles(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> ScanError {
    ScanError::ConfigError(msg.into())
}

fn ensure_has_analyzers(cfg: &RawConfigFile) -> Result<()> {
    if cfg.analyzer.is_empty() {
        return Err(config_error(
            "config must contain at least one [analyzer.<id>] section",
        ));
    }
    Ok(())
}

fn validate_settings(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.settings;

    for (name, value) in [
        ("parallel_repos", s.parallel_repos),
        ("parallel_scanners", s.parallel_scanners),
        ("queue_capacity", s.queue_capacity),
    ] {
        if value == 0 {
            return Err(config_error(format!("[settings].{name} must be >= 1 (got 0)")));
        }
    }

    if s.default_timeout.as_duration().is_zero() {
        return Err(config_error("[settings].default_timeout must be greater than zero"));
    }

    if s.stale_multiplier < 1 || s.very_stale_multiplier <= s.stale_multiplier {
        return Err(config_error(format!(
            "[settings] freshness multipliers must satisfy 1 <= stale_multiplier < very_stale_multiplier (got {} and {})",
            s.stale_multiplier, s.very_stale_multiplier
        )));
    }

    Ok(())
}

fn validate_analyzer_ids(cfg: &RawConfigFile) -> Result<()> {
    let valid_id = Regex::new(ANALYZER_ID_PATTERN)
        .map_err(|e| config_error(format!("compiling analyzer id pattern: {e}")))?;
    for (id, analyzer) in &cfg.analyzer {
        if !valid_id.is_match(id) {
            return Err(config_error(format!(
                "analyzer id '{id}' is invalid; use letters, digits, '.', '_' or '-'"
            )));
        }
        if analyzer.cmd.trim().is_empty() {
            return Err(config_error(format!("analyzer '{id}' has an empty `cmd`")));
        }
    }
    Ok(())
}

fn validate_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (id, analyzer) in &cfg.analyzer {
        for dep in &analyzer.after {
            if dep == id {
                return Err(config_error(format!(
                    "analyzer '{id}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.analyzer.contains_key(dep) {
                return Err(ScanError::UnknownDependency {
                    id: id.clone(),
                    missing: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> analyzer.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in cfg.analyzer.keys() {
        graph.add_node(id.as_str());
    }
    for (id, analyzer) in &cfg.analyzer {
        for dep in &analyzer.after {
            graph.add_edge(dep.as_str(), id.as_str(), ());
        }
    }

    if toposort(&graph, None).is_ok() {
        return Ok(());
    }

    let mut ids: Vec<String> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .flatten()
        .map(str::to_string)
        .collect();
    ids.sort();
    Err(ScanError::CycleDetected { ids })
}

fn validate_overrides(cfg: &RawConfigFile) -> Result<()> {
    for (section, map) in [("ttl", &cfg.ttl), ("timeout", &cfg.timeout)] {
        for id in map.keys() {
            if !cfg.analyzer.contains_key(id) {
                return Err(config_error(format!(
                    "[{section}] references unknown analyzer '{id}'"
                )));
            }
        }
    }
    for (id, timeout) in &cfg.timeout {
        if timeout.as_duration().is_zero() {
            return Err(config_error(format!("[timeout].{id} must be greater than zero")));
        }
    }
    Ok(())
}

fn validate_profiles(cfg: &RawConfigFile) -> Result<()> {
    for (name, profile) in &cfg.profile {
        if profile.analyzers.is_empty() {
            return Err(config_error(format!(
                "profile '{name}' must list at least one analyzer"
            )));
        }
        for entry in &profile.analyzers {
            if is_glob(entry) {
                let matcher = Glob::new(entry)
                    .map_err(|e| {
                        config_error(format!("profile '{name}' has invalid pattern '{entry}': {e}"))
                    })?
                    .compile_matcher();
                if !cfg.analyzer.keys().any(|id| matcher.is_match(id)) {
                    return Err(config_error(format!(
                        "profile '{name}' pattern '{entry}' matches no analyzer"
                    )));
                }
            } else if !cfg.analyzer.contains_key(entry) {
                return Err(config_error(format!(
                    "profile '{name}' references unknown analyzer '{entry}'"
                )));
            }
        }
    }

    if let Some(default) = &cfg.settings.default_profile {
        if !cfg.profile.contains_key(default) {
            return Err(ScanError::UnknownProfile(default.clone()));
        }
    }
    Ok(())
}
