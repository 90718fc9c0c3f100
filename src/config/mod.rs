// src/config/mod.rs

//! Configuration loading and validation.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::{HumanDuration, format_duration, parse_duration};
pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{AnalyzerConfig, ConfigFile, ProfileConfig, RawConfigFile, SettingsSection};
