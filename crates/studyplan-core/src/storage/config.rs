//! TOML-based application configuration.
//!
//! Stores:
//! - The active user for CLI commands
//! - Log level
//! - Scheduler switches (horizon, workload caps, soft-constraint policy)
//! - Makeup queue expiry
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use indoc::indoc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::schedule::UserId;
use crate::scheduler::{GenerationOptions, SoftConstraintPolicy};

const FILE_HEADER: &str = indoc! {"
    # studyplan configuration
    #
    # Change values with `studyplan config set <key> <value>`, e.g.
    #   studyplan config set scheduler.soft_constraints ignore
"};

/// Scheduler switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Days covered by `schedule generate` when `--days` is omitted.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default)]
    pub cap_to_workload: bool,
    #[serde(default)]
    pub soft_constraints: SoftConstraintPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeupConfig {
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_active_user")]
    pub active_user: UserId,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub makeup: MakeupConfig,
}

fn default_horizon_days() -> u32 {
    7
}
fn default_expiry_days() -> u32 {
    7
}
fn default_active_user() -> UserId {
    1
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            cap_to_workload: false,
            soft_constraints: SoftConstraintPolicy::default(),
        }
    }
}

impl Default for MakeupConfig {
    fn default() -> Self {
        Self {
            expiry_days: default_expiry_days(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active_user: default_active_user(),
            log_level: default_log_level(),
            scheduler: SchedulerConfig::default(),
            makeup: MakeupConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<i64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot set a whole section".to_string()))
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// `<data_dir>/config.toml`.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let body = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, format!("{FILE_HEADER}\n{body}")).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// field's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            Self::default()
        })
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            cap_to_workload: self.scheduler.cap_to_workload,
            soft_constraints: self.scheduler.soft_constraints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.scheduler.soft_constraints, SoftConstraintPolicy::Block);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[scheduler]\ncap_to_workload = true\n").unwrap();
        assert!(parsed.scheduler.cap_to_workload);
        assert_eq!(parsed.scheduler.horizon_days, 7);
        assert_eq!(parsed.makeup.expiry_days, 7);
        assert_eq!(parsed.active_user, 1);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("scheduler.horizon_days").as_deref(), Some("7"));
        assert_eq!(cfg.get("scheduler.soft_constraints").as_deref(), Some("block"));
        assert_eq!(cfg.get("log_level").as_deref(), Some("info"));
        assert!(cfg.get("scheduler.missing_key").is_none());
    }

    #[test]
    fn set_updates_typed_values() {
        let mut cfg = Config::default();
        cfg.set("scheduler.cap_to_workload", "true").unwrap();
        cfg.set("makeup.expiry_days", "14").unwrap();
        cfg.set("scheduler.soft_constraints", "ignore").unwrap();
        assert!(cfg.scheduler.cap_to_workload);
        assert_eq!(cfg.makeup.expiry_days, 14);
        assert_eq!(cfg.generation_options().soft_constraints, SoftConstraintPolicy::Ignore);
    }

    #[test]
    fn set_rejects_bad_input() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("scheduler.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(cfg.set("scheduler.cap_to_workload", "maybe").is_err());
        assert!(cfg.set("scheduler.soft_constraints", "sometimes").is_err());
        assert!(cfg.set("scheduler", "x").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# studyplan configuration"));

        let mut changed = cfg.clone();
        changed.set("active_user", "3").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().active_user, 3);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "scheduler = 5").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::LoadFailed { .. })));
    }
}
