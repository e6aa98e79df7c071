//! Core configuration
//!
//! Loaded from the environment (with `.env` support) or from a YAML file.
//! Every field has a default, so an empty environment yields a working
//! in-memory configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use fieldforce_types::FormKind;

pub const ENV_RESUBMISSION_POLICY: &str = "FIELDFORCE_RESUBMISSION_POLICY";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_NOTIFY_CAPACITY: &str = "FIELDFORCE_NOTIFY_CAPACITY";
pub const ENV_MAX_CHAIN_DEPTH: &str = "FIELDFORCE_MAX_CHAIN_DEPTH";

const DEFAULT_NOTIFY_CAPACITY: usize = 256;

/// Hierarchy depth is two levels; the walk limit only guards against corrupt
/// data looping forever.
const DEFAULT_MAX_CHAIN_DEPTH: usize = 8;

/// Steps the cycle walk needs from an Admin: its SuperAdmin edge, then the
/// SuperAdmin, which has no superior.
pub const MIN_CHAIN_DEPTH: usize = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Which forms a rejected marketer must record again before reopening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResubmissionPolicy {
    /// Every form, regardless of what the rejection named.
    #[default]
    AllForms,
    /// Only the forms the rejection reason implicates.
    ImplicatedOnly,
}

impl ResubmissionPolicy {
    /// Forms that must be recorded again after a rejection citing `implicated`.
    pub fn forms_to_resubmit(&self, implicated: &[FormKind]) -> Vec<FormKind> {
        match self {
            ResubmissionPolicy::AllForms => FormKind::ALL.to_vec(),
            ResubmissionPolicy::ImplicatedOnly => FormKind::ALL
                .into_iter()
                .filter(|kind| implicated.contains(kind))
                .collect(),
        }
    }
}

impl FromStr for ResubmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_forms" | "all" => Ok(ResubmissionPolicy::AllForms),
            "implicated_only" | "implicated" => Ok(ResubmissionPolicy::ImplicatedOnly),
            other => Err(format!(
                "expected 'all_forms' or 'implicated_only', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub resubmission_policy: ResubmissionPolicy,
    /// Postgres connection string; `None` means run against the memory store.
    pub database_url: Option<String>,
    /// Buffer size for `ChannelNotifier`.
    pub notify_channel_capacity: usize,
    pub max_chain_depth: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            resubmission_policy: ResubmissionPolicy::default(),
            database_url: None,
            notify_channel_capacity: DEFAULT_NOTIFY_CAPACITY,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }
}

impl CoreConfig {
    /// Load from process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_RESUBMISSION_POLICY) {
            config.resubmission_policy =
                raw.parse()
                    .map_err(|reason| ConfigError::InvalidValue {
                        key: ENV_RESUBMISSION_POLICY,
                        value: raw.clone(),
                        reason,
                    })?;
        }

        config.database_url = lookup(ENV_DATABASE_URL).filter(|url| !url.trim().is_empty());

        if let Some(raw) = lookup(ENV_NOTIFY_CAPACITY) {
            config.notify_channel_capacity = parse_at_least(ENV_NOTIFY_CAPACITY, &raw, 1)?;
        }
        if let Some(raw) = lookup(ENV_MAX_CHAIN_DEPTH) {
            config.max_chain_depth =
                parse_at_least(ENV_MAX_CHAIN_DEPTH, &raw, MIN_CHAIN_DEPTH)?;
        }

        Ok(config)
    }

    /// Load from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: CoreConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.notify_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "notify_channel_capacity",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.max_chain_depth < MIN_CHAIN_DEPTH {
            return Err(ConfigError::InvalidValue {
                key: "max_chain_depth",
                value: self.max_chain_depth.to_string(),
                reason: format!("must be at least {}", MIN_CHAIN_DEPTH),
            });
        }
        Ok(())
    }
}

fn parse_at_least(key: &'static str, raw: &str, min: usize) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: "must be positive".to_string(),
        }),
        Ok(n) if n < min => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: format!("must be at least {}", min),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}
