//! Run configuration for the execution engine.
//!
//! Configuration is loaded from multiple sources with the following
//! precedence (highest to lowest):
//!
//! 1. Environment variables
//! 2. `.focus-validator.toml` in the current directory
//! 3. `~/.config/focus-validator/config.toml`
//! 4. Default values
//!
//! # Configuration File Format
//!
//! ```toml
//! [engine]
//! parallelism = 4
//! deadline_ms = 30000
//!
//! [rules]
//! draft_policy = "skip"        # "skip" or "include"
//! target_prefix = "BilledCost"
//! applicability = ["AVAILABILITY_ZONE_SUPPORTED"]
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `FOCUS_VALIDATOR_PARALLELISM` | Worker threads per layer |
//! | `FOCUS_VALIDATOR_DEADLINE_MS` | Run-level deadline in milliseconds |
//! | `FOCUS_VALIDATOR_TARGET_PREFIX` | Seed-set rule_id prefix |

use std::{collections::HashSet, env, fs, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::error::{AppResult, config_error};

/// How draft-status rules are treated by the plan builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DraftPolicy {
    /// Draft rules are loaded but excluded from the plan (default).
    #[default]
    Skip,
    /// Draft rules participate exactly like active rules.
    Include
}

/// Engine execution configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub rules:  RulesSelectionConfig
}

/// Parallelism and deadline knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Worker threads used to execute checks within one layer. `1` means
    /// strictly sequential execution.
    pub parallelism: usize,
    /// Optional run-level deadline in milliseconds.
    pub deadline_ms: Option<u64>
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            deadline_ms: None
        }
    }
}

impl EngineConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Rule selection: which subgraph to resolve and which applicability
/// tokens the dataset satisfies.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RulesSelectionConfig {
    /// Optional `rule_id` prefix selecting the seed set; `None` selects
    /// every rule in the catalog.
    #[serde(default)]
    pub target_prefix: Option<String>,
    /// Dataset-global applicability tokens (e.g. `AVAILABILITY_ZONE_SUPPORTED`).
    #[serde(default)]
    pub applicability: HashSet<String>,
    #[serde(default)]
    pub draft_policy:  DraftPolicy
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file in current directory (`.focus-validator.toml`)
    /// 3. Config file in home directory (`~/.config/focus-validator/config.toml`)
    /// 4. Default values
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("focus-validator")
                .join("config.toml");

            if home_config.exists() {
                let content = fs::read_to_string(&home_config)
                    .map_err(|e| config_error(format!("failed to read config file: {e}")))?;
                config = toml::from_str(&content)
                    .map_err(|e| config_error(format!("invalid config file: {e}")))?;
            }
        }

        let local_config = PathBuf::from(".focus-validator.toml");
        if local_config.exists() {
            let content = fs::read_to_string(&local_config)
                .map_err(|e| config_error(format!("failed to read config file: {e}")))?;
            config = toml::from_str(&content)
                .map_err(|e| config_error(format!("invalid config file: {e}")))?;
        }

        if let Ok(raw) = env::var("FOCUS_VALIDATOR_PARALLELISM") {
            config.engine.parallelism = raw
                .parse()
                .map_err(|_| config_error("FOCUS_VALIDATOR_PARALLELISM must be an integer"))?;
        }

        if let Ok(raw) = env::var("FOCUS_VALIDATOR_DEADLINE_MS") {
            config.engine.deadline_ms = Some(
                raw.parse()
                    .map_err(|_| config_error("FOCUS_VALIDATOR_DEADLINE_MS must be an integer"))?
            );
        }

        if let Ok(prefix) = env::var("FOCUS_VALIDATOR_TARGET_PREFIX") {
            config.rules.target_prefix = Some(prefix);
        }

        Ok(config)
    }
}
