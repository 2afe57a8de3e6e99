//! Routing configuration — price table, model hierarchy and spend limits.
//!
//! Loaded from TOML and held behind a [`RoutingConfigHandle`] so it can be
//! hot-reloaded while debates are running. A reload that fails to parse or
//! validate leaves the previous configuration in place.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};

use crate::budget::ledger::BudgetLimits;
use crate::budget::pricing::PriceTable;
use crate::router::hierarchy::ModelHierarchy;

/// Configuration loading or validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("configuration lock poisoned")]
    Poisoned,
}

/// Externally supplied routing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Minimum interval between calls to the local engine, in milliseconds.
    pub local_cooldown_ms: u64,
    /// Abort routing when spend cannot be recorded.
    pub ledger_critical: bool,
    /// Daily and monthly spend limits.
    pub limits: BudgetLimits,
    /// Per-model prices.
    pub prices: PriceTable,
    /// Task → candidate backends.
    pub hierarchy: ModelHierarchy,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            local_cooldown_ms: 0,
            ledger_critical: false,
            limits: BudgetLimits::default(),
            prices: PriceTable::default(),
            hierarchy: ModelHierarchy::default(),
        }
    }
}

impl RoutingConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RoutingConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate().map_err(ConfigError::Invalid)?;
        self.hierarchy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Shared, hot-reloadable routing configuration.
#[derive(Debug, Clone)]
pub struct RoutingConfigHandle {
    inner: Arc<RwLock<RoutingConfig>>,
    source: Option<PathBuf>,
}

impl RoutingConfigHandle {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            source: None,
        }
    }

    /// Load from a file and remember the path for later reloads.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = RoutingConfig::from_file(&path)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(config)),
            source: Some(path),
        })
    }

    /// Run `f` against the current configuration.
    pub fn read<R>(&self, f: impl FnOnce(&RoutingConfig) -> R) -> Result<R, ConfigError> {
        let guard = self.inner.read().map_err(|_| ConfigError::Poisoned)?;
        Ok(f(&guard))
    }

    /// Clone of the current configuration.
    pub fn snapshot(&self) -> Result<RoutingConfig, ConfigError> {
        self.read(RoutingConfig::clone)
    }

    /// Swap in a new configuration after validating it.
    pub fn replace(&self, config: RoutingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut guard = self.inner.write().map_err(|_| ConfigError::Poisoned)?;
        *guard = config;
        Ok(())
    }

    /// Re-read the source file. No-op for handles built in memory.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let Some(path) = &self.source else {
            return Ok(false);
        };
        match RoutingConfig::from_file(path) {
            Ok(config) => {
                self.replace(config)?;
                info!(path = %path.display(), "Routing configuration reloaded");
                Ok(true)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Routing reload failed; keeping previous configuration");
                Err(e)
            }
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl Default for RoutingConfigHandle {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::task::{CostClass, TaskType};

    const SAMPLE: &str = r#"
local_cooldown_ms = 250

[limits]
daily_usd = 5.0
monthly_usd = 50.0

[prices]
"claude-opus-4-5" = { input = 5.0, output = 25.0 }
"gpt-4o" = { input = 2.5, output = 10.0 }

[hierarchy.default]
backend = "local"
model = "qwen2.5:7b"
cost = "local"

[[hierarchy.tasks.planning]]
backend = "anthropic"
model = "claude-opus-4-5"
cost = "paid"

[[hierarchy.tasks.planning]]
backend = "local"
model = "qwen2.5:7b"
cost = "local"
"#;

    #[test]
    fn test_parse_sample() {
        let config = RoutingConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.local_cooldown_ms, 250);
        assert_eq!(config.limits.daily_usd, 5.0);
        assert_eq!(config.prices.len(), 2);
        let planning = config.hierarchy.candidates(TaskType::Planning);
        assert_eq!(planning.len(), 2);
        assert_eq!(planning[0].cost, CostClass::Paid);
        assert_eq!(config.hierarchy.default.model, "qwen2.5:7b");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RoutingConfig::from_toml_str("").unwrap();
        assert_eq!(config, RoutingConfig::default());
    }

    #[test]
    fn test_invalid_default_rejected() {
        let doc = r#"
[hierarchy.default]
backend = "openai"
model = "gpt-4o"
cost = "paid"
"#;
        let err = RoutingConfig::from_toml_str(doc).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_reload_swaps_and_keeps_previous_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let handle = RoutingConfigHandle::from_file(&path).unwrap();
        assert_eq!(handle.read(|c| c.limits.daily_usd).unwrap(), 5.0);

        std::fs::write(&path, SAMPLE.replace("daily_usd = 5.0", "daily_usd = 9.0")).unwrap();
        assert!(handle.reload().unwrap());
        assert_eq!(handle.read(|c| c.limits.daily_usd).unwrap(), 9.0);

        std::fs::write(&path, "limits = 'broken").unwrap();
        assert!(handle.reload().is_err());
        assert_eq!(handle.read(|c| c.limits.daily_usd).unwrap(), 9.0);
    }

    #[test]
    fn test_in_memory_handle_reload_is_noop() {
        let handle = RoutingConfigHandle::default();
        assert!(!handle.reload().unwrap());
        assert!(handle.source().is_none());
    }
}
