use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use coordination::budget::{InMemoryLedgerStore, JsonFileLedgerStore, LedgerStore};
use coordination::{BudgetLedger, RoutingConfigHandle};
use tracing::{info, warn};

use crate::providers::{AnthropicProvider, OpenAiCompatProvider};
use crate::router::Router;

/// Locally hosted OpenAI-compatible engine.
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    pub url: String,
    pub model: String,
}

/// Backend endpoints, keys and file locations for one process.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub local: LocalEndpoint,
    /// Anthropic API key; the backend is skipped when unset.
    pub anthropic_api_key: Option<String>,
    /// OpenAI API key; the backend is skipped when unset.
    pub openai_api_key: Option<String>,
    /// Routing TOML (prices, hierarchy, limits). Built-in defaults when unset.
    pub routing_config: Option<PathBuf>,
    /// JSON ledger file. In-memory ledger when unset.
    pub ledger_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local: LocalEndpoint {
                url: std::env::var("DEBATE_LOCAL_URL")
                    .unwrap_or_else(|_| "http://localhost:11434/v1".into()),
                model: std::env::var("DEBATE_LOCAL_MODEL")
                    .unwrap_or_else(|_| "llama3.1:8b".into()),
            },
            anthropic_api_key: non_empty_env("ANTHROPIC_API_KEY"),
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            routing_config: non_empty_env("DEBATE_ROUTING_CONFIG").map(PathBuf::from),
            ledger_path: non_empty_env("DEBATE_LEDGER_PATH").map(PathBuf::from),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl EngineConfig {
    pub fn with_routing_config(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.routing_config = path;
        }
        self
    }

    pub fn with_ledger_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.ledger_path = path;
        }
        self
    }

    pub fn load_routing(&self) -> Result<RoutingConfigHandle> {
        match &self.routing_config {
            Some(path) => RoutingConfigHandle::from_file(path)
                .with_context(|| format!("Failed to load routing config {}", path.display())),
            None => Ok(RoutingConfigHandle::default()),
        }
    }

    pub fn build_ledger(&self, routing: RoutingConfigHandle) -> Result<BudgetLedger> {
        let store: Arc<dyn LedgerStore> = match &self.ledger_path {
            Some(path) => Arc::new(
                JsonFileLedgerStore::open(path)
                    .with_context(|| format!("Failed to open ledger {}", path.display()))?,
            ),
            None => Arc::new(InMemoryLedgerStore::new()),
        };
        Ok(BudgetLedger::new(store, routing))
    }

    /// Router with the local engine plus whichever paid backends have keys.
    pub fn build_router(&self, ledger: Arc<BudgetLedger>) -> Result<Router> {
        let local = OpenAiCompatProvider::local(&self.local.url, &self.local.model)
            .with_routing_cooldown(ledger.config().clone());
        let mut router = Router::new(ledger).with_provider(Arc::new(local));

        match &self.anthropic_api_key {
            Some(key) => router.register(Arc::new(AnthropicProvider::new(key))),
            None => warn!("ANTHROPIC_API_KEY not set; anthropic backend disabled"),
        }
        match &self.openai_api_key {
            Some(key) => router.register(Arc::new(OpenAiCompatProvider::openai(key))),
            None => warn!("OPENAI_API_KEY not set; openai backend disabled"),
        }

        info!(
            local = %self.local.url,
            backends = ?router.backend_ids(),
            "Router ready"
        );
        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            local: LocalEndpoint {
                url: "http://localhost:11434/v1".into(),
                model: "llama3.1:8b".into(),
            },
            anthropic_api_key: None,
            openai_api_key: Some("sk-test".into()),
            routing_config: None,
            ledger_path: None,
        }
    }

    #[test]
    fn test_router_registers_keyed_backends_only() {
        let cfg = config();
        let ledger = Arc::new(cfg.build_ledger(cfg.load_routing().unwrap()).unwrap());
        let router = cfg.build_router(ledger).unwrap();
        assert_eq!(router.backend_ids(), vec!["local", "openai"]);
    }

    #[test]
    fn test_missing_routing_file_is_an_error() {
        let cfg = config().with_routing_config(Some(PathBuf::from("/nonexistent/routing.toml")));
        let err = cfg.load_routing().unwrap_err();
        assert!(err.to_string().contains("Failed to load routing config"));
    }

    #[test]
    fn test_file_ledger_persists() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config().with_ledger_path(Some(dir.path().join("ledger.json")));
        let ledger = cfg.build_ledger(RoutingConfigHandle::default()).unwrap();
        ledger.record("anthropic", "claude-opus-4-5", 1_000_000, 0).unwrap();

        let reopened = cfg.build_ledger(RoutingConfigHandle::default()).unwrap();
        let today = chrono::Utc::now().date_naive();
        assert!((reopened.daily_spend(today).unwrap() - 5.0).abs() < 1e-9);
    }
}
