//! Budget ledger — cumulative spend per (day, backend, model) against limits.
//!
//! The ledger is the only state written by concurrently running agent
//! turns. Atomicity per key is delegated to the [`LedgerStore`]; the ledger
//! itself holds no mutable state. Storage failures never panic: affordability
//! degrades to `false` and status to `Critical`, which routes everything to
//! the free tier.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::store::{InMemoryLedgerStore, LedgerEntry, LedgerError, LedgerKey, LedgerStore};
use crate::config::RoutingConfigHandle;

/// Daily and monthly spend limits in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetLimits {
    pub daily_usd: f64,
    pub monthly_usd: f64,
    /// Spend ratio at which status becomes `Warning`.
    pub warning_ratio: f64,
    /// Spend ratio at which status becomes `Critical`.
    pub critical_ratio: f64,
}

impl BudgetLimits {
    pub fn new(daily_usd: f64, monthly_usd: f64) -> Self {
        Self {
            daily_usd,
            monthly_usd,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.daily_usd < 0.0 || self.monthly_usd < 0.0 {
            return Err("spend limits must be non-negative".to_string());
        }
        if !(0.0 < self.warning_ratio && self.warning_ratio < self.critical_ratio) {
            return Err(format!(
                "warning_ratio ({}) must be positive and below critical_ratio ({})",
                self.warning_ratio, self.critical_ratio
            ));
        }
        Ok(())
    }
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            daily_usd: 10.0,
            monthly_usd: 200.0,
            warning_ratio: 0.7,
            critical_ratio: 0.9,
        }
    }
}

/// Spend health relative to limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Healthy,
    Warning,
    Critical,
}

impl BudgetStatus {
    /// Classify a spend ratio.
    pub fn from_ratio(ratio: f64, limits: &BudgetLimits) -> Self {
        if ratio >= limits.critical_ratio {
            Self::Critical
        } else if ratio >= limits.warning_ratio {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Point-in-time view of spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub date: NaiveDate,
    pub status: BudgetStatus,
    /// `None` when storage was unavailable.
    pub daily_spend: Option<f64>,
    pub monthly_spend: Option<f64>,
    pub daily_limit: f64,
    pub monthly_limit: f64,
}

impl BudgetSnapshot {
    pub fn status_line(&self) -> String {
        let fmt = |v: Option<f64>| v.map_or("unknown".to_string(), |s| format!("${:.4}", s));
        format!(
            "[{}] {} | day {} / ${:.2} | month {} / ${:.2}",
            self.status,
            self.date,
            fmt(self.daily_spend),
            self.daily_limit,
            fmt(self.monthly_spend),
            self.monthly_limit
        )
    }
}

fn ratio(spend: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        f64::INFINITY
    } else {
        spend / limit
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Spend tracker shared by all concurrently running calls.
pub struct BudgetLedger {
    store: Arc<dyn LedgerStore>,
    config: RoutingConfigHandle,
}

impl BudgetLedger {
    pub fn new(store: Arc<dyn LedgerStore>, config: RoutingConfigHandle) -> Self {
        Self { store, config }
    }

    /// In-memory ledger over the given configuration.
    pub fn in_memory(config: RoutingConfigHandle) -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()), config)
    }

    pub fn config(&self) -> &RoutingConfigHandle {
        &self.config
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn limits(&self) -> Option<BudgetLimits> {
        self.config.read(|c| c.limits.clone()).ok()
    }

    /// Estimated USD cost; unknown models are free.
    pub fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.config
            .read(|c| c.prices.estimate_cost(model, input_tokens, output_tokens))
            .unwrap_or(0.0)
    }

    /// Whether a call of `estimated_tokens` fits today's and this month's limits.
    ///
    /// The estimate is priced at the model's output rate, the upper bound
    /// of the two rates.
    pub fn can_afford(&self, model: &str, estimated_tokens: u64) -> bool {
        self.can_afford_on(Self::today(), model, estimated_tokens)
    }

    pub fn can_afford_on(&self, date: NaiveDate, model: &str, estimated_tokens: u64) -> bool {
        let Some(limits) = self.limits() else {
            warn!("Routing configuration unavailable; treating spend as unaffordable");
            return false;
        };
        let estimate = self.estimate_cost(model, 0, estimated_tokens);
        match (self.daily_spend(date), self.monthly_spend(date)) {
            (Ok(day), Ok(month)) => {
                day + estimate <= limits.daily_usd && month + estimate <= limits.monthly_usd
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Ledger unavailable; treating spend as unaffordable");
                false
            }
        }
    }

    /// Record a completed paid call for today. Returns the recorded cost.
    pub fn record(
        &self,
        backend: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<f64, LedgerError> {
        self.record_on(Self::today(), backend, model, input_tokens, output_tokens)
    }

    pub fn record_on(
        &self,
        date: NaiveDate,
        backend: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<f64, LedgerError> {
        let cost = self.estimate_cost(model, input_tokens, output_tokens);
        let key = LedgerKey::new(date, backend, model);
        let total = self.store.increment(
            &key,
            &LedgerEntry::single(input_tokens, output_tokens, cost),
        )?;
        debug!(
            backend,
            model,
            input_tokens,
            output_tokens,
            cost,
            key_total = total.cost,
            "Recorded spend"
        );
        Ok(cost)
    }

    /// Total spend on `date`.
    pub fn daily_spend(&self, date: NaiveDate) -> Result<f64, LedgerError> {
        Ok(self
            .store
            .entries_between(date, date)?
            .iter()
            .map(|(_, e)| e.cost)
            .sum())
    }

    /// Total spend from the first of `date`'s month through `date`.
    pub fn monthly_spend(&self, date: NaiveDate) -> Result<f64, LedgerError> {
        Ok(self
            .store
            .entries_between(month_start(date), date)?
            .iter()
            .map(|(_, e)| e.cost)
            .sum())
    }

    /// Entries recorded on `date`, sorted by backend and model.
    pub fn usage_report(&self, date: NaiveDate) -> Result<Vec<(LedgerKey, LedgerEntry)>, LedgerError> {
        self.store.entries_between(date, date)
    }

    pub fn status(&self) -> BudgetStatus {
        self.snapshot_on(Self::today()).status
    }

    pub fn status_on(&self, date: NaiveDate) -> BudgetStatus {
        self.snapshot_on(date).status
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        self.snapshot_on(Self::today())
    }

    pub fn snapshot_on(&self, date: NaiveDate) -> BudgetSnapshot {
        let limits = self.limits();
        let daily = self.daily_spend(date).ok();
        let monthly = self.monthly_spend(date).ok();

        let status = match (&limits, daily, monthly) {
            (Some(limits), Some(day), Some(month)) => {
                let worst = ratio(day, limits.daily_usd).max(ratio(month, limits.monthly_usd));
                BudgetStatus::from_ratio(worst, limits)
            }
            _ => BudgetStatus::Critical,
        };

        BudgetSnapshot {
            date,
            status,
            daily_spend: daily,
            monthly_spend: monthly,
            daily_limit: limits.as_ref().map_or(0.0, |l| l.daily_usd),
            monthly_limit: limits.as_ref().map_or(0.0, |l| l.monthly_usd),
        }
    }

    /// True whenever status is warning or critical.
    pub fn should_prefer_local(&self) -> bool {
        self.status() != BudgetStatus::Healthy
    }

    pub fn should_prefer_local_on(&self, date: NaiveDate) -> bool {
        self.status_on(date) != BudgetStatus::Healthy
    }
}

impl std::fmt::Debug for BudgetLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetLedger")
            .field("store", &self.store.name())
            .finish()
    }
}
