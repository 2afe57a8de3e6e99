//! Usage reporting sink.
//!
//! The router reports every paid completion here in addition to recording
//! it in the ledger. Sinks must never fail the call that produced the usage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

/// One reported completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub backend: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub duration_ms: u64,
}

impl UsageRecord {
    pub fn new(backend: &str, model: &str, input_tokens: u64, output_tokens: u64, cost: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            backend: backend.to_string(),
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost,
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Receiver of usage records.
pub trait UsageSink: Send + Sync {
    fn report(&self, record: &UsageRecord);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUsageSink;

impl UsageSink for NoopUsageSink {
    fn report(&self, _record: &UsageRecord) {}
}

/// Emits each record as a structured `info` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn report(&self, record: &UsageRecord) {
        info!(
            target: "debate::usage",
            backend = %record.backend,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost = record.cost,
            duration_ms = record.duration_ms,
            "Paid completion"
        );
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryUsageSink {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn total_cost(&self) -> f64 {
        self.records().iter().map(|r| r.cost).sum()
    }
}

impl UsageSink for MemoryUsageSink {
    fn report(&self, record: &UsageRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemoryUsageSink::new();
        sink.report(&UsageRecord::new("openai", "gpt-4o", 10, 20, 0.25));
        sink.report(&UsageRecord::new("anthropic", "claude-haiku-4-5", 1, 2, 0.5).with_duration_ms(40));
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].duration_ms, 40);
        assert_eq!(sink.total_cost(), 0.75);
    }

    #[test]
    fn test_noop_and_tracing_sinks_accept_records() {
        let record = UsageRecord::new("openai", "gpt-4o", 1, 1, 0.0);
        NoopUsageSink.report(&record);
        TracingUsageSink.report(&record);
    }
}
