//! Ledger storage backends.
//!
//! Every increment for one `(date, backend, model)` key is applied under a
//! single lock, so concurrent `increment` calls never lose an update.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Ledger accumulator key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub date: NaiveDate,
    pub backend: String,
    pub model: String,
}

impl LedgerKey {
    pub fn new(date: NaiveDate, backend: &str, model: &str) -> Self {
        Self {
            date,
            backend: backend.to_string(),
            model: model.to_string(),
        }
    }
}

/// Accumulated usage for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub request_count: u64,
}

impl LedgerEntry {
    /// A single request's usage.
    pub fn single(input_tokens: u64, output_tokens: u64, cost: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cost,
            request_count: 1,
        }
    }

    pub fn add(&mut self, delta: &LedgerEntry) {
        self.input_tokens += delta.input_tokens;
        self.output_tokens += delta.output_tokens;
        self.cost += delta.cost;
        self.request_count += delta.request_count;
    }
}

/// Ledger storage failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger storage unavailable: {0}")]
    Unavailable(String),

    #[error("ledger I/O error: {0}")]
    Io(String),

    #[error("ledger serialization error: {0}")]
    Serialization(String),
}

/// Storage for ledger accumulators.
pub trait LedgerStore: Send + Sync {
    /// Atomically add `delta` to the entry for `key`, returning the new total.
    fn increment(&self, key: &LedgerKey, delta: &LedgerEntry) -> Result<LedgerEntry, LedgerError>;

    /// All entries with `from <= date <= to`.
    fn entries_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(LedgerKey, LedgerEntry)>, LedgerError>;

    /// Store name for logging.
    fn name(&self) -> &str;
}

fn collect_between(
    map: &HashMap<LedgerKey, LedgerEntry>,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<(LedgerKey, LedgerEntry)> {
    let mut rows: Vec<(LedgerKey, LedgerEntry)> = map
        .iter()
        .filter(|(k, _)| k.date >= from && k.date <= to)
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

/// Process-local ledger store.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    entries: Mutex<HashMap<LedgerKey, LedgerEntry>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn increment(&self, key: &LedgerKey, delta: &LedgerEntry) -> Result<LedgerEntry, LedgerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        let entry = entries.entry(key.clone()).or_default();
        entry.add(delta);
        Ok(*entry)
    }

    fn entries_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(LedgerKey, LedgerEntry)>, LedgerError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(collect_between(&entries, from, to))
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    #[serde(flatten)]
    key: LedgerKey,
    #[serde(flatten)]
    entry: LedgerEntry,
}

/// Ledger store persisted as a JSON file, rewritten on every increment.
#[derive(Debug)]
pub struct JsonFileLedgerStore {
    path: PathBuf,
    entries: Mutex<HashMap<LedgerKey, LedgerEntry>>,
}

impl JsonFileLedgerStore {
    /// Open (or create) a ledger file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| LedgerError::Io(e.to_string()))?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                let rows: Vec<LedgerRow> = serde_json::from_str(&content)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?;
                rows.into_iter().map(|r| (r.key, r.entry)).collect()
            }
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "Opened ledger file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<LedgerKey, LedgerEntry>) -> Result<(), LedgerError> {
        let mut rows: Vec<LedgerRow> = entries
            .iter()
            .map(|(k, v)| LedgerRow {
                key: k.clone(),
                entry: *v,
            })
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        let json = serde_json::to_string_pretty(&rows)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| LedgerError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| LedgerError::Io(e.to_string()))
    }
}

impl LedgerStore for JsonFileLedgerStore {
    fn increment(&self, key: &LedgerKey, delta: &LedgerEntry) -> Result<LedgerEntry, LedgerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        let previous = entries.get(key).copied();
        let entry = entries.entry(key.clone()).or_default();
        entry.add(delta);
        let updated = *entry;

        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(prev) => {
                    entries.insert(key.clone(), prev);
                }
                None => {
                    entries.remove(key);
                }
            }
            return Err(e);
        }
        Ok(updated)
    }

    fn entries_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(LedgerKey, LedgerEntry)>, LedgerError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(collect_between(&entries, from, to))
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_in_memory_increment_accumulates() {
        let store = InMemoryLedgerStore::new();
        let key = LedgerKey::new(day(1), "anthropic", "claude-sonnet-4-5");
        store
            .increment(&key, &LedgerEntry::single(100, 50, 0.01))
            .unwrap();
        let total = store
            .increment(&key, &LedgerEntry::single(10, 5, 0.002))
            .unwrap();
        assert_eq!(total.input_tokens, 110);
        assert_eq!(total.output_tokens, 55);
        assert_eq!(total.request_count, 2);
        assert!((total.cost - 0.012).abs() < 1e-12);
    }

    #[test]
    fn test_entries_between_filters_dates() {
        let store = InMemoryLedgerStore::new();
        for d in [1, 5, 9] {
            store
                .increment(
                    &LedgerKey::new(day(d), "openai", "gpt-4o"),
                    &LedgerEntry::single(1, 1, 1.0),
                )
                .unwrap();
        }
        let rows = store.entries_between(day(2), day(9)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.date, day(5));
    }

    #[test]
    fn test_json_store_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let key = LedgerKey::new(day(3), "anthropic", "claude-opus-4-5");
        {
            let store = JsonFileLedgerStore::open(&path).unwrap();
            store
                .increment(&key, &LedgerEntry::single(1_000, 200, 0.5))
                .unwrap();
        }
        let reopened = JsonFileLedgerStore::open(&path).unwrap();
        let rows = reopened.entries_between(day(1), day(31)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, key);
        assert_eq!(rows[0].1.input_tokens, 1_000);
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonFileLedgerStore::open(&path).unwrap_err();
        assert!(matches!(err, LedgerError::Serialization(_)));
    }
}
