//! Price table — per-million-token prices with family fallback.
//!
//! Lookup order: exact model key, then the longest key contained in the
//! model name (so `claude-sonnet-4-5-20250929` resolves to
//! `claude-sonnet-4-5`, and unknown sonnet builds to the `sonnet` family),
//! then free.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Price of one model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

impl ModelPrice {
    pub const FREE: ModelPrice = ModelPrice {
        input: 0.0,
        output: 0.0,
    };

    pub fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    /// Cost in USD for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input
            + (output_tokens as f64 / 1_000_000.0) * self.output
    }
}

/// Model name → price table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, ModelPrice>",
    into = "BTreeMap<String, ModelPrice>"
)]
pub struct PriceTable {
    prices: BTreeMap<String, ModelPrice>,
}

impl From<BTreeMap<String, ModelPrice>> for PriceTable {
    fn from(prices: BTreeMap<String, ModelPrice>) -> Self {
        Self::new(prices)
    }
}

impl From<PriceTable> for BTreeMap<String, ModelPrice> {
    fn from(table: PriceTable) -> Self {
        table.prices
    }
}

impl PriceTable {
    pub fn new(prices: BTreeMap<String, ModelPrice>) -> Self {
        Self {
            prices: prices
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            prices: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, model: &str, price: ModelPrice) {
        self.prices.insert(model.to_ascii_lowercase(), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Resolve the price for a model name; unknown names are free.
    pub fn lookup(&self, model: &str) -> ModelPrice {
        let name = model.to_ascii_lowercase();
        if let Some(price) = self.prices.get(&name) {
            return *price;
        }
        self.prices
            .iter()
            .filter(|(family, _)| name.contains(family.as_str()))
            .max_by_key(|(family, _)| family.len())
            .map(|(_, price)| *price)
            .unwrap_or(ModelPrice::FREE)
    }

    /// Whether the model resolves to a non-zero price.
    pub fn is_priced(&self, model: &str) -> bool {
        self.lookup(model) != ModelPrice::FREE
    }

    /// Estimated cost in USD.
    pub fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.lookup(model).cost(input_tokens, output_tokens)
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("claude-opus-4-5", ModelPrice::new(5.0, 25.0));
        table.insert("claude-sonnet-4-5", ModelPrice::new(3.0, 15.0));
        table.insert("claude-haiku-4-5", ModelPrice::new(1.0, 5.0));
        table.insert("opus", ModelPrice::new(15.0, 75.0));
        table.insert("sonnet", ModelPrice::new(3.0, 15.0));
        table.insert("haiku", ModelPrice::new(0.8, 4.0));
        table.insert("gpt-4o", ModelPrice::new(2.5, 10.0));
        table.insert("gpt-4o-mini", ModelPrice::new(0.15, 0.6));
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let table = PriceTable::default();
        assert_eq!(table.estimate_cost("claude-opus-4-5", 1_000_000, 0), 5.0);
        assert_eq!(table.estimate_cost("claude-opus-4-5", 0, 1_000_000), 25.0);
    }

    #[test]
    fn test_zero_tokens_is_free_for_every_model() {
        let table = PriceTable::default();
        for model in ["claude-opus-4-5", "gpt-4o", "llama3.1:8b", "mystery"] {
            assert_eq!(table.estimate_cost(model, 0, 0), 0.0, "{model}");
        }
    }

    #[test]
    fn test_family_match_prefers_longest_key() {
        let table = PriceTable::default();
        assert_eq!(
            table.lookup("gpt-4o-mini-2024-07-18"),
            ModelPrice::new(0.15, 0.6)
        );
        assert_eq!(table.lookup("gpt-4o-2024-08-06"), ModelPrice::new(2.5, 10.0));
        assert_eq!(
            table.lookup("claude-sonnet-4-5-20250929"),
            ModelPrice::new(3.0, 15.0)
        );
        assert_eq!(table.lookup("claude-3-opus-latest"), ModelPrice::new(15.0, 75.0));
    }

    #[test]
    fn test_unknown_model_is_free() {
        let table = PriceTable::default();
        assert_eq!(table.lookup("llama3.1:8b"), ModelPrice::FREE);
        assert!(!table.is_priced("qwen2.5:7b"));
        assert_eq!(table.estimate_cost("qwen2.5:7b", 5_000_000, 5_000_000), 0.0);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = PriceTable::default();
        assert_eq!(table.lookup("Claude-Opus-4-5"), ModelPrice::new(5.0, 25.0));
    }
}
