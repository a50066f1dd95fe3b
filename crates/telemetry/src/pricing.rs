//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price. Custom pricing and the default row can be overridden from
//! the `[telemetry]` config section.

use maitre_config::TelemetryConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub const fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// `prompt/1e6 * in + completion/1e6 * out`
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Row charged for models the table does not know.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(1.0, 3.0);

const PROVIDER_PREFIXES: &[&str] = &[
    "openai",
    "anthropic",
    "google",
    "mistral",
    "deepseek",
    "meta-llama",
];

/// Where a price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMatch {
    Exact,
    Prefixed,
    VersionSuffix,
    Default,
}

/// Thread-safe pricing table with built-in prices, custom overrides and a
/// default row.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
    default_row: RwLock<ModelPricing>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let builtin: &[(&str, ModelPricing)] = &[
            ("anthropic/claude-sonnet-4", ModelPricing::new(3.0, 15.0)),
            ("anthropic/claude-3.5-haiku", ModelPricing::new(0.8, 4.0)),
            ("anthropic/claude-3-haiku", ModelPricing::new(0.25, 1.25)),
            ("openai/gpt-4o", ModelPricing::new(2.5, 10.0)),
            ("openai/gpt-4o-mini", ModelPricing::new(0.15, 0.6)),
            ("openai/gpt-4.1-mini", ModelPricing::new(0.4, 1.6)),
            ("openai/gpt-3.5-turbo", ModelPricing::new(0.5, 1.5)),
            ("google/gemini-2.0-flash", ModelPricing::new(0.1, 0.4)),
            ("google/gemini-1.5-flash", ModelPricing::new(0.075, 0.3)),
            ("meta-llama/llama-3.1-70b", ModelPricing::new(0.52, 0.75)),
            ("meta-llama/llama-3.1-8b", ModelPricing::new(0.055, 0.055)),
            ("mistral/mistral-small", ModelPricing::new(0.2, 0.6)),
            ("deepseek/deepseek-v3", ModelPricing::new(0.27, 1.1)),
        ];
        let prices = builtin
            .iter()
            .map(|(model, pricing)| ((*model).to_string(), *pricing))
            .collect();

        Self {
            prices: RwLock::new(prices),
            default_row: RwLock::new(DEFAULT_PRICING),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            default_row: RwLock::new(DEFAULT_PRICING),
        }
    }

    /// Built-in prices with the config's overrides applied.
    pub fn from_config(config: &TelemetryConfig) -> Self {
        let table = Self::with_defaults();
        for (model, p) in &config.custom_pricing {
            table.set(model.clone(), ModelPricing::new(p.input_per_m, p.output_per_m));
        }
        if let Some(p) = &config.default_pricing {
            table.set_default(ModelPricing::new(p.input_per_m, p.output_per_m));
        }
        table
    }

    /// Look up pricing for a model by exact id.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.prices.read().get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.write().insert(model.into(), pricing);
    }

    pub fn set_default(&self, pricing: ModelPricing) {
        *self.default_row.write() = pricing;
    }

    pub fn default_row(&self) -> ModelPricing {
        *self.default_row.read()
    }

    /// Price for `model`, trying in order: exact id, provider-prefixed id
    /// (`gpt-4o` → `openai/gpt-4o`), then the longest known bare name that
    /// prefixes the model (`gpt-4o-mini-2024-07-18` → `gpt-4o-mini`).
    /// Anything else gets the default row and a warning.
    pub fn resolve(&self, model: &str) -> (ModelPricing, PriceMatch) {
        let prices = self.prices.read();

        if let Some(p) = prices.get(model) {
            return (*p, PriceMatch::Exact);
        }

        for prefix in PROVIDER_PREFIXES {
            if let Some(p) = prices.get(&format!("{prefix}/{model}")) {
                return (*p, PriceMatch::Prefixed);
            }
        }

        let model_lower = model.to_lowercase();
        let bare_model = model_lower.rsplit('/').next().unwrap_or(&model_lower);
        let best = prices
            .iter()
            .map(|(key, pricing)| (key.rsplit('/').next().unwrap_or(key).to_lowercase(), pricing))
            .filter(|(bare_key, _)| {
                !bare_key.is_empty() && bare_model.starts_with(bare_key.as_str())
            })
            .max_by_key(|(bare_key, _)| bare_key.len());
        if let Some((_, p)) = best {
            return (*p, PriceMatch::VersionSuffix);
        }
        drop(prices);

        let row = self.default_row();
        warn!(model, "Unknown model, using default pricing row");
        (row, PriceMatch::Default)
    }

    /// Cost in USD for one call.
    pub fn compute_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.resolve(model).0.cost(input_tokens, output_tokens)
    }

    /// All known models with their prices, sorted by name.
    pub fn entries(&self) -> Vec<(String, ModelPricing)> {
        let mut entries: Vec<(String, ModelPricing)> = self
            .prices
            .read()
            .iter()
            .map(|(model, pricing)| (model.clone(), *pricing))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maitre_config::PricingOverrideConfig;

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();
        // (1000 * 3.0 + 500 * 15.0) / 1M
        let cost = table.compute_cost("anthropic/claude-sonnet-4", 1000, 500);
        assert!((cost - 0.0105).abs() < 1e-10);
    }

    #[test]
    fn unknown_model_uses_default_row() {
        let table = PricingTable::with_defaults();
        let (pricing, matched) = table.resolve("unknown/model-xyz");
        assert_eq!(matched, PriceMatch::Default);
        assert_eq!(pricing, DEFAULT_PRICING);
        let cost = table.compute_cost("unknown/model-xyz", 1_000_000, 1_000_000);
        assert!((cost - 4.0).abs() < 1e-10);
    }

    #[test]
    fn prefix_and_version_matching() {
        let table = PricingTable::with_defaults();
        assert_eq!(table.resolve("gpt-4o").1, PriceMatch::Prefixed);

        let (pricing, matched) = table.resolve("openai/gpt-4o-mini-2024-07-18");
        assert_eq!(matched, PriceMatch::VersionSuffix);
        assert_eq!(pricing, ModelPricing::new(0.15, 0.6), "longest bare name wins");
    }

    #[test]
    fn config_overrides_apply() {
        let mut config = TelemetryConfig::default();
        config.custom_pricing.insert(
            "local/llama".into(),
            PricingOverrideConfig {
                input_per_m: 0.0,
                output_per_m: 0.0,
            },
        );
        config.default_pricing = Some(PricingOverrideConfig {
            input_per_m: 2.0,
            output_per_m: 2.0,
        });
        let table = PricingTable::from_config(&config);
        assert_eq!(table.compute_cost("local/llama", 5000, 5000), 0.0);
        let cost = table.compute_cost("mystery", 500_000, 500_000);
        assert!((cost - 2.0).abs() < 1e-10);
    }

    #[test]
    fn set_overrides_existing() {
        let table = PricingTable::with_defaults();
        table.set("openai/gpt-4o", ModelPricing::new(5.0, 20.0));
        let cost = table.compute_cost("openai/gpt-4o", 1_000_000, 0);
        assert!((cost - 5.0).abs() < 1e-10);
    }

    #[test]
    fn entries_are_sorted() {
        let table = PricingTable::with_defaults();
        let entries = table.entries();
        assert_eq!(entries.len(), table.len());
        assert!(entries.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(PricingTable::empty().is_empty());
    }
}
