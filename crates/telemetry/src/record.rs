//! Telemetry records and their aggregates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Facts about one backend call, before pricing.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStats {
    pub user_id: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency: Duration,
    pub success: bool,
    pub error: Option<String>,
}

/// One line of the telemetry log. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    /// UTC calendar day of `timestamp`, for cheap daily grouping.
    pub date: NaiveDate,
    pub user_id: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub latency_ms: u64,
    pub cost_usd: f64,
    pub success: bool,
    pub error: Option<String>,
}

impl TelemetryRecord {
    pub fn new(stats: CallStats, cost_usd: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            date: timestamp.date_naive(),
            total_tokens: stats.prompt_tokens.saturating_add(stats.completion_tokens),
            user_id: stats.user_id,
            model: stats.model,
            prompt_tokens: stats.prompt_tokens,
            completion_tokens: stats.completion_tokens,
            latency_ms: u64::try_from(stats.latency.as_millis()).unwrap_or(u64::MAX),
            cost_usd,
            success: stats.success,
            error: stats.error,
        }
    }
}

/// Sums over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollup {
    pub calls: u64,
    pub failures: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub total_latency_ms: u64,
}

impl Rollup {
    pub fn absorb(&mut self, record: &TelemetryRecord) {
        self.calls += 1;
        if !record.success {
            self.failures += 1;
        }
        self.prompt_tokens += u64::from(record.prompt_tokens);
        self.completion_tokens += u64::from(record.completion_tokens);
        self.total_tokens += u64::from(record.total_tokens);
        self.cost_usd += record.cost_usd;
        self.total_latency_ms = self.total_latency_ms.saturating_add(record.latency_ms);
    }

    pub fn mean_latency_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.calls as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            (self.calls - self.failures) as f64 / self.calls as f64
        }
    }
}

impl<'a> FromIterator<&'a TelemetryRecord> for Rollup {
    fn from_iter<I: IntoIterator<Item = &'a TelemetryRecord>>(iter: I) -> Self {
        let mut rollup = Rollup::default();
        for record in iter {
            rollup.absorb(record);
        }
        rollup
    }
}

/// A rollup for one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRollup {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub rollup: Rollup,
}
