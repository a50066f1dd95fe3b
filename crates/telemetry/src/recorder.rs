//! Telemetry recorder — prices calls, appends them, and reduces the log.

use crate::TelemetryError;
use crate::pricing::PricingTable;
use crate::record::{CallStats, DailyRollup, Rollup, TelemetryRecord};
use crate::sink::TelemetrySink;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Cost accounting over an append-only sink.
pub struct TelemetryRecorder {
    pricing: PricingTable,
    sink: Arc<dyn TelemetrySink>,
}

impl TelemetryRecorder {
    pub fn new(pricing: PricingTable, sink: Arc<dyn TelemetrySink>) -> Self {
        Self { pricing, sink }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn sink(&self) -> &Arc<dyn TelemetrySink> {
        &self.sink
    }

    /// Price a call and stamp it with the current time, without writing it.
    pub fn make_record(&self, stats: CallStats) -> TelemetryRecord {
        let cost = self
            .pricing
            .compute_cost(&stats.model, stats.prompt_tokens, stats.completion_tokens);
        TelemetryRecord::new(stats, cost, Utc::now())
    }

    pub fn append(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        self.sink.append(record)?;
        debug!(
            user_id = %record.user_id,
            model = %record.model,
            cost_usd = record.cost_usd,
            latency_ms = record.latency_ms,
            success = record.success,
            "Telemetry recorded"
        );
        Ok(())
    }

    /// Price and append in one step.
    pub fn record(&self, stats: CallStats) -> Result<TelemetryRecord, TelemetryError> {
        let record = self.make_record(stats);
        self.append(&record)?;
        Ok(record)
    }

    /// One rollup per day present in the log, oldest first.
    pub fn daily_rollups(&self) -> Result<Vec<DailyRollup>, TelemetryError> {
        let mut by_day: BTreeMap<NaiveDate, Rollup> = BTreeMap::new();
        for record in self.sink.read_all()? {
            by_day.entry(record.date).or_default().absorb(&record);
        }
        Ok(by_day
            .into_iter()
            .map(|(date, rollup)| DailyRollup { date, rollup })
            .collect())
    }

    pub fn rollup_for_date(&self, date: NaiveDate) -> Result<Rollup, TelemetryError> {
        let records = self.sink.read_all()?;
        Ok(records.iter().filter(|r| r.date == date).collect())
    }

    pub fn user_rollup(&self, user_id: &str) -> Result<Rollup, TelemetryError> {
        let records = self.sink.read_all()?;
        Ok(records.iter().filter(|r| r.user_id == user_id).collect())
    }

    /// Rollup per user, sorted by cost, highest first.
    pub fn user_rollups(&self) -> Result<Vec<(String, Rollup)>, TelemetryError> {
        let mut by_user: HashMap<String, Rollup> = HashMap::new();
        for record in self.sink.read_all()? {
            by_user.entry(record.user_id.clone()).or_default().absorb(&record);
        }
        let mut users: Vec<(String, Rollup)> = by_user.into_iter().collect();
        users.sort_by(|a, b| b.1.cost_usd.total_cmp(&a.1.cost_usd).then_with(|| a.0.cmp(&b.0)));
        Ok(users)
    }
}
