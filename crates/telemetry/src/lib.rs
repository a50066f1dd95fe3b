//! Cost and latency accounting for maitre.
//!
//! Every backend call becomes one immutable [`TelemetryRecord`], priced from
//! the [`PricingTable`] and appended to a [`TelemetrySink`]. Rollups are
//! computed by scanning the log; nothing ever rewrites it.

pub mod pricing;
pub mod record;
pub mod recorder;
pub mod sink;

pub use pricing::{DEFAULT_PRICING, ModelPricing, PriceMatch, PricingTable};
pub use record::{CallStats, DailyRollup, Rollup, TelemetryRecord};
pub use recorder::TelemetryRecorder;
pub use sink::{JsonlSink, MemorySink, TelemetrySink};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
