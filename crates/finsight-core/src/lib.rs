#![doc(test(attr(deny(warnings))))]

//! finsight-core
//!
//! The analytical engine: category aggregation, budget tracking, spending
//! baselines, anomaly detection, goal tracking, and report synthesis over
//! ledger snapshots supplied by external collaborators. No blocking I/O
//! happens anywhere in this crate.

pub mod aggregate;
pub mod anomaly;
pub mod baseline;
pub mod budget;
pub mod clock;
pub mod engine;
pub mod error;
pub mod format;
pub mod goal;
pub mod ledger;
pub mod report;

pub use aggregate::CategoryAggregator;
pub use anomaly::AnomalyDetector;
pub use baseline::{BaselineEngine, BaselineKey, BaselineStat, Measure};
pub use budget::{BudgetBook, BudgetTracker};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::AnalysisEngine;
pub use error::{EngineError, Result};
pub use goal::GoalTracker;
pub use ledger::{LedgerSnapshot, LedgerStore};
pub use report::ReportSynthesizer;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes the global tracing subscriber with sensible defaults and
/// emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter =
            EnvFilter::from_default_env().add_directive("finsight_core=info".parse().unwrap());
        fmt().with_env_filter(filter).init();
        tracing::info!("finsight tracing initialized.");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
    }
}
