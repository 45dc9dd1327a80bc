use serde::{Deserialize, Serialize};

/// Tunable parameters of the analysis engine. Every knob has a default so
/// a missing or partial config file still yields a working engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Slack added to the elapsed fraction before a budget counts as at risk.
    #[serde(default = "EngineConfig::default_budget_tolerance")]
    pub budget_tolerance: f64,
    /// Deviation threshold in standard deviations for anomaly flags.
    #[serde(default = "EngineConfig::default_anomaly_sigma")]
    pub anomaly_sigma: f64,
    /// Closed periods required before a baseline is trusted.
    #[serde(default = "EngineConfig::default_baseline_min_samples")]
    pub baseline_min_samples: u64,
    /// Absolute deviation (minor units) used when the baseline variance is zero.
    #[serde(default = "EngineConfig::default_anomaly_absolute_delta_minor")]
    pub anomaly_absolute_delta_minor: i64,
    /// Fraction of the target a goal may exceed before it is flagged.
    #[serde(default = "EngineConfig::default_goal_overflow_tolerance")]
    pub goal_overflow_tolerance: f64,
    /// Granularities the engine accepts for budgets and aggregation, as
    /// lowercase labels.
    #[serde(default = "EngineConfig::default_granularities")]
    pub granularities: Vec<String>,
    /// Granularity anomaly monitoring scans at; must be one of
    /// `granularities`.
    #[serde(default = "EngineConfig::default_anomaly_granularity")]
    pub anomaly_granularity: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            budget_tolerance: Self::default_budget_tolerance(),
            anomaly_sigma: Self::default_anomaly_sigma(),
            baseline_min_samples: Self::default_baseline_min_samples(),
            anomaly_absolute_delta_minor: Self::default_anomaly_absolute_delta_minor(),
            goal_overflow_tolerance: Self::default_goal_overflow_tolerance(),
            granularities: Self::default_granularities(),
            anomaly_granularity: Self::default_anomaly_granularity(),
        }
    }
}

impl EngineConfig {
    pub fn default_budget_tolerance() -> f64 {
        0.10
    }

    pub fn default_anomaly_sigma() -> f64 {
        3.0
    }

    pub fn default_baseline_min_samples() -> u64 {
        3
    }

    pub fn default_anomaly_absolute_delta_minor() -> i64 {
        10_000
    }

    pub fn default_goal_overflow_tolerance() -> f64 {
        0.05
    }

    pub fn default_granularities() -> Vec<String> {
        vec!["day".into(), "month".into(), "year".into()]
    }

    pub fn default_anomaly_granularity() -> String {
        "month".into()
    }
}
