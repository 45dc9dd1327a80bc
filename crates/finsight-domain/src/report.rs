//! Output-side data models: aggregates, statuses, anomaly flags, and the
//! composed analysis report snapshot.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::Period;

/// Derived per-(category, period) totals. Never authoritative; recomputed
/// from the ledger whenever the cache is suspect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodAggregate {
    pub category_id: Uuid,
    pub period: Period,
    /// Rolled-up total in minor units, descendants included.
    pub total_minor: i64,
    /// Transaction count for the category subtree within the period.
    pub transaction_count: u64,
}

/// Severity tier of an anomaly, scaled with the deviation score.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Severity {
    Mild,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Mild => "Mild",
            Severity::High => "High",
            Severity::Critical => "Critical",
        };
        f.write_str(label)
    }
}

/// What an anomaly flag points at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnomalySubject {
    Transaction { id: Uuid, category_id: Uuid },
    PeriodTotal { category_id: Uuid, period: Period },
}

impl AnomalySubject {
    pub fn category_id(&self) -> Uuid {
        match self {
            AnomalySubject::Transaction { category_id, .. } => *category_id,
            AnomalySubject::PeriodTotal { category_id, .. } => *category_id,
        }
    }
}

/// Ephemeral detector output; persistence, if any, belongs to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnomalyFlag {
    pub subject: AnomalySubject,
    pub score: f64,
    pub reason: String,
    pub severity: Severity,
    pub observed_at: DateTime<Utc>,
}

/// Classification ladder for budget execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BudgetStatusKind {
    OnTrack,
    AtRisk,
    OverBudget,
    /// Period just started; projection would divide by zero.
    InsufficientData,
}

impl fmt::Display for BudgetStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BudgetStatusKind::OnTrack => "On Track",
            BudgetStatusKind::AtRisk => "At Risk",
            BudgetStatusKind::OverBudget => "Over Budget",
            BudgetStatusKind::InsufficientData => "Insufficient Data",
        };
        f.write_str(label)
    }
}

/// One budget's execution status for the period containing the evaluation date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetStatus {
    pub budget_id: Uuid,
    pub category_id: Uuid,
    pub period: Period,
    pub spent_minor: i64,
    pub limit_minor: i64,
    pub remaining_minor: i64,
    pub utilization: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_minor: Option<i64>,
    pub kind: BudgetStatusKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GoalStatusKind {
    Achieved,
    OnPace,
    Behind,
}

impl fmt::Display for GoalStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GoalStatusKind::Achieved => "Achieved",
            GoalStatusKind::OnPace => "On Pace",
            GoalStatusKind::Behind => "Behind",
        };
        f.write_str(label)
    }
}

/// Progress snapshot for one savings goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalStatus {
    pub goal_id: Uuid,
    pub progress_minor: i64,
    pub target_minor: i64,
    pub kind: GoalStatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_completion: Option<NaiveDate>,
    /// Progress exceeded the target by more than the overflow tolerance.
    pub overflowed: bool,
}

/// Income/expense balance over a window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BalanceSummary {
    pub income_minor: i64,
    pub expense_minor: i64,
    pub net_minor: i64,
    pub transaction_count: u64,
}

/// One point of the per-period income/expense trend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrendPoint {
    pub period: Period,
    pub income_minor: i64,
    pub expense_minor: i64,
}

/// Immutable composed snapshot handed to presentation collaborators.
/// Reproducible: identical inputs and identical `generated_at` yield
/// byte-identical serialized output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub balance: BalanceSummary,
    pub budget_statuses: Vec<BudgetStatus>,
    pub anomaly_flags: Vec<AnomalyFlag>,
    pub goal_statuses: Vec<GoalStatus>,
    pub category_totals: Vec<PeriodAggregate>,
    pub trend: Vec<TrendPoint>,
    pub suggestions: Vec<String>,
}
