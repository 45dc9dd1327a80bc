//! Report synthesis: composes already-computed results into one immutable,
//! reproducible snapshot. No new computation happens here beyond sorting
//! and rule-based suggestion text.

use chrono::{DateTime, Utc};

use finsight_domain::{
    AnalysisReport, AnomalyFlag, BalanceSummary, BudgetStatus, GoalStatus, PeriodAggregate,
    TrendPoint,
};

pub struct ReportSynthesizer;

impl ReportSynthesizer {
    /// Assembles the snapshot. Calling twice with identical inputs and the
    /// same `generated_at` yields byte-identical serialized output: every
    /// collection is sorted with a total order.
    pub fn compose(
        generated_at: DateTime<Utc>,
        balance: BalanceSummary,
        mut budget_statuses: Vec<BudgetStatus>,
        mut anomaly_flags: Vec<AnomalyFlag>,
        mut goal_statuses: Vec<GoalStatus>,
        mut category_totals: Vec<PeriodAggregate>,
        mut trend: Vec<TrendPoint>,
        suggestions: Vec<String>,
    ) -> AnalysisReport {
        budget_statuses.sort_by(|a, b| {
            b.utilization
                .total_cmp(&a.utilization)
                .then_with(|| a.budget_id.cmp(&b.budget_id))
        });
        anomaly_flags.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.observed_at.cmp(&a.observed_at))
                .then_with(|| a.subject.category_id().cmp(&b.subject.category_id()))
        });
        goal_statuses.sort_by_key(|status| status.goal_id);
        category_totals.sort_by_key(|aggregate| (aggregate.period, aggregate.category_id));
        trend.sort_by_key(|point| point.period);

        AnalysisReport {
            generated_at,
            balance,
            budget_statuses,
            anomaly_flags,
            goal_statuses,
            category_totals,
            trend,
            suggestions,
        }
    }
}

/// Rule-based advice lines derived from already-computed results.
pub fn suggestions(
    balance: &BalanceSummary,
    top_expense: Option<(&str, i64)>,
    avg_monthly_expense_minor: i64,
    anomaly_count: usize,
) -> Vec<String> {
    let mut lines = Vec::new();

    if balance.net_minor < 0 {
        lines.push(
            "Your expenses exceed income; consider creating a budget plan to control spending."
                .to_string(),
        );
    } else if balance.income_minor > 0
        && balance.net_minor as f64 > balance.income_minor as f64 * 0.3
    {
        lines.push("Your savings rate is high; consider some investment products.".to_string());
    }

    if let Some((name, total)) = top_expense {
        if avg_monthly_expense_minor > 0
            && total as f64 > avg_monthly_expense_minor as f64 * 0.4
        {
            lines.push(format!(
                "'{}' category spending is relatively high; consider moderate control.",
                name
            ));
        }
    }

    if anomaly_count > 0 {
        lines.push(format!(
            "Detected {} anomalous large expenses; please verify.",
            anomaly_count
        ));
    }

    if lines.is_empty() {
        lines.push("Your financial status is good, keep it up!".to_string());
    }
    lines
}
