//! Budget definitions and execution tracking.
//!
//! `BudgetBook` owns the definition-time rules (positive limits, no
//! overlapping budgets per category/period); `BudgetTracker` evaluates a
//! budget against aggregated spending for the period containing the
//! evaluation date.

use chrono::NaiveDate;
use uuid::Uuid;

use finsight_domain::{Budget, BudgetStatus, BudgetStatusKind, Period};

use crate::error::{EngineError, Result};
use crate::format::format_minor;
use crate::ledger::find_by_id;

/// Definition store for budgets. Overlap is rejected here so the
/// analytical passes never see conflicting definitions.
#[derive(Debug, Clone, Default)]
pub struct BudgetBook {
    budgets: Vec<Budget>,
}

impl BudgetBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, budget: Budget) -> Result<Uuid> {
        if budget.limit_minor <= 0 {
            return Err(EngineError::Configuration(format!(
                "budget limit must be positive, got {}",
                budget.limit_minor
            )));
        }
        let conflict = self.budgets.iter().find(|existing| {
            existing.category_id == budget.category_id
                && existing.period == budget.period
                && existing.effective.overlaps(&budget.effective)
        });
        if let Some(existing) = conflict {
            return Err(EngineError::Configuration(format!(
                "budget overlaps existing budget {} for the same category and period",
                existing.id
            )));
        }
        let id = budget.id;
        tracing::debug!(budget = %id, category = %budget.category_id, "budget defined");
        self.budgets.push(budget);
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Budget> {
        find_by_id(&self.budgets, id)
    }

    pub fn budgets(&self) -> &[Budget] {
        &self.budgets
    }

    /// Budgets whose effective range contains `date`.
    pub fn active_at(&self, date: NaiveDate) -> impl Iterator<Item = &Budget> {
        self.budgets
            .iter()
            .filter(move |budget| budget.effective.contains(date))
    }
}

/// Stateless evaluation of a budget against period spending.
#[derive(Debug, Clone, Copy)]
pub struct BudgetTracker {
    tolerance: f64,
}

impl BudgetTracker {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Computes utilization, remaining amount, the linear end-of-period
    /// projection, and the status classification for the period containing
    /// `as_of`. Evaluating outside the budget's effective range fails;
    /// a just-started period yields `InsufficientData` instead of dividing
    /// by zero.
    pub fn evaluate(
        &self,
        budget: &Budget,
        category_name: &str,
        spent_minor: i64,
        as_of: NaiveDate,
    ) -> Result<BudgetStatus> {
        if !budget.effective.contains(as_of) {
            return Err(EngineError::OutOfRange {
                budget_id: budget.id,
                as_of,
            });
        }

        let period = Period::containing(as_of, budget.period);
        let period_days = period.days();
        let elapsed_days = (as_of - period.start).num_days();
        let limit = budget.limit_minor;
        let utilization = spent_minor as f64 / limit as f64;
        let remaining = limit - spent_minor;

        if elapsed_days == 0 {
            return Ok(BudgetStatus {
                budget_id: budget.id,
                category_id: budget.category_id,
                period,
                spent_minor,
                limit_minor: limit,
                remaining_minor: remaining,
                utilization,
                projected_minor: None,
                kind: BudgetStatusKind::InsufficientData,
                message: format!(
                    "{} period just started; not enough data to project.",
                    category_name
                ),
            });
        }

        let projected =
            ((spent_minor as i128 * period_days as i128) / elapsed_days as i128) as i64;
        let elapsed_fraction = elapsed_days as f64 / period_days as f64;

        let kind = if spent_minor > limit || projected > limit {
            BudgetStatusKind::OverBudget
        } else if utilization > elapsed_fraction + self.tolerance {
            BudgetStatusKind::AtRisk
        } else {
            BudgetStatusKind::OnTrack
        };

        let message = budget_message(
            category_name,
            kind,
            spent_minor,
            limit,
            projected,
            utilization,
            period_days - elapsed_days,
        );

        Ok(BudgetStatus {
            budget_id: budget.id,
            category_id: budget.category_id,
            period,
            spent_minor,
            limit_minor: limit,
            remaining_minor: remaining,
            utilization,
            projected_minor: Some(projected),
            kind,
            message,
        })
    }
}

fn budget_message(
    category_name: &str,
    kind: BudgetStatusKind,
    spent: i64,
    limit: i64,
    projected: i64,
    utilization: f64,
    remaining_days: i64,
) -> String {
    let usage_percent = utilization * 100.0;
    match kind {
        BudgetStatusKind::OverBudget if spent > limit => format!(
            "Budget exceeded for {} by {}. Consider reducing spending.",
            category_name,
            format_minor(spent - limit)
        ),
        BudgetStatusKind::OverBudget => format!(
            "{} projected to exceed budget: {} vs limit {}.",
            category_name,
            format_minor(projected),
            format_minor(limit)
        ),
        _ if utilization >= 0.8 => {
            let per_day = (limit - spent) / remaining_days.max(1);
            format!(
                "{} budget {:.1}% used. {}/day remaining for {} days.",
                category_name,
                usage_percent,
                format_minor(per_day),
                remaining_days
            )
        }
        _ => format!(
            "{} spending on track: {:.1}% of budget used.",
            category_name, usage_percent
        ),
    }
}
