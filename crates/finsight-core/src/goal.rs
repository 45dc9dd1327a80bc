//! Savings-goal progress tracking.

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use finsight_config::EngineConfig;
use finsight_domain::{Contribution, Goal, GoalStatus, GoalStatusKind};

use crate::ledger::LedgerStore;

/// A goal with no contributions counts as behind once the target date is
/// this close.
const IMMINENT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct GoalTracker {
    overflow_tolerance: f64,
}

impl GoalTracker {
    pub fn new(overflow_tolerance: f64) -> Self {
        Self { overflow_tolerance }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.goal_overflow_tolerance)
    }

    /// Status from the goal's recorded contributions only.
    pub fn status(&self, goal: &Goal, as_of: NaiveDate) -> GoalStatus {
        self.status_from(goal, &goal.contributions, as_of)
    }

    /// Status including contributions derived on demand from the linked
    /// category's ledger transactions. Derived entries are never stored;
    /// they are a pure function of the ledger and the goal's linkage.
    pub fn status_with_ledger(
        &self,
        ledger: &impl LedgerStore,
        goal: &Goal,
        as_of: NaiveDate,
    ) -> GoalStatus {
        let mut contributions = goal.contributions.clone();
        contributions.extend(derive_contributions(ledger, goal));
        contributions.sort_by_key(|c| c.timestamp);
        self.status_from(goal, &contributions, as_of)
    }

    fn status_from(
        &self,
        goal: &Goal,
        contributions: &[Contribution],
        as_of: NaiveDate,
    ) -> GoalStatus {
        let progress: i64 = contributions.iter().map(|c| c.amount_minor).sum();
        let overflow_limit = goal.target_minor as f64 * (1.0 + self.overflow_tolerance);
        let overflowed = progress as f64 > overflow_limit;

        if progress >= goal.target_minor {
            return GoalStatus {
                goal_id: goal.id,
                progress_minor: progress,
                target_minor: goal.target_minor,
                kind: GoalStatusKind::Achieved,
                projected_completion: None,
                overflowed,
            };
        }

        let projected_completion = project_completion(goal, contributions, progress, as_of);
        let kind = match projected_completion {
            Some(date) if date <= goal.target_date => GoalStatusKind::OnPace,
            Some(_) => GoalStatusKind::Behind,
            None => {
                // Nothing to extrapolate from yet; only an imminent deadline
                // makes that a problem.
                let days_left = (goal.target_date - as_of).num_days();
                if days_left <= IMMINENT_WINDOW_DAYS {
                    GoalStatusKind::Behind
                } else {
                    GoalStatusKind::OnPace
                }
            }
        };

        GoalStatus {
            goal_id: goal.id,
            progress_minor: progress,
            target_minor: goal.target_minor,
            kind,
            projected_completion,
            overflowed,
        }
    }
}

/// Linear-rate projection from the first contribution: at the observed
/// rate, when does the cumulative sum reach the target?
fn project_completion(
    goal: &Goal,
    contributions: &[Contribution],
    progress: i64,
    as_of: NaiveDate,
) -> Option<NaiveDate> {
    if contributions.is_empty() || progress <= 0 {
        return None;
    }
    let first = contributions
        .iter()
        .map(|c| c.timestamp.date_naive())
        .min()?;
    let elapsed_days = (as_of - first).num_days().max(1);
    let rate = progress as f64 / elapsed_days as f64;
    let total_days = (goal.target_minor as f64 / rate).ceil() as i64;
    Some(first + Duration::days(total_days))
}

/// Contributions derived from the goal's linked category: every ledger
/// transaction in that category counts toward the goal.
pub fn derive_contributions(ledger: &impl LedgerStore, goal: &Goal) -> Vec<Contribution> {
    let Some(category_id) = goal.linked_category else {
        return Vec::new();
    };
    ledger
        .transactions()
        .iter()
        .filter(|txn| txn.category_id == category_id)
        .map(|txn| Contribution {
            timestamp: txn.timestamp,
            amount_minor: txn.amount_minor,
        })
        .collect()
}
