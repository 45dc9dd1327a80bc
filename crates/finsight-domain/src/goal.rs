//! Savings goals and their contribution history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{Identifiable, NamedEntity};

/// A single payment toward a goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Contribution {
    pub timestamp: DateTime<Utc>,
    pub amount_minor: i64,
}

/// A savings target with an ordered contribution history. When
/// `linked_category` is set, contributions may additionally be derived
/// on demand from that category's ledger transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: Uuid,
    pub name: String,
    pub target_minor: i64,
    pub target_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_category: Option<Uuid>,
    #[serde(default)]
    pub contributions: Vec<Contribution>,
}

impl Goal {
    pub fn new(name: impl Into<String>, target_minor: i64, target_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            target_minor,
            target_date,
            linked_category: None,
            contributions: Vec::new(),
        }
    }

    pub fn with_linked_category(mut self, category_id: Uuid) -> Self {
        self.linked_category = Some(category_id);
        self
    }

    /// Appends a contribution, keeping the history ordered by timestamp.
    pub fn add_contribution(&mut self, timestamp: DateTime<Utc>, amount_minor: i64) {
        let contribution = Contribution {
            timestamp,
            amount_minor,
        };
        let index = self
            .contributions
            .partition_point(|existing| existing.timestamp <= timestamp);
        self.contributions.insert(index, contribution);
    }

    /// Exact integer sum of recorded contributions.
    pub fn contributed_minor(&self) -> i64 {
        self.contributions.iter().map(|c| c.amount_minor).sum()
    }
}

impl Identifiable for Goal {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for Goal {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn contributions_stay_ordered() {
        let mut goal = Goal::new(
            "Vacation",
            500_000,
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        );
        let later = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        goal.add_contribution(later, 20_000);
        goal.add_contribution(earlier, 10_000);
        assert_eq!(goal.contributions[0].timestamp, earlier);
        assert_eq!(goal.contributed_minor(), 30_000);
    }
}
