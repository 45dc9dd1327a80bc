//! A spending guardrail for a specific category.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{DateRange, Granularity, Identifiable};

/// Caps spending for one category over a recurring period while the
/// effective range is active. At most one budget may be active per
/// (category, period) pair at any instant; overlap is rejected when the
/// budget is defined, not during evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub id: Uuid,
    pub category_id: Uuid,
    pub period: Granularity,
    pub limit_minor: i64,
    pub effective: DateRange,
}

impl Budget {
    pub fn new(
        category_id: Uuid,
        period: Granularity,
        limit_minor: i64,
        effective: DateRange,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category_id,
            period,
            limit_minor,
            effective,
        }
    }
}

impl Identifiable for Budget {
    fn id(&self) -> Uuid {
        self.id
    }
}
