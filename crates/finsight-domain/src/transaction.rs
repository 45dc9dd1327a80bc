//! Immutable ledger transaction records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::Identifiable;

/// A single categorized ledger entry. Amounts are signed minor units
/// (cents); positive for inflows, negative never implied by kind.
///
/// Transactions are never edited after creation. A correction is modeled
/// as a reversing transaction plus a fresh corrected one, so the audit
/// trail stays intact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub amount_minor: i64,
    pub category_id: Uuid,
    #[serde(default)]
    pub memo: String,
    pub source: TransactionSource,
}

impl Transaction {
    pub fn new(
        timestamp: DateTime<Utc>,
        amount_minor: i64,
        category_id: Uuid,
        memo: impl Into<String>,
        source: TransactionSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            amount_minor,
            category_id,
            memo: memo.into(),
            source,
        }
    }

    /// Builds the reversing entry that cancels this transaction.
    pub fn reversal(&self, at: DateTime<Utc>) -> Transaction {
        Transaction::new(
            at,
            -self.amount_minor,
            self.category_id,
            format!("reversal of {}", self.id),
            TransactionSource::Reversal,
        )
    }
}

impl Identifiable for Transaction {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// How a transaction entered the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionSource {
    Manual,
    Import,
    Reversal,
}

impl fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionSource::Manual => "Manual",
            TransactionSource::Import => "Import",
            TransactionSource::Reversal => "Reversal",
        };
        f.write_str(label)
    }
}
