//! Ledger access: the `LedgerStore` interface the engine consumes and an
//! in-memory snapshot implementation.
//!
//! The ledger exclusively owns transaction and category identity. Every
//! derived structure in this crate can be rebuilt from it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use finsight_domain::{Category, Identifiable, Transaction};

use crate::error::{EngineError, Result};

/// Read interface supplied by ledger collaborators: ordered transactions,
/// the category forest, and range queries, all as of a fixed instant.
pub trait LedgerStore {
    /// The instant this snapshot was taken.
    fn as_of(&self) -> DateTime<Utc>;

    /// Transactions ordered by timestamp ascending.
    fn transactions(&self) -> &[Transaction];

    fn categories(&self) -> &[Category];

    fn category(&self, id: Uuid) -> Option<&Category> {
        find_by_id(self.categories(), id)
    }

    /// Transactions with `start <= timestamp < end`.
    fn transactions_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Transaction] {
        let all = self.transactions();
        let lo = all.partition_point(|t| t.timestamp < start);
        let hi = all.partition_point(|t| t.timestamp < end);
        &all[lo..hi]
    }

    /// Upward parent chain starting at the category itself, root last.
    fn ancestor_chain(&self, category_id: Uuid) -> Result<Vec<Uuid>> {
        let mut chain = Vec::new();
        let mut current = Some(category_id);
        while let Some(id) = current {
            let category = self
                .category(id)
                .ok_or(EngineError::CategoryNotFound(id))?;
            chain.push(id);
            current = category.parent_id;
        }
        Ok(chain)
    }
}

pub(crate) fn find_by_id<T: Identifiable>(items: &[T], id: Uuid) -> Option<&T> {
    items.iter().find(|item| item.id() == id)
}

/// In-memory ledger snapshot. Mutations validate referential integrity and
/// keep the transaction sequence ordered; categories are validated acyclic
/// at create/re-parent time so aggregation never has to handle cycles.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    as_of: DateTime<Utc>,
    categories: Vec<Category>,
    transactions: Vec<Transaction>,
}

impl LedgerSnapshot {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            categories: Vec::new(),
            transactions: Vec::new(),
        }
    }

    pub fn add_category(&mut self, category: Category) -> Result<Uuid> {
        if find_by_id(&self.categories, category.id).is_some() {
            return Err(EngineError::Configuration(format!(
                "duplicate category id {}",
                category.id
            )));
        }
        if let Some(parent_id) = category.parent_id {
            self.assert_acyclic(category.id, parent_id)?;
        }
        let id = category.id;
        self.categories.push(category);
        Ok(id)
    }

    /// Moves a category under a new parent (or to the root when `None`).
    pub fn reparent_category(&mut self, id: Uuid, new_parent: Option<Uuid>) -> Result<()> {
        if find_by_id(&self.categories, id).is_none() {
            return Err(EngineError::CategoryNotFound(id));
        }
        if let Some(parent_id) = new_parent {
            self.assert_acyclic(id, parent_id)?;
        }
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .expect("presence checked above");
        category.parent_id = new_parent;
        Ok(())
    }

    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<Uuid> {
        if self.category(transaction.category_id).is_none() {
            return Err(EngineError::CategoryNotFound(transaction.category_id));
        }
        let id = transaction.id;
        let index = self
            .transactions
            .partition_point(|existing| existing.timestamp <= transaction.timestamp);
        self.transactions.insert(index, transaction);
        tracing::debug!(transaction = %id, "transaction added to snapshot");
        Ok(id)
    }

    /// Appends the reversing entry for an existing transaction and returns
    /// the reversal's id. The original record is left untouched.
    pub fn reverse_transaction(&mut self, id: Uuid, at: DateTime<Utc>) -> Result<Uuid> {
        let original = find_by_id(&self.transactions, id)
            .ok_or(EngineError::TransactionNotFound(id))?;
        let reversal = original.reversal(at);
        self.add_transaction(reversal)
    }

    /// Walks upward from `parent_id` with a visited set; reaching `child_id`
    /// or revisiting a node means the re-parent would close a cycle.
    fn assert_acyclic(&self, child_id: Uuid, parent_id: Uuid) -> Result<()> {
        let mut visited = HashSet::new();
        let mut current = Some(parent_id);
        while let Some(id) = current {
            if id == child_id || !visited.insert(id) {
                return Err(EngineError::Configuration(format!(
                    "category {} would form a cycle",
                    child_id
                )));
            }
            let node = self
                .category(id)
                .ok_or(EngineError::CategoryNotFound(id))?;
            current = node.parent_id;
        }
        Ok(())
    }
}

impl LedgerStore for LedgerSnapshot {
    fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    fn categories(&self) -> &[Category] {
        &self.categories
    }
}
