//! Category aggregation: per-(category, period) totals with hierarchical
//! rollup, a cell cache, and an incremental path for single-transaction
//! writes.
//!
//! All sums are exact i64 minor units. Cycles never reach this module;
//! the ledger rejects them at category creation.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

use finsight_domain::{
    BalanceSummary, CategoryKind, Granularity, Period, PeriodAggregate, Transaction, TrendPoint,
};

use crate::error::Result;
use crate::ledger::LedgerStore;

type CellKey = (Uuid, Period);

/// Rolls transactions into cached per-(category, period) totals. Parent
/// cells include every descendant's activity.
#[derive(Debug, Clone)]
pub struct CategoryAggregator {
    granularity: Granularity,
    cache: HashMap<CellKey, PeriodAggregate>,
}

impl CategoryAggregator {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            cache: HashMap::new(),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Batch path: aggregates every transaction dated within `[from, to]`
    /// into rolled-up cells, repopulating the cache for the touched range.
    pub fn aggregate_range(
        &mut self,
        ledger: &impl LedgerStore,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PeriodAggregate>> {
        let mut cells: HashMap<CellKey, (i64, u64)> = HashMap::new();
        for txn in ledger.transactions() {
            let date = txn.timestamp.date_naive();
            if date < from || date > to {
                continue;
            }
            let period = Period::containing(date, self.granularity);
            for ancestor in ledger.ancestor_chain(txn.category_id)? {
                let cell = cells.entry((ancestor, period)).or_insert((0, 0));
                cell.0 += txn.amount_minor;
                cell.1 += 1;
            }
        }

        let mut aggregates: Vec<PeriodAggregate> = cells
            .into_iter()
            .map(|((category_id, period), (total_minor, transaction_count))| PeriodAggregate {
                category_id,
                period,
                total_minor,
                transaction_count,
            })
            .collect();
        aggregates.sort_by_key(|a| (a.period, a.category_id));

        for aggregate in &aggregates {
            self.cache
                .insert((aggregate.category_id, aggregate.period), *aggregate);
        }
        Ok(aggregates)
    }

    /// Incremental path: folds one already-inserted transaction into the
    /// affected (ancestor chain x period) cells only. Cells not yet cached
    /// are recomputed from the ledger, which already contains the
    /// transaction. Returns the updated cells.
    pub fn apply_transaction(
        &mut self,
        ledger: &impl LedgerStore,
        txn: &Transaction,
    ) -> Result<Vec<PeriodAggregate>> {
        let period = Period::containing(txn.timestamp.date_naive(), self.granularity);
        let mut updated = Vec::new();
        for ancestor in ledger.ancestor_chain(txn.category_id)? {
            let key = (ancestor, period);
            let aggregate = match self.cache.get_mut(&key) {
                Some(cell) => {
                    cell.total_minor += txn.amount_minor;
                    cell.transaction_count += 1;
                    *cell
                }
                None => {
                    let cell = self.recompute_cell(ledger, ancestor, period)?;
                    self.cache.insert(key, cell);
                    cell
                }
            };
            updated.push(aggregate);
        }
        updated.sort_by_key(|a| (a.period, a.category_id));
        Ok(updated)
    }

    /// Drops the cached cells along a category's ancestor chain for one
    /// period; they will be recomputed from the ledger on next access.
    pub fn invalidate(
        &mut self,
        ledger: &impl LedgerStore,
        category_id: Uuid,
        period: Period,
    ) -> Result<()> {
        for ancestor in ledger.ancestor_chain(category_id)? {
            self.cache.remove(&(ancestor, period));
        }
        Ok(())
    }

    pub fn cached(&self, category_id: Uuid, period: Period) -> Option<&PeriodAggregate> {
        self.cache.get(&(category_id, period))
    }

    /// Authoritative recomputation of one cell straight from the ledger:
    /// direct transactions of the category plus its whole descendant subtree.
    pub fn recompute_cell(
        &self,
        ledger: &impl LedgerStore,
        category_id: Uuid,
        period: Period,
    ) -> Result<PeriodAggregate> {
        let subtree = subtree_of(ledger, category_id);
        let mut total_minor = 0i64;
        let mut transaction_count = 0u64;
        for txn in ledger.transactions() {
            let date = txn.timestamp.date_naive();
            if period.contains(date) && subtree.contains(&txn.category_id) {
                total_minor += txn.amount_minor;
                transaction_count += 1;
            }
        }
        Ok(PeriodAggregate {
            category_id,
            period,
            total_minor,
            transaction_count,
        })
    }

    /// Rolled-up totals for every period of this aggregator's granularity
    /// that has closed by `now`, chronological, starting at the category
    /// subtree's first transaction. Quiet periods count as zero once the
    /// category has history, so baselines see the full trajectory.
    pub fn closed_period_totals(
        &self,
        ledger: &impl LedgerStore,
        category_id: Uuid,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<(Period, i64)>> {
        let subtree = subtree_of(ledger, category_id);
        let first = ledger
            .transactions()
            .iter()
            .find(|t| subtree.contains(&t.category_id))
            .map(|t| t.timestamp.date_naive());
        let Some(first) = first else {
            return Ok(Vec::new());
        };

        let mut totals = Vec::new();
        for period in Period::sequence(first, now.date_naive(), self.granularity) {
            if !period.has_closed(now) {
                break;
            }
            let cell = self.recompute_cell(ledger, category_id, period)?;
            totals.push((period, cell.total_minor));
        }
        Ok(totals)
    }

    /// Income vs expense balance over `[from, to]`, classified by the
    /// transaction category's kind.
    pub fn balance(
        &self,
        ledger: &impl LedgerStore,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BalanceSummary> {
        let mut summary = BalanceSummary::default();
        for txn in ledger.transactions() {
            let date = txn.timestamp.date_naive();
            if date < from || date > to {
                continue;
            }
            let category = ledger
                .category(txn.category_id)
                .ok_or(crate::error::EngineError::CategoryNotFound(txn.category_id))?;
            match category.kind {
                CategoryKind::Income => summary.income_minor += txn.amount_minor,
                CategoryKind::Expense => summary.expense_minor += txn.amount_minor,
            }
            summary.transaction_count += 1;
        }
        summary.net_minor = summary.income_minor - summary.expense_minor;
        Ok(summary)
    }

    /// Per-period income/expense pairs over `[from, to]`, ordered by period.
    pub fn trend(
        &self,
        ledger: &impl LedgerStore,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TrendPoint>> {
        let mut points: HashMap<Period, TrendPoint> = HashMap::new();
        for txn in ledger.transactions() {
            let date = txn.timestamp.date_naive();
            if date < from || date > to {
                continue;
            }
            let category = ledger
                .category(txn.category_id)
                .ok_or(crate::error::EngineError::CategoryNotFound(txn.category_id))?;
            let period = Period::containing(date, self.granularity);
            let point = points.entry(period).or_insert(TrendPoint {
                period,
                income_minor: 0,
                expense_minor: 0,
            });
            match category.kind {
                CategoryKind::Income => point.income_minor += txn.amount_minor,
                CategoryKind::Expense => point.expense_minor += txn.amount_minor,
            }
        }
        let mut trend: Vec<TrendPoint> = points.into_values().collect();
        trend.sort_by_key(|p| p.period);
        Ok(trend)
    }
}

fn subtree_of(ledger: &impl LedgerStore, root: Uuid) -> HashSet<Uuid> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for category in ledger.categories() {
        if let Some(parent) = category.parent_id {
            children.entry(parent).or_default().push(category.id);
        }
    }
    let mut subtree = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if subtree.insert(id) {
            if let Some(kids) = children.get(&id) {
                stack.extend(kids.iter().copied());
            }
        }
    }
    subtree
}
