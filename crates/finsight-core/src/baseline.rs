//! Streaming spending baselines.
//!
//! One `BaselineStat` per (category, measure) key, updated incrementally
//! with Welford's online mean/variance. Only closed periods fold in; the
//! in-progress period never contaminates its own baseline. Folds for the
//! same key are serialized by a per-key mutex; different keys proceed
//! independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use finsight_domain::{Granularity, Period};

use crate::error::{EngineError, Result};

/// Welford running mean/variance state. Population variance (`m2 / count`)
/// is used for scoring.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BaselineStat {
    pub count: u64,
    pub mean: f64,
    m2: f64,
}

impl BaselineStat {
    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// What a baseline measures for a category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Measure {
    /// Rolled-up total of a closed period at some granularity.
    PeriodTotal(Granularity),
    /// Size of individual transactions.
    TransactionAmount,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BaselineKey {
    pub category_id: Uuid,
    pub measure: Measure,
}

impl BaselineKey {
    pub fn period_total(category_id: Uuid, granularity: Granularity) -> Self {
        Self {
            category_id,
            measure: Measure::PeriodTotal(granularity),
        }
    }

    pub fn transaction_amount(category_id: Uuid) -> Self {
        Self {
            category_id,
            measure: Measure::TransactionAmount,
        }
    }
}

#[derive(Debug, Default)]
struct BaselineState {
    stat: BaselineStat,
    /// Start of the newest folded period; folds at or before it are skipped,
    /// which makes replay-based rebuilds restartable.
    checkpoint: Option<NaiveDate>,
    /// Timestamp of the newest transaction already scored against this
    /// baseline. Scoring passes skip transactions at or before it so a
    /// flag is emitted once, even while the transaction's period is open.
    scored_through: Option<DateTime<Utc>>,
}

/// Holds every baseline the engine maintains. The registry map is behind an
/// `RwLock`; each state sits behind its own `Mutex` because the Welford
/// update is not commutative-safe under interleaving.
#[derive(Debug, Default)]
pub struct BaselineEngine {
    min_samples: u64,
    states: RwLock<HashMap<BaselineKey, Arc<Mutex<BaselineState>>>>,
}

impl BaselineEngine {
    pub fn new(min_samples: u64) -> Self {
        Self {
            min_samples,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn min_samples(&self) -> u64 {
        self.min_samples
    }

    /// A baseline is mature once it has folded the configured number of
    /// closed periods; the detector stays silent before that.
    pub fn is_mature(&self, stat: &BaselineStat) -> bool {
        stat.count >= self.min_samples
    }

    fn state(&self, key: BaselineKey) -> Arc<Mutex<BaselineState>> {
        if let Some(state) = self.states.read().expect("baseline registry poisoned").get(&key) {
            return Arc::clone(state);
        }
        let mut registry = self.states.write().expect("baseline registry poisoned");
        Arc::clone(registry.entry(key).or_default())
    }

    /// Folds a closed period's total into the category baseline. Folding a
    /// period that has not closed yet is rejected; re-folding a period at or
    /// before the checkpoint is a no-op returning the current stat.
    pub fn fold_period_total(
        &self,
        category_id: Uuid,
        granularity: Granularity,
        period: Period,
        total_minor: i64,
        now: DateTime<Utc>,
    ) -> Result<BaselineStat> {
        if !period.has_closed(now) {
            return Err(EngineError::InvalidInput(format!(
                "period {} has not closed yet",
                period.label()
            )));
        }
        let state = self.state(BaselineKey::period_total(category_id, granularity));
        let mut guard = state.lock().expect("baseline state poisoned");
        if guard.checkpoint.is_some_and(|cp| period.start <= cp) {
            return Ok(guard.stat);
        }
        guard.stat.observe(total_minor as f64);
        guard.checkpoint = Some(period.start);
        tracing::debug!(
            category = %category_id,
            period = %period.label(),
            count = guard.stat.count,
            "baseline folded period total"
        );
        Ok(guard.stat)
    }

    /// Folds the sizes of a closed period's transactions into the
    /// per-category transaction-size baseline, guarded by the same
    /// checkpoint discipline as period totals.
    pub fn fold_transaction_amounts(
        &self,
        category_id: Uuid,
        period: Period,
        amounts_minor: &[i64],
        now: DateTime<Utc>,
    ) -> Result<BaselineStat> {
        if !period.has_closed(now) {
            return Err(EngineError::InvalidInput(format!(
                "period {} has not closed yet",
                period.label()
            )));
        }
        let state = self.state(BaselineKey::transaction_amount(category_id));
        let mut guard = state.lock().expect("baseline state poisoned");
        if guard.checkpoint.is_some_and(|cp| period.start <= cp) {
            return Ok(guard.stat);
        }
        for amount in amounts_minor {
            guard.stat.observe(*amount as f64);
        }
        guard.checkpoint = Some(period.start);
        Ok(guard.stat)
    }

    pub fn snapshot(&self, key: BaselineKey) -> Option<BaselineStat> {
        let registry = self.states.read().expect("baseline registry poisoned");
        registry
            .get(&key)
            .map(|state| state.lock().expect("baseline state poisoned").stat)
    }

    /// Start of the newest folded period for the key, if any.
    pub fn checkpoint(&self, key: BaselineKey) -> Option<NaiveDate> {
        let registry = self.states.read().expect("baseline registry poisoned");
        registry
            .get(&key)
            .and_then(|state| state.lock().expect("baseline state poisoned").checkpoint)
    }

    /// Timestamp of the newest transaction already scored for the key.
    pub fn scored_through(&self, key: BaselineKey) -> Option<DateTime<Utc>> {
        let registry = self.states.read().expect("baseline registry poisoned");
        registry.get(&key).and_then(|state| {
            state.lock().expect("baseline state poisoned").scored_through
        })
    }

    /// Advances the scored-transaction watermark; it never moves backward.
    pub fn mark_scored(&self, key: BaselineKey, through: DateTime<Utc>) {
        let state = self.state(key);
        let mut guard = state.lock().expect("baseline state poisoned");
        if guard.scored_through.map_or(true, |ts| through > ts) {
            guard.scored_through = Some(through);
        }
    }

    /// Discards a baseline, restarting its cold-start phase.
    pub fn reset(&self, key: BaselineKey) {
        let mut registry = self.states.write().expect("baseline registry poisoned");
        if registry.remove(&key).is_some() {
            tracing::info!(category = %key.category_id, "baseline reset");
        }
    }

    /// Replays closed-period totals in chronological order. Because folds at
    /// or before the checkpoint are skipped, an interrupted rebuild can be
    /// rerun from the full history without double-counting.
    pub fn rebuild_period_totals(
        &self,
        category_id: Uuid,
        granularity: Granularity,
        closed_totals: &[(Period, i64)],
        now: DateTime<Utc>,
    ) -> Result<BaselineStat> {
        let mut stat = self
            .snapshot(BaselineKey::period_total(category_id, granularity))
            .unwrap_or_default();
        for (period, total) in closed_totals {
            stat = self.fold_period_total(category_id, granularity, *period, *total, now)?;
        }
        Ok(stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    }

    fn month(y: i32, m: u32) -> Period {
        Period::containing(NaiveDate::from_ymd_opt(y, m, 1).unwrap(), Granularity::Month)
    }

    #[test]
    fn welford_matches_two_pass_mean_and_variance() {
        let values = [300.0, 310.0, 295.0, 305.0, 298.0, 340.0, 12.5];
        let mut stat = BaselineStat::default();
        for v in values {
            stat.observe(v);
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        assert!((stat.mean - mean).abs() < 1e-9);
        assert!((stat.variance() - variance).abs() < 1e-9);
    }

    #[test]
    fn refolding_a_period_is_a_no_op() {
        let engine = BaselineEngine::new(3);
        let category = Uuid::new_v4();
        let january = month(2025, 1);

        engine
            .fold_period_total(category, Granularity::Month, january, 30_000, now())
            .unwrap();
        let stat = engine
            .fold_period_total(category, Granularity::Month, january, 30_000, now())
            .unwrap();
        assert_eq!(stat.count, 1);
    }

    #[test]
    fn open_period_is_rejected() {
        let engine = BaselineEngine::new(3);
        let category = Uuid::new_v4();
        let july = month(2025, 7);
        let err = engine
            .fold_period_total(category, Granularity::Month, july, 10_000, now())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn reset_restarts_cold_start() {
        let engine = BaselineEngine::new(3);
        let category = Uuid::new_v4();
        for m in 1..=4 {
            engine
                .fold_period_total(category, Granularity::Month, month(2025, m), 30_000, now())
                .unwrap();
        }
        let key = BaselineKey::period_total(category, Granularity::Month);
        let stat = engine.snapshot(key).unwrap();
        assert!(engine.is_mature(&stat));

        engine.reset(key);
        assert!(engine.snapshot(key).is_none());
    }

    #[test]
    fn interrupted_rebuild_resumes_without_double_counting() {
        let engine = BaselineEngine::new(3);
        let category = Uuid::new_v4();
        let history: Vec<(Period, i64)> = (1..=5)
            .map(|m| (month(2025, m), 30_000 + m as i64 * 100))
            .collect();

        // First pass stops after two periods.
        engine
            .rebuild_period_totals(category, Granularity::Month, &history[..2], now())
            .unwrap();
        // Resume over the full history.
        let resumed = engine
            .rebuild_period_totals(category, Granularity::Month, &history, now())
            .unwrap();

        let mut expected = BaselineStat::default();
        for (_, total) in &history {
            expected.observe(*total as f64);
        }
        assert_eq!(resumed.count, 5);
        assert!((resumed.mean - expected.mean).abs() < 1e-9);
        assert!((resumed.variance() - expected.variance()).abs() < 1e-9);
    }

    #[test]
    fn scored_watermark_only_advances() {
        let engine = BaselineEngine::new(3);
        let key = BaselineKey::transaction_amount(Uuid::new_v4());
        assert!(engine.scored_through(key).is_none());

        engine.mark_scored(key, now());
        engine.mark_scored(key, now() - chrono::Duration::days(1));
        assert_eq!(engine.scored_through(key), Some(now()));
    }

    #[test]
    fn keys_are_independent() {
        let engine = BaselineEngine::new(3);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        engine
            .fold_period_total(a, Granularity::Month, month(2025, 1), 10_000, now())
            .unwrap();
        engine
            .fold_period_total(b, Granularity::Month, month(2025, 1), 99_000, now())
            .unwrap();

        let stat_a = engine
            .snapshot(BaselineKey::period_total(a, Granularity::Month))
            .unwrap();
        assert_eq!(stat_a.mean, 10_000.0);
    }
}
