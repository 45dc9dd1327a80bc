//! Anomaly scoring against spending baselines.
//!
//! Two rules: a closed period's rolled-up total deviating from the
//! category's period baseline, and a single transaction exceeding the
//! category's typical transaction size. Flags are additive per
//! (subject, rule); deduplication is a presentation concern.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use finsight_config::EngineConfig;
use finsight_domain::{AnomalyFlag, AnomalySubject, Period, Severity, Transaction};

use crate::baseline::BaselineStat;

#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    sigma: f64,
    min_samples: u64,
    absolute_delta_minor: i64,
}

impl AnomalyDetector {
    pub fn new(sigma: f64, min_samples: u64, absolute_delta_minor: i64) -> Self {
        Self {
            sigma,
            min_samples,
            absolute_delta_minor,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.anomaly_sigma,
            config.baseline_min_samples,
            config.anomaly_absolute_delta_minor,
        )
    }

    /// Scores a newly closed period's total against the baseline that was
    /// accumulated before the period folded in. Immature baselines emit
    /// nothing; the observation is still recorded by the folding path.
    pub fn score_period_total(
        &self,
        stat: &BaselineStat,
        category_id: Uuid,
        period: Period,
        total_minor: i64,
        observed_at: DateTime<Utc>,
    ) -> Option<AnomalyFlag> {
        if stat.count < self.min_samples {
            return None;
        }
        let subject = AnomalySubject::PeriodTotal {
            category_id,
            period,
        };
        let value = total_minor as f64;
        let stddev = stat.stddev();

        if stddev == 0.0 {
            let delta = value - stat.mean;
            if delta.abs() <= self.absolute_delta_minor as f64 {
                return None;
            }
            let score = delta / self.absolute_delta_minor as f64;
            return Some(AnomalyFlag {
                subject,
                score,
                reason: "period total deviates from a flat baseline".into(),
                severity: severity_for(score.abs()),
                observed_at,
            });
        }

        let z = (value - stat.mean) / stddev;
        if z.abs() <= self.sigma {
            return None;
        }
        Some(AnomalyFlag {
            subject,
            score: z,
            reason: "period total deviates from baseline".into(),
            severity: severity_for(z.abs()),
            observed_at,
        })
    }

    /// Scores one transaction against the category's typical transaction
    /// size. One-sided: only unusually large amounts flag.
    pub fn score_transaction(
        &self,
        stat: &BaselineStat,
        txn: &Transaction,
    ) -> Option<AnomalyFlag> {
        if stat.count < self.min_samples {
            return None;
        }
        let subject = AnomalySubject::Transaction {
            id: txn.id,
            category_id: txn.category_id,
        };
        let value = txn.amount_minor as f64;
        let stddev = stat.stddev();

        if stddev == 0.0 {
            let delta = value - stat.mean;
            if delta <= self.absolute_delta_minor as f64 {
                return None;
            }
            let score = delta / self.absolute_delta_minor as f64;
            return Some(AnomalyFlag {
                subject,
                score,
                reason: "transaction unusually large for a flat baseline".into(),
                severity: severity_for(score),
                observed_at: txn.timestamp,
            });
        }

        if value <= stat.mean + self.sigma * stddev {
            return None;
        }
        let z = (value - stat.mean) / stddev;
        Some(AnomalyFlag {
            subject,
            score: z,
            reason: "transaction unusually large for category".into(),
            severity: severity_for(z),
            observed_at: txn.timestamp,
        })
    }
}

fn severity_for(z_abs: f64) -> Severity {
    if z_abs > 6.0 {
        Severity::Critical
    } else if z_abs > 4.0 {
        Severity::High
    } else {
        Severity::Mild
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use finsight_domain::{Granularity, TransactionSource};

    fn observed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    }

    fn month(y: i32, m: u32) -> Period {
        Period::containing(
            chrono::NaiveDate::from_ymd_opt(y, m, 1).unwrap(),
            Granularity::Month,
        )
    }

    fn stat_of(values: &[f64]) -> BaselineStat {
        let mut stat = BaselineStat::default();
        for v in values {
            stat.observe(*v);
        }
        stat
    }

    #[test]
    fn groceries_sixth_month_is_critical() {
        // Five closed months of [300, 310, 295, 305, 298] (in minor units);
        // a sixth month at 340 deviates by well over six sigma.
        let detector = AnomalyDetector::new(3.0, 3, 10_000);
        let stat = stat_of(&[30_000.0, 31_000.0, 29_500.0, 30_500.0, 29_800.0]);
        let flag = detector
            .score_period_total(&stat, Uuid::new_v4(), month(2025, 6), 34_000, observed_at())
            .expect("expected a flag");
        assert!(flag.score > 6.0, "z was {}", flag.score);
        assert_eq!(flag.severity, Severity::Critical);
    }

    #[test]
    fn immature_baseline_emits_nothing_no_matter_how_extreme() {
        let detector = AnomalyDetector::new(3.0, 3, 10_000);
        let stat = stat_of(&[30_000.0, 31_000.0]);
        let flag = detector.score_period_total(
            &stat,
            Uuid::new_v4(),
            month(2025, 3),
            9_999_999,
            observed_at(),
        );
        assert!(flag.is_none());
    }

    #[test]
    fn zero_variance_uses_absolute_delta_fallback() {
        let detector = AnomalyDetector::new(3.0, 3, 5_000);
        let stat = stat_of(&[30_000.0, 30_000.0, 30_000.0]);
        assert_eq!(stat.stddev(), 0.0);

        let quiet = detector.score_period_total(
            &stat,
            Uuid::new_v4(),
            month(2025, 4),
            33_000,
            observed_at(),
        );
        assert!(quiet.is_none());

        let loud = detector
            .score_period_total(&stat, Uuid::new_v4(), month(2025, 4), 40_000, observed_at())
            .expect("expected fallback flag");
        assert_eq!(loud.severity, Severity::Mild);

        // The fallback severity scales with the delta ratio like z does:
        // (80000 - 30000) / 5000 = 10x the threshold.
        let extreme = detector
            .score_period_total(&stat, Uuid::new_v4(), month(2025, 5), 80_000, observed_at())
            .expect("expected fallback flag");
        assert_eq!(extreme.severity, Severity::Critical);
    }

    #[test]
    fn severity_tiers_scale_with_z() {
        assert_eq!(severity_for(3.5), Severity::Mild);
        assert_eq!(severity_for(5.0), Severity::High);
        assert_eq!(severity_for(6.9), Severity::Critical);
    }

    #[test]
    fn large_transaction_flags_one_sided() {
        let detector = AnomalyDetector::new(3.0, 3, 10_000);
        let stat = stat_of(&[2_000.0, 2_500.0, 1_800.0, 2_200.0]);
        let category = Uuid::new_v4();

        let huge = Transaction::new(
            observed_at(),
            30_000,
            category,
            "tv",
            TransactionSource::Manual,
        );
        let flag = detector
            .score_transaction(&stat, &huge)
            .expect("expected flag");
        assert!(flag.score > 3.0);

        // Small amounts never flag, no matter how far below the mean.
        let tiny = Transaction::new(observed_at(), 1, category, "", TransactionSource::Manual);
        assert!(detector.score_transaction(&stat, &tiny).is_none());
    }
}
