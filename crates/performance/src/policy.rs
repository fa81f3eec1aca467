//! Finish-time keep/drop policy.

use tracing::warn;

use crate::model::{Severity, Status, Transaction};

/// What the policy decided for a finished transaction, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    KeepFailed,
    KeepCritical,
    KeepSlow,
    KeepSampled,
    DropBelowThreshold,
    DropSampled,
}

impl Decision {
    pub fn keep(self) -> bool {
        matches!(
            self,
            Self::KeepFailed | Self::KeepCritical | Self::KeepSlow | Self::KeepSampled
        )
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepFailed => write!(f, "keep_failed"),
            Self::KeepCritical => write!(f, "keep_critical"),
            Self::KeepSlow => write!(f, "keep_slow"),
            Self::KeepSampled => write!(f, "keep_sampled"),
            Self::DropBelowThreshold => write!(f, "drop_below_threshold"),
            Self::DropSampled => write!(f, "drop_sampled"),
        }
    }
}

/// Decides whether a finished transaction is worth sending.
///
/// Rules, first match wins:
/// 1. failed or critical → keep
/// 2. at least `critical_duration_threshold_ms` long → keep
/// 3. shorter than `threshold_ms` → drop
/// 4. otherwise keep with probability `sample_rate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPolicy {
    sample_rate: f64,
    threshold_ms: u64,
    critical_duration_threshold_ms: u64,
}

impl SamplingPolicy {
    /// A sample rate outside `[0, 1]` is replaced by `1`.
    pub fn new(sample_rate: f64, threshold_ms: u64, critical_duration_threshold_ms: u64) -> Self {
        let sample_rate = if (0.0..=1.0).contains(&sample_rate) {
            sample_rate
        } else {
            warn!(sample_rate, "Invalid sample rate, using 1");
            1.0
        };

        Self {
            sample_rate,
            threshold_ms,
            critical_duration_threshold_ms,
        }
    }

    pub fn from_config(config: &vigil_config::PerformanceConfig) -> Self {
        Self::new(
            config.sample_rate,
            config.threshold_ms,
            config.critical_duration_threshold_ms,
        )
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn decide(&self, transaction: &Transaction) -> Decision {
        self.decide_with(transaction, rand::random::<f64>())
    }

    /// Decide using `draw`, a uniform sample from `[0, 1)`.
    pub fn decide_with(&self, transaction: &Transaction, draw: f64) -> Decision {
        if transaction.status == Some(Status::Failure) {
            return Decision::KeepFailed;
        }
        if transaction.severity == Severity::Critical {
            return Decision::KeepCritical;
        }

        let duration = transaction.duration_ms();
        if duration >= self.critical_duration_threshold_ms {
            return Decision::KeepSlow;
        }
        if duration < self.threshold_ms {
            return Decision::DropBelowThreshold;
        }

        if draw < self.sample_rate {
            Decision::KeepSampled
        } else {
            Decision::DropSampled
        }
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::from_config(&vigil_config::PerformanceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn finished(duration_ms: i64, severity: Severity, status: Status) -> Transaction {
        let t0 = Utc::now();
        let mut tx = Transaction::open("op", severity, t0);
        tx.finish(t0 + Duration::milliseconds(duration_ms), status);
        tx
    }

    #[test]
    fn failures_and_critical_always_kept() {
        let policy = SamplingPolicy::new(0.0, 20, 500);
        let fast_failure = finished(1, Severity::Default, Status::Failure);
        let fast_critical = finished(1, Severity::Critical, Status::Success);

        assert_eq!(policy.decide_with(&fast_failure, 0.99), Decision::KeepFailed);
        assert_eq!(policy.decide_with(&fast_critical, 0.99), Decision::KeepCritical);
    }

    #[test]
    fn slow_transactions_kept_at_zero_rate() {
        let policy = SamplingPolicy::new(0.0, 20, 500);
        let slow = finished(500, Severity::Default, Status::Success);
        assert_eq!(policy.decide_with(&slow, 0.5), Decision::KeepSlow);
    }

    #[test]
    fn below_threshold_dropped_even_at_full_rate() {
        let policy = SamplingPolicy::new(1.0, 20, 500);
        let fast = finished(19, Severity::Default, Status::Success);
        assert_eq!(policy.decide_with(&fast, 0.0), Decision::DropBelowThreshold);
        assert!(!policy.decide(&fast).keep());
    }

    #[test]
    fn mid_band_follows_sample_rate() {
        let mid = finished(100, Severity::Default, Status::Success);

        let all = SamplingPolicy::new(1.0, 20, 500);
        let none = SamplingPolicy::new(0.0, 20, 500);
        for _ in 0..100 {
            assert!(all.decide(&mid).keep());
            assert!(!none.decide(&mid).keep());
        }

        let half = SamplingPolicy::new(0.5, 20, 500);
        assert_eq!(half.decide_with(&mid, 0.49), Decision::KeepSampled);
        assert_eq!(half.decide_with(&mid, 0.5), Decision::DropSampled);
    }

    #[test]
    fn threshold_boundary_is_inclusive_of_sampling() {
        let policy = SamplingPolicy::new(1.0, 20, 500);
        let at_threshold = finished(20, Severity::Default, Status::Success);
        assert_eq!(policy.decide_with(&at_threshold, 0.3), Decision::KeepSampled);
    }

    #[test]
    fn invalid_rate_corrected_to_one() {
        assert_eq!(SamplingPolicy::new(1.5, 20, 500).sample_rate(), 1.0);
        assert_eq!(SamplingPolicy::new(-0.1, 20, 500).sample_rate(), 1.0);
        assert_eq!(SamplingPolicy::new(f64::NAN, 20, 500).sample_rate(), 1.0);
        assert_eq!(SamplingPolicy::new(0.25, 20, 500).sample_rate(), 0.25);
    }
}
