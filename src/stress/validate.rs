use std::{ops::RangeInclusive, time::Duration};

use crate::backend::{PoolLimits, PoolStats};

use super::driver::StressOutcome;

/// Pass criteria for a finished run.
#[derive(Debug, Clone)]
pub struct Acceptance {
    /// Range the mean per-work-unit latency must fall into.
    pub latency: RangeInclusive<Duration>,
}

/// A failed acceptance check. Reported, never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("run produced no latency samples")]
    NoSamples,

    #[error("{active} sessions still active after the run; expected all released")]
    LeakedSessions { active: usize },

    #[error("pooled sessions {pooled} exceed the configured limit {limit}")]
    PooledOverLimit { pooled: usize, limit: usize },

    #[error("mean latency {mean:?} outside accepted range {lo:?}..={hi:?}")]
    LatencyOutOfRange {
        mean: Duration,
        lo: Duration,
        hi: Duration,
    },
}

/// Checks the pool for internal consistency and the latency aggregate against
/// the scenario's accepted range.
pub fn validate_run(
    outcome: &StressOutcome,
    stats: PoolStats,
    limits: PoolLimits,
    acceptance: &Acceptance,
) -> Result<(), ValidationError> {
    if outcome.samples.is_empty() {
        return Err(ValidationError::NoSamples);
    }
    if stats.active > 0 {
        return Err(ValidationError::LeakedSessions {
            active: stats.active,
        });
    }
    if stats.pooled > limits.max_pooled {
        return Err(ValidationError::PooledOverLimit {
            pooled: stats.pooled,
            limit: limits.max_pooled,
        });
    }

    let mean = outcome.mean();
    if !acceptance.latency.contains(&mean) {
        return Err(ValidationError::LatencyOutOfRange {
            mean,
            lo: *acceptance.latency.start(),
            hi: *acceptance.latency.end(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(ms: &[u64]) -> StressOutcome {
        StressOutcome {
            samples: ms.iter().copied().map(Duration::from_millis).collect(),
        }
    }

    fn limits() -> PoolLimits {
        PoolLimits {
            max_active: 400,
            max_pooled: 400,
            max_fanout: 4,
        }
    }

    fn acceptance(hi_ms: u64) -> Acceptance {
        Acceptance {
            latency: Duration::ZERO..=Duration::from_millis(hi_ms),
        }
    }

    #[test]
    fn healthy_run_passes() {
        let result = validate_run(
            &outcome(&[70, 75, 80]),
            PoolStats {
                active: 0,
                pooled: 25,
            },
            limits(),
            &acceptance(150),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn leaked_sessions_fail() {
        let err = validate_run(
            &outcome(&[75]),
            PoolStats {
                active: 2,
                pooled: 25,
            },
            limits(),
            &acceptance(150),
        )
        .expect_err("leak must fail");
        assert!(matches!(err, ValidationError::LeakedSessions { active: 2 }));
    }

    #[test]
    fn pool_over_limit_fails() {
        let err = validate_run(
            &outcome(&[75]),
            PoolStats {
                active: 0,
                pooled: 500,
            },
            limits(),
            &acceptance(150),
        )
        .expect_err("overfull pool must fail");
        assert!(matches!(err, ValidationError::PooledOverLimit { .. }));
    }

    #[test]
    fn slow_mean_fails_with_the_measured_value() {
        let err = validate_run(
            &outcome(&[200, 200]),
            PoolStats::default(),
            limits(),
            &acceptance(150),
        )
        .expect_err("latency out of range");
        match err {
            ValidationError::LatencyOutOfRange { mean, .. } => {
                assert_eq!(mean, Duration::from_millis(200));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_run_fails() {
        let err = validate_run(
            &outcome(&[]),
            PoolStats::default(),
            limits(),
            &acceptance(150),
        )
        .expect_err("no samples");
        assert!(matches!(err, ValidationError::NoSamples));
    }
}
