use std::{num::NonZeroU32, time::Duration};

use rand::{Rng, SeedableRng as _, rngs::SmallRng};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backend::{BackendError, FaultClassifier};

/// Backoff policy for transient faults.
///
/// The delay doubles per consecutive failure, plus a random jitter in
/// `[0, jitter]`, clamped to `cap`. The delay starts at zero, so the first
/// retry waits only the jitter; the jitter spreads concurrent callers apart
/// so they do not retry in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub cap: Duration,
    pub jitter: Duration,

    /// Optional attempt budget. `None` retries until the fault clears,
    /// bounded only by the backoff cap slowing attempts down; callers must
    /// then only pass actions that are safe to retry indefinitely.
    pub max_attempts: Option<NonZeroU32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cap: Duration::from_millis(5000),
            jitter: Duration::from_millis(100),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    fn next_delay(&self, prev: Duration, rng: &mut impl Rng) -> Duration {
        let jitter = Duration::from_millis(rng.random_range(0..=self.jitter.as_millis() as u64));
        (prev * 2 + jitter).min(self.cap)
    }
}

/// Retries an asynchronous action on transient faults.
///
/// The classifier and policy are injected, so retry behavior swaps without
/// touching the workload driver. Actions must be safe to reissue from the
/// caller's perspective: either ephemeral single statements, or actions that
/// open their own fresh transaction per attempt.
pub struct RetryExecutor {
    classifier: FaultClassifier,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(classifier: FaultClassifier, policy: RetryPolicy) -> Self {
        Self { classifier, policy }
    }

    /// Invokes `action` until it succeeds or fails with a fault the
    /// classifier refuses to retry.
    pub async fn run<T, F, Fut>(&self, mut action: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        // The delay is owned by this invocation alone; concurrent retry
        // loops each carry their own.
        let mut delay = Duration::ZERO;
        let mut rng = SmallRng::from_os_rng();
        let mut attempt = 1u32;

        loop {
            match action().await {
                Ok(value) => return Ok(value),
                Err(err) if (self.classifier)(&err) => {
                    if let Some(budget) = self.policy.max_attempts
                        && attempt >= budget.get()
                    {
                        warn!(%err, attempt, "retry budget exhausted");
                        return Err(err);
                    }

                    delay = self.policy.next_delay(delay, &mut rng);
                    debug!(
                        %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient backend fault, backing off before retry",
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
