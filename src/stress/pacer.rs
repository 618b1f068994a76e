use std::time::Duration;

use rand::{Rng as _, SeedableRng as _};
use tokio::time::{Instant, sleep};

/// Absolute-schedule QPS pacer.
///
/// Tick `n` is due at `start + n / target_qps`, so the long term average holds
/// the configured rate exactly and cannot drift under scheduler delay.
/// When the pacer falls behind, due ticks fire immediately; the backlog is
/// clamped to `burst` ticks so a stall is not repaid as one giant spike.
///
/// Jitter is applied to the computed sleep duration only.
/// The schedule itself is not jittered, so the average rate is unaffected.
pub struct QpsPacer {
    period: Duration,
    burst: u32,
    next_due: Instant,
    jitter: f64,
    rng: rand::rngs::SmallRng,
}

impl QpsPacer {
    pub fn new(target_qps: u32, jitter: f64) -> Self {
        Self::new_with_rng(target_qps, jitter, rand::rngs::SmallRng::from_os_rng())
    }

    fn new_with_rng(target_qps: u32, jitter: f64, rng: rand::rngs::SmallRng) -> Self {
        const DEFAULT_BURST: u32 = 1;

        Self {
            period: Duration::from_secs(1) / target_qps.max(1),
            burst: DEFAULT_BURST,
            next_due: Instant::now(),
            jitter: jitter.clamp(0.0, 1.0),
            rng,
        }
    }

    /// Waits until the next scheduled tick is due and consumes it.
    pub async fn wait_next(&mut self) {
        let now = Instant::now();
        if self.next_due > now {
            let wait = self.jittered(self.next_due - now);
            if !wait.is_zero() {
                sleep(wait).await;
            }
        } else if let Some(floor) = now.checked_sub(self.period * self.burst) {
            // Behind schedule: fire immediately, dropping backlog beyond the
            // burst allowance.
            if self.next_due < floor {
                self.next_due = floor;
            }
        }
        self.next_due += self.period;
    }

    fn jittered(&mut self, d: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return d;
        }

        let lo = 1.0 - self.jitter;
        let hi = 1.0 + self.jitter;
        let m = self.rng.random_range(lo..=hi);

        Duration::from_secs_f64((d.as_secs_f64() * m).max(0.0))
    }
}
