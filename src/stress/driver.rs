use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{Semaphore, mpsc},
    time::{Instant, timeout},
};
use tracing::{debug, error, info};

use crate::{
    backend::{BackendError, SessionPool},
    config::{PoolSizing, StressConfig},
    stress::{HarnessError, pacer::QpsPacer, warmup},
    utils::telemetry::TelemetryHandle,
};

/// Latency samples of one measured run, one per completed work unit.
#[derive(Debug)]
pub struct StressOutcome {
    pub samples: Vec<Duration>,
}

impl StressOutcome {
    pub fn mean(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    pub fn min(&self) -> Duration {
        self.samples.iter().min().copied().unwrap_or_default()
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or_default()
    }

    pub fn p95(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let rank = ((sorted.len() as f64 * 0.95).ceil() as usize).max(1) - 1;
        sorted[rank.min(sorted.len() - 1)]
    }
}

/// Runs `work` once per scheduled tick at `cfg.target_qps` for `cfg.duration`.
///
/// Order of operations, each strictly before the next:
/// 1. Drain the pool under the reset deadline, so measurement starts from a
///    known pool state uncontaminated by a prior run. A missed deadline is
///    fatal and aborts the run.
/// 2. Warm the pool back up per `sizing`, so pool growth is paid here and not
///    attributed to the operation under test.
/// 3. Quiet the log stream, pace out the ticks, and collect samples. Ticks
///    are dispatched as independent tasks and are expected to overlap; that
///    is how sustained throughput is reached when per-call latency exceeds
///    the inter-tick interval. Log verbosity is restored when the run ends,
///    on every exit path.
///
/// Per-tick elapsed time is read from a monotonic clock at dispatch and
/// completion and funneled through a channel; nothing is dropped or counted
/// twice. A fatal work error stops dispatch at the next tick; the error
/// surfaces once the already-started ticks settle.
pub async fn run_stress<P, F, Fut>(
    pool: &P,
    telemetry: &TelemetryHandle,
    cfg: &StressConfig,
    sizing: Option<&PoolSizing>,
    work: F,
) -> Result<StressOutcome, HarnessError>
where
    P: SessionPool,
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BackendError>> + Send + 'static,
{
    timeout(cfg.reset_deadline, pool.release_all())
        .await
        .map_err(|_| HarnessError::PoolResetTimeout(cfg.reset_deadline))?;
    debug!("pool drained to its empty terminal state");

    if let Some(sizing) = sizing {
        warmup::warm_pool(pool, sizing).await?;
    }

    let total_ticks = (cfg.duration.as_secs_f64() * cfg.target_qps as f64).round() as u64;
    info!(
        total_ticks,
        qps = cfg.target_qps,
        duration_secs = cfg.duration.as_secs_f64(),
        "starting measured stress run",
    );

    let _quiet = telemetry.quiesce();

    let work = Arc::new(work);
    let gate = Arc::new(Semaphore::new(cfg.concurrency));
    let fatal_seen = Arc::new(AtomicBool::new(false));
    let (sample_tx, mut sample_rx) = mpsc::channel(cfg.concurrency.max(1) * 8);

    let mut pacer = QpsPacer::new(cfg.target_qps, cfg.jitter);
    for tick in 0..total_ticks {
        if fatal_seen.load(Ordering::Acquire) {
            debug!(tick, "stopping dispatch after a fatal work error");
            break;
        }
        pacer.wait_next().await;

        let work = work.clone();
        let gate = gate.clone();
        let fatal_seen = fatal_seen.clone();
        let sample_tx = sample_tx.clone();
        tokio::spawn(async move {
            let _permit = gate
                .acquire_owned()
                .await
                .expect("stress gate semaphore closed");

            let dispatched = Instant::now();
            let result = work(tick).await;
            let elapsed = dispatched.elapsed();

            if result.is_err() {
                fatal_seen.store(true, Ordering::Release);
            }
            if sample_tx.send((tick, elapsed, result)).await.is_err() {
                debug!(tick, "sample receiver dropped before completion");
            }
        });
    }
    drop(sample_tx);

    let mut samples = Vec::with_capacity(total_ticks as usize);
    let mut first_fatal: Option<BackendError> = None;
    while let Some((tick, elapsed, result)) = sample_rx.recv().await {
        match result {
            Ok(()) => samples.push(elapsed),
            Err(err) => {
                error!(tick, %err, "work unit failed fatally");
                first_fatal.get_or_insert(err);
            }
        }
    }

    if let Some(err) = first_fatal {
        return Err(HarnessError::Backend(err));
    }
    Ok(StressOutcome { samples })
}
