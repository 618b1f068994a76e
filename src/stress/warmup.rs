use std::time::Duration;

use tokio::{task::JoinSet, time::sleep};
use tracing::{debug, info};

use crate::{
    backend::{BackendError, SessionPool},
    config::PoolSizing,
};

/// Sessions opened in parallel per warm-up round.
const WARMUP_BATCH: usize = 25;

/// Pause between rounds, giving the backend room to settle.
const SETTLE_PAUSE: Duration = Duration::from_millis(250);

/// Pre-sizes the pool before the measured run.
///
/// Applies the sizing limits, opens `prewarm_count` sessions in bounded
/// parallel batches, and hands every one of them back so the pool starts the
/// run populated with warm, reusable sessions. Any failed open propagates:
/// measuring against a cold pool is worse than not measuring at all.
pub async fn warm_pool<P: SessionPool>(pool: &P, sizing: &PoolSizing) -> Result<(), BackendError> {
    pool.apply_limits(sizing.limits());
    info!(count = sizing.prewarm_count, "warming session pool");

    let mut opened = Vec::with_capacity(sizing.prewarm_count);
    while opened.len() < sizing.prewarm_count {
        let batch = WARMUP_BATCH.min(sizing.prewarm_count - opened.len());

        let mut opens = JoinSet::new();
        for _ in 0..batch {
            let pool = pool.clone();
            opens.spawn(async move { pool.open().await });
        }
        while let Some(joined) = opens.join_next().await {
            let session = joined.expect("warm-up open task panicked")?;
            opened.push(session);
        }

        debug!(opened = opened.len(), "warm-up batch complete, letting backend settle");
        sleep(SETTLE_PAUSE).await;
    }

    // Dropping the sessions releases them back into the pool, not discards.
    drop(opened);
    Ok(())
}
