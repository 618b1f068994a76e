//! In-process simulated backend.
//!
//! Implements the collaborator interfaces with deterministic service times and
//! optional transient-fault injection, so the stress scenarios run end-to-end
//! without a network. Rows live in a single uniqueness-constrained keyspace;
//! duplicate IDs fail the same way a real keyed table would.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};
use tokio::{sync::Notify, time::sleep};

use super::{BackendError, PoolLimits, PoolStats, SessionPool};

/// Behavior knobs for the simulated backend.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Fixed service time for establishing a new session, executing a
    /// statement, and committing a transaction.
    pub base_latency: Duration,

    /// Probability that an execute or commit fails with an injected transient
    /// fault. Session opens are never injected, so warm-up stays deterministic.
    pub transient_ratio: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            base_latency: Duration::from_millis(75),
            transient_ratio: 0.0,
        }
    }
}

#[derive(Clone)]
pub struct SimBackend {
    shared: Arc<SimShared>,
}

struct SimShared {
    cfg: SimConfig,
    rows: Mutex<HashSet<String>>,
    limits: Mutex<PoolLimits>,
    active: AtomicUsize,
    pooled: AtomicUsize,
    returned: Notify,
    rng: Mutex<SmallRng>,
}

impl SimBackend {
    pub fn new(cfg: SimConfig) -> Self {
        Self::new_with_rng(cfg, SmallRng::from_os_rng())
    }

    /// Deterministic fault injection for tests.
    pub fn with_seed(cfg: SimConfig, seed: u64) -> Self {
        Self::new_with_rng(cfg, SmallRng::seed_from_u64(seed))
    }

    fn new_with_rng(cfg: SimConfig, rng: SmallRng) -> Self {
        Self {
            shared: Arc::new(SimShared {
                cfg,
                rows: Mutex::new(HashSet::new()),
                limits: Mutex::new(PoolLimits {
                    max_active: 400,
                    max_pooled: 400,
                    max_fanout: 4,
                }),
                active: AtomicUsize::new(0),
                pooled: AtomicUsize::new(0),
                returned: Notify::new(),
                rng: Mutex::new(rng),
            }),
        }
    }

    /// Number of committed rows.
    pub fn row_count(&self) -> usize {
        self.shared.rows.lock().len()
    }

    pub fn contains_row(&self, id: &str) -> bool {
        self.shared.rows.lock().contains(id)
    }
}

impl SimShared {
    fn maybe_fault(&self, op: &str) -> Result<(), BackendError> {
        if self.cfg.transient_ratio <= 0.0 {
            return Ok(());
        }
        let mut rng = self.rng.lock();
        if rng.random::<f64>() >= self.cfg.transient_ratio {
            return Ok(());
        }
        // Rotate through the transient kinds so retry paths see all of them.
        Err(match rng.random_range(0..3u8) {
            0 => BackendError::DeadlineExceeded(format!("{op}: simulated deadline")),
            1 => BackendError::ResourceExhausted(format!("{op}: simulated throttle")),
            _ => BackendError::Aborted(format!("{op}: simulated contention")),
        })
    }
}

impl SessionPool for SimBackend {
    type Session = SimSession;

    async fn open(&self) -> Result<SimSession, BackendError> {
        let s = &self.shared;

        // Pool hit: hand out a warm session without paying establishment cost.
        loop {
            let pooled = s.pooled.load(Ordering::Acquire);
            if pooled == 0 {
                break;
            }
            if s.pooled
                .compare_exchange(pooled, pooled - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                s.active.fetch_add(1, Ordering::AcqRel);
                return Ok(SimSession {
                    shared: s.clone(),
                });
            }
        }

        // Cold path: establish a new session, bounded by the active limit.
        let max_active = s.limits.lock().max_active;
        if s.active.load(Ordering::Acquire) >= max_active {
            return Err(BackendError::ResourceExhausted(format!(
                "session limit {max_active} reached"
            )));
        }
        sleep(s.cfg.base_latency).await;
        // The slot is claimed only after the last await, so an open future
        // dropped mid-establishment cannot strand the active count.
        let prev = s.active.fetch_add(1, Ordering::AcqRel);
        if prev >= max_active {
            s.active.fetch_sub(1, Ordering::AcqRel);
            s.returned.notify_waiters();
            return Err(BackendError::ResourceExhausted(format!(
                "session limit {max_active} reached"
            )));
        }
        Ok(SimSession {
            shared: s.clone(),
        })
    }

    async fn release_all(&self) {
        let s = &self.shared;
        s.pooled.store(0, Ordering::Release);
        loop {
            let notified = s.returned.notified();
            if s.active.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }
        // Sessions drop into the idle set before giving up their active slot,
        // so once active hits zero every return is visible; sweep them out.
        s.pooled.store(0, Ordering::Release);
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.shared.active.load(Ordering::Acquire),
            pooled: self.shared.pooled.load(Ordering::Acquire),
        }
    }

    fn apply_limits(&self, limits: PoolLimits) {
        *self.shared.limits.lock() = limits;
    }
}

/// One backend session, checked out of the pool.
///
/// Dropping the session returns it to the pool; this is the release guarantee
/// on every exit path, including failures mid-transaction.
pub struct SimSession {
    shared: Arc<SimShared>,
}

impl std::fmt::Debug for SimSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimSession").finish_non_exhaustive()
    }
}

impl SimSession {
    pub fn begin(&self) -> SimTransaction {
        SimTransaction {
            shared: self.shared.clone(),
            staged: Mutex::new(Vec::new()),
        }
    }

    pub fn insert_command(&self, table: &str) -> InsertCommand {
        InsertCommand {
            shared: self.shared.clone(),
            table: table.to_owned(),
            params: Mutex::new(InsertParams::default()),
        }
    }
}

impl Drop for SimSession {
    fn drop(&mut self) {
        let s = &self.shared;
        // Return to the idle set first: a drainer that observes the active
        // decrement must also observe this return.
        let max_pooled = s.limits.lock().max_pooled;
        if s.pooled.load(Ordering::Acquire) < max_pooled {
            s.pooled.fetch_add(1, Ordering::AcqRel);
        }
        s.active.fetch_sub(1, Ordering::AcqRel);
        s.returned.notify_waiters();
    }
}

/// Read-your-writes transaction staging inserted row IDs until commit.
pub struct SimTransaction {
    shared: Arc<SimShared>,
    staged: Mutex<Vec<String>>,
}

impl SimTransaction {
    /// Publishes the staged rows atomically.
    ///
    /// A conflict with rows committed since staging surfaces as an abort,
    /// which is safe to retry with a fresh transaction.
    pub async fn commit(self) -> Result<(), BackendError> {
        sleep(self.shared.cfg.base_latency).await;
        self.shared.maybe_fault("commit")?;

        let staged = self.staged.into_inner();
        let mut rows = self.shared.rows.lock();
        for id in &staged {
            if rows.contains(id) {
                return Err(BackendError::Aborted(format!(
                    "commit conflict on id '{id}'"
                )));
            }
        }
        rows.extend(staged);
        Ok(())
    }
}

/// Parameterized insert command.
///
/// The parameter object has interior mutability on purpose: reusing one
/// command across concurrent tasks within a transaction is allowed by the
/// interface, and writing its parameters from more than one task at a time is
/// the correctness hazard the parallel-transaction scenario exists to surface.
pub struct InsertCommand {
    shared: Arc<SimShared>,
    table: String,
    params: Mutex<InsertParams>,
}

#[derive(Default)]
struct InsertParams {
    id: Option<String>,
}

impl InsertCommand {
    pub fn set_id(&self, id: impl Into<String>) {
        self.params.lock().id = Some(id.into());
    }

    /// Executes with whatever the shared parameter object currently holds.
    pub async fn execute(&self, txn: Option<&SimTransaction>) -> Result<u64, BackendError> {
        let id = self.params.lock().id.clone().ok_or_else(|| {
            BackendError::InvalidRequest("insert id parameter not set".into())
        })?;
        self.execute_id(id, txn).await
    }

    /// Binds the id and executes in one step: the per-task isolation
    /// discipline for commands shared inside a transaction.
    pub async fn bind_and_execute(
        &self,
        id: impl Into<String>,
        txn: Option<&SimTransaction>,
    ) -> Result<u64, BackendError> {
        let id = id.into();
        self.set_id(id.clone());
        self.execute_id(id, txn).await
    }

    async fn execute_id(
        &self,
        id: String,
        txn: Option<&SimTransaction>,
    ) -> Result<u64, BackendError> {
        sleep(self.shared.cfg.base_latency).await;
        self.shared.maybe_fault("execute")?;

        match txn {
            Some(txn) => {
                let rows = self.shared.rows.lock();
                let mut staged = txn.staged.lock();
                if rows.contains(&id) || staged.contains(&id) {
                    return Err(BackendError::AlreadyExists(format!(
                        "{}: id '{id}'",
                        self.table
                    )));
                }
                staged.push(id);
            }
            // Ephemeral write: no transaction boundary, committed immediately.
            None => {
                let mut rows = self.shared.rows.lock();
                if !rows.insert(id.clone()) {
                    return Err(BackendError::AlreadyExists(format!(
                        "{}: id '{id}'",
                        self.table
                    )));
                }
            }
        }
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    fn quick_backend() -> SimBackend {
        SimBackend::with_seed(
            SimConfig {
                base_latency: Duration::from_millis(5),
                transient_ratio: 0.0,
            },
            7,
        )
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn ephemeral_insert_commits_immediately() {
        let backend = quick_backend();
        let session = backend.open().await.expect("open");
        let cmd = session.insert_command("rows");

        let affected = cmd.bind_and_execute("a", None).await.expect("insert");
        assert_eq!(affected, 1);
        assert!(backend.contains_row("a"));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn duplicate_id_is_a_fatal_fault() {
        let backend = quick_backend();
        let session = backend.open().await.expect("open");
        let cmd = session.insert_command("rows");

        cmd.bind_and_execute("a", None).await.expect("first insert");
        let err = cmd
            .bind_and_execute("a", None)
            .await
            .expect_err("second insert must fail");
        assert!(matches!(err, BackendError::AlreadyExists(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn transaction_rows_are_invisible_until_commit() {
        let backend = quick_backend();
        let session = backend.open().await.expect("open");
        let txn = session.begin();
        let cmd = session.insert_command("rows");

        cmd.bind_and_execute("a", Some(&txn)).await.expect("stage");
        assert!(!backend.contains_row("a"));

        txn.commit().await.expect("commit");
        assert!(backend.contains_row("a"));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn commit_conflict_aborts_as_transient() {
        let backend = quick_backend();
        let session = backend.open().await.expect("open");

        let txn = session.begin();
        let cmd = session.insert_command("rows");
        cmd.bind_and_execute("a", Some(&txn)).await.expect("stage");

        // Another writer commits the same id first.
        let other = session.insert_command("rows");
        other.bind_and_execute("a", None).await.expect("insert");

        let err = txn.commit().await.expect_err("conflicting commit");
        assert!(matches!(err, BackendError::Aborted(_)));
        assert!(err.is_transient());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn sessions_return_to_the_pool_on_drop() {
        let backend = quick_backend();

        let session = backend.open().await.expect("open");
        assert_eq!(backend.stats(), PoolStats { active: 1, pooled: 0 });

        drop(session);
        assert_eq!(backend.stats(), PoolStats { active: 0, pooled: 1 });

        // Re-opening takes the warm session instead of creating a new one.
        let before = time::Instant::now();
        let _session = backend.open().await.expect("reopen");
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(backend.stats(), PoolStats { active: 1, pooled: 0 });
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn open_respects_the_active_limit() {
        let backend = quick_backend();
        backend.apply_limits(PoolLimits {
            max_active: 1,
            max_pooled: 1,
            max_fanout: 4,
        });

        let _held = backend.open().await.expect("first open");
        let err = backend.open().await.expect_err("over limit");
        assert!(matches!(err, BackendError::ResourceExhausted(_)));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn aborted_open_does_not_strand_the_active_count() {
        let backend = quick_backend();

        let opening = tokio::spawn({
            let backend = backend.clone();
            async move { backend.open().await }
        });

        // Let the open reach the establishment sleep, then cancel it there.
        tokio::task::yield_now().await;
        opening.abort();
        let _ = opening.await;

        assert_eq!(backend.stats(), PoolStats { active: 0, pooled: 0 });
        backend.release_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn release_all_sweeps_returns_racing_the_drain() {
        let backend = SimBackend::with_seed(
            SimConfig {
                base_latency: Duration::from_millis(1),
                transient_ratio: 0.0,
            },
            11,
        );
        backend.apply_limits(PoolLimits {
            max_active: 64,
            max_pooled: 64,
            max_fanout: 4,
        });

        let mut opens = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let backend = backend.clone();
            opens.spawn(async move { backend.open().await });
        }
        let mut sessions = Vec::new();
        while let Some(joined) = opens.join_next().await {
            sessions.push(joined.expect("open task join").expect("open"));
        }

        // Drop every session from its own task while the drain is running.
        let drain = tokio::spawn({
            let backend = backend.clone();
            async move { backend.release_all().await }
        });
        let mut droppers = tokio::task::JoinSet::new();
        for session in sessions {
            droppers.spawn(async move { drop(session) });
        }
        while droppers.join_next().await.is_some() {}
        drain.await.expect("drain join");

        assert_eq!(backend.stats(), PoolStats { active: 0, pooled: 0 });
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn release_all_is_idempotent() {
        let backend = quick_backend();
        for _ in 0..3 {
            let s = backend.open().await.expect("open");
            drop(s);
        }
        assert!(backend.stats().pooled > 0);

        backend.release_all().await;
        let first = backend.stats();
        backend.release_all().await;
        let second = backend.stats();

        assert_eq!(first, PoolStats { active: 0, pooled: 0 });
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn release_all_waits_for_active_sessions() {
        let backend = quick_backend();
        let session = backend.open().await.expect("open");

        let drain = tokio::spawn({
            let backend = backend.clone();
            async move { backend.release_all().await }
        });

        tokio::task::yield_now().await;
        assert!(!drain.is_finished());

        drop(session);
        drain.await.expect("drain join");
        assert_eq!(backend.stats(), PoolStats { active: 0, pooled: 0 });
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn injected_faults_are_transient() {
        let backend = SimBackend::with_seed(
            SimConfig {
                base_latency: Duration::from_millis(1),
                transient_ratio: 1.0,
            },
            42,
        );
        let session = backend.open().await.expect("open is never injected");
        let cmd = session.insert_command("rows");

        let err = cmd.bind_and_execute("a", None).await.expect_err("injected");
        assert!(err.is_transient(), "injected fault must be transient: {err}");
        assert!(!backend.contains_row("a"), "failed attempt must not persist");
    }
}
