//! Collaborator interfaces the harness drives: the backend error taxonomy,
//! the injectable fault classifier, and the session pool surface.
//!
//! The harness never reaches into pool internals; everything it needs is
//! expressed here and implemented by the simulated backend in [`sim`].

use std::sync::Arc;

pub mod sim;

/// Classified backend fault.
///
/// The split between transient and fatal variants is what the whole retry
/// design hinges on: transient faults are expected to resolve when the same
/// operation is retried later, fatal ones never will.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Backend gave up on the call while contending for resources.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Backend is throttling; capacity is expected to return.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Transaction lost a contention race and was rolled back.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// Uniqueness violation; retrying the same row can never succeed.
    #[error("row already exists: {0}")]
    AlreadyExists(String),

    /// Malformed request; a programming error on the caller side.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DeadlineExceeded(_) | Self::ResourceExhausted(_) | Self::Aborted(_)
        )
    }
}

/// Injectable predicate deciding which faults are worth retrying.
///
/// A single classifier is threaded through the harness rather than hard-coding
/// the decision per call site, so a backend collaborator can supply its own.
pub type FaultClassifier = Arc<dyn Fn(&BackendError) -> bool + Send + Sync>;

/// The default classifier: retry exactly the transient taxonomy.
pub fn transient_fault_classifier() -> FaultClassifier {
    Arc::new(BackendError::is_transient)
}

/// Point-in-time pool occupancy, as reported by the collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions currently handed out to callers.
    pub active: usize,
    /// Warm sessions parked in the pool.
    pub pooled: usize,
}

/// Sizing options settable on the pool before a run.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    pub max_active: usize,
    pub max_pooled: usize,
    /// Connection fanout the pool may use towards the backend.
    pub max_fanout: usize,
}

/// The pool surface the harness needs: open sessions, drain everything under a
/// caller-enforced deadline, report occupancy, and accept sizing limits.
///
/// Sessions release themselves back into the pool when dropped; there is no
/// explicit release call to forget on an error path.
pub trait SessionPool: Clone + Send + Sync + 'static {
    type Session: Send + 'static;

    fn open(&self) -> impl Future<Output = Result<Self::Session, BackendError>> + Send;

    /// Drains the pool to its empty terminal state, waiting for active
    /// sessions to come back first. Idempotent.
    fn release_all(&self) -> impl Future<Output = ()> + Send;

    fn stats(&self) -> PoolStats;

    fn apply_limits(&self, limits: PoolLimits);
}
