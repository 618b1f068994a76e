//! The harness core: pacing, retry with backoff, unique IDs, pool warm-up,
//! the workload driver, and post-run validation.

use std::time::Duration;

use crate::backend::BackendError;

pub mod driver;
pub mod ident;
pub mod pacer;
pub mod retry;
pub mod validate;
pub mod warmup;

/// Errors that abort a stress run.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The pool did not drain within its shutdown deadline.
    /// Measurement never starts against an unknown pool state.
    #[error("pool reset did not complete within {0:?}")]
    PoolResetTimeout(Duration),

    /// A work unit failed with a non-retryable backend fault.
    #[error("backend fault: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Validation(#[from] self::validate::ValidationError),
}
