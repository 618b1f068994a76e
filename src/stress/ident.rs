use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use rand::distr::{Alphanumeric, SampleString};

/// Collision-free row ID generator.
///
/// IDs are `prefix-counter`, where the prefix is an opaque token fixed at
/// construction and the counter is an atomic post-increment, so no two calls
/// anywhere in the process ever return the same string. Constructed explicitly
/// and handed to the harness rather than living as process-global state, so
/// parallel runs in one process do not interfere.
///
/// Cloning is cheap; clones share the counter.
#[derive(Clone)]
pub struct IdGenerator {
    inner: Arc<Inner>,
}

struct Inner {
    prefix: String,
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::with_prefix(Alphanumeric.sample_string(&mut rand::rng(), 8))
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                prefix: prefix.into(),
                counter: AtomicU64::new(0),
            }),
        }
    }

    /// Never fails and never repeats.
    pub fn next_id(&self) -> String {
        let n = self.inner.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n:08}", self.inner.prefix)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
