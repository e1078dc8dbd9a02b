//! Bounded worker pool for hashing.
//!
//! Hashing is the only phase of a build that runs in parallel. Each job reads
//! one file and returns a value; jobs never touch shared state, and results
//! come back in the order the jobs were given so the caller can merge them
//! deterministically.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Thread pool that hashing jobs are scheduled on.
///
/// Cloning is cheap and shares the underlying pool. By default the global
/// rayon pool is used.
#[derive(Clone, Default)]
pub struct HashPool {
    inner: Option<Arc<rayon::ThreadPool>>,
}
impl HashPool {
    #[must_use]
    pub fn global() -> Self {
        Self { inner: None }
    }

    /// A dedicated pool with `n` threads; `0` means the global pool.
    pub fn with_num_threads(n: usize) -> Result<Self> {
        if n == 0 {
            return Ok(Self::global());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("databuild-hash-{i}"))
            .build()
            .or_raise(|| ErrorKind::ThreadPool)?;
        Ok(Self { inner: Some(Arc::new(pool)) })
    }

    pub fn num_threads(&self) -> usize {
        match self.inner {
            Some(ref pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `f` over every item on the pool, returning results in input order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        let run = || -> Vec<R> { items.par_iter().map(&f).collect() };
        match self.inner {
            Some(ref pool) => pool.install(run),
            None => run(),
        }
    }
}

impl fmt::Debug for HashPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashPool")
            .field("kind", &if self.inner.is_some() { "custom" } else { "global" })
            .field("num_threads", &self.num_threads())
            .finish()
    }
}
