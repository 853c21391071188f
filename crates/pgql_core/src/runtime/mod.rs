use std::fmt;
use std::sync::Arc;

use pgql_error::{Result, ResultExt};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Fixed-size pool of grouping workers.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn try_new(num_threads: usize) -> Result<Self> {
        let thread_pool = ThreadPoolBuilder::new()
            .thread_name(|idx| format!("pgql-group-{idx}"))
            .num_threads(num_threads)
            .build()
            .context_fn(|| format!("Failed to build thread pool with {num_threads} threads"))?;

        Ok(WorkerPool {
            pool: Arc::new(thread_pool),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` inside the pool, blocking until it completes.
    ///
    /// `rayon::join` and `rayon::scope` called from `op` fork onto this pool's
    /// workers.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}
