//! Compute pool for CPU-bound work (ring generation, column processing,
//! crater sub-regions), bridged to async callers through a oneshot.

use crate::error::{EngineError, Result};
use log::error;
use rayon::{ThreadPool, ThreadPoolBuilder};

pub struct ComputePool {
    pool: ThreadPool,
    threads: usize,
}

impl ComputePool {
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("shockwave-compute-{}", idx))
            // A panicking job drops its result sender; the awaiting side
            // reports it.  Without a handler rayon would abort the process.
            .panic_handler(|_| error!("Compute job panicked"))
            .build()
            .map_err(|e| EngineError::InvalidConfig(format!("compute pool: {}", e)))?;
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `job` on the pool and await its result without blocking the
    /// async runtime.
    pub async fn run<F, R>(&self, label: &'static str, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.pool.spawn(move || {
            let _ = tx.send(job());
        });
        rx.await.map_err(|_| EngineError::WorkerPanicked(label))
    }

    /// Run `job` inside the pool from synchronous code, so nested
    /// `par_iter` calls use these threads.
    pub fn install<F, R>(&self, job: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(job)
    }
}
