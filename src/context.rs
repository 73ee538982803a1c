//! The single execution context allowed to touch live world state.
//!
//! Host worlds are not thread-safe.  Every block write, orientation copy and
//! entity operation the engine performs is funnelled onto one
//! [`MutationContext`]: either a dedicated OS thread running a current-thread
//! Tokio runtime, or a runtime handle the host already drives on its main
//! thread.

use crate::error::{EngineError, Result};
use log::{debug, warn};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::thread::{JoinHandle as ThreadHandle, ThreadId};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct ContextThread {
    name: String,
    id: ThreadId,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    join: Mutex<Option<ThreadHandle<()>>>,
}

impl Drop for ContextThread {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
        // Joining from the context thread itself would deadlock.
        if std::thread::current().id() == self.id {
            return;
        }
        if let Some(join) = self.join.lock().take() {
            if join.join().is_err() {
                warn!("Mutation context thread '{}' panicked", self.name);
            }
        }
        debug!("Mutation context thread '{}' stopped", self.name);
    }
}

#[derive(Clone)]
pub struct MutationContext {
    handle: Handle,
    thread: Option<Arc<ContextThread>>,
}

impl MutationContext {
    /// Spawn a dedicated thread hosting a current-thread runtime.  The thread
    /// stops when the last clone of the context is dropped.
    pub fn dedicated(name: &str) -> Result<Self> {
        let (handle_tx, handle_rx) = flume::bounded(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })
            .map_err(|e| EngineError::ContextUnavailable(e.to_string()))?;

        let id = join.thread().id();
        let handle = handle_rx
            .recv()
            .map_err(|e| EngineError::ContextUnavailable(e.to_string()))?
            .map_err(EngineError::ContextUnavailable)?;

        debug!("Mutation context thread '{}' started", name);
        Ok(Self {
            handle,
            thread: Some(Arc::new(ContextThread {
                name: name.to_string(),
                id,
                shutdown: Mutex::new(Some(shutdown_tx)),
                join: Mutex::new(Some(join)),
            })),
        })
    }

    /// Use a runtime the host already drives on its world thread.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            thread: None,
        }
    }

    /// Use the runtime the caller is running on.  Intended for tests and
    /// single-threaded hosts.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| EngineError::ContextUnavailable(e.to_string()))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_dedicated(&self) -> bool {
        self.thread.is_some()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run a synchronous closure on the context and await its result.
    pub async fn run<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn(async move { job() }).await.map_err(|e| {
            if e.is_cancelled() {
                EngineError::ContextUnavailable("mutation context shut down".into())
            } else {
                EngineError::WorkerPanicked("mutation context job")
            }
        })
    }
}
