//! Bounded pool for CPU-bound work
//!
//! Each unit runs on the blocking thread pool once it holds a semaphore
//! permit, so at most `size` decodes, inferences or renders run at a time.
//! Dispatched units always run to completion.

use leaf_id_common::RecognitionError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Pool with `size` permits (at least one)
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running unit
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `work` on the blocking pool once a permit is free
    ///
    /// # Errors
    /// The unit's own error, or `Dispatch` if the unit panicked or the pool closed
    pub async fn run<T, F>(&self, work: F) -> Result<T, RecognitionError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RecognitionError> + Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RecognitionError::Dispatch(format!("worker pool closed: {e}")))?;
        debug!("Worker permit acquired ({} left)", self.semaphore.available_permits());

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await
        .map_err(|e| RecognitionError::Dispatch(format!("Task join error: {e}")))?
    }
}
