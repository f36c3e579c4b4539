// ============================================================================
// File: src/async_task.rs
// ----------------------------------------------------------------------------
// Spawned-task handle used by every public lifecycle operation.
// ============================================================================

use std::future::Future;

/// Handle to a spawned harness operation
pub type AsyncTask<T> = tokio::task::JoinHandle<T>;

/// Builder that spawns a future onto the current tokio runtime
pub struct AsyncTaskBuilder<F> {
    future: F,
}

impl<F> AsyncTaskBuilder<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    /// Wrap a future for spawning
    pub fn new(future: F) -> Self {
        Self { future }
    }

    /// Spawn the wrapped future and return its handle
    pub fn spawn(self) -> AsyncTask<F::Output> {
        tokio::spawn(self.future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_task_resolves() {
        let task = AsyncTaskBuilder::new(async { 40 + 2 }).spawn();
        assert_eq!(task.await.expect("task should not panic"), 42);
    }
}
