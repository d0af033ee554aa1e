use crate::error::{Result, ScatterError};
use std::future::Future;
use tokio::task::JoinHandle;

/// A collective exchange running in a spawned task.
///
/// If dropped without `wait()`, the task is aborted.
pub struct ExchangeHandle<T> {
    inner: Option<JoinHandle<Result<T>>>,
}

impl<T: Send + 'static> ExchangeHandle<T> {
    pub(crate) fn spawn(fut: impl Future<Output = Result<T>> + Send + 'static) -> Self {
        Self {
            inner: Some(tokio::spawn(fut)),
        }
    }

    /// Wait for the exchange and propagate any error.
    pub async fn wait(mut self) -> Result<T> {
        let handle = self
            .inner
            .take()
            .ok_or_else(|| ScatterError::transport("exchange handle already consumed"))?;
        handle
            .await
            .map_err(|e| ScatterError::transport_with_source("exchange task failed", e))?
    }

    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_none_or(|h| h.is_finished())
    }
}

impl<T> Drop for ExchangeHandle<T> {
    fn drop(&mut self) {
        if let Some(handle) = &self.inner {
            handle.abort();
        }
    }
}
