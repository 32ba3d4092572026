// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::StreamError;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

struct Shared<T> {
    result: Mutex<Option<Result<T, StreamError>>>,
    notify: Notify,
}

/// Write-once result handle handed out as a sink's materialized value.
pub struct Completion<T> {
    inner: Arc<Shared<T>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Completion<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Shared {
                result: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Result<T, StreamError>>> {
        self.inner
            .result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the result. Only the first call has an effect.
    pub fn complete(&self, result: Result<T, StreamError>) -> bool {
        let stored = {
            let mut guard = self.lock();
            if guard.is_none() {
                *guard = Some(result);
                true
            } else {
                false
            }
        };
        if stored {
            self.inner.notify.notify_waiters();
        }
        stored
    }

    pub fn is_done(&self) -> bool {
        self.lock().is_some()
    }

    pub fn poll(&self) -> Option<Result<T, StreamError>>
    where
        T: Clone,
    {
        self.lock().clone()
    }

    pub async fn wait(&self) -> Result<T, StreamError>
    where
        T: Clone,
    {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(result) = self.poll() {
                return result;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_result_wins() {
        let completion = Completion::new();
        assert!(completion.poll().is_none());
        assert!(completion.complete(Ok(1)));
        assert!(!completion.complete(Err(StreamError::AbruptTermination)));
        assert_eq!(completion.poll(), Some(Ok(1)));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_completion() {
        let completion: Completion<&'static str> = Completion::new();
        let remote = completion.clone();
        let task = tokio::spawn(async move { remote.wait().await });
        tokio::task::yield_now().await;
        completion.complete(Ok("done"));
        assert_eq!(task.await.unwrap(), Ok("done"));
    }
}
