//! Backend abstraction for fetching update bundles.
//!
//! The backend is untrusted: whatever it returns goes through the
//! verifier before anything is used. Implementations may use HTTP, gRPC
//! or anything else.

use std::sync::Arc;

use async_trait::async_trait;
use rcfg_core::UpdateBundle;

use crate::config::RetryPolicy;
use crate::error::BackendError;
use crate::messages::LatestConfigsRequest;

/// Source of update bundles.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the latest configuration given what the client already trusts.
    async fn fetch(&self, request: &LatestConfigsRequest) -> Result<UpdateBundle, BackendError>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn fetch(&self, request: &LatestConfigsRequest) -> Result<UpdateBundle, BackendError> {
        (**self).fetch(request).await
    }
}

/// Retries transient failures of an inner backend with exponential backoff.
pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: Backend> RetryingBackend<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: Backend> Backend for RetryingBackend<B> {
    async fn fetch(&self, request: &LatestConfigsRequest) -> Result<UpdateBundle, BackendError> {
        let mut attempt = 1;
        loop {
            match self.inner.fetch(request).await {
                Ok(bundle) => return Ok(bundle),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::debug!(
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "backend fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A scripted backend for testing.
///
/// Responses are served in the order they were queued. Every request is
/// recorded so tests can inspect what the service asked for.
pub mod memory {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    type Scripted = Result<UpdateBundle, BackendError>;

    #[derive(Default)]
    pub struct StaticBackend {
        responses: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<LatestConfigsRequest>>,
        delay: Mutex<Option<Duration>>,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl StaticBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a bundle.
        pub fn push_bundle(&self, bundle: UpdateBundle) {
            lock(&self.responses).push_back(Ok(bundle));
        }

        /// Queue a failure.
        pub fn push_error(&self, error: BackendError) {
            lock(&self.responses).push_back(Err(error));
        }

        /// Delay every response, to exercise timeouts.
        pub fn set_delay(&self, delay: Option<Duration>) {
            *lock(&self.delay) = delay;
        }

        /// Requests received so far.
        pub fn requests(&self) -> Vec<LatestConfigsRequest> {
            lock(&self.requests).clone()
        }

        /// Responses not yet served.
        pub fn pending(&self) -> usize {
            lock(&self.responses).len()
        }
    }

    #[async_trait]
    impl Backend for StaticBackend {
        async fn fetch(&self, request: &LatestConfigsRequest) -> Result<UpdateBundle, BackendError> {
            lock(&self.requests).push(request.clone());
            let delay = *lock(&self.delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            lock(&self.responses)
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Transport("no scripted response".into())))
        }
    }
}
