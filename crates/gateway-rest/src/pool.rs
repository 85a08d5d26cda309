//! Bounded pool for fire-and-forget outbound requests.

use std::{future::Future, sync::Arc};

use tokio::{sync::Semaphore, task::JoinHandle};

use crate::RestError;

/// Default number of requests allowed in flight at once.
pub const DEFAULT_POOL_WIDTH: usize = 8;

/// Runs outbound requests with bounded concurrency.
///
/// A failed request is logged and dropped; nothing is propagated back to
/// whoever queued it.
#[derive(Clone)]
pub struct RequestPool {
    permits: Arc<Semaphore>,
    width: usize,
}

impl RequestPool {
    /// Create a pool with `width` concurrent slots (at least one).
    #[must_use]
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            permits: Arc::new(Semaphore::new(width)),
            width,
        }
    }

    /// Configured concurrency.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Slots not currently taken by a running request.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Queue a request. It starts once a slot frees up.
    pub fn spawn<F>(&self, label: &'static str, request: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), RestError>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if let Err(e) = request.await {
                tracing::error!(request = label, error = %e, "Outbound request failed");
            }
        })
    }
}

impl Default for RequestPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_WIDTH)
    }
}
