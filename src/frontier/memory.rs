//! In-memory FIFO frontier.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use super::{Frontier, FrontierError};
use crate::fetch::FetchRequest;

/// Initial queue capacity.
const INITIAL_CAPACITY: usize = 4096;

/// Unbounded in-memory frontier.
///
/// The list is guarded by a `std::sync::Mutex` that is never held across an
/// await; blocked poppers park on a `tokio::sync::Notify`.
#[derive(Debug)]
pub struct InMemoryFrontier {
    inner: Mutex<Inner>,
    available: Notify,
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<FetchRequest>,
    closed: bool,
}

impl Default for InMemoryFrontier {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFrontier {
    /// Creates an empty, open frontier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(INITIAL_CAPACITY),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    /// Whether [`close`](Frontier::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Frontier for InMemoryFrontier {
    async fn push(&self, request: FetchRequest) -> Result<(), FrontierError> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(FrontierError::Closed);
            }
            inner.queue.push_back(request);
        }
        self.available.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Result<FetchRequest, FrontierError> {
        loop {
            // Registered before checking state, so a close() between the check
            // and the await still wakes us.
            let notified = self.available.notified();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return Err(FrontierError::Closed);
                }
                if let Some(request) = inner.queue.pop_front() {
                    return Ok(request);
                }
            }
            notified.await;
        }
    }

    fn len(&self) -> usize {
        self.lock().queue.len()
    }

    async fn close(&self) {
        let discarded = {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            let discarded = inner.queue.len();
            inner.queue.clear();
            discarded
        };
        debug!(discarded, "frontier closed");
        self.available.notify_waiters();
    }
}
