use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

/// Per-connection and per-request limits enforced by the server
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Request line plus header block, in bytes
    pub max_header_size: usize,
    /// Request body, in bytes
    pub max_body_size: usize,
    pub max_concurrent_connections: usize,
    /// How long a kept-alive connection may sit between requests
    pub max_idle_time: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_header_size: 16 * 1024,
            max_body_size: 100 * 1024,
            max_concurrent_connections: 1000,
            max_idle_time: Duration::from_secs(5),
        }
    }
}

impl ResourceLimits {
    pub fn check_header_size(&self, size: usize) -> Result<(), SizeError> {
        within(size, self.max_header_size)
    }

    pub fn check_body_size(&self, size: usize) -> Result<(), SizeError> {
        within(size, self.max_body_size)
    }
}

fn within(size: usize, limit: usize) -> Result<(), SizeError> {
    if size <= limit {
        Ok(())
    } else {
        Err(SizeError::TooLarge { size, limit })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizeError {
    #[error("{size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

/// Hands out a bounded number of connection slots
#[derive(Debug)]
pub struct ConnectionTracker {
    slots: Arc<Semaphore>,
    limit: usize,
    accepted: AtomicU64,
}

impl ConnectionTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(limit)),
            limit,
            accepted: AtomicU64::new(0),
        }
    }

    /// Claims a slot without waiting; the slot is released when the guard drops
    pub fn try_acquire(self: &Arc<Self>) -> Result<ConnectionGuard, ConnectionError> {
        let permit = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => ConnectionError::LimitReached { limit: self.limit },
                TryAcquireError::Closed => ConnectionError::Closed,
            })?;
        self.accepted.fetch_add(1, Ordering::Relaxed);

        Ok(ConnectionGuard {
            _permit: permit,
            tracker: Arc::clone(self),
            opened_at: Instant::now(),
        })
    }

    pub fn active(&self) -> usize {
        self.limit - self.slots.available_permits()
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            active: self.active(),
            accepted: self.accepted.load(Ordering::Relaxed),
            limit: self.limit,
        }
    }
}

/// Snapshot of [`ConnectionTracker`] counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub active: usize,
    /// Connections admitted since start
    pub accepted: u64,
    pub limit: usize,
}

/// Holds one connection slot
#[derive(Debug)]
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
    tracker: Arc<ConnectionTracker>,
    opened_at: Instant,
}

impl ConnectionGuard {
    /// Connections open right now, this one included
    pub fn active_connections(&self) -> usize {
        self.tracker.active()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        // The permit is released after this body runs, so this connection still counts.
        debug!(
            open_for_ms = self.opened_at.elapsed().as_millis(),
            remaining = self.tracker.active().saturating_sub(1),
            "Released connection slot"
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("all {limit} connection slots are in use")]
    LimitReached { limit: usize },
    #[error("connection slots are closed")]
    Closed,
}
