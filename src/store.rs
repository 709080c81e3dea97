//! Errors raised by the backing stores of the rate limiter and the cache.
//!
//! Callers never fail a request because of a store error: the rate limiter
//! fails open and the cache treats the failure as a miss.

/// Failure talking to a shared key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write (e.g. the entry is over the size bound).
    #[error("store rejected write: {0}")]
    Rejected(String),

    /// The store answered but the operation failed.
    #[error("store operation failed: {0}")]
    Operation(String),
}
