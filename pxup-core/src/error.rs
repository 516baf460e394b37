//! Core error types.

use thiserror::Error;

/// Errors from the update buffer.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to allocate update buffer for {requested} entries")]
    AllocationFailed { requested: usize },
}
