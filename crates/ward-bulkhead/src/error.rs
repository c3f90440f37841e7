//! Error types for the bulkhead pattern.

use thiserror::Error;

/// Errors that can occur acquiring a bulkhead ticket.
#[derive(Debug, Clone, Error)]
pub enum BulkheadError {
    /// The wait budget elapsed before a ticket became available.
    #[error("resource occupied: max concurrent calls ({max_concurrent_calls}) reached")]
    ResourceOccupied {
        /// Capacity of the bulkhead.
        max_concurrent_calls: usize,
    },
}

/// Result type for bulkhead operations.
pub type Result<T> = std::result::Result<T, BulkheadError>;
