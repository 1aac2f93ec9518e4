// SPDX-License-Identifier: MIT

//! Error taxonomy for the sync pipeline.
//!
//! The orchestrator's retry wrapper keys off `is_transient()`: network
//! hiccups and rejected uploads are retried with backoff, authentication
//! failures abort the run immediately, and decode failures are scoped to a
//! single activity.

use crate::fit::DecodeError;

/// Top-level error type for sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Authentication with a remote service failed. Fatal, never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transient network or remote-API failure. Retried with backoff.
    #[error("Network error: {0}")]
    Network(String),

    /// Garmin rejected the uploaded file. Retried a bounded number of times,
    /// then reported; the checkpoint is withheld past the failed activity.
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// The downloaded FIT file could not be decoded. Per-activity fatal:
    /// the activity is skipped and the run continues.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Checkpoint store read/write failure.
    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// Whether the retry wrapper should attempt this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::UploadRejected(_))
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SyncError::Network("connection reset".to_string()).is_transient());
        assert!(SyncError::UploadRejected("HTTP 500".to_string()).is_transient());

        assert!(!SyncError::Auth("bad password".to_string()).is_transient());
        assert!(!SyncError::Checkpoint("read-only fs".to_string()).is_transient());
        assert!(!SyncError::Decode(DecodeError::InvalidFormat("no signature".to_string()))
            .is_transient());
    }
}
