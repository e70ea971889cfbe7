//! Error types for notification delivery.

use thiserror::Error;

/// Errors that can occur when posting a notification.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// HTTP request failed or timed out
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Receiver answered with a non-success status
    #[error("receiver rejected notification with status {status}")]
    Rejected { status: u16 },
}
