//! Error types for Telegram delivery

use thiserror::Error;

/// Why a single delivery attempt failed
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("Telegram API request failed: {0}")]
    Transport(String),

    #[error("Telegram API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl DeliveryError {
    /// Whether the remote answered at all
    pub fn is_status(&self) -> bool {
        matches!(self, DeliveryError::Status { .. })
    }
}
