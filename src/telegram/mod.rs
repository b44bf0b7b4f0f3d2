//! Delivery of relayed messages to a Telegram chat

mod client;
mod error;
mod transport;

pub use client::{
    DEFAULT_MAX_RETRIES, Deliver, DeliveryOutcome, MESSAGE_LIMIT, TRUNCATED_LENGTH,
    TRUNCATION_MARKER, TelegramClient, backoff_delay, truncate_message,
};
pub use error::DeliveryError;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
