//! Bot API client with retry and message-size normalization

use std::borrow::Cow;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::telegram::error::DeliveryError;
use crate::telegram::transport::{HttpTransport, ReqwestTransport};

/// Hard limit on the length of one Telegram message, in characters
pub const MESSAGE_LIMIT: usize = 4096;

/// Characters of original text kept when a message is truncated
pub const TRUNCATED_LENGTH: usize = MESSAGE_LIMIT - 50;

/// Appended to a truncated message
pub const TRUNCATION_MARKER: &str = "\n\n... (message truncated)";

/// Attempts made per message unless configured otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const API_BASE: &str = "https://api.telegram.org";
const TEST_MESSAGE: &str = "smtp2telegram: Connection test successful";

/// Result of one delivery, including every retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Failed { attempts } => {
                attempts
            }
        }
    }
}

/// Something that relays a formatted message to its destination.
///
/// Shared by every SMTP session, so implementations must tolerate
/// concurrent calls.
pub trait Deliver: Send + Sync {
    fn deliver(&self, text: &str) -> DeliveryOutcome;
}

type Pause = Box<dyn Fn(Duration) + Send + Sync>;

/// Sends messages to one fixed chat through the Telegram Bot API.
///
/// Holds only fixed configuration, so one client can serve many sessions at
/// once. Retry counters live on the caller's stack.
pub struct TelegramClient<T = ReqwestTransport> {
    transport: T,
    api_base: String,
    /// Bot token; part of every request URL, never logged
    token: String,
    chat_id: String,
    max_retries: u32,
    pause: Pause,
}

impl<T: HttpTransport> TelegramClient<T> {
    /// Create a client for `chat_id` authenticated by `token`
    pub fn new(transport: T, token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            transport,
            api_base: API_BASE.to_owned(),
            token: token.into(),
            chat_id: chat_id.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            pause: Box::new(thread::sleep),
        }
    }

    /// Total attempts per message; at least one attempt is always made
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Point the client at another Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    /// Replace the function used to wait between attempts
    pub fn with_pause(mut self, pause: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Send `text`, trying up to `max_retries` times with linear backoff
    pub fn send_message(&self, text: &str, max_retries: u32) -> DeliveryOutcome {
        let max_retries = max_retries.max(1);
        let text = truncate_message(text);

        for attempt in 1..=max_retries {
            match self.attempt(&text) {
                Ok(()) => {
                    info!(attempt, "Telegram message sent successfully");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) if e.is_status() => error!(attempt, "{e}"),
                Err(e) => warn!(attempt, "{e}"),
            }

            if attempt < max_retries {
                let wait = backoff_delay(attempt);
                warn!(
                    "Retry {attempt}/{max_retries} in {} seconds...",
                    wait.as_secs()
                );
                (self.pause)(wait);
            }
        }

        error!("Failed to send Telegram message after {max_retries} attempts");
        DeliveryOutcome::Failed {
            attempts: max_retries,
        }
    }

    /// Make a single attempt to send a fixed diagnostic message
    pub fn test_connection(&self) -> DeliveryOutcome {
        info!(chat_id = %self.chat_id, "Testing Telegram bot connection...");
        self.send_message(TEST_MESSAGE, 1)
    }

    fn attempt(&self, text: &str) -> Result<(), DeliveryError> {
        debug!(
            chat_id = %self.chat_id,
            chars = text.chars().count(),
            "calling sendMessage"
        );

        let response = self.transport.get(&self.request_url(text))?;
        if response.status != 200 {
            return Err(DeliveryError::Status {
                status: response.status,
                body: response.body,
            });
        }

        Ok(())
    }

    fn request_url(&self, text: &str) -> String {
        format!(
            "{}/bot{}/sendMessage?chat_id={}&text={}",
            self.api_base,
            self.token,
            urlencoding::encode(&self.chat_id),
            urlencoding::encode(text)
        )
    }
}

impl<T: HttpTransport> Deliver for TelegramClient<T> {
    fn deliver(&self, text: &str) -> DeliveryOutcome {
        self.send_message(text, self.max_retries)
    }
}

/// Pause before the attempt following attempt number `attempt`
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2 * u64::from(attempt))
}

/// Fit `text` within [`MESSAGE_LIMIT`] characters.
///
/// Longer text keeps its first [`TRUNCATED_LENGTH`] characters followed by
/// [`TRUNCATION_MARKER`].
pub fn truncate_message(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= MESSAGE_LIMIT {
        return Cow::Borrowed(text);
    }

    let mut truncated: String = text.chars().take(TRUNCATED_LENGTH).collect();
    truncated.push_str(TRUNCATION_MARKER);
    Cow::Owned(truncated)
}
