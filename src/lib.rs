//! # smtp2telegram
//!
//! smtp2telegram is a small SMTP server that relays every message it
//! receives to one Telegram chat.
//!
//! Point a device or service that can only send mail (a NAS, a router, a
//! cron job) at it and the messages arrive as chat messages instead.
//!
//! ## Quick Start
//!
//! ```no_run
//! use smtp2telegram::{ReqwestTransport, Shutdown, SmtpServer, TelegramClient};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let transport = ReqwestTransport::new(Duration::from_secs(30)).unwrap();
//! let client = TelegramClient::new(transport, "123456:bot-token", "-100123456");
//!
//! let shutdown = Shutdown::new();
//! let server = SmtpServer::new("relay.local", Arc::new(client), shutdown.clone());
//!
//! // Blocks until `shutdown.request_shutdown()` is called
//! server.start("127.0.0.1:2525").unwrap();
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `EHLO` / `HELO` - Identify the sender
//! - `MAIL FROM` / `RCPT TO` - Accepted without validation; the chat is fixed
//! - `DATA` - Send the message, which is decoded and relayed
//! - `RSET` - Discard a partial message
//! - `NOOP` - Do nothing
//! - `QUIT` - Close connection
//!
//! Unknown commands are answered with `250 OK`.
//!
//! ## Message handling
//!
//! The `Subject` and `From` headers lead the relayed text, followed by the
//! body. Multipart messages are reduced to their first `text/plain` part;
//! quoted-printable and base64 bodies are decoded and HTML tags are
//! stripped. Text over Telegram's 4096 character limit is truncated.
//!
//! A message Telegram did not accept after every retry is answered with
//! `451`, so the sending mail server will try again later.
//!
//! ## Notes
//!
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.
//! - Undelivered messages are not persisted.

pub mod config;
pub mod logging;
pub mod mail;
pub mod shutdown;
mod smtp;
pub mod telegram;

pub use config::{Config, ConfigError};
pub use mail::{DecodedMessage, decode};
pub use shutdown::{Shutdown, spawn_signal_listener};
pub use smtp::{
    Command, LineIo, SmtpError, SmtpIo, SmtpLimits, SmtpResponse, SmtpServer, SmtpSession,
    SmtpState,
};
pub use telegram::{
    Deliver, DeliveryError, DeliveryOutcome, HttpResponse, HttpTransport, ReqwestTransport,
    TelegramClient,
};
