//! Error types for the SMTP server

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Read timed out")]
    Timeout,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Too much mail data (max {max} bytes)")]
    TooMuchData { max: usize },
}

impl SmtpError {
    /// Classify an error raised while reading from the client.
    ///
    /// A socket read timeout surfaces as `WouldBlock` or `TimedOut`
    /// depending on the platform.
    pub fn from_read(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => SmtpError::Timeout,
            io::ErrorKind::UnexpectedEof => SmtpError::ConnectionClosed,
            _ => SmtpError::Io(error),
        }
    }
}

/// Size limits enforced by the server
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of a reply line including CRLF
    pub const REPLY_LINE_MAX_LENGTH: usize = 512;

    /// Maximum size of one DATA block, advertised through the EHLO `SIZE` keyword
    pub const MAX_DATA_SIZE: usize = 35_882_577;

    /// Seconds a session may stay silent before it is closed
    pub const READ_TIMEOUT_SECS: u64 = 30;
}
