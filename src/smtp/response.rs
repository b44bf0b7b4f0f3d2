//! SMTP response handling

use crate::smtp::error::SmtpLimits;

/// Represents an SMTP response that can be sent to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    /// The SMTP reply code (e.g. 250, 354, 451)
    pub code: u16,
    /// The human-readable message
    pub message: String,
    /// Extra lines of a multi-line reply, such as the EHLO capabilities
    pub multiline: Option<Vec<String>>,
}

impl SmtpResponse {
    /// Create a new SMTP response
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_owned(),
            multiline: None,
        }
    }

    /// Create a new multiline SMTP response
    pub fn new_multiline(code: u16, message: &str, lines: Vec<String>) -> Self {
        Self {
            code,
            message: message.to_owned(),
            multiline: Some(lines),
        }
    }

    /// 250 OK
    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    /// 220 greeting sent when a client connects
    pub fn greeting(server_name: &str) -> Self {
        Self::new(220, &format!("{server_name} ESMTP Service Ready"))
    }

    /// 250 reply to HELO
    pub fn helo(server_name: &str) -> Self {
        Self::new(250, &format!("{server_name} greets you"))
    }

    /// Multi-line 250 reply to EHLO listing the advertised extensions
    pub fn ehlo(server_name: &str) -> Self {
        let capabilities = vec![
            "PIPELINING".to_owned(),
            format!("SIZE {}", SmtpLimits::MAX_DATA_SIZE),
            "8BITMIME".to_owned(),
            "ENHANCEDSTATUSCODES".to_owned(),
            "HELP".to_owned(),
        ];
        Self::new_multiline(250, &format!("{server_name} greets you"), capabilities)
    }

    /// 354 reply inviting the message content
    pub fn data_start() -> Self {
        Self::new(354, "End data with <CR><LF>.<CR><LF>")
    }

    /// 250 reply after a message was relayed
    pub fn message_accepted() -> Self {
        Self::new(250, "OK: Message accepted")
    }

    /// 250 reply for a message with nothing worth relaying
    pub fn empty_message_accepted() -> Self {
        Self::new(250, "OK: Empty message accepted")
    }

    /// 451 reply when relaying failed after every retry
    pub fn delivery_failed() -> Self {
        Self::new(451, "Temporary failure")
    }

    /// 451 reply when the message could not be read
    pub fn local_error() -> Self {
        Self::new(451, "Requested action aborted: local error in processing")
    }

    /// 221 reply to QUIT
    pub fn quit() -> Self {
        Self::new(221, "Bye")
    }

    /// 421 reply sent to a client when the server is stopping
    pub fn shutting_down() -> Self {
        Self::new(421, "Service shutting down")
    }

    /// The reply as wire lines, without line terminators.
    ///
    /// Every line but the last carries a dash after the code.
    pub fn lines(&self) -> Vec<String> {
        match self.multiline {
            Some(ref extra) if !extra.is_empty() => {
                let mut lines = Vec::with_capacity(extra.len() + 1);
                lines.push(format!("{}-{}", self.code, self.message));
                for (i, line) in extra.iter().enumerate() {
                    let separator = if i == extra.len() - 1 { ' ' } else { '-' };
                    lines.push(format!("{}{separator}{line}", self.code));
                }
                lines
            }
            _ => vec![format!("{} {}", self.code, self.message)],
        }
    }

    /// Format the response for sending over the wire
    pub fn format(&self) -> String {
        self.lines()
            .into_iter()
            .map(|line| line + "\r\n")
            .collect()
    }

    /// Check if this is a success response (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Check if this is an error response (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_creation() {
        let response = SmtpResponse::new(250, "OK");
        assert_eq!(response.code, 250);
        assert_eq!(response.message, "OK");
    }

    #[test]
    fn test_greeting_response() {
        let response = SmtpResponse::greeting("relay.local");
        assert_eq!(response.code, 220);
        assert_eq!(response.format(), "220 relay.local ESMTP Service Ready\r\n");
    }

    #[test]
    fn test_helo_response() {
        let response = SmtpResponse::helo("relay.local");
        assert_eq!(response.format(), "250 relay.local greets you\r\n");
    }

    #[test]
    fn test_ehlo_response() {
        let formatted = SmtpResponse::ehlo("relay.local").format();
        assert_eq!(
            formatted,
            "250-relay.local greets you\r\n\
             250-PIPELINING\r\n\
             250-SIZE 35882577\r\n\
             250-8BITMIME\r\n\
             250-ENHANCEDSTATUSCODES\r\n\
             250 HELP\r\n"
        );
    }

    #[test]
    fn test_data_start_response() {
        let response = SmtpResponse::data_start();
        assert_eq!(response.code, 354);
        assert_eq!(response.message, "End data with <CR><LF>.<CR><LF>");
    }

    #[test]
    fn test_quit_response() {
        assert_eq!(SmtpResponse::quit().format(), "221 Bye\r\n");
    }

    #[test]
    fn test_multiline_format() {
        let response = SmtpResponse::new_multiline(
            250,
            "Hello",
            vec!["PIPELINING".to_owned(), "SIZE 1000".to_owned()],
        );
        assert_eq!(
            response.format(),
            "250-Hello\r\n250-PIPELINING\r\n250 SIZE 1000\r\n"
        );
    }

    #[test]
    fn test_empty_multiline_is_single_line() {
        let response = SmtpResponse::new_multiline(250, "Hello", Vec::new());
        assert_eq!(response.lines(), vec!["250 Hello".to_owned()]);
    }

    #[test]
    fn test_is_success() {
        assert!(SmtpResponse::ok().is_success());
        assert!(SmtpResponse::message_accepted().is_success());
        assert!(!SmtpResponse::delivery_failed().is_success());
    }

    #[test]
    fn test_is_error() {
        assert!(SmtpResponse::delivery_failed().is_error());
        assert!(SmtpResponse::local_error().is_error());
        assert!(SmtpResponse::shutting_down().is_error());
        assert!(!SmtpResponse::data_start().is_error());
    }
}
