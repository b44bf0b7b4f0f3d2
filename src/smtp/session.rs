//! SMTP session state management

use tracing::{debug, error, info, warn};

use crate::mail;
use crate::shutdown::Shutdown;
use crate::smtp::commands::Command;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::io::SmtpIo;
use crate::smtp::response::SmtpResponse;
use crate::telegram::Deliver;

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Connection accepted, greeting not yet sent
    Greeting,
    /// Waiting for the next command
    Ready,
    /// DATA accepted - collecting the message
    InData,
    /// Terminal; the connection is done
    Closed,
}

/// Drives the command/response exchange of one connection.
///
/// Completed DATA blocks are decoded and handed to the delivery client. The
/// session is generic over [`SmtpIo`] and never touches a socket directly.
pub struct SmtpSession<'a, D: Deliver + ?Sized> {
    server_name: &'a str,
    delivery: &'a D,
    shutdown: Option<&'a Shutdown>,
    state: SmtpState,
    /// Raw DATA block of the current message
    data: Vec<u8>,
    /// Domain given with HELO/EHLO, for logging only
    client_domain: Option<String>,
}

impl<'a, D: Deliver + ?Sized> SmtpSession<'a, D> {
    /// Create a new SMTP session
    pub fn new(server_name: &'a str, delivery: &'a D) -> Self {
        Self {
            server_name,
            delivery,
            shutdown: None,
            state: SmtpState::Greeting,
            data: Vec::new(),
            client_domain: None,
        }
    }

    /// Stop between commands once `shutdown` is requested
    pub fn with_shutdown(mut self, shutdown: &'a Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> SmtpState {
        self.state
    }

    /// Drop any partially collected message
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Run the session until it is closed.
    ///
    /// Returns an error when the connection failed or timed out. A client
    /// hanging up between commands is a normal close.
    pub fn run<I: SmtpIo>(&mut self, io: &mut I) -> Result<(), SmtpError> {
        let result = self.exchange(io);
        self.state = SmtpState::Closed;
        debug!(
            "Session closed (client: {})",
            self.client_domain.as_deref().unwrap_or("unidentified")
        );
        result
    }

    fn exchange<I: SmtpIo>(&mut self, io: &mut I) -> Result<(), SmtpError> {
        self.send_response(io, &SmtpResponse::greeting(self.server_name))?;
        self.state = SmtpState::Ready;

        while self.state != SmtpState::Closed {
            if self.shutdown_requested() {
                self.send_response(io, &SmtpResponse::shutting_down())?;
                self.state = SmtpState::Closed;
                break;
            }

            let Some(line) = io.read_line()? else {
                debug!("Client closed the connection");
                break;
            };

            let Some(command) = Command::parse(&line) else {
                continue;
            };

            debug!(verb = command.verb(), "SMTP command: {}", line.trim());
            self.process_command(command, io)?;
        }

        Ok(())
    }

    /// Apply one command and send its reply
    pub fn process_command<I: SmtpIo>(
        &mut self,
        command: Command,
        io: &mut I,
    ) -> Result<(), SmtpError> {
        match command {
            Command::Ehlo(domain) => {
                self.set_client_domain(domain);
                self.send_response(io, &SmtpResponse::ehlo(self.server_name))
            }
            Command::Helo(domain) => {
                self.set_client_domain(domain);
                self.send_response(io, &SmtpResponse::helo(self.server_name))
            }
            Command::MailFrom(_) | Command::RcptTo(_) | Command::Noop => {
                self.send_response(io, &SmtpResponse::ok())
            }
            Command::Data => self.handle_data(io),
            Command::Rset => {
                self.reset();
                self.send_response(io, &SmtpResponse::ok())
            }
            Command::Quit => {
                self.send_response(io, &SmtpResponse::quit())?;
                self.state = SmtpState::Closed;
                Ok(())
            }
            Command::Unknown(line) => {
                warn!("Unknown SMTP command: {line}");
                self.send_response(io, &SmtpResponse::ok())
            }
        }
    }

    fn handle_data<I: SmtpIo>(&mut self, io: &mut I) -> Result<(), SmtpError> {
        self.send_response(io, &SmtpResponse::data_start())?;
        self.state = SmtpState::InData;
        self.data.clear();

        if let Err(e) = io.read_data(&mut self.data) {
            error!("Failed to read message data: {e}");
            // the connection may already be gone
            let _ = self.send_response(io, &SmtpResponse::local_error());
            self.data.clear();
            self.state = SmtpState::Closed;
            return Err(e);
        }

        let message = mail::decode(&self.data);
        self.data.clear();
        info!(
            "Received message ({} bytes body), subject: {:?}",
            message.body.len(),
            message.subject
        );

        let text = message.format_for_delivery();
        let response = if text.trim().is_empty() {
            warn!("Message has no content, not delivering");
            SmtpResponse::empty_message_accepted()
        } else {
            let outcome = self.delivery.deliver(&text);
            if outcome.is_delivered() {
                debug!("Delivered in {} attempt(s)", outcome.attempts());
                SmtpResponse::message_accepted()
            } else {
                error!("Delivery failed after {} attempts", outcome.attempts());
                SmtpResponse::delivery_failed()
            }
        };

        self.state = SmtpState::Ready;
        self.send_response(io, &response)
    }

    fn set_client_domain(&mut self, domain: String) {
        debug!("Client identified as {domain:?}");
        self.client_domain = Some(domain);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .is_some_and(|shutdown| shutdown.is_shutdown_requested())
    }

    /// Send a response to the client
    fn send_response<I: SmtpIo>(
        &self,
        io: &mut I,
        response: &SmtpResponse,
    ) -> Result<(), SmtpError> {
        for line in response.lines() {
            // +2 for CRLF
            if line.len() + 2 > SmtpLimits::REPLY_LINE_MAX_LENGTH {
                io.write_line(&format!("{} Response too long (truncated)", response.code))?;
            } else {
                io.write_line(&line)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::io::LineIo;
    use crate::telegram::DeliveryOutcome;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Records every delivered text and answers with a fixed outcome
    struct StubDelivery {
        delivered: Mutex<Vec<String>>,
        succeed: bool,
    }

    impl StubDelivery {
        fn succeeding() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                succeed: true,
            }
        }

        fn failing() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                succeed: false,
            }
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }
    }

    impl Deliver for StubDelivery {
        fn deliver(&self, text: &str) -> DeliveryOutcome {
            self.delivered.lock().unwrap().push(text.to_owned());
            if self.succeed {
                DeliveryOutcome::Delivered { attempts: 1 }
            } else {
                DeliveryOutcome::Failed { attempts: 3 }
            }
        }
    }

    type TestIo = LineIo<Cursor<Vec<u8>>, Vec<u8>>;

    fn io_for(input: &str) -> TestIo {
        LineIo::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn reply_lines(io: &TestIo) -> Vec<String> {
        String::from_utf8(io.writer().clone())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Codes of complete replies, skipping the continuation lines of multi-line replies
    fn reply_codes(io: &TestIo) -> Vec<String> {
        reply_lines(io)
            .iter()
            .filter(|line| line.as_bytes().get(3) != Some(&b'-'))
            .map(|line| line[..3].to_owned())
            .collect()
    }

    #[test]
    fn test_new_session() {
        let delivery = StubDelivery::succeeding();
        let session = SmtpSession::new("relay.local", &delivery);

        assert_eq!(session.state(), SmtpState::Greeting);
        assert!(session.data.is_empty());
        assert!(session.client_domain.is_none());
    }

    #[test]
    fn test_complete_session() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for(
            "EHLO test\r\n\
             MAIL FROM:<a>\r\n\
             RCPT TO:<b>\r\n\
             DATA\r\n\
             Subject: hi\r\n\r\nhello\r\n.\r\n\
             QUIT\r\n",
        );
        let mut session = SmtpSession::new("relay.local", &delivery);

        session.run(&mut io).unwrap();

        assert_eq!(
            reply_codes(&io),
            vec!["220", "250", "250", "250", "354", "250", "221"]
        );
        let lines = reply_lines(&io);
        assert_eq!(lines[1], "250-relay.local greets you");
        assert_eq!(lines[6], "250 HELP");

        let delivered = delivery.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].starts_with("Subject: hi"));
        assert_eq!(delivered[0], "Subject: hi\n\nhello");
        assert_eq!(session.state(), SmtpState::Closed);
    }

    #[test]
    fn test_greeting() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for("");
        let mut session = SmtpSession::new("relay.local", &delivery);

        session.run(&mut io).unwrap();

        assert_eq!(reply_lines(&io), vec!["220 relay.local ESMTP Service Ready"]);
    }

    #[test]
    fn test_unknown_command_is_accepted() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for("");
        let mut session = SmtpSession::new("relay.local", &delivery);
        session.state = SmtpState::Ready;

        session
            .process_command(Command::Unknown("VRFY user".into()), &mut io)
            .unwrap();

        assert_eq!(reply_lines(&io), vec!["250 OK"]);
        assert_eq!(session.state(), SmtpState::Ready);
    }

    #[test]
    fn test_blank_lines_get_no_reply() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for("\r\n   \r\nNOOP\r\n");
        let mut session = SmtpSession::new("relay.local", &delivery);

        session.run(&mut io).unwrap();

        assert_eq!(reply_codes(&io), vec!["220", "250"]);
    }

    #[test]
    fn test_helo() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for("helo client.local\r\n");
        let mut session = SmtpSession::new("relay.local", &delivery);

        session.run(&mut io).unwrap();

        assert_eq!(reply_lines(&io)[1], "250 relay.local greets you");
        assert_eq!(session.client_domain.as_deref(), Some("client.local"));
    }

    #[test]
    fn test_delivery_failure_replies_451() {
        let delivery = StubDelivery::failing();
        let mut io = io_for("DATA\r\nSubject: hi\r\n\r\nhello\r\n.\r\nQUIT\r\n");
        let mut session = SmtpSession::new("relay.local", &delivery);

        session.run(&mut io).unwrap();

        assert_eq!(reply_codes(&io), vec!["220", "354", "451", "221"]);
        assert_eq!(reply_lines(&io)[2], "451 Temporary failure");
        assert_eq!(delivery.delivered().len(), 1);
    }

    #[test]
    fn test_empty_message_is_not_delivered() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for("DATA\r\n.\r\nQUIT\r\n");
        let mut session = SmtpSession::new("relay.local", &delivery);

        session.run(&mut io).unwrap();

        assert_eq!(reply_lines(&io)[2], "250 OK: Empty message accepted");
        assert!(delivery.delivered().is_empty());
    }

    #[test]
    fn test_data_read_error_replies_451_and_closes() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for("DATA\r\nSubject: hi\r\n\r\nunterminated");
        let mut session = SmtpSession::new("relay.local", &delivery);

        let result = session.run(&mut io);

        assert!(matches!(result, Err(SmtpError::ConnectionClosed)));
        assert_eq!(reply_codes(&io), vec!["220", "354", "451"]);
        assert_eq!(session.state(), SmtpState::Closed);
        assert!(delivery.delivered().is_empty());
    }

    #[test]
    fn test_oversized_data_replies_451() {
        let delivery = StubDelivery::succeeding();
        let input = format!("DATA\r\n{}\r\n.\r\n", "x".repeat(64));
        let mut io = io_for(&input).with_max_data_size(32);
        let mut session = SmtpSession::new("relay.local", &delivery);

        let result = session.run(&mut io);

        assert!(matches!(result, Err(SmtpError::TooMuchData { max: 32 })));
        assert_eq!(reply_codes(&io), vec!["220", "354", "451"]);
    }

    #[test]
    fn test_second_message_on_same_connection() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for(
            "DATA\r\nSubject: one\r\n\r\nfirst\r\n.\r\n\
             DATA\r\nSubject: two\r\n\r\nsecond\r\n.\r\n\
             QUIT\r\n",
        );
        let mut session = SmtpSession::new("relay.local", &delivery);

        session.run(&mut io).unwrap();

        assert_eq!(delivery.delivered().len(), 2);
        assert_eq!(reply_codes(&io), vec!["220", "354", "250", "354", "250", "221"]);
    }

    #[test]
    fn test_reset() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for("");
        let mut session = SmtpSession::new("relay.local", &delivery);
        session.state = SmtpState::Ready;
        session.data.extend_from_slice(b"partial");

        session.process_command(Command::Rset, &mut io).unwrap();

        assert!(session.data.is_empty());
        assert_eq!(session.state(), SmtpState::Ready);
        assert_eq!(reply_lines(&io), vec!["250 OK"]);
    }

    #[test]
    fn test_quit_stops_reading() {
        let delivery = StubDelivery::succeeding();
        let mut io = io_for("QUIT\r\nNOOP\r\n");
        let mut session = SmtpSession::new("relay.local", &delivery);

        session.run(&mut io).unwrap();

        assert_eq!(reply_codes(&io), vec!["220", "221"]);
    }

    #[test]
    fn test_shutdown_replies_421() {
        let delivery = StubDelivery::succeeding();
        let shutdown = Shutdown::new();
        shutdown.request_shutdown();
        let mut io = io_for("NOOP\r\n");
        let mut session = SmtpSession::new("relay.local", &delivery).with_shutdown(&shutdown);

        session.run(&mut io).unwrap();

        assert_eq!(
            reply_lines(&io),
            vec!["220 relay.local ESMTP Service Ready", "421 Service shutting down"]
        );
        assert_eq!(session.state(), SmtpState::Closed);
    }

    #[test]
    fn test_long_reply_is_truncated() {
        let delivery = StubDelivery::succeeding();
        let long_name = "a".repeat(SmtpLimits::REPLY_LINE_MAX_LENGTH);
        let mut io = io_for("");
        let mut session = SmtpSession::new(&long_name, &delivery);

        session.run(&mut io).unwrap();

        assert_eq!(reply_lines(&io), vec!["220 Response too long (truncated)"]);
    }
}
