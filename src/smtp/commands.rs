//! Recognition of SMTP command lines

/// A command read from the client.
///
/// Verbs are matched case-insensitively by prefix so trailing arguments are
/// tolerated. Anything else is [`Command::Unknown`], which the session
/// accepts rather than rejecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `EHLO <domain>`
    Ehlo(String),
    /// `HELO <domain>`
    Helo(String),
    /// `MAIL FROM:<path>`
    MailFrom(String),
    /// `RCPT TO:<path>`
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    /// Any other non-empty line
    Unknown(String),
}

impl Command {
    /// Parse one command line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let argument = |prefix: &str| {
            strip_prefix_ignore_case(line, prefix).map(|rest| rest.trim().to_owned())
        };

        let command = if let Some(domain) = argument("EHLO") {
            Command::Ehlo(domain)
        } else if let Some(domain) = argument("HELO") {
            Command::Helo(domain)
        } else if let Some(path) = argument("MAIL FROM:") {
            Command::MailFrom(path)
        } else if let Some(path) = argument("RCPT TO:") {
            Command::RcptTo(path)
        } else if argument("DATA").is_some() {
            Command::Data
        } else if argument("RSET").is_some() {
            Command::Rset
        } else if argument("NOOP").is_some() {
            Command::Noop
        } else if argument("QUIT").is_some() {
            Command::Quit
        } else {
            Command::Unknown(line.to_owned())
        };

        Some(command)
    }

    /// Name of the command for logging
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Ehlo(_) => "EHLO",
            Command::Helo(_) => "HELO",
            Command::MailFrom(_) => "MAIL",
            Command::RcptTo(_) => "RCPT",
            Command::Data => "DATA",
            Command::Rset => "RSET",
            Command::Noop => "NOOP",
            Command::Quit => "QUIT",
            Command::Unknown(_) => "UNKNOWN",
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}
