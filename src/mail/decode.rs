//! Header parsing, multipart resolution and body decoding

use std::collections::HashMap;

use super::encoding::{
    decode_base64, decode_encoded_words, decode_quoted_printable, strip_html_tags,
};

/// A message decoded from one DATA block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Decoded `Subject` header, empty if absent
    pub subject: String,
    /// Decoded `From` header, empty if absent
    pub from: String,
    /// Decoded `To` header, empty if absent
    pub to: String,
    /// Raw `Content-Type` header value, empty if absent
    pub content_type: String,
    /// Every header as received; the last occurrence of a name wins
    pub headers: HashMap<String, String>,
    /// Body after multipart selection, transfer decoding and HTML stripping
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferEncoding {
    QuotedPrintable,
    Base64,
    Identity,
}

impl TransferEncoding {
    fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "quoted-printable" => Self::QuotedPrintable,
            "base64" => Self::Base64,
            _ => Self::Identity,
        }
    }
}

/// Decode a raw DATA block.
///
/// Never fails. Input without a header/body separator is returned whole as
/// the body.
pub fn decode(raw: &[u8]) -> DecodedMessage {
    let text = String::from_utf8_lossy(raw);

    let Some((header_section, body)) = split_header_body(&text) else {
        return DecodedMessage::unstructured(text.into_owned());
    };

    let mut message = DecodedMessage::default();
    for (name, value) in parse_headers(header_section) {
        message.apply_header(name, value);
    }
    message.body = message.decode_body(body);
    message
}

impl DecodedMessage {
    fn unstructured(body: String) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Look up a header by name, ignoring ASCII case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Render the message as the text sent to the chat.
    ///
    /// `From:` and `Subject:` lines lead when present, separated from the
    /// body by a blank line.
    pub fn format_for_delivery(&self) -> String {
        let mut text = String::with_capacity(self.body.len() + 128);

        if !self.from.is_empty() {
            text.push_str("From: ");
            text.push_str(&self.from);
            text.push('\n');
        }

        if !self.subject.is_empty() {
            text.push_str("Subject: ");
            text.push_str(&self.subject);
            text.push('\n');
        }

        if !text.is_empty() {
            text.push('\n');
        }

        text.push_str(&self.body);
        text
    }

    fn apply_header(&mut self, name: String, value: String) {
        if name.eq_ignore_ascii_case("Subject") {
            self.subject = decode_encoded_words(&value);
        } else if name.eq_ignore_ascii_case("From") {
            self.from = decode_encoded_words(&value);
        } else if name.eq_ignore_ascii_case("To") {
            self.to = decode_encoded_words(&value);
        } else if name.eq_ignore_ascii_case("Content-Type") {
            self.content_type = value.clone();
        }

        self.headers.insert(name, value);
    }

    fn decode_body(&self, body: &str) -> String {
        let content_type = self.content_type.to_ascii_lowercase();
        let mut encoding = self
            .header("Content-Transfer-Encoding")
            .map_or(TransferEncoding::Identity, TransferEncoding::from_header);

        let mut working = body.to_owned();
        if let Some(boundary) = extract_boundary(&self.content_type) {
            if let Some(part) = select_text_part(body, &boundary) {
                working = part.body;
                encoding = part.encoding;
            }
        }

        if content_type.contains("quoted-printable")
            || encoding == TransferEncoding::QuotedPrintable
        {
            working = String::from_utf8_lossy(&decode_quoted_printable(&working)).into_owned();
        } else if encoding == TransferEncoding::Base64 {
            if let Some(bytes) = decode_base64(&working) {
                working = String::from_utf8_lossy(&bytes).into_owned();
            }
        }

        if content_type.contains("text/html") {
            working = strip_html_tags(&working);
        }

        working
    }
}

/// Split at the first blank line, `\n\n` or `\r\n\r\n` whichever comes first
fn split_header_body(text: &str) -> Option<(&str, &str)> {
    let lf = text.find("\n\n").map(|at| (at, at + 2));
    let crlf = text.find("\r\n\r\n").map(|at| (at, at + 4));

    let (header_end, body_start) = match (lf, crlf) {
        (Some(lf), Some(crlf)) => {
            if lf.0 < crlf.0 {
                lf
            } else {
                crlf
            }
        }
        (lf, crlf) => lf.or(crlf)?,
    };

    Some((&text[..header_end], &text[body_start..]))
}

/// Parse a header section into `(name, value)` pairs in order of appearance.
///
/// Folded lines are joined to the previous value with a single space. Lines
/// that neither continue a header nor contain `:` are skipped.
fn parse_headers(section: &str) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in section.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }

        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = current.as_mut() {
                let continuation = line.trim_start();
                if !value.is_empty() && !continuation.is_empty() {
                    value.push(' ');
                }
                value.push_str(continuation);
            }
            continue;
        }

        if let Some((name, value)) = line.split_once(':') {
            if let Some(finished) = current.take() {
                headers.push(finished);
            }
            current = Some((name.to_owned(), value.trim_start().to_owned()));
        }
    }

    // the last header has no successor to commit it
    if let Some(finished) = current {
        headers.push(finished);
    }

    headers
}

/// Extract the `boundary=` parameter of a Content-Type value
fn extract_boundary(content_type: &str) -> Option<String> {
    const PARAM: &str = "boundary=";

    let start = content_type.to_ascii_lowercase().find(PARAM)? + PARAM.len();
    let rest = &content_type[start..];

    let boundary = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or(quoted),
        None => rest.split(';').next().unwrap_or(rest).trim_end(),
    };

    (!boundary.is_empty()).then(|| boundary.to_owned())
}

struct TextPart {
    body: String,
    encoding: TransferEncoding,
}

/// Find the first `text/plain` part of a multipart body
fn select_text_part(body: &str, boundary: &str) -> Option<TextPart> {
    let delimiter = format!("--{boundary}");
    let mut segments = body.split(delimiter.as_str());

    // preamble
    segments.next();

    for segment in segments {
        if segment.starts_with("--") {
            break;
        }

        // the remainder of the delimiter line is not part of the part
        let Some(line_end) = segment.find('\n') else {
            continue;
        };
        let part = &segment[line_end + 1..];
        let part = part
            .strip_suffix("\r\n")
            .or_else(|| part.strip_suffix('\n'))
            .unwrap_or(part);

        let Some((header_section, part_body)) = split_header_body(part) else {
            continue;
        };

        let headers = parse_headers(header_section);
        let find = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        };

        let is_plain = find("Content-Type")
            .is_some_and(|value| value.to_ascii_lowercase().starts_with("text/plain"));
        if is_plain {
            return Some(TextPart {
                body: part_body.to_owned(),
                encoding: find("Content-Transfer-Encoding")
                    .map_or(TransferEncoding::Identity, TransferEncoding::from_header),
            });
        }
    }

    None
}
