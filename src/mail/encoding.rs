//! Transfer encodings and text cleanup used by the decoder

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mail_parser::MessageParser;

/// Decode a quoted-printable string into raw bytes.
///
/// `=HH` becomes the byte `0xHH`, `=` followed by a line break is a soft
/// line break and disappears, and any other `=` is kept literally.
pub fn decode_quoted_printable(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'=' {
            decoded.push(bytes[i]);
            i += 1;
            continue;
        }

        match (bytes.get(i + 1), bytes.get(i + 2)) {
            (Some(&hi), Some(&lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                decoded.push((hex_value(hi) << 4) | hex_value(lo));
                i += 3;
            }
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\r' | b'\n'), _) => i += 2,
            _ => {
                decoded.push(b'=');
                i += 1;
            }
        }
    }

    decoded
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// Decode base64 content, ignoring embedded line breaks and other whitespace.
///
/// Returns `None` when the content is not valid base64.
pub fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let compact: Vec<u8> = input
        .bytes()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact).ok()
}

/// Remove every `<...>` span, keeping only the text outside of tags.
///
/// A `<` without a closing `>` is left as text.
pub fn strip_html_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        text.push_str(&rest[..open]);
        rest = &rest[open + close + 1..];
    }

    text.push_str(rest);
    text
}

/// Decode RFC 2047 encoded words (`=?charset?B?...?=`, `=?charset?Q?...?=`)
/// found in an unstructured header value.
///
/// The value is handed to `mail-parser` as a `Subject` field so that every
/// charset it knows is converted. Values without encoded words are only
/// trimmed.
pub fn decode_encoded_words(value: &str) -> String {
    let value = value.trim();
    if !value.contains("=?") {
        return value.to_owned();
    }

    let header = format!("Subject: {value}\r\n\r\n");
    MessageParser::default()
        .parse(header.as_bytes())
        .and_then(|message| message.subject().map(str::to_owned))
        .unwrap_or_else(|| value.to_owned())
}
