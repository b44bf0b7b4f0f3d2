//! Decoding of received messages into the text relayed to Telegram
//!
//! Decoding is best effort and never fails: input that cannot be understood
//! is passed through as an unstructured body.

mod decode;
mod encoding;

pub use decode::{DecodedMessage, decode};
pub use encoding::{
    decode_base64, decode_encoded_words, decode_quoted_printable, strip_html_tags,
};
