//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 header encoding.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum line length for encoded bodies.
const MAX_LINE_LENGTH: usize = 76;

/// Longest payload that fits one 75-character `=?utf-8?B?...?=` word.
const MAX_WORD_BYTES: usize = 45;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 split into CRLF-separated 76-column lines.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2);
    for (i, chunk) in encoded.as_bytes().chunks(MAX_LINE_LENGTH).enumerate() {
        if i > 0 {
            result.push_str("\r\n");
        }
        // Base64 output is pure ASCII, so every chunk is valid UTF-8.
        result.push_str(&String::from_utf8_lossy(chunk));
    }
    result
}

/// Decodes Base64 data, ignoring line breaks and other whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact).map_err(Into::into)
}

/// Encodes bytes using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks in the input are escaped too, so decoding returns exactly
/// the original bytes. Output lines never exceed 76 characters.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len());
    let mut line_length = 0;

    for (i, byte) in data.iter().enumerate() {
        if line_length >= MAX_LINE_LENGTH - 3 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        let last = i + 1 == data.len();
        match byte {
            b'!'..=b'<' | b'>'..=b'~' => {
                result.push(char::from(*byte));
                line_length += 1;
            }
            // Trailing whitespace may be stripped in transit.
            b' ' | b'\t' if !last => {
                result.push(char::from(*byte));
                line_length += 1;
            }
            _ => {
                let _ = write!(result, "={byte:02X}");
                line_length += 3;
            }
        }
    }

    result
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        match data.get(i + 1..) {
            Some([b'\r', b'\n', ..]) => i += 3,
            Some([b'\n', ..]) => i += 2,
            Some([hi, lo, ..]) => {
                let decoded = hex_value(*hi)
                    .zip(hex_value(*lo))
                    .map(|(h, l)| (h << 4) | l)
                    .ok_or_else(|| {
                        Error::InvalidEncoding(format!(
                            "Invalid hex escape: ={}{}",
                            char::from(*hi),
                            char::from(*lo)
                        ))
                    })?;
                result.push(decoded);
                i += 3;
            }
            _ => {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(result)
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

/// Encodes a header value using RFC 2047 encoding.
///
/// Values that are plain printable ASCII are returned unchanged. Anything
/// else becomes one or more `=?charset?B?...?=` words separated by spaces,
/// each within the 75-character limit.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_rfc2047(text: &str, charset: &str) -> Result<String> {
    let needs_encoding = text.contains("=?")
        || text
            .chars()
            .any(|c| !c.is_ascii() || (c.is_ascii_control() && c != '\t'));
    if !needs_encoding {
        return Ok(text.to_string());
    }

    let mut words = Vec::new();
    let mut chunk_start = 0;
    for (index, c) in text.char_indices() {
        if index + c.len_utf8() - chunk_start > MAX_WORD_BYTES {
            words.push(&text[chunk_start..index]);
            chunk_start = index;
        }
    }
    words.push(&text[chunk_start..]);

    Ok(words
        .into_iter()
        .map(|chunk| format!("=?{charset}?B?{}?=", encode_base64(chunk.as_bytes())))
        .collect::<Vec<_>>()
        .join(" "))
}

/// Decodes RFC 2047 encoded words anywhere in a header value.
///
/// Whitespace between two adjacent encoded words is dropped. Text that only
/// looks like the start of an encoded word is kept as-is.
///
/// # Errors
///
/// Returns an error if a well-formed encoded word carries an unknown
/// encoding or undecodable payload.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_word = false;

    while let Some(word) = next_encoded_word(rest) {
        let between = &rest[..word.start];
        if !(after_word && between.chars().all(char::is_whitespace)) {
            result.push_str(between);
        }
        result.push_str(&word.decode()?);
        rest = &rest[word.end..];
        after_word = true;
    }
    result.push_str(rest);

    Ok(result)
}

struct EncodedWord<'a> {
    start: usize,
    end: usize,
    charset: &'a str,
    encoding: &'a str,
    text: &'a str,
}

impl EncodedWord<'_> {
    fn decode(&self) -> Result<String> {
        let bytes = match self.encoding {
            "B" | "b" => decode_base64(self.text)?,
            "Q" | "q" => decode_quoted_printable(self.text.replace('_', " ").as_bytes())?,
            other => {
                return Err(Error::InvalidEncoding(format!("Unknown encoding: {other}")));
            }
        };

        // RFC 2231 allows a language suffix: charset*lang
        let charset = self.charset.split('*').next().unwrap_or_default();
        if charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1") {
            Ok(bytes.into_iter().map(char::from).collect())
        } else {
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn next_encoded_word(s: &str) -> Option<EncodedWord<'_>> {
    let mut from = 0;
    while let Some(offset) = s[from..].find("=?") {
        let start = from + offset;
        if let Some(word) = encoded_word_at(s, start) {
            return Some(word);
        }
        from = start + 2;
    }
    None
}

fn encoded_word_at(s: &str, start: usize) -> Option<EncodedWord<'_>> {
    let (charset, rest) = s[start + 2..].split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let close = rest.find("?=")?;
    let text = &rest[..close];

    if charset.is_empty()
        || charset.contains(char::is_whitespace)
        || encoding.len() != 1
        || text.contains(char::is_whitespace)
    {
        return None;
    }

    Some(EncodedWord {
        start,
        end: s.len() - rest.len() + close + 2,
        charset,
        encoding,
        text,
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_wrapped_lines() {
        let data = vec![0xAB_u8; 200];
        let encoded = encode_base64_wrapped(&data);
        assert!(encoded.split("\r\n").all(|line| line.len() <= 76));
        assert_eq!(decode_base64(&encoded).unwrap(), data);
    }

    #[test]
    fn test_quoted_printable_encode() {
        assert_eq!(encode_quoted_printable(b"Hello, World!"), "Hello, World!");

        let encoded = encode_quoted_printable("Héllo, Wørld!".as_bytes());
        assert!(encoded.contains("=C3=A9"));
    }

    #[test]
    fn test_quoted_printable_escapes_trailing_space_and_newlines() {
        assert_eq!(encode_quoted_printable(b"a\r\nb "), "a=0D=0Ab=20");
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello").unwrap(), b"Hello");
        assert_eq!(
            decode_quoted_printable(b"H=C3=A9llo").unwrap(),
            "Héllo".as_bytes()
        );
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(
            decode_quoted_printable(b"Hello=\r\nWorld").unwrap(),
            b"HelloWorld"
        );
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld").unwrap(), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        assert!(decode_quoted_printable(b"bad=ZZ").is_err());
        assert!(decode_quoted_printable(b"short=4").is_err());
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello", "utf-8").unwrap(), "Hello");

        let encoded = encode_rfc2047("Héllo", "utf-8").unwrap();
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?="));
    }

    #[test]
    fn test_rfc2047_long_value_splits_words() {
        let text = "ü".repeat(60);
        let encoded = encode_rfc2047(&text, "utf-8").unwrap();
        assert!(encoded.split(' ').count() > 1);
        assert!(encoded.split(' ').all(|word| word.len() <= 75));
        assert_eq!(decode_rfc2047(&encoded).unwrap(), text);
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
    }

    #[test]
    fn test_rfc2047_quoted_printable() {
        assert_eq!(
            decode_rfc2047("=?utf-8?Q?H=C3=A9llo_there?=").unwrap(),
            "Héllo there"
        );
    }

    #[test]
    fn test_rfc2047_mixed_text_and_words() {
        let decoded = decode_rfc2047("Re: =?utf-8?B?SMOp?= =?utf-8?B?bGxv?= again").unwrap();
        assert_eq!(decoded, "Re: Héllo again");
    }

    #[test]
    fn test_rfc2047_latin1() {
        assert_eq!(decode_rfc2047("=?ISO-8859-1?Q?caf=E9?=").unwrap(), "café");
    }

    #[test]
    fn test_rfc2047_lookalike_is_literal() {
        assert_eq!(decode_rfc2047("price =? 5").unwrap(), "price =? 5");
    }

    proptest! {
        #[test]
        fn quoted_printable_is_lossless(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode_quoted_printable(&data);
            prop_assert!(encoded.split("\r\n").all(|line| line.len() <= 76));
            prop_assert_eq!(decode_quoted_printable(encoded.as_bytes()).unwrap(), data);
        }

        #[test]
        fn rfc2047_is_lossless(text in "\\PC{0,80}") {
            let encoded = encode_rfc2047(&text, "utf-8").unwrap();
            prop_assert_eq!(decode_rfc2047(&encoded).unwrap(), text);
        }
    }
}
