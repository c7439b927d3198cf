//! MIME part trees.

use crate::classify;
use crate::content_type::{ContentType, generate_boundary};
use crate::encoding::{
    decode_base64, decode_quoted_printable, encode_base64_wrapped, encode_quoted_printable,
};
use crate::error::{Error, Result};
use crate::header::Headers;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt;

const CONTENT_TYPE: &str = "Content-Type";
const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// RFC 5322 hard line limit, excluding CRLF.
const MAX_7BIT_LINE: usize = 998;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Picks an encoding for leaf content that has none declared.
    ///
    /// Text content stays 7bit when it is already transport safe and falls
    /// back to quoted-printable otherwise; everything else is base64.
    #[must_use]
    pub fn choose(content_type: &str, data: &[u8]) -> Self {
        if !classify::is_text(content_type) {
            Self::Base64
        } else if is_seven_bit_safe(data) {
            Self::SevenBit
        } else {
            Self::QuotedPrintable
        }
    }

    fn encode(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64 => encode_base64_wrapped(data).into_bytes(),
            Self::QuotedPrintable => encode_quoted_printable(data).into_bytes(),
            Self::SevenBit | Self::EightBit | Self::Binary => data.to_vec(),
        }
    }

    fn decode(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(&String::from_utf8_lossy(data)),
            Self::QuotedPrintable => decode_quoted_printable(data),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(data.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// ASCII only, no NUL, CRLF line endings and no overlong lines.
fn is_seven_bit_safe(data: &[u8]) -> bool {
    let mut line_length = 0;
    for (i, byte) in data.iter().enumerate() {
        match byte {
            0 | 128.. => return false,
            b'\r' => {
                if data.get(i + 1) != Some(&b'\n') {
                    return false;
                }
            }
            b'\n' => {
                if i == 0 || data[i - 1] != b'\r' {
                    return false;
                }
                line_length = 0;
                continue;
            }
            _ => {}
        }
        line_length += 1;
        if line_length > MAX_7BIT_LINE {
            return false;
        }
    }
    true
}

/// Content of a part: scalar bytes or an ordered list of children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Decoded leaf content.
    Single(Vec<u8>),
    /// Child parts of a multipart container.
    Multipart(Vec<Part>),
}

/// MIME message part.
///
/// Leaf bodies are held decoded; transfer encoding happens in
/// [`Part::render`] and is undone by [`Part::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body.
    pub body: Body,
}

/// The protocol-level message: a root part.
pub type WireMessage = Part;

impl Part {
    /// Creates a leaf part with the given content type.
    #[must_use]
    pub fn single(content_type: &str, content: Vec<u8>) -> Self {
        let mut headers = Headers::new();
        headers.add(CONTENT_TYPE, content_type);
        Self {
            headers,
            body: Body::Single(content),
        }
    }

    /// Creates a text leaf part.
    #[must_use]
    pub fn text(content_type: &str, text: impl Into<String>) -> Self {
        Self::single(content_type, text.into().into_bytes())
    }

    /// Creates a multipart container.
    ///
    /// A boundary is generated when the content type does not carry one.
    #[must_use]
    pub fn multipart(mut content_type: ContentType, children: Vec<Self>) -> Self {
        if content_type.boundary().is_none() {
            content_type.set_parameter("boundary", generate_boundary());
        }
        let mut headers = Headers::new();
        headers.add(CONTENT_TYPE, content_type.to_string());
        Self {
            headers,
            body: Body::Multipart(children),
        }
    }

    /// Raw Content-Type header, `text/plain` when absent.
    #[must_use]
    pub fn content_type_raw(&self) -> &str {
        self.headers.get(CONTENT_TYPE).unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Parsed Content-Type.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        ContentType::parse(self.content_type_raw())
    }

    /// Declared transfer encoding, if any.
    #[must_use]
    pub fn transfer_encoding(&self) -> Option<TransferEncoding> {
        self.headers
            .get(CONTENT_TRANSFER_ENCODING)
            .map(TransferEncoding::parse)
    }

    /// Checks if this part holds children.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self.body, Body::Multipart(_))
    }

    /// Child parts; empty for a leaf.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match &self.body {
            Body::Multipart(children) => children,
            Body::Single(_) => &[],
        }
    }

    /// Leaf content; `None` for a multipart.
    #[must_use]
    pub fn content(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Single(content) => Some(content),
            Body::Multipart(_) => None,
        }
    }

    /// Leaf content as text, honouring a Latin-1 charset.
    ///
    /// # Errors
    ///
    /// Returns an error for a multipart or for content that is not valid
    /// UTF-8.
    pub fn text_content(&self) -> Result<String> {
        let content = self.content().ok_or_else(|| {
            Error::InvalidMultipart("multipart part has no scalar content".to_string())
        })?;

        let latin1 = self.content_type().ok().is_some_and(|ct| {
            ct.charset().is_some_and(|charset| {
                charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1")
            })
        });
        if latin1 {
            return Ok(content.iter().copied().map(char::from).collect());
        }
        String::from_utf8(content.to_vec()).map_err(Into::into)
    }

    /// Renders the part as RFC 5322 bytes.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        self.render_without(&[])
    }

    /// Renders the part, leaving out the named root headers.
    ///
    /// Used to strip `Bcc` before handing a message to SMTP.
    #[must_use]
    pub fn render_without(&self, skip: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out, skip);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>, skip: &[&str]) {
        let visible = |name: &str| !skip.iter().any(|s| s.eq_ignore_ascii_case(name));

        match &self.body {
            Body::Single(content) => {
                let declared = self.transfer_encoding();
                let encoding = declared
                    .unwrap_or_else(|| TransferEncoding::choose(self.content_type_raw(), content));

                for (name, value) in self.headers.iter().filter(|&(n, _)| visible(n)) {
                    write_header(out, name, value);
                }
                if declared.is_none() {
                    write_header(out, CONTENT_TRANSFER_ENCODING, &encoding.to_string());
                }
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(&encoding.encode(content));
            }
            Body::Multipart(children) => {
                let mut content_type = self
                    .content_type()
                    .unwrap_or_else(|_| ContentType::new("multipart", "mixed"));
                let boundary = if let Some(boundary) = content_type.boundary() {
                    boundary.to_string()
                } else {
                    let boundary = generate_boundary();
                    content_type.set_parameter("boundary", boundary.clone());
                    boundary
                };

                for (name, value) in self.headers.iter().filter(|&(n, _)| visible(n)) {
                    if name.eq_ignore_ascii_case(CONTENT_TYPE) {
                        write_header(out, name, &content_type.to_string());
                    } else {
                        write_header(out, name, value);
                    }
                }
                if !self.headers.contains(CONTENT_TYPE) {
                    write_header(out, CONTENT_TYPE, &content_type.to_string());
                }
                out.extend_from_slice(b"\r\n");

                for child in children {
                    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
                    child.write_to(out, &[]);
                    out.extend_from_slice(b"\r\n");
                }
                out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
            }
        }
    }

    /// Parses RFC 5322 bytes into a part tree.
    ///
    /// Multipart bodies are split on their boundary and parsed
    /// recursively; leaf bodies are transfer-decoded.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart part has no boundary or no parts,
    /// or if a transfer encoding cannot be decoded.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (header_bytes, body_bytes) = split_header_block(data);
        let headers = Headers::parse(&String::from_utf8_lossy(header_bytes));

        let raw_type = headers.get(CONTENT_TYPE).unwrap_or(DEFAULT_CONTENT_TYPE);
        if classify::is_multipart(raw_type) {
            let content_type = ContentType::parse(raw_type)?;
            let boundary = content_type
                .boundary()
                .ok_or_else(|| Error::MissingBoundary(raw_type.to_string()))?;
            let children = split_multipart(body_bytes, boundary)?
                .into_iter()
                .map(Self::parse)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self {
                headers,
                body: Body::Multipart(children),
            });
        }

        let encoding = headers
            .get(CONTENT_TRANSFER_ENCODING)
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
        let content = encoding.decode(body_bytes)?;
        Ok(Self {
            headers,
            body: Body::Single(content),
        })
    }
}

fn write_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Splits at the first empty line.
fn split_header_block(data: &[u8]) -> (&[u8], &[u8]) {
    if let Some(rest) = data.strip_prefix(b"\r\n") {
        return (&[], rest);
    }
    if let Some(rest) = data.strip_prefix(b"\n") {
        return (&[], rest);
    }

    let crlf = find(data, b"\r\n\r\n").map(|i| (i, i + 4));
    let lf = find(data, b"\n\n").map(|i| (i, i + 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match split {
        Some((end, body_start)) => (&data[..end], &data[body_start..]),
        None => (data, &[]),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Returns the raw bytes of each child between boundary delimiters.
///
/// The line break preceding a delimiter belongs to the delimiter. A missing
/// close delimiter ends the last child at the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut children = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut line_start = 0;

    while line_start < body.len() {
        let next_line = body[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| line_start + i + 1);
        let line = trim_line_end(&body[line_start..next_line]);

        if let Some(rest) = line.strip_prefix(delimiter) {
            let closing = rest.starts_with(b"--");
            if closing || rest.iter().all(u8::is_ascii_whitespace) {
                if let Some(start) = current_start.take() {
                    children.push(strip_trailing_newline(&body[start..line_start]));
                }
                if closing {
                    break;
                }
                current_start = Some(next_line);
            }
        }
        line_start = next_line;
    }

    if let Some(start) = current_start {
        children.push(strip_trailing_newline(&body[start.min(body.len())..]));
    }

    if children.is_empty() {
        return Err(Error::InvalidMultipart(format!(
            "no parts found for boundary {boundary}"
        )));
    }
    Ok(children)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b'\n'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

fn strip_trailing_newline(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\r\n")
        .or_else(|| data.strip_suffix(b"\n"))
        .unwrap_or(data)
}

/// Generates a unique `Message-ID` value for the given domain.
#[must_use]
pub fn generate_message_id(domain: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let domain = if domain.is_empty() { "localhost" } else { domain };
    format!("<{token}@{domain}>")
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

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_transfer_encoding_choose() {
        assert_eq!(
            TransferEncoding::choose("text/plain", b"plain\r\nascii"),
            TransferEncoding::SevenBit
        );
        assert_eq!(
            TransferEncoding::choose("text/plain", "héllo".as_bytes()),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(
            TransferEncoding::choose("text/plain", b"bare\nnewline"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(
            TransferEncoding::choose("image/png", b"ascii"),
            TransferEncoding::Base64
        );
    }

    #[test]
    fn test_single_part_render() {
        let part = Part::text("text/plain", "Hello, World!");
        let wire = String::from_utf8(part.render()).unwrap();
        assert_eq!(
            wire,
            "Content-Type: text/plain\r\nContent-Transfer-Encoding: 7bit\r\n\r\nHello, World!"
        );
    }

    #[test]
    fn test_render_without_skips_root_header() {
        let mut part = Part::text("text/plain", "hi");
        part.headers.add("Bcc", "hidden@example.com");
        let wire = String::from_utf8(part.render_without(&["bcc"])).unwrap();
        assert!(!wire.contains("hidden@example.com"));
        assert!(part.headers.contains("Bcc"));
    }

    #[test]
    fn test_multipart_render_parse() {
        let root = Part::multipart(
            ContentType::multipart("alternative"),
            vec![
                Part::text("text/plain", "Plain"),
                Part::text("text/html", "<p>Html</p>"),
            ],
        );

        let parsed = Part::parse(&root.render()).unwrap();
        assert!(parsed.is_multipart());
        assert_eq!(parsed.children().len(), 2);
        assert_eq!(parsed.children()[0].content_type_raw(), "text/plain");
        assert_eq!(parsed.children()[0].text_content().unwrap(), "Plain");
        assert_eq!(parsed.children()[1].text_content().unwrap(), "<p>Html</p>");
    }

    #[test]
    fn test_nested_multipart_and_binary() {
        let bytes: Vec<u8> = (0..=255).collect();
        let inner = Part::multipart(
            ContentType::multipart("mixed"),
            vec![
                Part::text("text/plain", "inner one"),
                Part::single("application/octet-stream", bytes.clone()),
            ],
        );
        let root = Part::multipart(
            ContentType::multipart("mixed"),
            vec![Part::text("text/plain", "body"), inner],
        );

        let parsed = Part::parse(&root.render()).unwrap();
        let nested = &parsed.children()[1];
        assert!(nested.is_multipart());
        assert_eq!(nested.children().len(), 2);
        assert_eq!(nested.children()[1].content(), Some(bytes.as_slice()));
        assert_eq!(
            nested.children()[1].transfer_encoding(),
            Some(TransferEncoding::Base64)
        );
    }

    #[test]
    fn test_parse_quoted_printable_leaf() {
        let raw = b"Content-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\nH=C3=A9llo=\r\n world";
        let part = Part::parse(raw).unwrap();
        assert_eq!(part.text_content().unwrap(), "Héllo world");
    }

    #[test]
    fn test_parse_latin1_text() {
        let raw = b"Content-Type: text/plain; charset=ISO-8859-1\r\n\r\ncaf\xE9";
        let part = Part::parse(raw).unwrap();
        assert_eq!(part.text_content().unwrap(), "café");
    }

    #[test]
    fn test_parse_without_headers_defaults_to_text() {
        let part = Part::parse(b"\r\njust a body").unwrap();
        assert!(part.headers.is_empty());
        assert_eq!(part.content_type_raw(), "text/plain");
        assert_eq!(part.content(), Some(&b"just a body"[..]));
    }

    #[test]
    fn test_parse_missing_boundary() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\n--x\r\n\r\na\r\n--x--\r\n";
        assert!(matches!(Part::parse(raw), Err(Error::MissingBoundary(_))));
    }

    #[test]
    fn test_parse_multipart_with_preamble_and_lf_endings() {
        let raw = b"Content-Type: multipart/mixed; boundary=\"b1\"\n\nThis is a preamble\n--b1\nContent-Type: text/plain\n\nfirst\n--b1\n\nsecond\n--b1--\nepilogue\n";
        let part = Part::parse(raw).unwrap();
        assert_eq!(part.children().len(), 2);
        assert_eq!(part.children()[0].text_content().unwrap(), "first");
        assert_eq!(part.children()[1].text_content().unwrap(), "second");
    }

    #[test]
    fn test_parse_multipart_without_parts() {
        let raw = b"Content-Type: multipart/mixed; boundary=b1\r\n\r\nnothing here\r\n";
        assert!(matches!(Part::parse(raw), Err(Error::InvalidMultipart(_))));
    }

    #[test]
    fn test_generate_message_id() {
        let a = generate_message_id("example.com");
        let b = generate_message_id("example.com");
        assert!(a.starts_with('<') && a.ends_with("@example.com>"));
        assert_ne!(a, b);
    }
}
