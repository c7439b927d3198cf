//! Line framing for the POP3 and IMAP protocols.
//!
//! Both protocols exchange CRLF-terminated lines. IMAP additionally embeds
//! `{n}` literals, and POP3 terminates multi-line replies with a lone dot.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal or multi-line body size.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Buffered line-oriented connection.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> std::fmt::Debug for FramedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedStream").finish_non_exhaustive()
    }
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads a single line, including its line ending.
    ///
    /// A bare LF is accepted as a line ending.
    ///
    /// # Errors
    ///
    /// Returns an error on EOF, I/O failure or an overlong line.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&buf[..=pos]);
                self.reader.consume(pos + 1);
                return Ok(line);
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
    }

    /// Reads one IMAP response, following any `{n}` literals it contains.
    ///
    /// # Errors
    ///
    /// Returns an error on EOF, I/O failure or an oversized literal.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                return Ok(response);
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }

            let start = response.len();
            response.resize(start + literal_len, 0);
            self.reader.read_exact(&mut response[start..]).await?;
        }
    }

    /// Reads a POP3 multi-line body up to the terminating `.` line.
    ///
    /// Dot-stuffing is undone and line endings are kept as CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error on EOF, I/O failure or an oversized body.
    pub async fn read_dot_terminated(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();

        loop {
            let line = self.read_line().await?;
            let content = trim_line_ending(&line);
            if content == b"." {
                return Ok(body);
            }

            let content = content.strip_prefix(b".").unwrap_or(content);
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");

            if body.len() > MAX_LITERAL_SIZE {
                return Err(Error::Protocol("multi-line reply too large".to_string()));
            }
        }
    }

    /// Writes a command to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Any buffered but unread data is lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Strips a trailing CRLF or LF.
pub(crate) fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Parses a literal length from the end of a line.
///
/// Matches `{123}` or the non-synchronizing `{123+}` before the line ending.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;

    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
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
    use tokio_test::io::Builder;

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY[] {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY[] {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
        assert_eq!(parse_literal_length(b"empty {}\r\n"), None);
    }

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc"), b"abc");
    }

    #[tokio::test]
    async fn test_read_response_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn test_literal_containing_newlines() {
        let mock = Builder::new()
            .read(b"* 2 FETCH (BODY[] {7}\r\na\r\nb\r\n)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 2 FETCH (BODY[] {7}\r\na\r\nb\r\n)\r\n");
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let header = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_read_dot_terminated_unstuffs() {
        let mock = Builder::new()
            .read(b"Subject: x\r\n\r\n..leading dot\r\nplain\r\n.\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let body = framed.read_dot_terminated().await.unwrap();
        assert_eq!(body, b"Subject: x\r\n\r\n.leading dot\r\nplain\r\n");
    }

    #[tokio::test]
    async fn test_eof_is_an_error() {
        let mock = Builder::new().read(b"partial").build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(framed.read_line().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = Builder::new().write(b"A0001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);
        framed.write_command(b"A0001 NOOP\r\n").await.unwrap();
    }
}
