//! SMTP reply types.

use crate::error::{Error, Result};

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply message lines, code and separator stripped.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Parses the lines of a complete (possibly multi-line) reply.
    ///
    /// - Single: `250 OK`
    /// - Multi: `250-First`, `250-Second`, `250 Last`
    ///
    /// # Errors
    ///
    /// Returns an error if the reply is empty, a line has no three-digit
    /// code, or the lines disagree on the code.
    pub fn parse(lines: &[String]) -> Result<Self> {
        let first = lines
            .first()
            .ok_or_else(|| Error::Protocol("Empty reply".into()))?;
        let code = parse_code(first)?;

        let message = lines
            .iter()
            .map(|line| {
                if parse_code(line)? != code {
                    return Err(Error::Protocol(format!(
                        "Reply code changed mid-reply: {line}"
                    )));
                }
                Ok(line.get(4..).unwrap_or_default().to_string())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(ReplyCode::new(code), message))
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient_error(&self) -> bool {
        self.code.is_transient()
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code.is_permanent()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }
}

fn parse_code(line: &str) -> Result<u16> {
    let code = line
        .get(..3)
        .ok_or_else(|| Error::Protocol(format!("Reply too short: {line}")))?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Protocol(format!("Invalid reply code: {code}")));
    }
    match line.as_bytes().get(3) {
        None | Some(b' ' | b'-') => {}
        Some(_) => return Err(Error::Protocol(format!("Malformed reply line: {line}"))),
    }
    code.parse()
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {code}")))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Continuation lines use `-` after the code; the last line uses a space
/// or ends right after the code.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    match line.as_bytes().get(3) {
        Some(b' ') => true,
        Some(_) => false,
        None => line.len() == 3,
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCEEDED: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 450 Mailbox unavailable (busy)
    pub const MAILBOX_BUSY: Self = Self(450);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable (not found, access denied)
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);

    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parse_single_line() {
        let reply = Reply::parse(&lines(&["250 OK"])).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.message, vec!["OK"]);
        assert!(reply.is_success());
    }

    #[test]
    fn parse_multi_line() {
        let reply = Reply::parse(&lines(&[
            "250-mail.example.com",
            "250-AUTH PLAIN",
            "250 SIZE 1000",
        ]))
        .unwrap();
        assert_eq!(
            reply.message,
            vec!["mail.example.com", "AUTH PLAIN", "SIZE 1000"]
        );
        assert_eq!(reply.message_text(), "mail.example.com\nAUTH PLAIN\nSIZE 1000");
    }

    #[test]
    fn parse_bare_code() {
        let reply = Reply::parse(&lines(&["354"])).unwrap();
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn parse_errors() {
        assert!(Reply::parse(&[]).is_err());
        assert!(Reply::parse(&lines(&["25"])).is_err());
        assert!(Reply::parse(&lines(&["ABC OK"])).is_err());
        assert!(Reply::parse(&lines(&["250xOK"])).is_err());
        assert!(Reply::parse(&lines(&["250-a", "251 b"])).is_err());
    }

    #[test]
    fn last_line_detection() {
        assert!(is_last_reply_line("250 OK"));
        assert!(is_last_reply_line("250"));
        assert!(!is_last_reply_line("250-Continuing"));
    }

    #[test]
    fn code_classes() {
        assert!(ReplyCode::SERVICE_READY.is_success());
        assert!(ReplyCode::AUTH_CONTINUE.is_intermediate());
        assert!(ReplyCode::MAILBOX_BUSY.is_transient());
        assert!(ReplyCode::MAILBOX_UNAVAILABLE.is_permanent());
        assert!(ReplyCode::OK < ReplyCode::MAILBOX_BUSY);
        assert_eq!(ReplyCode::AUTH_FAILED.to_string(), "535");
    }
}
