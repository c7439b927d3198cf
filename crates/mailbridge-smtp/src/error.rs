//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error, including TLS handshake failures.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Server returned an error reply.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (malformed or unexpected reply).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid envelope address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Host name cannot be used for TLS server name indication.
    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    /// Message exceeds the size the server advertised.
    #[error("Message of {size} bytes exceeds server limit of {limit} bytes")]
    MessageTooLarge {
        /// Message size.
        size: usize,
        /// Advertised SIZE limit.
        limit: usize,
    },

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }
}

impl From<&crate::types::Reply> for Error {
    fn from(reply: &crate::types::Reply) -> Self {
        Self::smtp_error(reply.code.as_u16(), reply.message_text())
    }
}
