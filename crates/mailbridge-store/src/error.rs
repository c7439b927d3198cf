//! Error types for the mail store clients.

use thiserror::Error;

/// Errors that can occur during POP3 or IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations, including TLS handshakes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Login was refused.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// IMAP server returned NO.
    #[error("Server returned NO: {0}")]
    No(String),

    /// IMAP server returned BAD.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// IMAP server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// POP3 server returned -ERR.
    #[error("Server returned -ERR: {0}")]
    Err(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
