//! Error taxonomy shared by the transport, the store client and the
//! listener.

use thiserror::Error;

/// Errors returned by mailbridge operations.
///
/// Each variant carries a stable [`kind`](Error::kind) so callers can
/// branch on the category without matching on messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Session or secure transport setup failed.
    #[error("failed to initialize session: {0}")]
    Init(String),

    /// Delivery failed. `rejected` lists the recipients the server refused.
    #[error("failed to send message: {message}")]
    Send {
        /// What went wrong.
        message: String,
        /// Recipients refused by the server, possibly empty.
        rejected: Vec<String>,
    },

    /// A single read from the mail store failed.
    #[error("failed to read message: {0}")]
    Read(String),

    /// The MIME structure could not be built or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// An address is not a valid RFC 822 mailbox.
    #[error("invalid address: {0}")]
    AddressFormat(String),

    /// Closing the mail store failed.
    #[error("failed to close mail store: {0}")]
    Close(String),

    /// A polling wait was cancelled.
    #[error("polling interrupted")]
    PollInterrupted,
}

impl Error {
    /// Stable name of the error category.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "InitError",
            Self::Send { .. } => "SendError",
            Self::Read(_) => "ReadError",
            Self::Codec(_) => "CodecError",
            Self::AddressFormat(_) => "AddressFormatError",
            Self::Close(_) => "CloseError",
            Self::PollInterrupted => "PollInterruptedError",
        }
    }

    /// Recipients rejected by the server; empty for anything but a send
    /// failure.
    #[must_use]
    pub fn rejected(&self) -> &[String] {
        match self {
            Self::Send { rejected, .. } => rejected,
            _ => &[],
        }
    }

    pub(crate) fn send(message: impl std::fmt::Display) -> Self {
        Self::Send {
            message: message.to_string(),
            rejected: Vec::new(),
        }
    }

    pub(crate) fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<mailbridge_mime::Error> for Error {
    fn from(err: mailbridge_mime::Error) -> Self {
        match err {
            mailbridge_mime::Error::InvalidAddress { .. } => Self::AddressFormat(err.to_string()),
            other => Self::Codec(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(format!("invalid JSON: {err}"))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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
    fn kinds_are_stable() {
        assert_eq!(Error::Init("x".into()).kind(), "InitError");
        assert_eq!(Error::send("x").kind(), "SendError");
        assert_eq!(Error::Read("x".into()).kind(), "ReadError");
        assert_eq!(Error::codec("x").kind(), "CodecError");
        assert_eq!(Error::AddressFormat("x".into()).kind(), "AddressFormatError");
        assert_eq!(Error::Close("x".into()).kind(), "CloseError");
        assert_eq!(Error::PollInterrupted.kind(), "PollInterruptedError");
    }

    #[test]
    fn rejected_only_on_send() {
        let err = Error::Send {
            message: "1 recipient rejected".into(),
            rejected: vec!["nobody@example.com".into()],
        };
        assert_eq!(err.rejected(), ["nobody@example.com"]);
        assert!(Error::Read("x".into()).rejected().is_empty());
    }

    #[test]
    fn mime_address_errors_map_to_address_format() {
        let err: Error = mailbridge_mime::Mailbox::parse("not-an-address")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "AddressFormatError");

        let err: Error = mailbridge_mime::ContentType::parse("garbage").unwrap_err().into();
        assert_eq!(err.kind(), "CodecError");
    }
}
