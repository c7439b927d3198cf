//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{Authenticated, Client, Connected, Data, MailTransaction, SmtpConnection};
pub use stream::{SmtpStream, connect, connect_tls};

use crate::types::{AuthMechanism, Extension};

/// Server capabilities from the greeting and EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions, in advertised order.
    pub extensions: Vec<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms; `None` when AUTH is
    /// not advertised at all.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Option<&[AuthMechanism]> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Auth(mechanisms) => Some(mechanisms.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_lookup() {
        let info = ServerInfo {
            hostname: "mx.example.com".to_string(),
            extensions: vec![
                Extension::Size(Some(1024)),
                Extension::Auth(vec![AuthMechanism::Login]),
                Extension::StartTls,
            ],
        };
        assert!(info.supports_starttls());
        assert_eq!(info.max_message_size(), Some(1024));
        assert_eq!(info.auth_mechanisms(), Some(&[AuthMechanism::Login][..]));
        assert_eq!(ServerInfo::default().auth_mechanisms(), None);
    }
}
