//! Connection configuration for the SMTP transport and the mail stores.
//!
//! Every record derives `serde` so it can be loaded from any format; all
//! fields have defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Folder read when none is configured.
pub const DEFAULT_FOLDER: &str = "INBOX";

/// Transport security posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// Upgrade with STARTTLS when the server offers it.
    StartTlsAuto,
    /// Require a STARTTLS upgrade.
    StartTlsAlways,
    /// Plain text only.
    StartTlsNever,
    /// Implicit TLS from the first byte.
    #[default]
    Ssl,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::StartTlsAuto => "STARTTLS (when offered)",
            Self::StartTlsAlways => "STARTTLS (required)",
            Self::StartTlsNever => "None (insecure)",
            Self::Ssl => "SSL/TLS",
        }
    }
}

/// TLS protocol restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsProtocol {
    /// Protocol family name, e.g. `TLS`.
    pub name: String,
    /// Allowed versions, e.g. `TLSv1.2`, `TLSv1.3`. Empty allows all.
    #[serde(default)]
    pub versions: Vec<String>,
}

/// Custom trust and cipher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecureSocket {
    /// PEM file whose certificates replace the default trust roots.
    pub cert: Option<PathBuf>,
    /// Protocol version restriction.
    pub protocol: Option<TlsProtocol>,
    /// Allowed cipher suites by IANA name.
    pub ciphers: Option<Vec<String>>,
    /// Whether the certificate must match the host name.
    pub verify_hostname: bool,
}

impl Default for SecureSocket {
    fn default() -> Self {
        Self {
            cert: None,
            protocol: None,
            ciphers: None,
            verify_hostname: true,
        }
    }
}

/// SMTP transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Server port.
    pub port: u16,
    /// Security posture.
    pub security: Security,
    /// Custom TLS settings.
    pub secure_socket: Option<SecureSocket>,
    /// Deliver to the accepted recipients when some are rejected.
    pub send_partial: bool,
    /// Name announced in EHLO.
    pub client_hostname: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            port: 465,
            security: Security::default(),
            secure_socket: None,
            send_partial: false,
            client_hostname: "localhost".to_string(),
        }
    }
}

/// POP3 store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopConfig {
    /// Server port.
    pub port: u16,
    /// Security posture.
    pub security: Security,
    /// Custom TLS settings.
    pub secure_socket: Option<SecureSocket>,
}

impl Default for PopConfig {
    fn default() -> Self {
        Self {
            port: 995,
            security: Security::default(),
            secure_socket: None,
        }
    }
}

/// IMAP store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapConfig {
    /// Server port.
    pub port: u16,
    /// Security posture.
    pub security: Security,
    /// Custom TLS settings.
    pub secure_socket: Option<SecureSocket>,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            port: 993,
            security: Security::default(),
            secure_socket: None,
        }
    }
}

/// Mail store protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    /// POP3: read messages are deleted.
    Pop,
    /// IMAP: read messages are marked seen.
    #[default]
    Imap,
}

/// Connection settings for one mail store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings<'a> {
    /// Server port.
    pub port: u16,
    /// Security posture.
    pub security: Security,
    /// Custom TLS settings.
    pub secure_socket: Option<&'a SecureSocket>,
}

impl<'a> From<&'a PopConfig> for StoreSettings<'a> {
    fn from(config: &'a PopConfig) -> Self {
        Self {
            port: config.port,
            security: config.security,
            secure_socket: config.secure_socket.as_ref(),
        }
    }
}

impl<'a> From<&'a ImapConfig> for StoreSettings<'a> {
    fn from(config: &'a ImapConfig) -> Self {
        Self {
            port: config.port,
            security: config.security,
            secure_socket: config.secure_socket.as_ref(),
        }
    }
}

/// Inbox listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Mail store host.
    pub host: String,
    /// Login name.
    pub username: String,
    /// Login secret.
    pub password: String,
    /// Store protocol.
    pub protocol: Protocol,
    /// Time between poll cycles.
    pub polling_interval: Duration,
    /// Folder to read.
    pub folder: String,
    /// Settings used when `protocol` is [`Protocol::Pop`].
    pub pop: PopConfig,
    /// Settings used when `protocol` is [`Protocol::Imap`].
    pub imap: ImapConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            protocol: Protocol::default(),
            polling_interval: Duration::from_secs(60),
            folder: DEFAULT_FOLDER.to_string(),
            pop: PopConfig::default(),
            imap: ImapConfig::default(),
        }
    }
}

impl ListenerConfig {
    /// Settings for the configured protocol.
    #[must_use]
    pub fn store_settings(&self) -> StoreSettings<'_> {
        match self.protocol {
            Protocol::Pop => (&self.pop).into(),
            Protocol::Imap => (&self.imap).into(),
        }
    }
}

/// Concrete session properties derived from a security posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProperties {
    /// Attempt a STARTTLS upgrade.
    pub starttls_enabled: bool,
    /// Fail when STARTTLS is not offered.
    pub starttls_required: bool,
    /// Use implicit TLS.
    pub ssl_enabled: bool,
    /// A TLS provider is configured explicitly.
    pub tls_provider: bool,
    /// Check the certificate against the host name.
    pub verify_hostname: bool,
}

impl SessionProperties {
    /// Maps a posture and optional custom TLS settings to properties.
    ///
    /// Custom TLS settings install a provider and enable STARTTLS under
    /// every posture.
    #[must_use]
    pub fn resolve(security: Security, secure_socket: Option<&SecureSocket>) -> Self {
        let mut props = match security {
            Security::StartTlsAuto => Self {
                starttls_enabled: true,
                starttls_required: false,
                ssl_enabled: false,
                tls_provider: false,
                verify_hostname: true,
            },
            Security::StartTlsAlways => Self {
                starttls_enabled: true,
                starttls_required: true,
                ssl_enabled: false,
                tls_provider: true,
                verify_hostname: true,
            },
            Security::StartTlsNever => Self {
                starttls_enabled: false,
                starttls_required: false,
                ssl_enabled: false,
                tls_provider: false,
                verify_hostname: true,
            },
            Security::Ssl => Self {
                starttls_enabled: true,
                starttls_required: false,
                ssl_enabled: true,
                tls_provider: true,
                verify_hostname: true,
            },
        };

        if let Some(socket) = secure_socket {
            props.tls_provider = true;
            props.starttls_enabled = true;
            props.verify_hostname = socket.verify_hostname;
        }
        props
    }

    /// Logs the properties for `host:port`.
    pub(crate) fn log(&self, protocol: &str, host: &str, port: u16, username: &str) {
        debug!(
            protocol,
            host,
            port,
            username,
            auth = true,
            starttls_enabled = self.starttls_enabled,
            starttls_required = self.starttls_required,
            ssl_enabled = self.ssl_enabled,
            tls_provider = self.tls_provider,
            verify_hostname = self.verify_hostname,
            "session properties"
        );
    }
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
    fn defaults() {
        assert_eq!(SmtpConfig::default().port, 465);
        assert_eq!(SmtpConfig::default().client_hostname, "localhost");
        assert!(!SmtpConfig::default().send_partial);
        assert_eq!(PopConfig::default().port, 995);
        assert_eq!(ImapConfig::default().port, 993);
        assert_eq!(Security::default(), Security::Ssl);

        let listener = ListenerConfig::default();
        assert_eq!(listener.folder, "INBOX");
        assert_eq!(listener.polling_interval, Duration::from_secs(60));
        assert!(SecureSocket::default().verify_hostname);
    }

    #[test]
    fn four_postures_are_distinct() {
        let all = [
            Security::StartTlsAuto,
            Security::StartTlsAlways,
            Security::StartTlsNever,
            Security::Ssl,
        ]
        .map(|security| SessionProperties::resolve(security, None));

        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(all[3].ssl_enabled);
        assert!(all[1].starttls_required);
        assert!(!all[2].starttls_enabled);
    }

    #[test]
    fn secure_socket_controls_hostname_check() {
        let socket = SecureSocket {
            verify_hostname: false,
            ..SecureSocket::default()
        };
        let props = SessionProperties::resolve(Security::StartTlsNever, Some(&socket));
        assert!(props.tls_provider);
        assert!(props.starttls_enabled);
        assert!(!props.verify_hostname);
    }

    #[test]
    fn listener_picks_protocol_settings() {
        let mut config = ListenerConfig {
            protocol: Protocol::Pop,
            ..ListenerConfig::default()
        };
        assert_eq!(config.store_settings().port, 995);
        config.protocol = Protocol::Imap;
        config.imap.port = 143;
        config.imap.security = Security::StartTlsAlways;
        let settings = config.store_settings();
        assert_eq!(settings.port, 143);
        assert_eq!(settings.security, Security::StartTlsAlways);
    }

    #[test]
    fn deserializes_partial_json() {
        let config: SmtpConfig =
            serde_json::from_str(r#"{"port": 587, "security": "StartTlsAlways"}"#).unwrap();
        assert_eq!(config.port, 587);
        assert_eq!(config.security, Security::StartTlsAlways);
        assert_eq!(config.client_hostname, "localhost");

        let socket: SecureSocket =
            serde_json::from_str(r#"{"cert": "/etc/ssl/ca.pem", "ciphers": ["TLS_AES_128_GCM_SHA256"]}"#)
                .unwrap();
        assert!(socket.verify_hostname);
        assert_eq!(socket.ciphers.unwrap().len(), 1);
    }
}
