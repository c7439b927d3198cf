//! # mailbridge
//!
//! Structured email over the standard mail protocols.
//!
//! This crate provides:
//! - [`EmailMessage`]: a structured message with typed bodies and attachments
//! - [`codec`]: conversion between structured messages and MIME
//! - [`SmtpClient`]: delivery over SMTP with STARTTLS or implicit TLS
//! - [`MailStoreClient`]: reading unseen messages from POP3 or IMAP
//! - [`EmailListener`]: periodic polling that fans messages out to
//!   [`EmailConsumer`]s
//!
//! ```ignore
//! use mailbridge::{EmailMessage, SmtpClient, SmtpConfig};
//!
//! let client = SmtpClient::open("smtp.example.com", "me@example.com", "secret", SmtpConfig::default())?;
//! client
//!     .send(&EmailMessage::new("you@example.com", "Hello", "Sent with mailbridge"))
//!     .await?;
//! ```

#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod dispatch;
mod error;
pub mod listener;
pub mod message;
pub mod poll;
pub mod store;
pub mod tls;
pub mod transport;
pub mod xml;

pub use config::{
    ImapConfig, ListenerConfig, PopConfig, Protocol, SecureSocket, Security, SmtpConfig,
    StoreSettings, TlsProtocol,
};
pub use dispatch::{ConsumerRegistry, DispatchHandle, EmailConsumer, HandlerResult};
pub use error::{Error, Result};
pub use listener::EmailListener;
pub use message::{AddressList, Attachment, EmailMessage, Entity, EntityBody, MessageBody};
pub use store::{ImapStore, MailStore, MailStoreClient, Pop3Store, UnseenMessage};
pub use transport::SmtpClient;
pub use xml::XmlElement;
