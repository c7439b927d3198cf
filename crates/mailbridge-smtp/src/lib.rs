//! # mailbridge-smtp
//!
//! SMTP submission client (RFC 5321) used by the mailbridge transport.
//!
//! ## Features
//!
//! - **Type-state sessions**: invalid command sequences do not compile
//! - **TLS**: implicit TLS and STARTTLS, with the connector supplied by the
//!   caller
//! - **Authentication**: PLAIN and LOGIN
//! - **Per-recipient replies**: `RCPT TO` rejections are returned, not
//!   raised, so callers can decide between partial delivery and abort
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailbridge_smtp::{Address, Client};
//! use mailbridge_smtp::connection::connect_tls;
//!
//! let stream = connect_tls("smtp.example.com", 465, &connector).await?;
//! let client = Client::from_stream(stream).await?.ehlo("localhost").await?;
//! let client = client.authenticate("user@example.com", "secret").await?;
//!
//! let mut txn = client.mail_from(&Address::new("user@example.com")?, None).await?;
//! let reply = txn.rcpt_to(&Address::new("friend@example.com")?).await?;
//! assert!(reply.is_success());
//!
//! let client = txn.data().await?.send_message(b"Subject: Hi\r\n\r\nHello\r\n").await?;
//! client.quit().await?;
//! ```
//!
//! ## Session States
//!
//! ```text
//! Connected ── authenticate() ──→ Authenticated ── mail_from() ──→ MailTransaction
//!                                      ↑                               │
//!                                      ├────────── reset() ────────────┤
//!                                      │                             data()
//!                                      └──── send_message() ──── Data ←┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, Data, MailTransaction, ServerInfo, SmtpConnection,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
