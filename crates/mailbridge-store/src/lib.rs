//! # mailbridge-store
//!
//! Async POP3 (RFC 1939) and IMAP4rev1 (RFC 3501) clients for reading a
//! mail store.
//!
//! Both clients use the type-state pattern: commands are only available in
//! the protocol states where they are valid, and state transitions consume
//! the client.
//!
//! ```ignore
//! use mailbridge_store::{imap, stream};
//!
//! let tcp = stream::connect_tls("imap.example.com", 993, &connector).await?;
//! let client = imap::Client::from_stream(tcp).await?;
//! let client = client.login("user@example.com", "password").await?;
//! let (mut inbox, status) = client.select("INBOX").await?;
//! for seq in inbox.search_unseen().await? {
//!     let raw = inbox.fetch_message(seq).await?;
//! }
//! ```
//!
//! TLS is provided by `tokio-rustls`; callers pass a ready
//! [`TlsConnector`](tokio_rustls::TlsConnector) so trust configuration
//! stays with the application.

mod error;
pub mod flag;
pub mod framed;
pub mod imap;
pub mod pop3;
pub mod stream;

pub use error::{Error, Result};
pub use flag::Flag;
pub use stream::MailStream;
