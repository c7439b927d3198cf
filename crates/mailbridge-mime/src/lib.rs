//! # mailbridge-mime
//!
//! The wire-format side of mailbridge: MIME part trees as they travel over
//! SMTP, POP3 and IMAP.
//!
//! ## Features
//!
//! - **Part trees**: a [`Part`] is either scalar content or an ordered list of
//!   child parts, nested to any depth
//! - **Rendering**: [`Part::render`] produces RFC 5322 bytes, choosing a
//!   transfer encoding per leaf
//! - **Parsing**: [`Part::parse`] recurses through multipart boundaries and
//!   undoes transfer encodings
//! - **Content types**: [`ContentType`] plus the permissive text/JSON/XML
//!   classifier in [`classify`]
//! - **Addresses**: RFC 822 mailbox parsing and formatting in [`Mailbox`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailbridge_mime::{Part, ContentType};
//!
//! let body = Part::text("text/plain", "Hello, World!");
//! let html = Part::text("text/html", "<p>Hello, World!</p>");
//! let root = Part::multipart(ContentType::multipart("alternative"), vec![body, html]);
//!
//! let wire = root.render();
//! let parsed = Part::parse(&wire)?;
//! assert_eq!(parsed.children().len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
pub mod classify;
mod content_type;
mod error;
mod header;
mod part;

pub mod encoding;

pub use address::{Mailbox, parse_mailbox_list};
pub use classify::Category;
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use part::{Body, Part, TransferEncoding, WireMessage, generate_message_id};
