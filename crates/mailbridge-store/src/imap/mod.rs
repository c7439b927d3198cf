//! IMAP4rev1 client (RFC 3501).

mod client;
pub mod command;
pub mod response;
mod tag;

pub use client::{Authenticated, Client, MailboxStatus, NotAuthenticated, Selected};
pub use tag::TagGenerator;
