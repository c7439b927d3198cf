//! POP3 client (RFC 1939).

mod client;
pub mod command;

pub use client::{Authorization, Client, Transaction};
