//! Core SMTP types.

mod address;
mod extension;
mod reply;

pub use address::Address;
pub use extension::{AuthMechanism, Extension};
pub use reply::{Reply, ReplyCode};
pub(crate) use reply::is_last_reply_line;
