//! IMAP commands and their wire serialization.

use crate::flag::Flag;

/// IMAP commands issued by the mail store client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY.
    Capability,
    /// STARTTLS.
    StartTls,
    /// LOGIN with plaintext credentials.
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT a mailbox read-write.
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// SEARCH with raw criteria, e.g. `UNSEEN`.
    Search {
        /// Search criteria.
        criteria: String,
    },
    /// FETCH one message by sequence number.
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Fetch items, e.g. `(FLAGS BODY.PEEK[])`.
        items: String,
    },
    /// STORE flags on one message.
    Store {
        /// Message sequence number.
        seq: u32,
        /// Flags to change.
        flags: Vec<Flag>,
        /// Add (`+FLAGS`) or remove (`-FLAGS`).
        add: bool,
    },
    /// CLOSE the selected mailbox, expunging `\Deleted` messages.
    Close,
    /// LOGOUT.
    Logout,
}

impl Command {
    /// Serializes the command with the given tag, including the final CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }
            Self::Search { criteria } => {
                buf.extend_from_slice(b"SEARCH ");
                buf.extend_from_slice(criteria.as_bytes());
            }
            Self::Fetch { seq, items } => {
                buf.extend_from_slice(format!("FETCH {seq} {items}").as_bytes());
            }
            Self::Store { seq, flags, add } => {
                let sign = if *add { '+' } else { '-' };
                let list = flags
                    .iter()
                    .map(Flag::as_str)
                    .collect::<Vec<_>>()
                    .join(" ");
                buf.extend_from_slice(format!("STORE {seq} {sign}FLAGS.SILENT ({list})").as_bytes());
            }
            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Command name for logging. Never includes credentials.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Search { .. } => "SEARCH",
            Self::Fetch { .. } => "FETCH",
            Self::Store { .. } => "STORE",
            Self::Close => "CLOSE",
            Self::Logout => "LOGOUT",
        }
    }
}

/// Writes an astring (atom or quoted string).
fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
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

    fn wire(cmd: &Command) -> String {
        String::from_utf8(cmd.serialize("A0001")).unwrap()
    }

    #[test]
    fn login_quotes_special_credentials() {
        let cmd = Command::Login {
            username: "user@example.com".into(),
            password: "pa ss\"word".into(),
        };
        assert_eq!(
            wire(&cmd),
            "A0001 LOGIN user@example.com \"pa ss\\\"word\"\r\n"
        );
    }

    #[test]
    fn select_quotes_names_with_spaces() {
        let cmd = Command::Select {
            mailbox: "Sent Items".into(),
        };
        assert_eq!(wire(&cmd), "A0001 SELECT \"Sent Items\"\r\n");
        let cmd = Command::Select {
            mailbox: "INBOX".into(),
        };
        assert_eq!(wire(&cmd), "A0001 SELECT INBOX\r\n");
    }

    #[test]
    fn store_is_silent() {
        let cmd = Command::Store {
            seq: 3,
            flags: vec![Flag::Seen],
            add: true,
        };
        assert_eq!(wire(&cmd), "A0001 STORE 3 +FLAGS.SILENT (\\Seen)\r\n");

        let cmd = Command::Store {
            seq: 3,
            flags: vec![Flag::Seen, Flag::Flagged],
            add: false,
        };
        assert_eq!(
            wire(&cmd),
            "A0001 STORE 3 -FLAGS.SILENT (\\Seen \\Flagged)\r\n"
        );
    }

    #[test]
    fn fetch_and_search() {
        let cmd = Command::Fetch {
            seq: 7,
            items: "(FLAGS BODY.PEEK[])".into(),
        };
        assert_eq!(wire(&cmd), "A0001 FETCH 7 (FLAGS BODY.PEEK[])\r\n");
        let cmd = Command::Search {
            criteria: "UNSEEN".into(),
        };
        assert_eq!(wire(&cmd), "A0001 SEARCH UNSEEN\r\n");
    }

    #[test]
    fn name_hides_credentials() {
        let cmd = Command::Login {
            username: "u".into(),
            password: "secret".into(),
        };
        assert_eq!(cmd.name(), "LOGIN");
    }
}
