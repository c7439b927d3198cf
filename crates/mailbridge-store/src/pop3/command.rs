//! POP3 commands (RFC 1939, RFC 2595 for STLS).

/// POP3 commands issued by the mail store client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPA (RFC 2449).
    Capa,
    /// STLS.
    Stls,
    /// USER name.
    User(String),
    /// PASS secret.
    Pass(String),
    /// LIST (all messages).
    List,
    /// RETR msg.
    Retr(u32),
    /// DELE msg.
    Dele(u32),
    /// QUIT.
    Quit,
}

impl Command {
    /// Serializes the command, including the final CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Capa => "CAPA".to_string(),
            Self::Stls => "STLS".to_string(),
            Self::User(name) => format!("USER {name}"),
            Self::Pass(secret) => format!("PASS {secret}"),
            Self::List => "LIST".to_string(),
            Self::Retr(n) => format!("RETR {n}"),
            Self::Dele(n) => format!("DELE {n}"),
            Self::Quit => "QUIT".to_string(),
        };
        format!("{line}\r\n").into_bytes()
    }

    /// Command name for logging. Never includes credentials.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capa => "CAPA",
            Self::Stls => "STLS",
            Self::User(_) => "USER",
            Self::Pass(_) => "PASS",
            Self::List => "LIST",
            Self::Retr(_) => "RETR",
            Self::Dele(_) => "DELE",
            Self::Quit => "QUIT",
        }
    }

    /// Returns true if a successful reply carries a dot-terminated body.
    #[must_use]
    pub const fn is_multiline(&self) -> bool {
        matches!(self, Self::Capa | Self::List | Self::Retr(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_with_arguments() {
        assert_eq!(Command::Retr(12).serialize(), b"RETR 12\r\n");
        assert_eq!(Command::User("bob".into()).serialize(), b"USER bob\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn name_hides_secret() {
        assert_eq!(Command::Pass("hunter2".into()).name(), "PASS");
    }

    #[test]
    fn multiline_commands() {
        assert!(Command::Capa.is_multiline());
        assert!(Command::List.is_multiline());
        assert!(Command::Retr(1).is_multiline());
        assert!(!Command::Dele(1).is_multiline());
    }
}
