//! RFC 822 mailbox parsing and formatting.

use crate::error::{Error, Result};
use std::fmt;

/// A single mailbox: an address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, if any.
    pub name: Option<String>,
    /// `local@domain` address.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox without a display name.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Parses `addr@domain` or `Display Name <addr@domain>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] when the input is not a usable
    /// mailbox.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_address(input, "empty address"));
        }

        let (name, address) = match trimmed.rfind('<') {
            Some(open) => {
                let address = trimmed[open + 1..]
                    .strip_suffix('>')
                    .ok_or_else(|| Error::invalid_address(input, "unterminated '<'"))?;
                let name = trimmed[..open].trim().trim_matches('"').trim();
                let name = (!name.is_empty()).then(|| name.replace("\\\"", "\""));
                (name, address.trim())
            }
            None => (None, trimmed),
        };

        validate_address(input, address)?;
        Ok(Self {
            name,
            address: address.to_string(),
        })
    }
}

fn validate_address(input: &str, address: &str) -> Result<()> {
    let (local, domain) = address
        .split_once('@')
        .ok_or_else(|| Error::invalid_address(input, "missing '@'"))?;

    if domain.contains('@') {
        return Err(Error::invalid_address(input, "more than one '@'"));
    }
    if local.is_empty() {
        return Err(Error::invalid_address(input, "empty local part"));
    }
    if domain.is_empty() {
        return Err(Error::invalid_address(input, "empty domain"));
    }
    if address
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || "<>()[],;:\\\"".contains(c))
    {
        return Err(Error::invalid_address(input, "illegal character"));
    }
    for piece in [local, domain] {
        if piece.starts_with('.') || piece.ends_with('.') || piece.contains("..") {
            return Err(Error::invalid_address(input, "misplaced '.'"));
        }
    }
    Ok(())
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if name.chars().any(|c| "()<>@,;:\\\".[]".contains(c)) => {
                let escaped = name.replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}>", self.address)
            }
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// Parses a comma separated address header into mailboxes.
///
/// Commas inside quoted display names or angle brackets do not split.
/// Empty entries are skipped.
///
/// # Errors
///
/// Returns the first entry that fails [`Mailbox::parse`].
pub fn parse_mailbox_list(input: &str) -> Result<Vec<Mailbox>> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for c in input.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                entries.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    entries.push(current);

    entries
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| Mailbox::parse(entry))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_address() {
        let mailbox = Mailbox::parse(" alice@example.com ").unwrap();
        assert_eq!(mailbox, Mailbox::new("alice@example.com"));
        assert_eq!(mailbox.to_string(), "alice@example.com");
    }

    #[test]
    fn parses_display_name() {
        let mailbox = Mailbox::parse("\"Smith, Bob\" <bob@example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Smith, Bob"));
        assert_eq!(mailbox.address, "bob@example.com");
        assert_eq!(mailbox.to_string(), "\"Smith, Bob\" <bob@example.com>");

        let plain = Mailbox::parse("Bob <bob@example.com>").unwrap();
        assert_eq!(plain.to_string(), "Bob <bob@example.com>");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in [
            "",
            "no-at-sign",
            "two@@example.com",
            "@example.com",
            "user@",
            "us er@example.com",
            ".user@example.com",
            "user@example..com",
            "Name <user@example.com",
        ] {
            assert!(
                matches!(Mailbox::parse(bad), Err(Error::InvalidAddress { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn splits_lists_outside_quotes() {
        let list =
            parse_mailbox_list("a@example.com, \"Doe, Jane\" <jane@example.com>,, b@example.com")
                .unwrap();
        let addresses: Vec<&str> = list.iter().map(|m| m.address.as_str()).collect();
        assert_eq!(
            addresses,
            vec!["a@example.com", "jane@example.com", "b@example.com"]
        );
    }

    #[test]
    fn empty_list() {
        assert!(parse_mailbox_list("  ").unwrap().is_empty());
    }
}
