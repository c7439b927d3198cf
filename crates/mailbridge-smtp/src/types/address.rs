//! Envelope addresses.

use crate::error::{Error, Result};

/// Bare `local@domain` path used in `MAIL FROM` and `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be used as an SMTP path.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(addr: &str) -> Result<()> {
        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress(format!("{addr:?} has no '@'")));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} needs exactly one '@' between a local part and a domain"
            )));
        }
        // Anything here would break the angle-bracketed path on the wire.
        if addr
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} contains characters not allowed in a path"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in [
            "",
            "userexample.com",
            "@example.com",
            "user@",
            "a@b@c",
            "user name@example.com",
            "<user@example.com>",
            "user@example.com\r\nRCPT TO:<x@y>",
        ] {
            assert!(Address::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
