//! MIME header handling.

use crate::encoding::{decode_rfc2047, encode_rfc2047};
use crate::error::Result;
use std::fmt;

/// Ordered collection of header fields.
///
/// Names keep the case they were added with; lookups are case-insensitive.
/// Repeated names are allowed and keep their relative order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header field.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets a header value, replacing every existing field with that name.
    ///
    /// The field keeps the position of the first field it replaces.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(first) => {
                self.entries[first] = (name.clone(), value);
                let mut index = 0;
                self.entries.retain(|(n, _)| {
                    let keep = index <= first || !n.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header, in order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns true if at least one field has this name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over all fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Parses a header block.
    ///
    /// Folded continuation lines (leading space or tab) are unfolded into
    /// the preceding field. Parsing stops at the first empty line; lines
    /// without a colon are ignored.
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        headers
    }

    /// Encodes a header value using RFC 2047 if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_value(value: &str) -> Result<String> {
        encode_rfc2047(value, "utf-8")
    }

    /// Decodes RFC 2047 encoded words in a header value.
    ///
    /// # Errors
    ///
    /// Returns an error if an encoded word is malformed.
    pub fn decode_value(value: &str) -> Result<String> {
        decode_rfc2047(value)
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
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
    use proptest::prelude::*;

    #[test]
    fn test_headers_add_get_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_headers_keep_insertion_order() {
        let headers: Headers = [("X-B", "2"), ("X-A", "1"), ("X-C", "3")]
            .into_iter()
            .collect();
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-B", "X-A", "X-C"]);
    }

    #[test]
    fn test_headers_set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("Subject", "hi");
        headers.add("To", "bob@example.com");

        headers.set("to", "charlie@example.com");
        assert_eq!(headers.get_all("To"), vec!["charlie@example.com"]);
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["to", "Subject"]);
    }

    #[test]
    fn test_headers_remove() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        headers.remove("subject");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_parse_unfolds() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: multipart/mixed;\r\n",
            "\tboundary=\"abc\"\r\n",
            "\r\n",
            "Not-A-Header: body text\r\n"
        );

        let headers = Headers::parse(text);
        assert_eq!(headers.len(), 3);
        assert_eq!(
            headers.get("Content-Type"),
            Some("multipart/mixed; boundary=\"abc\"")
        );
        assert!(headers.get("Not-A-Header").is_none());
    }

    #[test]
    fn test_headers_display_uses_crlf() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");
        assert_eq!(
            headers.to_string(),
            "From: sender@example.com\r\nTo: recipient@example.com\r\n"
        );
    }

    proptest! {
        #[test]
        fn display_then_parse_preserves_fields(
            fields in proptest::collection::vec(("[A-Z][a-zA-Z-]{0,10}", "[ -~]{0,30}"), 0..8)
        ) {
            let headers: Headers = fields
                .iter()
                .map(|(n, v)| (n.clone(), v.trim().to_string()))
                .collect();
            let reparsed = Headers::parse(&headers.to_string());
            prop_assert_eq!(reparsed, headers);
        }
    }
}
