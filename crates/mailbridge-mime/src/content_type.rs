//! MIME content type handling.

use crate::error::{Error, Result};
use rand::Rng;
use std::fmt;

/// MIME content type with parameters.
///
/// Parameters keep their declaration order so a rendered header is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: Vec::new(),
        }
    }

    /// Creates a text/plain content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "utf-8")
    }

    /// Creates a text/html content type.
    #[must_use]
    pub fn text_html() -> Self {
        Self::new("text", "html").with_parameter("charset", "utf-8")
    }

    /// Creates a multipart content type with a freshly generated boundary.
    #[must_use]
    pub fn multipart(sub_type: impl Into<String>) -> Self {
        Self::new("multipart", sub_type).with_parameter("boundary", generate_boundary())
    }

    /// Adds a parameter, replacing an existing one with the same name.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(key, value);
        self
    }

    /// Sets a parameter in place.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into().to_lowercase();
        let value = value.into();
        if let Some(slot) = self.parameters.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.parameters.push((key, value));
        }
    }

    /// Returns a parameter value by (case-insensitive) name.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if the primary type is `text`.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the type or subtype is missing.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = split_parameters(s).into_iter();

        let type_str = parts.next().unwrap_or_default();
        let (main_type, sub_type) = type_str
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(s.to_string()))?;
        let main_type = main_type.trim().to_lowercase();
        let sub_type = sub_type.trim().to_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(s.to_string()));
        }

        let mut content_type = Self::new(main_type, sub_type);
        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                content_type.set_parameter(key.trim(), value.replace("\\\"", "\""));
            }
        }

        Ok(content_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        for (key, value) in &self.parameters {
            if value.is_empty()
                || value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c))
            {
                let escaped = value.replace('"', "\\\"");
                write!(f, "; {key}=\"{escaped}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

/// Splits on `;` while respecting quoted parameter values.
fn split_parameters(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in s.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Generates a multipart boundary that cannot collide with encoded content.
///
/// The random tail holds no letters, so it never spells a type name.
pub(crate) fn generate_boundary() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "----=_Part_{}_{}.{}",
        rng.r#gen::<u32>(),
        rng.r#gen::<u32>(),
        rng.r#gen::<u64>()
    )
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

    #[test]
    fn test_text_plain() {
        let ct = ContentType::text_plain();
        assert_eq!(ct.essence(), "text/plain");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert!(ct.is_text());
    }

    #[test]
    fn test_multipart_generates_distinct_boundaries() {
        let a = ContentType::multipart("mixed");
        let b = ContentType::multipart("mixed");
        assert!(a.is_multipart());
        assert!(a.boundary().unwrap().starts_with("----=_Part_"));
        assert_ne!(a.boundary(), b.boundary());
    }

    #[test]
    fn test_boundary_tail_has_no_letters() {
        for _ in 0..64 {
            let boundary = generate_boundary();
            let tail = boundary.strip_prefix("----=_Part_").unwrap();
            assert!(!tail.chars().any(|c| c.is_ascii_alphabetic()), "{boundary}");
            let header = format!("multipart/mixed; boundary=\"{boundary}\"");
            assert!(!header.to_ascii_lowercase().contains("xml"));
            assert!(!header.to_ascii_lowercase().contains("json"));
        }
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; Charset=UTF-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("UTF-8"));
    }

    #[test]
    fn test_content_type_parse_quoted_semicolon() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"a;b=c\"; x=1").unwrap();
        assert_eq!(ct.boundary(), Some("a;b=c"));
        assert_eq!(ct.parameter("x"), Some("1"));
    }

    #[test]
    fn test_content_type_parse_rejects_missing_subtype() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("/plain").is_err());
    }

    #[test]
    fn test_display_quotes_special_values() {
        let ct = ContentType::new("multipart", "mixed").with_parameter("boundary", "----=_Part_1");
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"----=_Part_1\"");
        let reparsed = ContentType::parse(&ct.to_string()).unwrap();
        assert_eq!(reparsed, ct);
    }

    #[test]
    fn test_set_parameter_replaces() {
        let ct = ContentType::new("text", "plain")
            .with_parameter("charset", "iso-8859-1")
            .with_parameter("charset", "utf-8");
        assert_eq!(ct.parameters.len(), 1);
        assert_eq!(ct.charset(), Some("utf-8"));
    }
}
