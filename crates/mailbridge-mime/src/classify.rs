//! Content-type classification.
//!
//! These predicates work on raw content-type strings exactly as they appear
//! in a header, parameters included. They never fail: anything unrecognised
//! is simply binary.

const JSON_SUFFIX: &str = "+json";
const XML_SUFFIX: &str = "+xml";
const TEXT_PRIMARY: &str = "text/";
const MULTIPART_PRIMARY: &str = "multipart/";

const TEXT_LIKE_APPLICATION_TYPES: [&str; 3] = [
    "application/json",
    "application/xml",
    "application/x-www-form-urlencoded",
];

/// Canonical media type used for JSON entities.
pub const APPLICATION_JSON: &str = "application/json";
/// Canonical media type used for XML entities.
pub const APPLICATION_XML: &str = "application/xml";
/// Canonical media type used for text entities.
pub const TEXT_PLAIN: &str = "text/plain";
/// Canonical media type used for everything else.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Broad category of a leaf entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// JSON-based content.
    Json,
    /// XML-based content.
    Xml,
    /// Other text-based content.
    Text,
    /// Anything else.
    Binary,
}

impl Category {
    /// Returns the canonical media type for the category.
    #[must_use]
    pub const fn canonical_type(self) -> &'static str {
        match self {
            Self::Json => APPLICATION_JSON,
            Self::Xml => APPLICATION_XML,
            Self::Text => TEXT_PLAIN,
            Self::Binary => OCTET_STREAM,
        }
    }
}

/// Classifies a content type, checking JSON, then XML, then text.
#[must_use]
pub fn classify(content_type: &str) -> Category {
    if is_json(content_type) {
        Category::Json
    } else if is_xml(content_type) {
        Category::Xml
    } else if is_text(content_type) {
        Category::Text
    } else {
        Category::Binary
    }
}

/// Returns true for `text/*`, `+xml`/`+json` suffixed types and the
/// text-like `application/*` types.
#[must_use]
pub fn is_text(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence.starts_with(TEXT_PRIMARY)
        || essence.ends_with(XML_SUFFIX)
        || essence.ends_with(JSON_SUFFIX)
        || TEXT_LIKE_APPLICATION_TYPES
            .iter()
            .any(|prefix| essence.starts_with(prefix))
}

/// Returns true if "json" appears anywhere in the content type.
#[must_use]
pub fn is_json(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("json")
}

/// Returns true if "xml" appears anywhere in the content type.
#[must_use]
pub fn is_xml(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("xml")
}

/// Returns true if the content type begins with `multipart/`.
#[must_use]
pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with(MULTIPART_PRIMARY)
}

/// Lowercased `type/subtype` with parameters stripped.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn text_types() {
        assert!(is_text("text/plain"));
        assert!(is_text("TEXT/HTML; charset=utf-8"));
        assert!(is_text("application/json"));
        assert!(is_text("application/xml"));
        assert!(is_text("application/x-www-form-urlencoded"));
        assert!(is_text("application/atom+xml"));
        assert!(is_text("application/vnd.api+json; charset=utf-8"));
        assert!(!is_text("image/png"));
        assert!(!is_text("application/octet-stream"));
    }

    #[test]
    fn json_and_xml_are_permissive_substring_matches() {
        assert!(is_json("application/vnd.foo+json"));
        assert!(is_json("Application/JSON"));
        assert!(is_xml("text/xml"));
        assert!(is_xml("application/xhtml+xml"));
        assert!(!is_json("text/plain"));
        assert!(!is_xml("text/plain"));
    }

    #[test]
    fn multipart_detection() {
        assert!(is_multipart("multipart/mixed; boundary=x"));
        assert!(is_multipart("Multipart/Alternative"));
        assert!(!is_multipart("text/plain"));
        assert!(!is_multipart("application/multipart"));
    }

    #[test]
    fn classify_prefers_json_then_xml() {
        assert_eq!(classify("application/json"), Category::Json);
        assert_eq!(classify("text/xml"), Category::Xml);
        assert_eq!(classify("text/csv"), Category::Text);
        assert_eq!(classify("image/jpeg"), Category::Binary);
        assert_eq!(Category::Binary.canonical_type(), OCTET_STREAM);
    }

    proptest! {
        #[test]
        fn classification_never_panics(s in ".*") {
            let _ = classify(&s);
            let _ = is_multipart(&s);
        }

        #[test]
        fn any_text_subtype_is_text(sub in "[a-z][a-z0-9.-]{0,15}") {
            let ct = format!("text/{sub}");
            prop_assert!(is_text(&ct));
        }
    }
}
