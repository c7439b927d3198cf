//! Structured email records.
//!
//! [`EmailMessage`] is what applications send and what the listener
//! delivers. It is converted to and from the wire MIME tree by
//! [`crate::codec`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use mailbridge_mime::classify;
use serde::{Deserialize, Serialize};

use crate::xml::XmlElement;

/// An address field: one address or a list of them.
///
/// Decoding yields [`AddressList::Scalar`] when the wire header carries
/// exactly one address and [`AddressList::List`] otherwise, including for
/// no address at all. Consumers of the serialized form rely on that shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressList {
    /// A single address string.
    Scalar(String),
    /// Zero or more address strings in order.
    List(Vec<String>),
}

impl Default for AddressList {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl AddressList {
    /// Wraps decoded addresses, collapsing a single address to a scalar.
    #[must_use]
    pub fn from_decoded(mut addresses: Vec<String>) -> Self {
        if addresses.len() == 1 {
            Self::Scalar(addresses.remove(0))
        } else {
            Self::List(addresses)
        }
    }

    /// Iterates over the non-blank entries.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let entries: &[String] = match self {
            Self::Scalar(address) => std::slice::from_ref(address),
            Self::List(addresses) => addresses,
        };
        entries
            .iter()
            .map(String::as_str)
            .filter(|entry| !entry.trim().is_empty())
    }

    /// Number of non-blank entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if there is no address.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Appends an address, turning a scalar into a list.
    pub fn push(&mut self, address: impl Into<String>) {
        match self {
            Self::Scalar(existing) => {
                let first = std::mem::take(existing);
                *self = Self::List(vec![first, address.into()]);
            }
            Self::List(addresses) => addresses.push(address.into()),
        }
    }
}

impl From<&str> for AddressList {
    fn from(address: &str) -> Self {
        Self::Scalar(address.to_string())
    }
}

impl From<String> for AddressList {
    fn from(address: String) -> Self {
        Self::Scalar(address)
    }
}

impl From<Vec<String>> for AddressList {
    fn from(addresses: Vec<String>) -> Self {
        Self::List(addresses)
    }
}

impl From<Vec<&str>> for AddressList {
    fn from(addresses: Vec<&str>) -> Self {
        Self::List(addresses.into_iter().map(str::to_string).collect())
    }
}

/// Message body, typed by its content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Plain text.
    Text(String),
    /// Parsed JSON.
    Json(serde_json::Value),
    /// Parsed XML.
    Xml(XmlElement),
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageBody {
    /// Serialized text of the body.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
            Self::Xml(element) => element.to_string(),
        }
    }

    /// Content type used when the message does not override it.
    #[must_use]
    pub const fn default_content_type(&self) -> &'static str {
        match self {
            Self::Text(_) => classify::TEXT_PLAIN,
            Self::Json(_) => classify::APPLICATION_JSON,
            Self::Xml(_) => classify::APPLICATION_XML,
        }
    }

    /// Returns the text if this is a plain text body.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for MessageBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Payload of an [`Entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityBody {
    /// Text content.
    Text(String),
    /// JSON content.
    Json(serde_json::Value),
    /// XML content.
    Xml(XmlElement),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Child entities of a multipart entity.
    Multipart(Vec<Entity>),
}

/// An in-memory MIME entity, possibly a nested multipart.
///
/// A `multipart/*` entity must hold a non-empty [`EntityBody::Multipart`];
/// any other content type must hold a scalar body. The builder rejects
/// entities that break this rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Content type, parameters included.
    pub content_type: String,
    /// Extra MIME headers for the part.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Payload.
    pub body: EntityBody,
}

impl Entity {
    /// Creates a text entity.
    #[must_use]
    pub fn text(content_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_body(content_type, EntityBody::Text(text.into()))
    }

    /// Creates a binary entity.
    #[must_use]
    pub fn binary(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::with_body(content_type, EntityBody::Binary(bytes))
    }

    /// Creates a JSON entity with content type `application/json`.
    #[must_use]
    pub fn json(value: serde_json::Value) -> Self {
        Self::with_body(classify::APPLICATION_JSON, EntityBody::Json(value))
    }

    /// Creates an XML entity with content type `application/xml`.
    #[must_use]
    pub fn xml(element: XmlElement) -> Self {
        Self::with_body(classify::APPLICATION_XML, EntityBody::Xml(element))
    }

    /// Creates a multipart entity, e.g. `multipart/mixed`.
    #[must_use]
    pub fn multipart(content_type: impl Into<String>, children: Vec<Self>) -> Self {
        Self::with_body(content_type, EntityBody::Multipart(children))
    }

    fn with_body(content_type: impl Into<String>, body: EntityBody) -> Self {
        Self {
            content_type: content_type.into(),
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Scalar payload as bytes; `None` for a multipart entity.
    #[must_use]
    pub fn bytes(&self) -> Option<Vec<u8>> {
        match &self.body {
            EntityBody::Text(text) => Some(text.clone().into_bytes()),
            EntityBody::Json(value) => Some(value.to_string().into_bytes()),
            EntityBody::Xml(element) => Some(element.to_string().into_bytes()),
            EntityBody::Binary(bytes) => Some(bytes.clone()),
            EntityBody::Multipart(_) => None,
        }
    }

    /// Child entities; empty for a scalar entity.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match &self.body {
            EntityBody::Multipart(children) => children,
            _ => &[],
        }
    }
}

/// A message attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attachment {
    /// A file read from disk when the message is built.
    File {
        /// Path to the file.
        path: PathBuf,
        /// Content type, `text/plain` when absent.
        content_type: Option<String>,
    },
    /// An in-memory entity.
    Entity(Entity),
}

impl Attachment {
    /// Creates a file attachment.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>, content_type: Option<&str>) -> Self {
        Self::File {
            path: path.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    /// Returns the entity of an in-memory attachment.
    #[must_use]
    pub const fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::File { .. } => None,
        }
    }
}

impl From<Entity> for Attachment {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

/// A structured email message.
///
/// `from` and `sender` are empty when unset; the builder fills an empty
/// `from` with the authenticated username.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailMessage {
    /// Primary recipients.
    pub to: AddressList,
    /// Carbon copy recipients.
    pub cc: AddressList,
    /// Blind carbon copy recipients.
    pub bcc: AddressList,
    /// Reply-To addresses.
    pub reply_to: AddressList,
    /// Subject line.
    pub subject: String,
    /// Main body.
    pub body: MessageBody,
    /// HTML alternative of the body.
    pub html_body: Option<String>,
    /// Explicit content type of the body.
    pub body_content_type: Option<String>,
    /// Author address.
    pub from: String,
    /// Sender address, when different from the author.
    pub sender: String,
    /// Extra headers, one value per name.
    pub headers: BTreeMap<String, String>,
    /// Attachments in order.
    pub attachments: Vec<Attachment>,
}

impl EmailMessage {
    /// Creates a message with recipients, subject and plain text body.
    #[must_use]
    pub fn new(
        to: impl Into<AddressList>,
        subject: impl Into<String>,
        body: impl Into<MessageBody>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Sets the author address.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Sets the sender address.
    #[must_use]
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient);
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient);
        self
    }

    /// Adds a Reply-To address.
    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to.push(address);
        self
    }

    /// Sets the HTML alternative.
    #[must_use]
    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    /// Overrides the body content type.
    #[must_use]
    pub fn body_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.body_content_type = Some(content_type.into());
        self
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Appends an attachment.
    #[must_use]
    pub fn attachment(mut self, attachment: impl Into<Attachment>) -> Self {
        self.attachments.push(attachment.into());
        self
    }

    /// Every envelope recipient: to, cc and bcc entries in that order.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
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

    #[test]
    fn address_list_shapes() {
        assert_eq!(
            AddressList::from_decoded(vec!["a@x.org".into()]),
            AddressList::Scalar("a@x.org".into())
        );
        assert_eq!(
            AddressList::from_decoded(vec!["a@x.org".into(), "b@x.org".into()]),
            AddressList::List(vec!["a@x.org".into(), "b@x.org".into()])
        );
        assert_eq!(AddressList::from_decoded(Vec::new()), AddressList::List(Vec::new()));
    }

    #[test]
    fn address_list_serializes_scalar_or_array() {
        let scalar = serde_json::to_string(&AddressList::from("a@x.org")).unwrap();
        assert_eq!(scalar, r#""a@x.org""#);

        let list: AddressList = serde_json::from_str(r#"["a@x.org","b@x.org"]"#).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn blank_scalar_counts_as_empty() {
        assert!(AddressList::from("  ").is_empty());
        assert!(AddressList::default().is_empty());
    }

    #[test]
    fn push_promotes_scalar() {
        let mut list = AddressList::from("a@x.org");
        list.push("b@x.org");
        assert_eq!(list.iter().collect::<Vec<_>>(), ["a@x.org", "b@x.org"]);
    }

    #[test]
    fn fluent_construction() {
        let message = EmailMessage::new("to@x.org", "Hi", "Hello")
            .cc("cc@x.org")
            .bcc("hidden@x.org")
            .html_body("<p>Hello</p>")
            .header("X-Trace", "1")
            .attachment(Entity::text("text/plain", "notes"));

        assert_eq!(
            message.recipients().collect::<Vec<_>>(),
            ["to@x.org", "cc@x.org", "hidden@x.org"]
        );
        assert_eq!(message.body.as_text(), Some("Hello"));
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.headers.get("X-Trace").map(String::as_str), Some("1"));
    }

    #[test]
    fn entity_bytes() {
        let json = Entity::json(serde_json::json!({"a": 1}));
        assert_eq!(json.bytes().unwrap(), br#"{"a":1}"#);

        let nested = Entity::multipart("multipart/mixed", vec![json.clone()]);
        assert!(nested.bytes().is_none());
        assert_eq!(nested.children().len(), 1);
    }

    #[test]
    fn body_default_content_types() {
        assert_eq!(MessageBody::from("x").default_content_type(), "text/plain");
        assert_eq!(
            MessageBody::Json(serde_json::json!([])).default_content_type(),
            "application/json"
        );
        assert_eq!(
            MessageBody::Xml(XmlElement::new("a")).default_content_type(),
            "application/xml"
        );
    }
}
