//! Builds the wire MIME tree for an outgoing message.

use mailbridge_mime::{
    ContentType, Headers, Mailbox, Part, WireMessage, classify, generate_message_id,
    parse_mailbox_list,
};
use tracing::debug;

use crate::message::{AddressList, Attachment, EmailMessage, Entity, EntityBody};
use crate::{Error, Result};

const TEXT_HTML: &str = "text/html";
const CONTENT_TYPE: &str = "Content-Type";
const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";

/// Builds the MIME tree for `message`.
///
/// Without attachments the root is the body itself: a text part, an HTML
/// part, or a `multipart/alternative` holding both. With attachments the
/// root is `multipart/mixed`, the body first and each attachment after it
/// in order. An empty `from` is replaced by `username`.
///
/// The result keeps the `Bcc` header; strip it when rendering for SMTP.
///
/// # Errors
///
/// Returns [`Error::AddressFormat`] for an invalid address and
/// [`Error::Codec`] for an unreadable file attachment or an entity whose
/// content type does not match its payload.
pub fn build(message: &EmailMessage, username: &str) -> Result<WireMessage> {
    let body = body_part(message);

    let mut root = if message.attachments.is_empty() {
        body
    } else {
        let mut children = Vec::with_capacity(message.attachments.len() + 1);
        children.push(body);
        for attachment in &message.attachments {
            children.push(attachment_part(attachment)?);
        }
        Part::multipart(ContentType::multipart("mixed"), children)
    };

    let from = if message.from.trim().is_empty() {
        username
    } else {
        message.from.as_str()
    };
    let author = Mailbox::parse(from)?;

    let headers = &mut root.headers;
    headers.set("From", author.to_string());
    if !message.sender.trim().is_empty() {
        headers.set("Sender", Mailbox::parse(&message.sender)?.to_string());
    }
    set_addresses(headers, "To", &message.to)?;
    set_addresses(headers, "Cc", &message.cc)?;
    set_addresses(headers, "Bcc", &message.bcc)?;
    set_addresses(headers, "Reply-To", &message.reply_to)?;
    headers.set("Subject", Headers::encode_value(&message.subject)?);
    headers.set("Date", chrono::Local::now().to_rfc2822());
    let domain = author.address.rsplit('@').next().unwrap_or_default();
    headers.set("Message-ID", generate_message_id(domain));
    headers.set("MIME-Version", "1.0");
    for (name, value) in &message.headers {
        headers.add(name.as_str(), value.as_str());
    }

    debug!(
        attachments = message.attachments.len(),
        multipart = root.is_multipart(),
        "built MIME message"
    );
    Ok(root)
}

/// Writes an address header, or nothing when the field is empty.
fn set_addresses(headers: &mut Headers, name: &str, addresses: &AddressList) -> Result<()> {
    let mut mailboxes = Vec::new();
    for entry in addresses.iter() {
        mailboxes.extend(parse_mailbox_list(entry)?);
    }
    if !mailboxes.is_empty() {
        let value = mailboxes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        headers.set(name, value);
    }
    Ok(())
}

fn body_part(message: &EmailMessage) -> Part {
    let text = message.body.to_text();
    let content_type = message
        .body_content_type
        .as_deref()
        .unwrap_or_else(|| message.body.default_content_type());
    let html = message.html_body.as_deref().filter(|html| !html.is_empty());

    match html {
        Some(html) if !text.is_empty() => Part::multipart(
            ContentType::multipart("alternative"),
            vec![text_part(content_type, text), text_part(TEXT_HTML, html.to_string())],
        ),
        Some(html) => text_part(TEXT_HTML, html.to_string()),
        None => text_part(content_type, text),
    }
}

/// Text leaf, labelled UTF-8 when it is not plain ASCII.
fn text_part(content_type: &str, text: String) -> Part {
    if text.is_ascii() || content_type.to_ascii_lowercase().contains("charset") {
        return Part::text(content_type, text);
    }
    match ContentType::parse(content_type) {
        Ok(parsed) if parsed.is_text() => {
            Part::text(&parsed.with_parameter("charset", "utf-8").to_string(), text)
        }
        _ => Part::text(content_type, text),
    }
}

fn attachment_part(attachment: &Attachment) -> Result<Part> {
    match attachment {
        Attachment::File { path, content_type } => {
            let content_type = content_type.as_deref().unwrap_or(classify::TEXT_PLAIN);
            if classify::is_multipart(content_type) {
                return Err(Error::Codec(format!(
                    "file attachment {} cannot be {content_type}",
                    path.display()
                )));
            }
            let content = std::fs::read(path).map_err(|e| {
                Error::Codec(format!("cannot read attachment {}: {e}", path.display()))
            })?;

            let mut part = Part::single(content_type, content);
            let disposition = match path.file_name() {
                Some(name) => format!(
                    "attachment; filename=\"{}\"",
                    name.to_string_lossy().replace('"', "")
                ),
                None => "attachment".to_string(),
            };
            part.headers.set("Content-Disposition", disposition);
            Ok(part)
        }
        Attachment::Entity(entity) => entity_part(entity),
    }
}

fn entity_part(entity: &Entity) -> Result<Part> {
    let multipart = classify::is_multipart(&entity.content_type);

    let mut part = match (&entity.body, multipart) {
        (EntityBody::Multipart(children), true) => {
            if children.is_empty() {
                return Err(Error::Codec(format!(
                    "{} entity has no child entities",
                    entity.content_type
                )));
            }
            let content_type = ContentType::parse(&entity.content_type)?;
            let children = children.iter().map(entity_part).collect::<Result<Vec<_>>>()?;
            Part::multipart(content_type, children)
        }
        (EntityBody::Multipart(_), false) => {
            return Err(Error::Codec(format!(
                "{} entity cannot hold child entities",
                entity.content_type
            )));
        }
        (_, true) => {
            return Err(Error::Codec(format!(
                "{} entity must hold child entities",
                entity.content_type
            )));
        }
        (_, false) => Part::single(&entity.content_type, entity.bytes().unwrap_or_default()),
    };

    for (name, value) in &entity.headers {
        if name.eq_ignore_ascii_case(CONTENT_TRANSFER_ENCODING) {
            continue;
        }
        if name.eq_ignore_ascii_case(CONTENT_TYPE) && classify::is_multipart(value) != multipart {
            continue;
        }
        part.headers.set(name.as_str(), value.as_str());
    }
    Ok(part)
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
    use crate::message::MessageBody;
    use crate::xml::XmlElement;

    #[test]
    fn plain_body_uses_override_or_text_plain() {
        let wire = build(&EmailMessage::new("a@x.org", "s", "hello"), "me@x.org").unwrap();
        assert!(!wire.is_multipart());
        assert_eq!(wire.content_type_raw(), "text/plain");
        assert_eq!(wire.content(), Some(&b"hello"[..]));

        let message = EmailMessage::new("a@x.org", "s", "a,b").body_content_type("text/csv");
        let wire = build(&message, "me@x.org").unwrap();
        assert_eq!(wire.content_type_raw(), "text/csv");
    }

    #[test]
    fn text_and_html_make_an_alternative() {
        let message = EmailMessage::new("a@x.org", "s", "plain").html_body("<b>rich</b>");
        let wire = build(&message, "me@x.org").unwrap();

        assert!(wire.content_type_raw().starts_with("multipart/alternative"));
        let children = wire.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].content_type_raw(), "text/plain");
        assert_eq!(children[1].content_type_raw(), "text/html");
        assert_eq!(children[1].content(), Some(&b"<b>rich</b>"[..]));
    }

    #[test]
    fn html_only_is_a_single_part() {
        let message = EmailMessage::new("a@x.org", "s", "").html_body("<i>only</i>");
        let wire = build(&message, "me@x.org").unwrap();
        assert_eq!(wire.content_type_raw(), "text/html");
    }

    #[test]
    fn attachments_follow_the_body() {
        let message = EmailMessage::new("a@x.org", "s", "plain")
            .html_body("<b>rich</b>")
            .attachment(Entity::text("text/plain", "one"))
            .attachment(Entity::binary("image/png", vec![137, 80, 78, 71]));
        let wire = build(&message, "me@x.org").unwrap();

        assert!(wire.content_type_raw().starts_with("multipart/mixed"));
        let children = wire.children();
        assert_eq!(children.len(), 3);
        assert!(children[0].content_type_raw().starts_with("multipart/alternative"));
        assert_eq!(children[1].content(), Some(&b"one"[..]));
        assert_eq!(children[2].content_type_raw(), "image/png");
    }

    #[test]
    fn json_and_xml_bodies_default_their_content_type() {
        let mut message = EmailMessage::new("a@x.org", "s", "");
        message.body = MessageBody::Json(serde_json::json!({"k": [1, 2]}));
        let wire = build(&message, "me@x.org").unwrap();
        assert_eq!(wire.content_type_raw(), "application/json");
        assert_eq!(wire.content(), Some(&br#"{"k":[1,2]}"#[..]));

        message.body = MessageBody::Xml(XmlElement::new("ping"));
        let wire = build(&message, "me@x.org").unwrap();
        assert_eq!(wire.content_type_raw(), "application/xml");
        assert_eq!(wire.content(), Some(&b"<ping/>"[..]));
    }

    #[test]
    fn standard_headers_and_user_headers() {
        let message = EmailMessage::new(vec!["a@x.org", "Bee <b@x.org>"], "Hi", "body")
            .cc("c@x.org")
            .reply_to("r@x.org")
            .sender("Agent <agent@x.org>")
            .header("X-Mailer", "mailbridge");
        let wire = build(&message, "me@x.org").unwrap();
        let headers = &wire.headers;

        assert_eq!(headers.get("From"), Some("me@x.org"));
        assert_eq!(headers.get("Sender"), Some("Agent <agent@x.org>"));
        assert_eq!(headers.get("To"), Some("a@x.org, Bee <b@x.org>"));
        assert_eq!(headers.get("Cc"), Some("c@x.org"));
        assert_eq!(headers.get("Reply-To"), Some("r@x.org"));
        assert_eq!(headers.get("MIME-Version"), Some("1.0"));
        assert!(headers.get("Message-ID").unwrap().ends_with("@x.org>"));
        assert!(headers.contains("Date"));
        assert!(!headers.contains("Bcc"));

        let names: Vec<_> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names.last(), Some(&"X-Mailer"));
    }

    #[test]
    fn explicit_from_wins_over_username() {
        let message = EmailMessage::new("a@x.org", "s", "b").from("Boss <boss@x.org>");
        let wire = build(&message, "me@x.org").unwrap();
        assert_eq!(wire.headers.get("From"), Some("Boss <boss@x.org>"));
    }

    #[test]
    fn non_ascii_subject_is_encoded() {
        let wire = build(&EmailMessage::new("a@x.org", "Café", "b"), "me@x.org").unwrap();
        assert!(wire.headers.get("Subject").unwrap().starts_with("=?utf-8?B?"));
    }

    #[test]
    fn invalid_address_is_rejected() {
        let message = EmailMessage::new("not an address", "s", "b");
        let err = build(&message, "me@x.org").unwrap_err();
        assert_eq!(err.kind(), "AddressFormatError");

        let err = build(&EmailMessage::new("a@x.org", "s", "b"), "bob").unwrap_err();
        assert_eq!(err.kind(), "AddressFormatError");
    }

    #[test]
    fn unreadable_file_is_codec_error() {
        let message = EmailMessage::new("a@x.org", "s", "b")
            .attachment(Attachment::file("/nonexistent/mailbridge/file.txt", None));
        let err = build(&message, "me@x.org").unwrap_err();
        assert_eq!(err.kind(), "CodecError");
    }

    #[test]
    fn file_attachment_defaults_to_text_plain() {
        let path = std::env::temp_dir().join(format!("mailbridge-builder-{}.txt", std::process::id()));
        std::fs::write(&path, "contents").unwrap();

        let message =
            EmailMessage::new("a@x.org", "s", "b").attachment(Attachment::file(&path, None));
        let wire = build(&message, "me@x.org").unwrap();
        let file = &wire.children()[1];
        assert_eq!(file.content_type_raw(), "text/plain");
        assert!(file.headers.get("Content-Disposition").unwrap().contains("filename="));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn entity_shape_is_checked() {
        let empty = Entity::multipart("multipart/mixed", Vec::new());
        let scalar_multipart = Entity::text("multipart/mixed", "oops");
        let children_without_multipart =
            Entity::multipart("text/plain", vec![Entity::text("text/plain", "x")]);

        for entity in [empty, scalar_multipart, children_without_multipart] {
            let message = EmailMessage::new("a@x.org", "s", "b").attachment(entity);
            assert_eq!(build(&message, "me@x.org").unwrap_err().kind(), "CodecError");
        }
    }

    #[test]
    fn entity_headers_replace_defaults() {
        let entity = Entity::binary("application/octet-stream", vec![1, 2, 3])
            .with_header("Content-Type", "image/gif")
            .with_header("Content-Transfer-Encoding", "7bit")
            .with_header("Content-ID", "<logo>");
        let message = EmailMessage::new("a@x.org", "s", "b").attachment(entity);
        let wire = build(&message, "me@x.org").unwrap();

        let part = &wire.children()[1];
        assert_eq!(part.content_type_raw(), "image/gif");
        assert_eq!(part.headers.get("Content-ID"), Some("<logo>"));
        assert!(part.transfer_encoding().is_none());
    }
}
