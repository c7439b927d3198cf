//! Decodes a received MIME tree into an [`EmailMessage`].

use std::collections::BTreeMap;

use mailbridge_mime::classify;
use mailbridge_mime::{Headers, Part, WireMessage, parse_mailbox_list};

use crate::message::{AddressList, Attachment, EmailMessage, Entity, EntityBody, MessageBody};
use crate::xml::XmlElement;
use crate::{Error, Result};

/// Decodes `wire` into a structured message.
///
/// The body is the root content when the root is text, or the first
/// child when the root is multipart and that child is a text leaf. A
/// JSON or XML root is parsed; the first child of a multipart root stays
/// text. Only children after the first become attachments, each leaf
/// carrying its transfer-decoded bytes unparsed. Address fields with one
/// address decode as [`AddressList::Scalar`].
///
/// # Errors
///
/// Returns [`Error::Codec`] for malformed headers, undecodable text, or a
/// JSON/XML root body that does not parse. Nothing is returned for a
/// partially decoded message.
pub fn decode(wire: &WireMessage) -> Result<EmailMessage> {
    let content_type = wire.content_type_raw();
    let body_text = body_text(wire)?;

    let typed = !wire.is_multipart();
    let body = if typed && classify::is_json(content_type) {
        MessageBody::Json(serde_json::from_str(&body_text)?)
    } else if typed && classify::is_xml(content_type) {
        MessageBody::Xml(XmlElement::parse(&body_text)?)
    } else {
        MessageBody::Text(body_text)
    };

    let attachments = match wire.children() {
        [_, rest @ ..] if wire.is_multipart() && !rest.is_empty() => rest
            .iter()
            .map(|part| entity(part).map(Attachment::Entity))
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };

    Ok(EmailMessage {
        to: addresses(&wire.headers, "To")?,
        cc: addresses(&wire.headers, "Cc")?,
        bcc: addresses(&wire.headers, "Bcc")?,
        reply_to: addresses(&wire.headers, "Reply-To")?,
        subject: wire
            .headers
            .get("Subject")
            .map(Headers::decode_value)
            .transpose()
            .map_err(Error::codec)?
            .unwrap_or_default(),
        body,
        html_body: None,
        body_content_type: Some(content_type.to_string()),
        from: first_address(&wire.headers, "From")?,
        sender: first_address(&wire.headers, "Sender")?,
        headers: header_map(&wire.headers),
        attachments,
    })
}

fn body_text(wire: &WireMessage) -> Result<String> {
    if wire.is_multipart() {
        return match wire.children().first() {
            Some(first) if !first.is_multipart() && is_text_leaf(first) => {
                first.text_content().map_err(Error::codec)
            }
            _ => Ok(String::new()),
        };
    }
    if classify::is_text(wire.content_type_raw()) {
        return wire.text_content().map_err(Error::codec);
    }
    Ok(String::new())
}

fn is_text_leaf(part: &Part) -> bool {
    part.content_type().is_ok_and(|ct| ct.is_text())
}

fn entity(part: &Part) -> Result<Entity> {
    let headers = header_map(&part.headers);
    let content_type = part.content_type_raw();

    if part.is_multipart() {
        let children = part.children().iter().map(entity).collect::<Result<Vec<_>>>()?;
        return Ok(Entity {
            content_type: content_type.to_string(),
            headers,
            body: EntityBody::Multipart(children),
        });
    }

    Ok(Entity {
        content_type: classify::classify(content_type).canonical_type().to_string(),
        headers,
        body: EntityBody::Binary(part.content().unwrap_or_default().to_vec()),
    })
}

fn addresses(headers: &Headers, name: &str) -> Result<AddressList> {
    let mut found = Vec::new();
    for value in headers.get_all(name) {
        let value = Headers::decode_value(value).map_err(Error::codec)?;
        found.extend(
            parse_mailbox_list(&value)
                .map_err(Error::codec)?
                .iter()
                .map(ToString::to_string),
        );
    }
    Ok(AddressList::from_decoded(found))
}

fn first_address(headers: &Headers, name: &str) -> Result<String> {
    Ok(match addresses(headers, name)? {
        AddressList::Scalar(address) => address,
        AddressList::List(list) => list.into_iter().next().unwrap_or_default(),
    })
}

/// Header fields as a map; a repeated name keeps its last value.
fn header_map(headers: &Headers) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
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

    fn parse(raw: &str) -> WireMessage {
        WireMessage::parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn json_body_is_parsed() {
        let wire = parse(
            "From: a@x.org\r\nTo: b@x.org\r\nContent-Type: application/json\r\n\r\n{\"id\": 42}",
        );
        let message = decode(&wire).unwrap();
        assert_eq!(message.body, MessageBody::Json(serde_json::json!({"id": 42})));
    }

    #[test]
    fn xml_body_is_parsed() {
        let wire = parse("Content-Type: text/xml\r\n\r\n<note><to>Tove</to></note>");
        let MessageBody::Xml(note) = decode(&wire).unwrap().body else {
            panic!("expected an XML body");
        };
        assert_eq!(note.name, "note");
        assert_eq!(note.child("to").unwrap().text, "Tove");
    }

    #[test]
    fn other_text_stays_a_string() {
        let wire = parse("Content-Type: text/html\r\n\r\n<p>hello</p>");
        assert_eq!(
            decode(&wire).unwrap().body,
            MessageBody::Text("<p>hello</p>".into())
        );
    }

    #[test]
    fn malformed_json_body_fails_the_whole_decode() {
        let wire = parse("To: b@x.org\r\nContent-Type: application/json\r\n\r\n{not json");
        assert_eq!(decode(&wire).unwrap_err().kind(), "CodecError");
    }

    #[test]
    fn missing_headers_decode_to_empty_strings() {
        let message = decode(&parse("Content-Type: text/plain\r\n\r\nhi")).unwrap();
        assert_eq!(message.subject, "");
        assert_eq!(message.from, "");
        assert_eq!(message.sender, "");
        assert!(message.to.is_empty());
    }

    #[test]
    fn sender_and_from_use_first_address() {
        let wire = parse(concat!(
            "From: Ann <ann@x.org>, bob@x.org\r\n",
            "Sender: relay@x.org\r\n",
            "Subject: =?utf-8?B?SGFsbG8=?=\r\n",
            "\r\n",
            "body",
        ));
        let message = decode(&wire).unwrap();
        assert_eq!(message.from, "Ann <ann@x.org>");
        assert_eq!(message.sender, "relay@x.org");
        assert_eq!(message.subject, "Hallo");
    }

    #[test]
    fn repeated_header_keeps_last_value() {
        let wire = parse("X-Tag: one\r\nX-Tag: two\r\n\r\nbody");
        let message = decode(&wire).unwrap();
        assert_eq!(message.headers.get("X-Tag").map(String::as_str), Some("two"));
    }

    #[test]
    fn leaves_are_tagged_with_canonical_types() {
        let wire = parse(concat!(
            "Content-Type: multipart/mixed; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "the body\r\n",
            "--b1\r\n",
            "Content-Type: application/vnd.api+json\r\n",
            "\r\n",
            "[1,2]\r\n",
            "--b1\r\n",
            "Content-Type: image/svg+xml\r\n",
            "\r\n",
            "<svg/>\r\n",
            "--b1\r\n",
            "Content-Type: text/csv\r\n",
            "X-Origin: export\r\n",
            "\r\n",
            "a,b\r\n",
            "--b1\r\n",
            "Content-Type: image/png\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "iVBORw==\r\n",
            "--b1--\r\n",
        ));
        let message = decode(&wire).unwrap();

        assert_eq!(message.body, MessageBody::Text("the body".into()));
        let types: Vec<_> = message
            .attachments
            .iter()
            .map(|a| a.as_entity().unwrap().content_type.as_str())
            .collect();
        assert_eq!(
            types,
            [
                "application/json",
                "application/xml",
                "text/plain",
                "application/octet-stream"
            ]
        );

        let csv = message.attachments[2].as_entity().unwrap();
        assert_eq!(csv.headers.get("X-Origin").map(String::as_str), Some("export"));
        assert_eq!(
            csv.headers.get("Content-Type").map(String::as_str),
            Some("text/csv")
        );

        let png = message.attachments[3].as_entity().unwrap();
        assert_eq!(png.bytes().unwrap(), [0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn only_the_first_child_is_the_body() {
        // An alternative in first position is not a text leaf, so the body
        // comes out empty even though both versions are present.
        let wire = parse(concat!(
            "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=\"inner\"\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<b>rich</b>\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "attached\r\n",
            "--outer--\r\n",
        ));
        let message = decode(&wire).unwrap();
        assert_eq!(message.body, MessageBody::Text(String::new()));
        assert_eq!(message.attachments.len(), 1);
    }

    #[test]
    fn single_child_multipart_has_no_attachments() {
        let wire = parse(concat!(
            "Content-Type: multipart/alternative; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "only\r\n",
            "--b--\r\n",
        ));
        let message = decode(&wire).unwrap();
        assert_eq!(message.body, MessageBody::Text("only".into()));
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn attachment_bytes_are_kept_verbatim() {
        let wire = parse(concat!(
            "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "body\r\n",
            "--b\r\n",
            "Content-Type: application/json\r\n",
            "\r\n",
            "{\"b\":1,  \"a\":2}\r\n",
            "--b--\r\n",
        ));
        let message = decode(&wire).unwrap();

        let json = message.attachments[0].as_entity().unwrap();
        assert_eq!(json.content_type, "application/json");
        assert_eq!(json.bytes().unwrap(), b"{\"b\":1,  \"a\":2}");
    }

    #[test]
    fn malformed_json_attachment_still_decodes() {
        let wire = parse(concat!(
            "Subject: export\r\n",
            "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "see attached\r\n",
            "--b\r\n",
            "Content-Type: application/vnd.acme+json\r\n",
            "\r\n",
            "not json at all\r\n",
            "--b--\r\n",
        ));
        let message = decode(&wire).unwrap();

        assert_eq!(message.subject, "export");
        let entity = message.attachments[0].as_entity().unwrap();
        assert_eq!(entity.content_type, "application/json");
        assert_eq!(entity.bytes().unwrap(), b"not json at all");
    }

    #[test]
    fn boundary_text_does_not_type_the_body() {
        let wire = parse(concat!(
            "Content-Type: multipart/mixed; boundary=\"Part_aXmLq\"\r\n",
            "\r\n",
            "--Part_aXmLq\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "hello\r\n",
            "--Part_aXmLq\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "raw\r\n",
            "--Part_aXmLq--\r\n",
        ));
        let message = decode(&wire).unwrap();
        assert_eq!(message.body, MessageBody::Text("hello".into()));
        assert_eq!(message.attachments.len(), 1);
    }
}
