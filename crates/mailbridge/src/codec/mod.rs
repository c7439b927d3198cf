//! Conversion between [`EmailMessage`](crate::EmailMessage) and the wire
//! MIME tree.
//!
//! [`build`] turns a structured message into a [`WireMessage`] ready for
//! SMTP; [`decode`] walks a received [`WireMessage`] back into a structured
//! message. Both recurse through nested multipart attachments.
//!
//! [`WireMessage`]: mailbridge_mime::WireMessage

mod builder;
mod decoder;

pub use builder::build;
pub use decoder::decode;

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
    use crate::message::{AddressList, Attachment, EmailMessage, Entity, MessageBody};
    use mailbridge_mime::WireMessage;

    fn through_the_wire(message: &EmailMessage) -> EmailMessage {
        let wire = build(message, "me@example.com").unwrap();
        let bytes = wire.render_without(&["Bcc"]);
        decode(&WireMessage::parse(&bytes).unwrap()).unwrap()
    }

    #[test]
    fn single_attachment_round_trip() {
        let message = EmailMessage::new("you@example.com", "Report", "See attached.")
            .attachment(Entity::binary("application/octet-stream", vec![0, 159, 146, 150, 255]));

        let decoded = through_the_wire(&message);

        assert_eq!(decoded.body, MessageBody::Text("See attached.".into()));
        assert_eq!(decoded.attachments.len(), 1);
        let entity = decoded.attachments[0].as_entity().unwrap();
        assert_eq!(entity.content_type, "application/octet-stream");
        assert_eq!(entity.bytes().unwrap(), vec![0, 159, 146, 150, 255]);
    }

    #[test]
    fn one_recipient_decodes_as_scalar() {
        let decoded = through_the_wire(&EmailMessage::new("solo@example.com", "s", "b"));
        assert_eq!(decoded.to, AddressList::Scalar("solo@example.com".into()));
    }

    #[test]
    fn several_recipients_decode_as_list() {
        let message = EmailMessage::new(vec!["a@example.com", "b@example.com"], "s", "b");
        let decoded = through_the_wire(&message);
        assert_eq!(
            decoded.to,
            AddressList::List(vec!["a@example.com".into(), "b@example.com".into()])
        );
        assert_eq!(decoded.cc, AddressList::List(Vec::new()));
    }

    #[test]
    fn nested_multipart_attachment_keeps_its_children() {
        let nested = Entity::multipart(
            "multipart/mixed",
            vec![
                Entity::text("text/plain", "first"),
                Entity::json(serde_json::json!({"second": true})),
            ],
        );
        let message = EmailMessage::new("you@example.com", "Nested", "body").attachment(nested);

        let decoded = through_the_wire(&message);

        assert_eq!(decoded.attachments.len(), 1);
        let entity = decoded.attachments[0].as_entity().unwrap();
        assert!(entity.content_type.starts_with("multipart/mixed"));
        let children = entity.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].content_type, "text/plain");
        assert_eq!(children[0].bytes().unwrap(), b"first");
        assert_eq!(children[1].content_type, "application/json");
        assert_eq!(children[1].bytes().unwrap(), br#"{"second":true}"#);
    }

    #[test]
    fn attachments_keep_their_order() {
        let dir = std::env::temp_dir().join(format!("mailbridge-codec-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("notes.txt");
        std::fs::write(&path, "from disk").unwrap();

        let message = EmailMessage::new("you@example.com", "Three", "body")
            .attachment(Entity::text("text/plain", "one"))
            .attachment(Attachment::file(&path, None))
            .attachment(Entity::text("text/plain", "three"));

        let decoded = through_the_wire(&message);
        let texts: Vec<_> = decoded
            .attachments
            .iter()
            .map(|a| a.as_entity().unwrap().bytes().unwrap())
            .collect();
        assert_eq!(texts, [b"one".to_vec(), b"from disk".to_vec(), b"three".to_vec()]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn non_ascii_subject_and_body_survive() {
        let message = EmailMessage::new("you@example.com", "Grüße aus Köln", "Schöne Grüße");
        let decoded = through_the_wire(&message);
        assert_eq!(decoded.subject, "Grüße aus Köln");
        assert_eq!(decoded.body, MessageBody::Text("Schöne Grüße".into()));
    }

    #[test]
    fn bcc_is_not_rendered() {
        let message = EmailMessage::new("you@example.com", "s", "b").bcc("hidden@example.com");
        let decoded = through_the_wire(&message);
        assert!(decoded.bcc.is_empty());
        assert!(!decoded.headers.contains_key("Bcc"));
    }
}
