//! End-to-end delivery through a scripted SMTP server on 127.0.0.1.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mailbridge::{EmailMessage, Security, SmtpClient, SmtpConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Marker step: read DATA content up to the lone "." line.
const CONTENT: &str = "<content>";

const EHLO_REPLY: &str = "250-mx.test greets you\r\n250 8BITMIME\r\n";

async fn scripted_server(script: Vec<(&'static str, &'static str)>) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        let mut transcript = Vec::new();

        write.write_all(b"220 mx.test ESMTP\r\n").await.unwrap();
        for (expected, reply) in script {
            let mut received = String::new();
            if expected == CONTENT {
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    if line == ".\r\n" {
                        break;
                    }
                    received.push_str(&line);
                }
            } else {
                reader.read_line(&mut received).await.unwrap();
                assert!(
                    received.starts_with(expected),
                    "expected {expected:?}, got {received:?}"
                );
            }
            transcript.push(received);
            write.write_all(reply.as_bytes()).await.unwrap();
        }
        transcript
    });

    (port, handle)
}

fn tracing_init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn client(port: u16, send_partial: bool) -> SmtpClient {
    let config = SmtpConfig {
        port,
        security: Security::StartTlsNever,
        send_partial,
        client_hostname: "client.test".into(),
        ..SmtpConfig::default()
    };
    SmtpClient::open("127.0.0.1", "me@test", "secret", config).unwrap()
}

#[tokio::test]
async fn delivers_to_every_recipient_without_bcc_header() {
    tracing_init();
    let (port, server) = scripted_server(vec![
        ("EHLO client.test", EHLO_REPLY),
        ("MAIL FROM:<me@test>", "250 ok\r\n"),
        ("RCPT TO:<to@test>", "250 ok\r\n"),
        ("RCPT TO:<cc@test>", "250 ok\r\n"),
        ("RCPT TO:<hidden@test>", "250 ok\r\n"),
        ("DATA", "354 go ahead\r\n"),
        (CONTENT, "250 queued\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let message = EmailMessage::new("to@test", "Quarterly report", "See attached numbers.")
        .cc("cc@test")
        .bcc("hidden@test");
    client(port, false).send(&message).await.unwrap();

    let transcript = server.await.unwrap();
    let data = &transcript[6];
    assert!(data.contains("From: me@test\r\n"), "{data}");
    assert!(data.contains("To: to@test\r\n"), "{data}");
    assert!(data.contains("Cc: cc@test\r\n"), "{data}");
    assert!(data.contains("Subject: Quarterly report\r\n"), "{data}");
    assert!(data.contains("MIME-Version: 1.0\r\n"), "{data}");
    assert!(data.contains("See attached numbers."), "{data}");
    assert!(!data.contains("hidden@test"), "{data}");
}

#[tokio::test]
async fn envelope_sender_follows_from() {
    let (port, server) = scripted_server(vec![
        ("EHLO client.test", EHLO_REPLY),
        ("MAIL FROM:<desk@test>", "250 ok\r\n"),
        ("RCPT TO:<to@test>", "250 ok\r\n"),
        ("DATA", "354 go ahead\r\n"),
        (CONTENT, "250 queued\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let message = EmailMessage::new("to@test", "hi", "body").from("Help Desk <desk@test>");
    client(port, false).send(&message).await.unwrap();

    let transcript = server.await.unwrap();
    assert!(transcript[4].contains("From: Help Desk <desk@test>\r\n"));
}

#[tokio::test]
async fn rejected_recipient_aborts_without_partial_sending() {
    let (port, server) = scripted_server(vec![
        ("EHLO client.test", EHLO_REPLY),
        ("MAIL FROM:<me@test>", "250 ok\r\n"),
        ("RCPT TO:<good@test>", "250 ok\r\n"),
        ("RCPT TO:<bad@test>", "550 no such user\r\n"),
        ("RSET", "250 reset\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let message = EmailMessage::new(vec!["good@test", "bad@test"], "hi", "body");
    let err = client(port, false).send(&message).await.unwrap_err();

    assert_eq!(err.kind(), "SendError");
    assert_eq!(err.rejected(), ["bad@test"]);
    assert_eq!(server.await.unwrap().len(), 6);
}

#[tokio::test]
async fn partial_sending_delivers_to_accepted_recipients() {
    let (port, server) = scripted_server(vec![
        ("EHLO client.test", EHLO_REPLY),
        ("MAIL FROM:<me@test>", "250 ok\r\n"),
        ("RCPT TO:<good@test>", "250 ok\r\n"),
        ("RCPT TO:<bad@test>", "550 no such user\r\n"),
        ("DATA", "354 go ahead\r\n"),
        (CONTENT, "250 queued\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let message = EmailMessage::new(vec!["good@test", "bad@test"], "hi", "body");
    let err = client(port, true).send(&message).await.unwrap_err();

    assert_eq!(err.kind(), "SendError");
    assert_eq!(err.rejected(), ["bad@test"]);
    assert!(err.to_string().contains("delivered"));
    assert_eq!(server.await.unwrap().len(), 7);
}

#[tokio::test]
async fn nothing_is_sent_when_every_recipient_is_rejected() {
    let (port, server) = scripted_server(vec![
        ("EHLO client.test", EHLO_REPLY),
        ("MAIL FROM:<me@test>", "250 ok\r\n"),
        ("RCPT TO:<bad@test>", "550 no such user\r\n"),
        ("RSET", "250 reset\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let err = client(port, true)
        .send(&EmailMessage::new("bad@test", "hi", "body"))
        .await
        .unwrap_err();

    assert_eq!(err.rejected(), ["bad@test"]);
    assert_eq!(server.await.unwrap().len(), 5);
}

#[tokio::test]
async fn required_starttls_fails_when_not_offered() {
    let (port, _server) = scripted_server(vec![("EHLO client.test", EHLO_REPLY)]).await;
    let config = SmtpConfig {
        port,
        security: Security::StartTlsAlways,
        client_hostname: "client.test".into(),
        ..SmtpConfig::default()
    };
    let client = SmtpClient::open("127.0.0.1", "me@test", "secret", config).unwrap();

    let err = client
        .send(&EmailMessage::new("to@test", "hi", "body"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "SendError");
}

#[tokio::test]
async fn invalid_recipient_fails_before_connecting() {
    let client = client(9, false);
    let err = client
        .send(&EmailMessage::new("not-an-address", "hi", "body"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "AddressFormatError");
}
