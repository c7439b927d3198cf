//! Integration tests for the SMTP client.
//!
//! Each test runs a scripted server on 127.0.0.1 that checks the commands
//! it receives and answers with canned replies.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mailbridge_smtp::connection::connect;
use mailbridge_smtp::{Address, Client, Error, SmtpConnection};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Marker step: read DATA content up to the lone "." line.
const CONTENT: &str = "<content>";

const EHLO_REPLY: &str = "250-mx.test greets you\r\n250-AUTH PLAIN LOGIN\r\n250 SIZE 1000\r\n";

async fn scripted_server(
    greeting: &'static str,
    script: Vec<(&'static str, &'static str)>,
) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        let mut transcript = Vec::new();

        write.write_all(greeting.as_bytes()).await.unwrap();
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

#[tokio::test]
async fn send_with_auth_plain_and_partial_rejection() {
    tracing_init();
    let (port, server) = scripted_server(
        "220 mx.test ESMTP\r\n",
        vec![
            ("EHLO client.test", EHLO_REPLY),
            ("AUTH PLAIN AHVzZXIAc2VjcmV0", "235 2.7.0 ok\r\n"),
            ("MAIL FROM:<user@test> SIZE=", "250 ok\r\n"),
            ("RCPT TO:<good@test>", "250 ok\r\n"),
            ("RCPT TO:<bad@test>", "550 no such user\r\n"),
            ("DATA", "354 go ahead\r\n"),
            (CONTENT, "250 queued\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    assert_eq!(client.server_info().hostname, "mx.test");

    let client = client.ehlo("client.test").await.unwrap();
    assert_eq!(client.server_info().max_message_size(), Some(1000));

    let client = client.authenticate("user", "secret").await.unwrap();
    let message = b"Subject: hi\r\n\r\n.starts with a dot\r\n";
    let mut txn = client
        .mail_from(&Address::new("user@test").unwrap(), Some(message.len()))
        .await
        .unwrap();

    let good = txn.rcpt_to(&Address::new("good@test").unwrap()).await.unwrap();
    let bad = txn.rcpt_to(&Address::new("bad@test").unwrap()).await.unwrap();
    assert!(good.is_success());
    assert!(bad.is_permanent_error());

    let client = txn.data().await.unwrap().send_message(message).await.unwrap();
    client.quit().await.unwrap();

    let transcript = server.await.unwrap();
    assert_eq!(
        transcript[6],
        "Subject: hi\r\n\r\n..starts with a dot\r\n"
    );
}

#[tokio::test]
async fn auth_login_when_plain_is_not_offered() {
    let (port, server) = scripted_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO localhost", "250-mx.test\r\n250 AUTH LOGIN\r\n"),
            ("AUTH LOGIN", "334 VXNlcm5hbWU6\r\n"),
            ("dXNlcg==", "334 UGFzc3dvcmQ6\r\n"),
            ("c2VjcmV0", "235 ok\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream)
        .await
        .unwrap()
        .ehlo("localhost")
        .await
        .unwrap();
    let client = client.authenticate("user", "secret").await.unwrap();
    client.quit().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_surface_the_reply() {
    let (port, _server) = scripted_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO localhost", EHLO_REPLY),
            ("AUTH PLAIN", "535 5.7.8 bad credentials\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream)
        .await
        .unwrap()
        .ehlo("localhost")
        .await
        .unwrap();
    let err = client.authenticate("user", "wrong").await.unwrap_err();
    assert!(err.is_permanent());
    assert!(err.to_string().contains("bad credentials"));
}

#[tokio::test]
async fn oversized_message_is_refused_locally() {
    let (port, _server) = scripted_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO localhost", EHLO_REPLY),
            ("AUTH PLAIN", "235 ok\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream)
        .await
        .unwrap()
        .ehlo("localhost")
        .await
        .unwrap()
        .authenticate("user", "secret")
        .await
        .unwrap();

    let err = client
        .mail_from(&Address::new("user@test").unwrap(), Some(5000))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::MessageTooLarge {
            size: 5000,
            limit: 1000
        }
    ));
}

#[tokio::test]
async fn reset_returns_to_ready_state() {
    let (port, server) = scripted_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO localhost", "250 mx.test\r\n"),
            ("MAIL FROM:<user@test>", "250 ok\r\n"),
            ("RCPT TO:<bad@test>", "550 nope\r\n"),
            ("RSET", "250 reset\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream)
        .await
        .unwrap()
        .ehlo("localhost")
        .await
        .unwrap();
    // No AUTH advertised: the session continues unauthenticated.
    let client = client.authenticate("user", "secret").await.unwrap();

    let mut txn = client
        .mail_from(&Address::new("user@test").unwrap(), None)
        .await
        .unwrap();
    let reply = txn.rcpt_to(&Address::new("bad@test").unwrap()).await.unwrap();
    assert!(!reply.is_success());

    txn.reset().await.unwrap().quit().await.unwrap();
    assert_eq!(server.await.unwrap().len(), 5);
}

#[tokio::test]
async fn refused_greeting_is_an_error() {
    let (port, _server) = scripted_server("554 go away\r\n", vec![]).await;
    let stream = connect("127.0.0.1", port).await.unwrap();
    let err = Client::from_stream(stream).await.unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 554, .. }));
}

#[tokio::test]
async fn starttls_requires_advertisement() {
    let (port, _server) = scripted_server(
        "220 mx.test\r\n",
        vec![("EHLO localhost", "250 mx.test\r\n")],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream)
        .await
        .unwrap()
        .ehlo("localhost")
        .await
        .unwrap();

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(std::sync::Arc::new(config));

    let err = client
        .starttls(&connector, "mx.test", "localhost")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
}
