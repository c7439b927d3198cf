//! Integration tests for the POP3 and IMAP clients.
//!
//! A scripted server on 127.0.0.1 checks each command line it receives and
//! answers with a canned reply.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mailbridge_store::stream::connect_plain;
use mailbridge_store::{Error, Flag, imap, pop3};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

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
            reader.read_line(&mut received).await.unwrap();
            assert!(
                received.starts_with(expected),
                "expected {expected:?}, got {received:?}"
            );
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

const RAW: &str = "From: a@test\r\nSubject: hello\r\n\r\nbody\r\n";

#[tokio::test]
async fn pop3_retrieves_and_deletes_first_message() {
    tracing_init();
    let (port, server) = scripted_server(
        "+OK POP3 server ready\r\n",
        vec![
            ("USER bob", "+OK\r\n"),
            ("PASS secret", "+OK\r\n"),
            ("LIST", "+OK\r\n1 45\r\n2 80\r\n.\r\n"),
            (
                "RETR 1",
                "+OK\r\nFrom: a@test\r\nSubject: hello\r\n\r\nbody\r\n.\r\n",
            ),
            ("DELE 1", "+OK deleted\r\n"),
            ("QUIT", "+OK bye\r\n"),
        ],
    )
    .await;

    let stream = connect_plain("127.0.0.1", port).await.unwrap();
    assert!(!stream.is_tls());
    let mut client = pop3::Client::from_stream(stream)
        .await
        .unwrap()
        .login("bob", "secret")
        .await
        .unwrap();

    let listing = client.list().await.unwrap();
    assert_eq!(listing.len(), 2);

    let raw = client.retr(listing[0].0).await.unwrap();
    assert_eq!(raw, RAW.as_bytes());
    client.dele(listing[0].0).await.unwrap();
    client.quit().await.unwrap();

    assert_eq!(server.await.unwrap().len(), 6);
}

#[tokio::test]
async fn pop3_empty_maildrop() {
    let (port, _server) = scripted_server(
        "+OK ready\r\n",
        vec![
            ("USER u", "+OK\r\n"),
            ("PASS p", "+OK\r\n"),
            ("LIST", "+OK 0 messages\r\n.\r\n"),
        ],
    )
    .await;

    let stream = connect_plain("127.0.0.1", port).await.unwrap();
    let mut client = pop3::Client::from_stream(stream)
        .await
        .unwrap()
        .login("u", "p")
        .await
        .unwrap();
    assert!(client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn imap_reads_unseen_and_marks_seen() {
    tracing_init();
    assert_eq!(RAW.len(), 38);
    let (port, server) = scripted_server(
        "* OK [CAPABILITY IMAP4rev1] ready\r\n",
        vec![
            ("A0001 LOGIN bob secret", "A0001 OK logged in\r\n"),
            (
                "A0002 SELECT INBOX",
                "* 2 EXISTS\r\nA0002 OK [READ-WRITE] selected\r\n",
            ),
            ("A0003 SEARCH UNSEEN", "* SEARCH 2\r\nA0003 OK\r\n"),
            (
                "A0004 FETCH 2 (BODY.PEEK[])",
                "* 2 FETCH (BODY[] {38}\r\nFrom: a@test\r\nSubject: hello\r\n\r\nbody\r\n)\r\nA0004 OK fetched\r\n",
            ),
            ("A0005 STORE 2 +FLAGS.SILENT (\\Seen)", "A0005 OK\r\n"),
            ("A0006 SEARCH UNSEEN", "* SEARCH\r\nA0006 OK\r\n"),
            ("A0007 CLOSE", "A0007 OK\r\n"),
            ("A0008 LOGOUT", "* BYE\r\nA0008 OK\r\n"),
        ],
    )
    .await;

    let stream = connect_plain("127.0.0.1", port).await.unwrap();
    let client = imap::Client::from_stream(stream)
        .await
        .unwrap()
        .login("bob", "secret")
        .await
        .unwrap();
    let (mut inbox, status) = client.select("INBOX").await.unwrap();
    assert_eq!(status.exists, 2);

    let unseen = inbox.search_unseen().await.unwrap();
    assert_eq!(unseen, vec![2]);
    assert_eq!(inbox.fetch_message(2).await.unwrap(), RAW.as_bytes());
    inbox.store_flags(2, &[Flag::Seen], true).await.unwrap();
    assert!(inbox.search_unseen().await.unwrap().is_empty());

    inbox.close().await.unwrap().logout().await.unwrap();
    assert_eq!(server.await.unwrap().len(), 8);
}

#[tokio::test]
async fn imap_login_refused() {
    let (port, _server) = scripted_server(
        "* OK ready\r\n",
        vec![("A0001 LOGIN bob wrong", "A0001 NO [AUTHENTICATIONFAILED] nope\r\n")],
    )
    .await;

    let stream = connect_plain("127.0.0.1", port).await.unwrap();
    let err = imap::Client::from_stream(stream)
        .await
        .unwrap()
        .login("bob", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
}

#[tokio::test]
async fn connection_refused_is_io_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = connect_plain("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
