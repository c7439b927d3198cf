//! Reading and listening against scripted POP3 and IMAP servers on
//! 127.0.0.1.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mailbridge::{
    AddressList, EmailConsumer, EmailListener, EmailMessage, Error, HandlerResult, ImapConfig,
    ListenerConfig, MailStoreClient, Protocol, Security, StoreSettings,
};
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

const PLAIN: Security = Security::StartTlsNever;

#[tokio::test]
async fn pop3_read_deletes_and_commits_on_close() {
    tracing_init();
    let (port, server) = scripted_server(
        "+OK POP3 ready\r\n",
        vec![
            ("USER bob", "+OK\r\n"),
            ("PASS secret", "+OK\r\n"),
            ("LIST", "+OK\r\n1 60\r\n.\r\n"),
            (
                "RETR 1",
                "+OK\r\nFrom: Ann <ann@test>\r\nTo: bob@test\r\nSubject: status\r\n\r\nall green\r\n.\r\n",
            ),
            ("DELE 1", "+OK deleted\r\n"),
            ("QUIT", "+OK bye\r\n"),
        ],
    )
    .await;

    let settings = StoreSettings {
        port,
        security: PLAIN,
        secure_socket: None,
    };
    let mut client = MailStoreClient::open(Protocol::Pop, "127.0.0.1", "bob", "secret", settings)
        .await
        .unwrap();

    let message = client.read_once("INBOX").await.unwrap().unwrap();
    assert_eq!(message.subject, "status");
    assert_eq!(message.from, "Ann <ann@test>");
    assert_eq!(message.to, AddressList::from("bob@test"));
    assert!(message.body.to_text().starts_with("all green"));

    client.close().await.unwrap();
    assert_eq!(server.await.unwrap().len(), 6);
}

#[tokio::test]
async fn pop3_required_stls_fails_when_not_offered() {
    let (port, _server) = scripted_server(
        "+OK POP3 ready\r\n",
        vec![("CAPA", "+OK\r\nUSER\r\nTOP\r\n.\r\n")],
    )
    .await;

    let settings = StoreSettings {
        port,
        security: Security::StartTlsAlways,
        secure_socket: None,
    };
    let err = MailStoreClient::open(Protocol::Pop, "127.0.0.1", "bob", "secret", settings)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InitError");
}

#[tokio::test]
async fn pop3_has_only_an_inbox() {
    let (port, _server) = scripted_server(
        "+OK POP3 ready\r\n",
        vec![("USER bob", "+OK\r\n"), ("PASS secret", "+OK\r\n")],
    )
    .await;

    let settings = StoreSettings {
        port,
        security: PLAIN,
        secure_socket: None,
    };
    let mut client = MailStoreClient::open(Protocol::Pop, "127.0.0.1", "bob", "secret", settings)
        .await
        .unwrap();
    let err = client.read_once("Archive").await.unwrap_err();
    assert_eq!(err.kind(), "ReadError");
}

#[tokio::test]
async fn refused_login_is_init_error() {
    let (port, _server) = scripted_server(
        "* OK ready\r\n",
        vec![("A0001 LOGIN bob wrong", "A0001 NO [AUTHENTICATIONFAILED] nope\r\n")],
    )
    .await;

    let settings = StoreSettings {
        port,
        security: PLAIN,
        secure_socket: None,
    };
    let err = MailStoreClient::open(Protocol::Imap, "127.0.0.1", "bob", "wrong", settings)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InitError");
}

#[derive(Default)]
struct Inbox {
    subjects: Mutex<Vec<String>>,
    closed: Mutex<u32>,
}

#[async_trait]
impl EmailConsumer for Inbox {
    async fn on_message(&self, message: &EmailMessage) -> HandlerResult {
        self.subjects.lock().unwrap().push(message.subject.clone());
        Ok(())
    }

    async fn on_close(&self, _error: Option<&Error>) -> HandlerResult {
        *self.closed.lock().unwrap() += 1;
        Ok(())
    }
}

struct Broken;

#[async_trait]
impl EmailConsumer for Broken {
    async fn on_message(&self, _message: &EmailMessage) -> HandlerResult {
        Err("cannot handle mail".into())
    }
}

#[tokio::test]
async fn imap_listener_marks_seen_and_reopens_the_folder() {
    tracing_init();
    let (port, server) = scripted_server(
        "* OK [CAPABILITY IMAP4rev1] ready\r\n",
        vec![
            ("A0001 LOGIN bob secret", "A0001 OK logged in\r\n"),
            (
                "A0002 SELECT INBOX",
                "* 1 EXISTS\r\nA0002 OK [READ-WRITE] selected\r\n",
            ),
            ("A0003 SEARCH UNSEEN", "* SEARCH 1\r\nA0003 OK\r\n"),
            (
                "A0004 FETCH 1 (BODY.PEEK[])",
                "* 1 FETCH (BODY[] {38}\r\nFrom: a@test\r\nSubject: hello\r\n\r\nbody\r\n)\r\nA0004 OK fetched\r\n",
            ),
            ("A0005 STORE 1 +FLAGS.SILENT (\\Seen)", "A0005 OK\r\n"),
            ("A0006 CLOSE", "A0006 OK\r\n"),
            (
                "A0007 SELECT INBOX",
                "* 1 EXISTS\r\nA0007 OK [READ-WRITE] selected\r\n",
            ),
            ("A0008 SEARCH UNSEEN", "* SEARCH\r\nA0008 OK\r\n"),
            ("A0009 LOGOUT", "* BYE\r\nA0009 OK\r\n"),
        ],
    )
    .await;

    let config = ListenerConfig {
        host: "127.0.0.1".into(),
        username: "bob".into(),
        password: "secret".into(),
        protocol: Protocol::Imap,
        imap: ImapConfig {
            port,
            security: PLAIN,
            secure_socket: None,
        },
        ..ListenerConfig::default()
    };
    let listener = EmailListener::new(config).await.unwrap();
    let inbox = Arc::new(Inbox::default());
    listener.register(inbox.clone());
    listener.register(Arc::new(Broken));

    assert_eq!(listener.poll().await.join().await, 1);
    assert!(listener.poll().await.is_empty());
    assert_eq!(listener.close().await.join().await, 0);

    assert_eq!(*inbox.subjects.lock().unwrap(), ["hello"]);
    assert_eq!(*inbox.closed.lock().unwrap(), 1);
    assert_eq!(server.await.unwrap().len(), 9);
}
