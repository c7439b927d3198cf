//! Type-state POP3 client.
//!
//! A session is in the `Authorization` state until USER/PASS succeed, then
//! in `Transaction`. Deletions are only committed by [`Client::quit`] from
//! the transaction state.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::command::Command;
use crate::framed::{FramedStream, trim_line_ending};
use crate::stream::MailStream;
use crate::{Error, Result};

/// State before authentication.
#[derive(Debug)]
pub struct Authorization;

/// State after authentication.
#[derive(Debug)]
pub struct Transaction;

/// POP3 client connection with type-state.
pub struct Client<S, State> {
    stream: FramedStream<S>,
    greeting: String,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("greeting", &self.greeting)
            .finish_non_exhaustive()
    }
}

impl<S> Client<S, Authorization>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is not `+OK`.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut stream = FramedStream::new(stream);
        let greeting = status_line(&stream.read_line().await?)?;
        debug!(greeting = %greeting, "POP3 greeting received");

        Ok(Self {
            stream,
            greeting,
            _state: PhantomData,
        })
    }

    /// Authenticates with USER and PASS.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if either command is refused.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Transaction>> {
        let result = async {
            self.execute(&Command::User(username.to_string())).await?;
            self.execute(&Command::Pass(password.to_string())).await
        }
        .await;

        match result {
            Ok(_) => {
                debug!(user = username, "POP3 login succeeded");
                Ok(self.into_state())
            }
            Err(Error::Err(text)) => Err(Error::Auth(text)),
            Err(e) => Err(e),
        }
    }
}

impl Client<MailStream, Authorization> {
    /// Upgrades the connection with STLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses STLS or the handshake fails.
    pub async fn stls(mut self, host: &str, connector: &TlsConnector) -> Result<Self> {
        self.execute(&Command::Stls).await?;
        let stream = self
            .stream
            .into_inner()
            .upgrade_to_tls(host, connector)
            .await?;
        self.stream = FramedStream::new(stream);
        Ok(self)
    }
}

impl<S> Client<S, Transaction>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Lists message numbers and sizes of messages not marked deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply is refused or malformed.
    pub async fn list(&mut self) -> Result<Vec<(u32, u64)>> {
        self.execute(&Command::List).await?;
        let body = self.stream.read_dot_terminated().await?;

        String::from_utf8_lossy(&body)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut fields = line.split_whitespace();
                let id = fields.next().and_then(|n| n.parse().ok());
                let size = fields.next().and_then(|n| n.parse().ok());
                id.zip(size)
                    .ok_or_else(|| Error::Protocol(format!("malformed LIST entry: {line:?}")))
            })
            .collect()
    }

    /// Retrieves a full message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Err`] if the message does not exist.
    pub async fn retr(&mut self, id: u32) -> Result<Vec<u8>> {
        self.execute(&Command::Retr(id)).await?;
        self.stream.read_dot_terminated().await
    }

    /// Marks a message deleted. It is removed when the session quits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Err`] if the message does not exist.
    pub async fn dele(&mut self, id: u32) -> Result<()> {
        self.execute(&Command::Dele(id)).await.map(drop)
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Lists server capabilities with CAPA.
    ///
    /// Servers predating RFC 2449 answer `-ERR`; that is reported as an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a malformed reply.
    pub async fn capa(&mut self) -> Result<Vec<String>> {
        match self.execute(&Command::Capa).await {
            Ok(_) => {}
            Err(Error::Err(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
        let body = self.stream.read_dot_terminated().await?;
        Ok(String::from_utf8_lossy(&body)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Returns true if CAPA lists `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if CAPA fails.
    pub async fn has_capability(&mut self, name: &str) -> Result<bool> {
        Ok(self.capa().await?.iter().any(|cap| {
            cap.split_whitespace()
                .next()
                .is_some_and(|first| first.eq_ignore_ascii_case(name))
        }))
    }

    /// Returns the text of the server greeting.
    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Ends the session. From the transaction state this commits deletions.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses QUIT, which means deletions
    /// were not committed.
    pub async fn quit(mut self) -> Result<()> {
        self.execute(&Command::Quit).await.map(drop)
    }

    fn into_state<T>(self) -> Client<S, T> {
        Client {
            stream: self.stream,
            greeting: self.greeting,
            _state: PhantomData,
        }
    }

    /// Sends a command and returns the text after `+OK`.
    ///
    /// Multi-line bodies are left on the stream for the caller.
    async fn execute(&mut self, cmd: &Command) -> Result<String> {
        self.stream.write_command(&cmd.serialize()).await?;
        let line = self.stream.read_line().await?;
        let result = status_line(&line);
        debug!(command = cmd.name(), ok = result.is_ok(), "POP3 exchange");
        result
    }
}

/// Parses a `+OK text` / `-ERR text` status line.
fn status_line(line: &[u8]) -> Result<String> {
    let line = String::from_utf8_lossy(trim_line_ending(line));
    if let Some(rest) = line.strip_prefix("+OK") {
        Ok(rest.trim_start().to_string())
    } else if let Some(rest) = line.strip_prefix("-ERR") {
        Err(Error::Err(rest.trim_start().to_string()))
    } else {
        Err(Error::Protocol(format!("unexpected POP3 reply: {line:?}")))
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
    use tokio_test::io::Builder;

    #[test]
    fn status_lines() {
        assert_eq!(status_line(b"+OK 2 320\r\n").unwrap(), "2 320");
        assert_eq!(status_line(b"+OK\r\n").unwrap(), "");
        assert!(matches!(status_line(b"-ERR no such message\r\n"), Err(Error::Err(t)) if t == "no such message"));
        assert!(matches!(status_line(b"* OK imap?\r\n"), Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn login_list_retr_dele_quit() {
        let mock = Builder::new()
            .read(b"+OK POP3 ready\r\n")
            .write(b"USER bob\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS secret\r\n")
            .read(b"+OK maildrop locked\r\n")
            .write(b"LIST\r\n")
            .read(b"+OK 2 messages\r\n1 120\r\n2 200\r\n.\r\n")
            .write(b"RETR 1\r\n")
            .read(b"+OK 120 octets\r\nSubject: hi\r\n\r\n..dot\r\n.\r\n")
            .write(b"DELE 1\r\n")
            .read(b"+OK marked\r\n")
            .write(b"QUIT\r\n")
            .read(b"+OK bye\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        assert_eq!(client.greeting(), "POP3 ready");

        let mut client = client.login("bob", "secret").await.unwrap();
        assert_eq!(client.list().await.unwrap(), vec![(1, 120), (2, 200)]);
        assert_eq!(client.retr(1).await.unwrap(), b"Subject: hi\r\n\r\n.dot\r\n");
        client.dele(1).await.unwrap();
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn bad_password_is_auth_error() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"USER bob\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS nope\r\n")
            .read(b"-ERR [AUTH] invalid password\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("bob", "nope").await.unwrap_err();
        assert!(matches!(err, Error::Auth(text) if text.contains("invalid password")));
    }

    #[tokio::test]
    async fn capa_lists_stls() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK capability list follows\r\nUSER\r\nSTLS\r\nSASL PLAIN\r\n.\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nUSER\r\n.\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        assert!(client.has_capability("stls").await.unwrap());
        assert!(!client.has_capability("STLS").await.unwrap());
    }

    #[tokio::test]
    async fn capa_unsupported_is_empty() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"-ERR unknown command\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        assert!(client.capa().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refused_greeting() {
        let mock = Builder::new().read(b"-ERR busy\r\n").build();
        assert!(matches!(Client::from_stream(mock).await, Err(Error::Err(_))));
    }

    #[tokio::test]
    async fn retr_missing_message_leaves_session_usable() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"USER u\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS p\r\n")
            .read(b"+OK\r\n")
            .write(b"RETR 9\r\n")
            .read(b"-ERR no such message\r\n")
            .write(b"LIST\r\n")
            .read(b"+OK\r\n1 120\r\n.\r\n")
            .build();

        let mut client = Client::from_stream(mock)
            .await
            .unwrap()
            .login("u", "p")
            .await
            .unwrap();
        assert!(matches!(client.retr(9).await, Err(Error::Err(_))));
        assert_eq!(client.list().await.unwrap(), vec![(1, 120)]);
    }
}
