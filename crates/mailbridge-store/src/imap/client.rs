//! Type-state IMAP client.
//!
//! The connection moves through `NotAuthenticated` → `Authenticated` →
//! `Selected`; each state exposes only the commands valid in it.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::command::Command;
use super::response::{FetchData, Response, Status};
use super::tag::TagGenerator;
use crate::flag::Flag;
use crate::framed::FramedStream;
use crate::stream::MailStream;
use crate::{Error, Result};

/// Initial state after the greeting.
#[derive(Debug)]
pub struct NotAuthenticated;

/// State after a successful LOGIN.
#[derive(Debug)]
pub struct Authenticated;

/// State with a mailbox selected.
#[derive(Debug)]
pub struct Selected;

/// Mailbox status reported by SELECT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Whether the mailbox was opened read-write.
    pub read_write: bool,
}

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    capabilities: Vec<String>,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tags", &self.tags)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be read or the server
    /// refuses the connection with BYE.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut stream = FramedStream::new(stream);
        let greeting = Response::parse(&stream.read_response().await?)?;

        match greeting {
            Response::Status {
                status: Status::Ok | Status::PreAuth,
                text,
            } => debug!(greeting = %text, "IMAP greeting received"),
            Response::Status {
                status: Status::Bye,
                text,
            } => return Err(Error::Bye(text)),
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }

        Ok(Self {
            stream,
            tags: TagGenerator::default(),
            capabilities: Vec::new(),
            _state: PhantomData,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the server rejects the credentials.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        let cmd = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.execute(&cmd).await {
            Ok(_) => {
                debug!(user = username, "IMAP login succeeded");
                Ok(self.into_state())
            }
            Err(Error::No(text) | Error::Bad(text)) => Err(Error::Auth(text)),
            Err(e) => Err(e),
        }
    }
}

impl Client<MailStream, NotAuthenticated> {
    /// Upgrades the connection with STARTTLS and refreshes capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses STARTTLS or the handshake
    /// fails.
    pub async fn starttls(mut self, host: &str, connector: &TlsConnector) -> Result<Self> {
        self.execute(&Command::StartTls).await?;

        let stream = self
            .stream
            .into_inner()
            .upgrade_to_tls(host, connector)
            .await?;
        self.stream = FramedStream::new(stream);
        self.capabilities.clear();
        self.capability().await?;
        Ok(self)
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox read-write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the mailbox does not exist.
    pub async fn select(mut self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxStatus)> {
        let responses = self
            .execute_with_completion(&Command::Select {
                mailbox: mailbox.to_string(),
            })
            .await?;

        let mut status = MailboxStatus::default();
        for response in responses {
            match response {
                Response::Exists(n) => status.exists = n,
                Response::Tagged { text, .. } => {
                    status.read_write = !text.to_ascii_uppercase().contains("[READ-ONLY]");
                }
                _ => {}
            }
        }
        debug!(mailbox, exists = status.exists, "mailbox selected");
        Ok((self.into_state(), status))
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Searches the selected mailbox with raw criteria.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the search.
    pub async fn search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        let responses = self
            .execute(&Command::Search {
                criteria: criteria.to_string(),
            })
            .await?;

        Ok(responses
            .into_iter()
            .filter_map(|r| match r {
                Response::Search(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .collect())
    }

    /// Returns the sequence numbers of messages without `\Seen`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the search.
    pub async fn search_unseen(&mut self) -> Result<Vec<u32>> {
        self.search("UNSEEN").await
    }

    /// Fetches the full message without setting `\Seen`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails or the server sends no body.
    pub async fn fetch_message(&mut self, seq: u32) -> Result<Vec<u8>> {
        self.fetch(seq, "(BODY.PEEK[])")
            .await?
            .body
            .ok_or_else(|| Error::Protocol(format!("no body returned for message {seq}")))
    }

    async fn fetch(&mut self, seq: u32, items: &str) -> Result<FetchData> {
        let responses = self
            .execute(&Command::Fetch {
                seq,
                items: items.to_string(),
            })
            .await?;

        let mut merged: Option<FetchData> = None;
        for response in responses {
            if let Response::Fetch(data) = response
                && data.seq == seq
            {
                let entry = merged.get_or_insert_with(|| FetchData {
                    seq,
                    ..FetchData::default()
                });
                if data.flags.is_some() {
                    entry.flags = data.flags;
                }
                if data.body.is_some() {
                    entry.body = data.body;
                }
            }
        }
        merged.ok_or_else(|| Error::No(format!("message {seq} not found")))
    }

    /// Adds or removes flags on one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the STORE.
    pub async fn store_flags(&mut self, seq: u32, flags: &[Flag], add: bool) -> Result<()> {
        self.execute(&Command::Store {
            seq,
            flags: flags.to_vec(),
            add,
        })
        .await
        .map(drop)
    }

    /// Closes the mailbox, expunging messages marked `\Deleted`.
    ///
    /// # Errors
    ///
    /// Returns an error if CLOSE fails.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        self.execute(&Command::Close).await?;
        Ok(self.into_state())
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the capabilities seen so far.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns true if the server advertised the capability.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Sends CAPABILITY and stores the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn capability(&mut self) -> Result<&[String]> {
        for response in self.execute(&Command::Capability).await? {
            if let Response::Capability(caps) = response {
                self.capabilities = caps;
            }
        }
        Ok(&self.capabilities)
    }

    /// Logs out and drops the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge LOGOUT.
    pub async fn logout(mut self) -> Result<()> {
        self.execute(&Command::Logout).await.map(drop)
    }

    fn into_state<T>(self) -> Client<S, T> {
        Client {
            stream: self.stream,
            tags: self.tags,
            capabilities: self.capabilities,
            _state: PhantomData,
        }
    }

    /// Runs a command and returns its untagged responses.
    async fn execute(&mut self, cmd: &Command) -> Result<Vec<Response>> {
        let mut responses = self.execute_with_completion(cmd).await?;
        responses.pop();
        Ok(responses)
    }

    /// Runs a command and returns every response, the tagged completion last.
    async fn execute_with_completion(&mut self, cmd: &Command) -> Result<Vec<Response>> {
        let tag = self.tags.next();
        self.stream.write_command(&cmd.serialize(&tag)).await?;

        let mut responses = Vec::new();
        loop {
            let response = Response::parse(&self.stream.read_response().await?)?;

            if let Response::Tagged {
                tag: got,
                status,
                text,
            } = &response
                && *got == tag
            {
                let (status, text) = (*status, text.clone());
                debug!(command = cmd.name(), ?status, "IMAP exchange");
                return match status {
                    Status::Ok | Status::PreAuth => {
                        responses.push(response);
                        Ok(responses)
                    }
                    Status::No => Err(Error::No(text)),
                    Status::Bad => Err(Error::Bad(text)),
                    Status::Bye => Err(Error::Bye(text)),
                };
            }

            match response {
                Response::Status {
                    status: Status::Bye,
                    text,
                } if *cmd != Command::Logout => return Err(Error::Bye(text)),
                Response::Capability(caps) => {
                    self.capabilities.clone_from(&caps);
                    responses.push(Response::Capability(caps));
                }
                other => responses.push(other),
            }
        }
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

    #[tokio::test]
    async fn login_select_search_fetch_store() {
        let mock = Builder::new()
            .read(b"* OK IMAP4rev1 ready\r\n")
            .write(b"A0001 LOGIN user secret\r\n")
            .read(b"* CAPABILITY IMAP4rev1 UIDPLUS\r\nA0001 OK logged in\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\n* 0 RECENT\r\nA0002 OK [READ-WRITE] done\r\n")
            .write(b"A0003 SEARCH UNSEEN\r\n")
            .read(b"* SEARCH 2 3\r\nA0003 OK done\r\n")
            .write(b"A0004 FETCH 2 (BODY.PEEK[])\r\n")
            .read(b"* 2 FETCH (BODY[] {9}\r\nSubject:x)\r\nA0004 OK done\r\n")
            .write(b"A0005 STORE 2 +FLAGS.SILENT (\\Seen)\r\n")
            .read(b"A0005 OK done\r\n")
            .write(b"A0006 CLOSE\r\n")
            .read(b"A0006 OK closed\r\n")
            .write(b"A0007 LOGOUT\r\n")
            .read(b"* BYE logging out\r\nA0007 OK bye\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "secret").await.unwrap();
        assert!(client.has_capability("uidplus"));

        let (mut client, status) = client.select("INBOX").await.unwrap();
        assert_eq!(
            status,
            MailboxStatus {
                exists: 3,
                read_write: true
            }
        );

        assert_eq!(client.search_unseen().await.unwrap(), vec![2, 3]);
        assert_eq!(client.fetch_message(2).await.unwrap(), b"Subject:x");
        client.store_flags(2, &[Flag::Seen], true).await.unwrap();

        let client = client.close().await.unwrap();
        client.logout().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_login_is_auth_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN user wrong\r\n")
            .read(b"A0001 NO [AUTHENTICATIONFAILED] invalid credentials\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("user", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(text) if text.contains("invalid credentials")));
    }

    #[tokio::test]
    async fn bye_greeting_is_refused() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let err = Client::from_stream(mock).await.unwrap_err();
        assert!(matches!(err, Error::Bye(_)));
    }

    #[tokio::test]
    async fn select_missing_mailbox_is_no() {
        let mock = Builder::new()
            .read(b"* PREAUTH welcome back\r\n")
            .write(b"A0001 LOGIN u p\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 SELECT Missing\r\n")
            .read(b"A0002 NO no such mailbox\r\n")
            .build();

        let client = Client::from_stream(mock)
            .await
            .unwrap()
            .login("u", "p")
            .await
            .unwrap();
        let err = client.select("Missing").await.unwrap_err();
        assert!(matches!(err, Error::No(_)));
    }

    #[tokio::test]
    async fn fetch_message_ignores_unsolicited_flag_updates() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN u p\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 2 EXISTS\r\nA0002 OK [READ-ONLY] done\r\n")
            .write(b"A0003 FETCH 1 (BODY.PEEK[])\r\n")
            .read(b"* 2 FETCH (FLAGS (\\Deleted))\r\n")
            .read(b"* 1 FETCH (FLAGS (\\Seen))\r\n")
            .read(b"* 1 FETCH (BODY[] {9}\r\nSubject:x)\r\nA0003 OK\r\n")
            .build();

        let client = Client::from_stream(mock)
            .await
            .unwrap()
            .login("u", "p")
            .await
            .unwrap();
        let (mut client, status) = client.select("INBOX").await.unwrap();
        assert!(!status.read_write);
        assert_eq!(client.fetch_message(1).await.unwrap(), b"Subject:x");
    }

    #[tokio::test]
    async fn unexpected_bye_aborts_command() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 CAPABILITY\r\n")
            .read(b"* BYE idle timeout\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        assert!(matches!(client.capability().await, Err(Error::Bye(_))));
    }
}
