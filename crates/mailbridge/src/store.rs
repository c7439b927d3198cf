//! Reading messages from a POP3 or IMAP mail store.
//!
//! [`MailStoreClient`] finds the first unseen message in a folder, decodes
//! it and marks it consumed: deleted on POP3, seen on IMAP. The folder is
//! reopened on every read so new arrivals are picked up.
//!
//! The protocol work sits behind the [`MailStore`] trait, implemented by
//! [`Pop3Store`] and [`ImapStore`].

use std::time::Duration;

use async_trait::async_trait;
use mailbridge_mime::WireMessage;
use mailbridge_store::stream::{connect_plain, connect_tls};
use mailbridge_store::{Flag, MailStream, imap, pop3};
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::codec;
use crate::config::{DEFAULT_FOLDER, Protocol, SessionProperties, StoreSettings};
use crate::message::EmailMessage;
use crate::poll::{POLL_INTERVAL, PollState, sleep_or_cancel};
use crate::tls::build_connector;
use crate::{Error, Result};

/// The first unseen message of a folder, undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnseenMessage {
    /// Protocol message number.
    pub id: u32,
    /// Full RFC 5322 bytes.
    pub raw: Vec<u8>,
}

/// Protocol access to a mail store.
///
/// Implementations own their connection; callers serialize access.
#[async_trait]
pub trait MailStore: Send {
    /// Reopens `folder` and returns its first unseen message.
    async fn fetch_unseen(&mut self, folder: &str) -> Result<Option<UnseenMessage>>;

    /// Marks a message returned by [`fetch_unseen`](Self::fetch_unseen)
    /// as consumed.
    async fn mark_consumed(&mut self, id: u32) -> Result<()>;

    /// Closes the folder and the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Connection parameters shared by both stores.
struct Endpoint {
    host: String,
    port: u16,
    username: String,
    password: String,
    props: SessionProperties,
    connector: TlsConnector,
}

impl Endpoint {
    fn new(
        host: &str,
        username: &str,
        password: &str,
        settings: StoreSettings<'_>,
    ) -> Result<Self> {
        Ok(Self {
            host: host.to_string(),
            port: settings.port,
            username: username.to_string(),
            password: password.to_string(),
            props: SessionProperties::resolve(settings.security, settings.secure_socket),
            connector: build_connector(settings.secure_socket)?,
        })
    }

    async fn stream(&self) -> mailbridge_store::Result<MailStream> {
        if self.props.ssl_enabled {
            connect_tls(&self.host, self.port, &self.connector).await
        } else {
            connect_plain(&self.host, self.port).await
        }
    }

    /// Whether to upgrade, given what the server advertised.
    fn wants_starttls(&self, offered: bool) -> mailbridge_store::Result<bool> {
        if self.props.ssl_enabled || !self.props.starttls_enabled {
            return Ok(false);
        }
        if !offered && self.props.starttls_required {
            return Err(mailbridge_store::Error::Protocol(
                "server does not offer STARTTLS".into(),
            ));
        }
        Ok(offered)
    }

    async fn pop3(&self) -> mailbridge_store::Result<Pop3Session> {
        let mut client = pop3::Client::from_stream(self.stream().await?).await?;
        let offered = if self.props.ssl_enabled || !self.props.starttls_enabled {
            false
        } else {
            client.has_capability("STLS").await?
        };
        if self.wants_starttls(offered)? {
            client = client.stls(&self.host, &self.connector).await?;
        }
        client.login(&self.username, &self.password).await
    }

    async fn imap(&self) -> mailbridge_store::Result<ImapAuthenticated> {
        let mut client = imap::Client::from_stream(self.stream().await?).await?;
        let offered = if self.props.ssl_enabled || !self.props.starttls_enabled {
            false
        } else {
            client
                .capability()
                .await?
                .iter()
                .any(|cap| cap.eq_ignore_ascii_case("STARTTLS"))
        };
        if self.wants_starttls(offered)? {
            client = client.starttls(&self.host, &self.connector).await?;
        }
        client.login(&self.username, &self.password).await
    }
}

fn read_error(err: mailbridge_store::Error) -> Error {
    Error::Read(err.to_string())
}

fn close_error(err: mailbridge_store::Error) -> Error {
    Error::Close(err.to_string())
}

type Pop3Session = pop3::Client<MailStream, pop3::Transaction>;
type ImapAuthenticated = imap::Client<MailStream, imap::Authenticated>;
type ImapSelected = imap::Client<MailStream, imap::Selected>;

/// POP3 mail store.
///
/// POP3 has a single folder and no seen flag, so every message left in the
/// maildrop counts as unseen. Each read ends the previous session with
/// QUIT, which commits the deletions, and logs in again.
pub struct Pop3Store {
    endpoint: Endpoint,
    session: Option<Pop3Session>,
    used: bool,
}

impl Pop3Store {
    /// Connects and logs in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] on connection, TLS or login failure.
    pub async fn connect(
        host: &str,
        username: &str,
        password: &str,
        settings: StoreSettings<'_>,
    ) -> Result<Self> {
        let endpoint = Endpoint::new(host, username, password, settings)?;
        endpoint.props.log("pop3", host, settings.port, username);
        let session = endpoint
            .pop3()
            .await
            .map_err(|e| Error::Init(e.to_string()))?;
        info!(host, port = settings.port, "POP3 store connected");
        Ok(Self {
            endpoint,
            session: Some(session),
            used: false,
        })
    }

    async fn fresh_session(&mut self) -> Result<&mut Pop3Session> {
        if self.used {
            if let Some(previous) = self.session.take() {
                previous.quit().await.map_err(read_error)?;
            }
        }
        self.used = true;

        match self.session.take() {
            Some(session) => Ok(self.session.insert(session)),
            None => {
                let session = self.endpoint.pop3().await.map_err(read_error)?;
                Ok(self.session.insert(session))
            }
        }
    }
}

#[async_trait]
impl MailStore for Pop3Store {
    async fn fetch_unseen(&mut self, folder: &str) -> Result<Option<UnseenMessage>> {
        if !folder.eq_ignore_ascii_case(DEFAULT_FOLDER) {
            return Err(Error::Read(format!("POP3 has no folder named {folder}")));
        }
        let session = self.fresh_session().await?;
        let listing = session.list().await.map_err(read_error)?;
        debug!(count = listing.len(), "POP3 maildrop listed");

        let Some(&(id, _)) = listing.first() else {
            return Ok(None);
        };
        let raw = session.retr(id).await.map_err(read_error)?;
        Ok(Some(UnseenMessage { id, raw }))
    }

    async fn mark_consumed(&mut self, id: u32) -> Result<()> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::Read("no POP3 session".into()))?;
        session.dele(id).await.map_err(read_error)
    }

    async fn close(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => session.quit().await.map_err(close_error),
            None => Ok(()),
        }
    }
}

enum ImapSession {
    Idle(ImapAuthenticated),
    Open(ImapSelected),
}

/// IMAP mail store.
///
/// The login is kept for the lifetime of the store; the folder is closed
/// and selected again on every read. A lost session is reconnected on the
/// next read.
pub struct ImapStore {
    endpoint: Endpoint,
    session: Option<ImapSession>,
}

impl ImapStore {
    /// Connects and logs in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] on connection, TLS or login failure.
    pub async fn connect(
        host: &str,
        username: &str,
        password: &str,
        settings: StoreSettings<'_>,
    ) -> Result<Self> {
        let endpoint = Endpoint::new(host, username, password, settings)?;
        endpoint.props.log("imap", host, settings.port, username);
        let client = endpoint
            .imap()
            .await
            .map_err(|e| Error::Init(e.to_string()))?;
        info!(host, port = settings.port, "IMAP store connected");
        Ok(Self {
            endpoint,
            session: Some(ImapSession::Idle(client)),
        })
    }

    async fn reselect(&mut self, folder: &str) -> Result<ImapSelected> {
        let client = match self.session.take() {
            Some(ImapSession::Idle(client)) => client,
            Some(ImapSession::Open(selected)) => selected.close().await.map_err(read_error)?,
            None => {
                info!(host = %self.endpoint.host, "reconnecting IMAP store");
                self.endpoint.imap().await.map_err(read_error)?
            }
        };
        let (selected, status) = client.select(folder).await.map_err(read_error)?;
        debug!(folder, exists = status.exists, read_write = status.read_write, "folder selected");
        Ok(selected)
    }
}

async fn first_unseen(selected: &mut ImapSelected) -> Result<Option<UnseenMessage>> {
    let unseen = selected.search_unseen().await.map_err(read_error)?;
    debug!(count = unseen.len(), "unseen messages");
    let Some(id) = unseen.into_iter().min() else {
        return Ok(None);
    };
    let raw = selected.fetch_message(id).await.map_err(read_error)?;
    Ok(Some(UnseenMessage { id, raw }))
}

#[async_trait]
impl MailStore for ImapStore {
    async fn fetch_unseen(&mut self, folder: &str) -> Result<Option<UnseenMessage>> {
        let mut selected = self.reselect(folder).await?;
        let result = first_unseen(&mut selected).await;
        self.session = Some(ImapSession::Open(selected));
        result
    }

    async fn mark_consumed(&mut self, id: u32) -> Result<()> {
        match self.session.as_mut() {
            Some(ImapSession::Open(selected)) => selected
                .store_flags(id, &[Flag::Seen], true)
                .await
                .map_err(read_error),
            _ => Err(Error::Read("no IMAP folder is open".into())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // LOGOUT without CLOSE leaves \Deleted messages in place.
        match self.session.take() {
            Some(ImapSession::Open(selected)) => selected.logout().await.map_err(close_error),
            Some(ImapSession::Idle(client)) => client.logout().await.map_err(close_error),
            None => Ok(()),
        }
    }
}

/// Reads structured messages from one mail store.
pub struct MailStoreClient {
    store: Box<dyn MailStore>,
    closed: bool,
}

impl std::fmt::Debug for MailStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailStoreClient")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl MailStoreClient {
    /// Connects to a POP3 or IMAP store and logs in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if the connection, TLS setup or login fails.
    pub async fn open(
        protocol: Protocol,
        host: &str,
        username: &str,
        password: &str,
        settings: StoreSettings<'_>,
    ) -> Result<Self> {
        let store: Box<dyn MailStore> = match protocol {
            Protocol::Pop => Box::new(Pop3Store::connect(host, username, password, settings).await?),
            Protocol::Imap => {
                Box::new(ImapStore::connect(host, username, password, settings).await?)
            }
        };
        Ok(Self::from_store(store))
    }

    /// Wraps an already connected store.
    #[must_use]
    pub fn from_store(store: Box<dyn MailStore>) -> Self {
        Self {
            store,
            closed: false,
        }
    }

    /// Reads the first unseen message of `folder`, if any, and marks it
    /// consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] on a protocol or I/O fault and
    /// [`Error::Codec`] if the message cannot be decoded; an undecodable
    /// message is left unconsumed.
    pub async fn read_once(&mut self, folder: &str) -> Result<Option<EmailMessage>> {
        if self.closed {
            return Err(Error::Read("mail store client is closed".into()));
        }
        let Some(unseen) = self.store.fetch_unseen(folder).await? else {
            return Ok(None);
        };

        let wire = WireMessage::parse(&unseen.raw).map_err(Error::codec)?;
        let message = codec::decode(&wire)?;
        self.store.mark_consumed(unseen.id).await?;
        debug!(id = unseen.id, bytes = unseen.raw.len(), folder, "message consumed");
        Ok(Some(message))
    }

    /// Reads the first unseen message, polling until one arrives or
    /// `max_wait` has passed.
    ///
    /// A zero `max_wait` reads exactly once.
    ///
    /// # Errors
    ///
    /// Returns what [`read_once`](Self::read_once) returns, or
    /// [`Error::PollInterrupted`] if `cancel` fires during a wait.
    pub async fn read(
        &mut self,
        folder: &str,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<EmailMessage>> {
        let mut schedule = PollState::new(Instant::now(), max_wait, POLL_INTERVAL);

        if let Some(message) = self.read_once(folder).await? {
            return Ok(Some(message));
        }
        while let Some(wait) = schedule.next_wait(Instant::now()) {
            sleep_or_cancel(wait, cancel).await?;
            if let Some(message) = self.read_once(folder).await? {
                return Ok(Some(message));
            }
        }
        debug!(folder, attempts = schedule.attempts() + 1, "no message before deadline");
        Ok(None)
    }

    /// Closes the folder and the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Close`] if the server could not be told; the
    /// client is closed either way.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.store.close().await;
        info!(ok = result.is_ok(), "mail store closed");
        result
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
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Pop,
        Imap,
    }

    #[derive(Debug, Default)]
    struct Mailbox {
        messages: Vec<(Vec<u8>, Vec<Flag>)>,
        fetches: u32,
    }

    /// In-memory store that flags messages the way the protocol does.
    struct FakeStore {
        kind: Kind,
        mailbox: Arc<Mutex<Mailbox>>,
    }

    impl FakeStore {
        fn unseen(flags: &[Flag], kind: Kind) -> bool {
            match kind {
                Kind::Pop => !flags.contains(&Flag::Deleted),
                Kind::Imap => !flags.contains(&Flag::Seen),
            }
        }
    }

    #[async_trait]
    impl MailStore for FakeStore {
        async fn fetch_unseen(&mut self, _folder: &str) -> Result<Option<UnseenMessage>> {
            let mut mailbox = self.mailbox.lock().unwrap();
            mailbox.fetches += 1;
            Ok(mailbox
                .messages
                .iter()
                .enumerate()
                .find(|(_, (_, flags))| Self::unseen(flags, self.kind))
                .map(|(i, (raw, _))| UnseenMessage {
                    id: u32::try_from(i + 1).unwrap(),
                    raw: raw.clone(),
                }))
        }

        async fn mark_consumed(&mut self, id: u32) -> Result<()> {
            let flag = match self.kind {
                Kind::Pop => Flag::Deleted,
                Kind::Imap => Flag::Seen,
            };
            let mut mailbox = self.mailbox.lock().unwrap();
            mailbox.messages[id as usize - 1].1.push(flag);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn client(kind: Kind, raws: &[&str]) -> (MailStoreClient, Arc<Mutex<Mailbox>>) {
        let mailbox = Arc::new(Mutex::new(Mailbox {
            messages: raws.iter().map(|r| (r.as_bytes().to_vec(), Vec::new())).collect(),
            fetches: 0,
        }));
        let store = FakeStore {
            kind,
            mailbox: Arc::clone(&mailbox),
        };
        (MailStoreClient::from_store(Box::new(store)), mailbox)
    }

    const FIRST: &str = "To: a@x.org\r\nSubject: first\r\n\r\none";
    const SECOND: &str = "To: a@x.org\r\nSubject: second\r\n\r\ntwo";

    #[tokio::test]
    async fn pop_read_deletes_the_message() {
        let (mut client, mailbox) = client(Kind::Pop, &[FIRST, SECOND]);

        let first = client.read_once("INBOX").await.unwrap().unwrap();
        assert_eq!(first.subject, "first");
        assert!(mailbox.lock().unwrap().messages[0].1.contains(&Flag::Deleted));

        let second = client.read_once("INBOX").await.unwrap().unwrap();
        assert_eq!(second.subject, "second");
        assert!(client.read_once("INBOX").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn imap_read_marks_seen_and_keeps_the_message() {
        let (mut client, mailbox) = client(Kind::Imap, &[FIRST]);

        assert!(client.read_once("INBOX").await.unwrap().is_some());
        assert!(client.read_once("INBOX").await.unwrap().is_none());

        let mailbox = mailbox.lock().unwrap();
        assert_eq!(mailbox.messages.len(), 1);
        assert_eq!(mailbox.messages[0].1, [Flag::Seen]);
    }

    #[tokio::test]
    async fn undecodable_message_is_left_unconsumed() {
        let raw = "Content-Type: application/json\r\n\r\n{broken";
        let (mut client, mailbox) = client(Kind::Imap, &[raw]);

        let err = client.read_once("INBOX").await.unwrap_err();
        assert_eq!(err.kind(), "CodecError");
        assert!(mailbox.lock().unwrap().messages[0].1.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_wait_reads_exactly_once() {
        let (mut client, mailbox) = client(Kind::Imap, &[]);
        let cancel = CancellationToken::new();
        let before = Instant::now();

        assert!(client.read("INBOX", Duration::ZERO, &cancel).await.unwrap().is_none());
        assert_eq!(mailbox.lock().unwrap().fetches, 1);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_store_polls_until_the_deadline() {
        let (mut client, mailbox) = client(Kind::Imap, &[]);
        let cancel = CancellationToken::new();
        let before = Instant::now();

        let found = client.read("INBOX", Duration::from_secs(2), &cancel).await.unwrap();

        let elapsed = before.elapsed();
        assert!(found.is_none());
        assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2200), "{elapsed:?}");
        assert!(mailbox.lock().unwrap().fetches > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn message_arriving_mid_wait_is_returned() {
        let (mut client, mailbox) = client(Kind::Imap, &[]);
        let cancel = CancellationToken::new();

        let late = Arc::clone(&mailbox);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(450)).await;
            late.lock().unwrap().messages.push((FIRST.as_bytes().to_vec(), Vec::new()));
        });

        let before = Instant::now();
        let found = client.read("INBOX", Duration::from_secs(5), &cancel).await.unwrap();
        assert_eq!(found.unwrap().subject, "first");
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let (mut client, _mailbox) = client(Kind::Imap, &[]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let err = client.read("INBOX", Duration::from_secs(10), &cancel).await.unwrap_err();
        assert_eq!(err.kind(), "PollInterruptedError");
    }

    #[tokio::test]
    async fn closed_client_refuses_reads() {
        let (mut client, _mailbox) = client(Kind::Pop, &[FIRST]);
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert_eq!(client.read_once("INBOX").await.unwrap_err().kind(), "ReadError");
    }
}
