//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream};
use crate::command::{Command, encode_data};
use crate::error::{Error, Result};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::marker::PhantomData;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Type-state marker for a greeted but unauthenticated session.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for a session ready to start a transaction.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for an open mail transaction.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or the server
    /// refuses the session.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = stream.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::from(&greeting));
        }

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(server = %hostname, tls = stream.is_tls(), "SMTP greeting received");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: Vec::new(),
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        self.refresh_extensions(client_hostname).await?;
        Ok(self)
    }

    /// Upgrades the connection to TLS using STARTTLS, then repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised or the upgrade fails.
    pub async fn starttls(
        mut self,
        connector: &TlsConnector,
        server_hostname: &str,
        client_hostname: &str,
    ) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        self.expect_success(Command::StartTls).await?;
        self.stream = self
            .stream
            .upgrade_to_tls(server_hostname, connector)
            .await?;
        self.refresh_extensions(client_hostname).await?;
        Ok(self)
    }

    /// Authenticates with the best mechanism the server offers.
    ///
    /// PLAIN is preferred, LOGIN is the fallback. A server that does not
    /// advertise AUTH at all is used without authentication.
    ///
    /// # Errors
    ///
    /// Returns an error if the server offers only mechanisms this client
    /// does not implement, or if authentication fails.
    pub async fn authenticate(
        self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let offered = self.server_info.auth_mechanisms().map(|mechanisms| {
            (
                mechanisms.contains(&AuthMechanism::Plain),
                mechanisms.contains(&AuthMechanism::Login),
            )
        });

        match offered {
            None => {
                debug!("server does not advertise AUTH, continuing unauthenticated");
                Ok(self.into_state())
            }
            Some((true, _)) => self.auth_plain(username, password).await,
            Some((false, true)) => self.auth_login(username, password).await,
            Some((false, false)) => Err(Error::NotSupported("AUTH PLAIN or LOGIN".into())),
        }
    }

    /// Authenticates using the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let credentials = format!("\0{username}\0{password}");
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(STANDARD.encode(credentials.as_bytes())),
        };
        self.expect_success(cmd).await?;
        debug!(mechanism = "PLAIN", "SMTP authentication succeeded");
        Ok(self.into_state())
    }

    /// Authenticates using the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let mut reply = self
            .send_command(Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            })
            .await?;

        for secret in [username, password] {
            if reply.code != ReplyCode::AUTH_CONTINUE {
                return Err(Error::from(&reply));
            }
            reply = self
                .send_command(Command::AuthResponse(STANDARD.encode(secret.as_bytes())))
                .await?;
        }

        if !reply.is_success() {
            return Err(Error::from(&reply));
        }
        debug!(mechanism = "LOGIN", "SMTP authentication succeeded");
        Ok(self.into_state())
    }

    async fn refresh_extensions(&mut self, client_hostname: &str) -> Result<()> {
        let reply = self
            .expect_success(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;

        // The first line is the server's greeting, the rest are keywords.
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        debug!(extensions = ?self.server_info.extensions, "EHLO capabilities");
        Ok(())
    }
}

impl Client<Authenticated> {
    /// Starts a mail transaction.
    ///
    /// When the server advertised SIZE, the message size is declared and
    /// checked against the limit before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is too large or MAIL FROM is
    /// rejected.
    pub async fn mail_from(
        mut self,
        from: &Address,
        size: Option<usize>,
    ) -> Result<Client<MailTransaction>> {
        let limit = self.server_info.max_message_size();
        if let (Some(size), Some(limit)) = (size, limit) {
            if limit > 0 && size > limit {
                return Err(Error::MessageTooLarge { size, limit });
            }
        }

        let cmd = Command::MailFrom {
            from: Some(from.clone()),
            size: size.filter(|_| limit.is_some()),
        };
        self.expect_success(cmd).await?;
        Ok(self.into_state())
    }
}

impl Client<MailTransaction> {
    /// Adds a recipient to the transaction.
    ///
    /// The server's reply is returned whether or not it accepted the
    /// recipient; only transport and protocol failures are errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged.
    pub async fn rcpt_to(&mut self, to: &Address) -> Result<Reply> {
        let reply = self.send_command(Command::RcptTo { to: to.clone() }).await?;
        if !reply.is_success() {
            debug!(recipient = %to, code = %reply.code, "recipient rejected");
        }
        Ok(reply)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer DATA with 354.
    pub async fn data(mut self) -> Result<Client<Data>> {
        let reply = self.send_command(Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Error::from(&reply));
        }
        Ok(self.into_state())
    }

    /// Aborts the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(mut self) -> Result<Client<Authenticated>> {
        self.expect_success(Command::Rset).await?;
        Ok(self.into_state())
    }
}

impl Client<Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// The message should be RFC 5322 formatted. Line endings are
    /// normalized to CRLF and the terminating "." line is added.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the server rejects the message.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Authenticated>> {
        self.stream.write_all(&encode_data(message)).await?;

        let reply = self.stream.read_reply().await?;
        if !reply.is_success() {
            return Err(Error::from(&reply));
        }
        debug!(bytes = message.len(), "message accepted");
        Ok(self.into_state())
    }
}

// Common implementation for all states
impl<S> Client<S> {
    fn into_state<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = self.stream.read_reply().await?;
        debug!(command = cmd.name(), code = %reply.code, "SMTP exchange");
        Ok(reply)
    }

    async fn expect_success(&mut self, cmd: Command) -> Result<Reply> {
        let reply = self.send_command(cmd).await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(Error::from(&reply))
        }
    }

    /// Sends NOOP, useful to check a session is still alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer with success.
    pub async fn noop(&mut self) -> Result<()> {
        self.expect_success(Command::Noop).await.map(drop)
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;
        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(Error::from(&reply));
        }
        Ok(())
    }
}
