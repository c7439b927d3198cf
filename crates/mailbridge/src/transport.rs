//! SMTP delivery of structured messages.
//!
//! [`SmtpClient::open`] resolves the session properties and the TLS
//! connector once; each [`SmtpClient::send`] opens its own SMTP session,
//! delivers one message and quits.

use mailbridge_mime::Mailbox;
use mailbridge_smtp::connection::{SmtpStream, connect, connect_tls};
use mailbridge_smtp::{Address, Authenticated, Client, SmtpConnection};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::{SessionProperties, SmtpConfig};
use crate::message::EmailMessage;
use crate::tls::build_connector;
use crate::{Error, Result};

/// Sends messages through one SMTP server.
pub struct SmtpClient {
    host: String,
    username: String,
    password: String,
    config: SmtpConfig,
    props: SessionProperties,
    connector: TlsConnector,
}

impl std::fmt::Debug for SmtpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpClient")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("config", &self.config)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

impl SmtpClient {
    /// Prepares a client for `host`.
    ///
    /// No connection is made here; the server is contacted by
    /// [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if the TLS settings cannot be applied.
    pub fn open(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        config: SmtpConfig,
    ) -> Result<Self> {
        let host = host.into();
        let username = username.into();
        let props = SessionProperties::resolve(config.security, config.secure_socket.as_ref());
        props.log("smtp", &host, config.port, &username);
        let connector = build_connector(config.secure_socket.as_ref())?;

        Ok(Self {
            host,
            username,
            password: password.into(),
            config,
            props,
            connector,
        })
    }

    /// Builds and delivers `message`.
    ///
    /// The envelope sender is the message's `from`, or the username when
    /// that is empty. Every to, cc and bcc address is an envelope
    /// recipient; the `Bcc` header itself is not transmitted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressFormat`] or [`Error::Codec`] if the message
    /// cannot be built, and [`Error::Send`] if delivery fails. When some
    /// recipients are refused the error lists them; with `send_partial`
    /// the message has still been delivered to the others.
    pub async fn send(&self, message: &EmailMessage) -> Result<()> {
        let wire = codec::build(message, &self.username)?;
        let data = wire.render_without(&["Bcc"]);

        let envelope_from = if message.from.trim().is_empty() {
            self.username.as_str()
        } else {
            message.from.as_str()
        };
        let from = smtp_address(envelope_from)?;
        let mut recipients = Vec::new();
        for entry in message.recipients() {
            for mailbox in mailbridge_mime::parse_mailbox_list(entry)? {
                recipients.push(smtp_address(&mailbox.address)?);
            }
        }
        if recipients.is_empty() {
            return Err(Error::send("message has no recipients"));
        }

        let client = self.session().await.map_err(Error::send)?;
        let mut txn = client
            .mail_from(&from, Some(data.len()))
            .await
            .map_err(Error::send)?;

        let mut rejected = Vec::new();
        for recipient in &recipients {
            let reply = txn.rcpt_to(recipient).await.map_err(Error::send)?;
            if !reply.is_success() {
                warn!(recipient = %recipient, code = %reply.code, "recipient rejected");
                rejected.push(recipient.as_str().to_string());
            }
        }

        let deliver = rejected.len() < recipients.len()
            && (rejected.is_empty() || self.config.send_partial);
        if !deliver {
            let client = txn.reset().await.map_err(Error::send)?;
            quit(client).await;
            return Err(rejection(&rejected, false));
        }

        let client = txn
            .data()
            .await
            .map_err(Error::send)?
            .send_message(&data)
            .await
            .map_err(Error::send)?;
        quit(client).await;

        info!(
            host = %self.host,
            recipients = recipients.len() - rejected.len(),
            bytes = data.len(),
            "message sent"
        );
        if rejected.is_empty() {
            Ok(())
        } else {
            Err(rejection(&rejected, true))
        }
    }

    /// Connects, applies the security posture and authenticates.
    async fn session(&self) -> mailbridge_smtp::Result<Client<Authenticated>> {
        let (host, port) = (self.host.as_str(), self.config.port);
        let hostname = self.config.client_hostname.as_str();

        let stream: SmtpStream = if self.props.ssl_enabled {
            connect_tls(host, port, &self.connector).await?
        } else {
            connect(host, port).await?
        };
        let mut client = Client::from_stream(stream).await?.ehlo(hostname).await?;

        if !self.props.ssl_enabled && self.props.starttls_enabled {
            if client.server_info().supports_starttls() {
                client = client.starttls(&self.connector, host, hostname).await?;
                debug!(host, "SMTP session upgraded with STARTTLS");
            } else if self.props.starttls_required {
                return Err(mailbridge_smtp::Error::NotSupported("STARTTLS".into()));
            }
        }

        client.authenticate(&self.username, &self.password).await
    }
}

fn smtp_address(input: &str) -> Result<Address> {
    let mailbox = Mailbox::parse(input)?;
    Address::new(mailbox.address).map_err(|e| Error::AddressFormat(e.to_string()))
}

fn rejection(rejected: &[String], delivered: bool) -> Error {
    let message = if delivered {
        format!(
            "delivered, but {} recipient(s) were rejected: {}",
            rejected.len(),
            rejected.join(",")
        )
    } else {
        format!(
            "not delivered, {} recipient(s) were rejected: {}",
            rejected.len(),
            rejected.join(",")
        )
    };
    Error::Send {
        message,
        rejected: rejected.to_vec(),
    }
}

async fn quit(client: Client<Authenticated>) {
    if let Err(e) = client.quit().await {
        debug!(error = %e, "SMTP QUIT failed");
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

    #[test]
    fn smtp_address_strips_display_name() {
        assert_eq!(smtp_address("Ann <ann@x.org>").unwrap().as_str(), "ann@x.org");
        assert_eq!(smtp_address("bob").unwrap_err().kind(), "AddressFormatError");
    }

    #[test]
    fn rejection_lists_addresses() {
        let err = rejection(&["a@x.org".into(), "b@x.org".into()], true);
        assert_eq!(err.kind(), "SendError");
        assert_eq!(err.rejected(), ["a@x.org", "b@x.org"]);
        assert!(err.to_string().contains("a@x.org,b@x.org"));
    }

    #[tokio::test]
    async fn message_without_recipients_is_send_error() {
        let client = SmtpClient::open("127.0.0.1", "me@x.org", "pw", SmtpConfig::default()).unwrap();
        let err = client
            .send(&EmailMessage::new(Vec::<String>::new(), "s", "b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "SendError");
    }

    #[test]
    fn debug_hides_password() {
        let client =
            SmtpClient::open("smtp.x.org", "me@x.org", "hunter2", SmtpConfig::default()).unwrap();
        assert!(!format!("{client:?}").contains("hunter2"));
    }
}
