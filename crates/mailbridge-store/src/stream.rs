//! Plain or TLS transport shared by the POP3 and IMAP clients.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// A stream that can be either plaintext or TLS.
#[derive(Debug)]
pub enum MailStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl MailStream {
    /// Upgrades a plaintext stream to TLS (STARTTLS / STLS).
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already TLS or the handshake
    /// fails.
    pub async fn upgrade_to_tls(self, host: &str, connector: &TlsConnector) -> Result<Self> {
        match self {
            Self::Plain(tcp) => handshake(tcp, host, connector).await,
            Self::Tls(_) => Err(Error::Protocol("Stream is already TLS".to_string())),
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

async fn handshake(tcp: TcpStream, host: &str, connector: &TlsConnector) -> Result<MailStream> {
    let server_name = ServerName::try_from(host.to_string())?;
    let tls = connector.connect(server_name, tcp).await?;
    Ok(MailStream::Tls(Box::new(tls)))
}

/// Connects to a server with TLS from the start.
///
/// # Errors
///
/// Returns an error if the connection or handshake fails.
pub async fn connect_tls(host: &str, port: u16, connector: &TlsConnector) -> Result<MailStream> {
    let tcp = TcpStream::connect((host, port)).await?;
    handshake(tcp, host, connector).await
}

/// Connects to a server without TLS (for STARTTLS or testing).
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect_plain(host: &str, port: u16) -> Result<MailStream> {
    let tcp = TcpStream::connect((host, port)).await?;
    Ok(MailStream::Plain(tcp))
}
