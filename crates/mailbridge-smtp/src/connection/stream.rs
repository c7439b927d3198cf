//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use crate::types::{Reply, is_last_reply_line};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Longest reply line accepted before the server is considered broken.
const MAX_REPLY_LINE: usize = 4096;

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

impl SmtpStream {
    /// Reads a line from the stream, without its line ending.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the server closed the
    /// connection.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = match self {
            Self::Tcp(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
        };
        if read == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        if line.len() > MAX_REPLY_LINE {
            return Err(Error::Protocol("reply line too long".into()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Reads one complete reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the reply is malformed.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                continue;
            }
            let last = is_last_reply_line(&line);
            lines.push(line);
            if last {
                break;
            }
        }
        Reply::parse(&lines)
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                let stream = reader.get_mut();
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Self::Tls(reader) => {
                let stream = reader.get_mut();
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already TLS or the handshake
    /// fails.
    pub async fn upgrade_to_tls(self, hostname: &str, connector: &TlsConnector) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
        };
        handshake(tcp_stream, hostname, connector).await
    }
}

async fn handshake(tcp: TcpStream, hostname: &str, connector: &TlsConnector) -> Result<SmtpStream> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::InvalidHostname(hostname.to_string()))?;
    let tls_stream = connector.connect(server_name, tcp).await?;
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))))
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let stream = TcpStream::connect((hostname, port)).await?;
    Ok(SmtpStream::Tcp(BufReader::new(stream)))
}

/// Connects to an SMTP server over implicit TLS (port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(hostname: &str, port: u16, connector: &TlsConnector) -> Result<SmtpStream> {
    let tcp_stream = TcpStream::connect((hostname, port)).await?;
    handshake(tcp_stream, hostname, connector).await
}
