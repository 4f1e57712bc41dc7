//! Outbound SMTP client with opportunistic STARTTLS.

mod error;

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::warn;

use mailferry_common::outgoing;

use crate::response::Response;

pub use error::{ClientError, Result};

/// Initial size of the reply buffer.
const BUFFER_SIZE: usize = 8192;

/// Upper bound on reply buffering; anything larger is a protocol violation.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// The transport under the dialogue: plain TCP or TLS after STARTTLS.
enum Connection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    /// Re-negotiates the plain connection as an encrypted channel.
    async fn upgrade_to_tls(self, server_name: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::Tls("connection is already TLS".to_string()));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            root_store
                .add(cert)
                .map_err(|err| ClientError::Tls(format!("failed to add certificate: {err}")))?;
        }
        if !certs.errors.is_empty() {
            warn!(?certs.errors, "some system certificates could not be loaded");
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if accept_invalid_certs {
            // Opportunistic encryption: an unverifiable certificate still
            // beats plaintext. This is an explicit, logged decision.
            warn!(
                server = server_name,
                "certificate validation relaxed for opportunistic TLS"
            );
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        let connector = TlsConnector::from(Arc::new(config));
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|err| ClientError::Tls(format!("invalid server name: {err}")))?;

        let tls_stream = connector
            .connect(name, stream)
            .await
            .map_err(|err| ClientError::Tls(err.to_string()))?;

        Ok(Self::Tls(Box::new(tls_stream)))
    }
}

/// A certificate verifier that accepts any certificate. Only installed when
/// the caller explicitly relaxes validation for opportunistic encryption.
#[derive(Debug)]
struct NoVerifier;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::ServerCertVerified,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

/// One SMTP dialogue with a single server.
pub struct SmtpClient {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_name: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Opens a TCP connection to `addr`. `server_name` is the exchange
    /// hostname, used for SNI if the dialogue later upgrades to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, server_name: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Io)?;

        Ok(Self {
            connection: Some(Connection::Plain(stream)),
            buffer: vec![0_u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_name: server_name.into(),
            accept_invalid_certs: false,
        })
    }

    /// Relaxes certificate validation for the STARTTLS upgrade.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Reads the initial `220` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends one command line and reads the complete reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        let data = format!("{command}\r\n");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data.as_bytes())
            .await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Transmits the message payload followed by the `CRLF.CRLF` terminator,
    /// dot-stuffing every payload line that begins with a dot, and reads the
    /// final reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading the reply fails.
    pub async fn send_payload(&mut self, payload: &[u8]) -> Result<Response> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;

        connection.send(&frame_payload(payload)).await?;
        self.read_response().await
    }

    /// Issues `STARTTLS`; on a `220` reply the connection is re-negotiated
    /// as an encrypted channel. Any other reply leaves the connection as it
    /// was so the caller can continue in plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if the command, or the TLS handshake after a `220`
    /// reply, fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.code == 220 {
            let connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;
            self.connection = Some(
                connection
                    .upgrade_to_tls(&self.server_name, self.accept_invalid_certs)
                    .await?,
            );
            // Capabilities changed with the channel; the buffer holds
            // nothing valid across the upgrade.
            self.buffer_pos = 0;
        }

        Ok(response)
    }

    /// Reads one complete (possibly multi-line) reply.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ReplyTooLarge(MAX_BUFFER_SIZE));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

/// Frames a message payload for the DATA phase: CRLF line endings, lines
/// beginning with a dot escaped with a second dot, and the `CRLF.CRLF`
/// terminator appended.
fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(payload.len() + 64);

    let mut lines = payload.split(|&byte| byte == b'\n').peekable();
    while let Some(line) = lines.next() {
        // A trailing newline produces one final empty fragment, which is
        // not a payload line of its own.
        if lines.peek().is_none() && line.is_empty() {
            break;
        }

        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            wire.push(b'.');
        }
        wire.extend_from_slice(line);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b".\r\n");

    wire
}
