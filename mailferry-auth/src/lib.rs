//! Message construction and authentication.
//!
//! Builds RFC 5322 messages with a fixed header order, overlays a DKIM
//! signature (RFC 6376, relaxed/simple canonicalization over a fixed header
//! subset), and derives the SPF/DKIM/DMARC TXT records a sending domain
//! publishes.
//!
//! Signing is a best-effort overlay: a message is never lost to a signing
//! failure, it degrades to unsigned and the condition is logged and flagged.

mod canonical;
pub mod keys;
pub mod records;
mod signer;

use std::{
    net::{IpAddr, Ipv4Addr},
    path::Path,
    sync::Arc,
};

use tracing::warn;
use ulid::Ulid;

use mailferry_common::message::Message;

pub use keys::{DkimKey, KeyError, KeySource};
pub use records::{AuthRecords, DnsRecord};

/// A fully rendered wire message plus its authentication outcome.
#[derive(Debug, Clone)]
pub struct SignedMessage {
    /// Raw message bytes: headers, one blank line, body. CRLF line endings.
    pub bytes: Vec<u8>,
    /// The generated message identifier (`<id>@<domain>` without brackets).
    pub message_id: String,
    /// `true` when the DKIM signature does not carry full domain trust:
    /// a non-domain key was used or signing failed entirely.
    pub degraded: bool,
}

/// Builds and signs outbound messages for one configured sending domain.
///
/// Key material is loaded once at construction and shared read-only across
/// concurrent signing operations.
pub struct Authenticator {
    domain: String,
    key: Arc<DkimKey>,
    outbound_ip: IpAddr,
}

impl Authenticator {
    /// Loads key material for `domain` from `key_dir` and prepares the
    /// authenticator. Missing domain keys fall back to a shared default key
    /// or an ephemeral one; both are logged as degraded trust.
    ///
    /// # Errors
    ///
    /// Fails only when no key could be loaded *and* ephemeral key
    /// generation failed.
    pub fn new(
        domain: impl Into<String>,
        selector: impl Into<String>,
        key_dir: &Path,
    ) -> Result<Self, KeyError> {
        let domain = domain.into();
        let key = DkimKey::load(key_dir, &domain, &selector.into())?;

        Ok(Self {
            domain,
            key: Arc::new(key),
            outbound_ip: detect_outbound_ip(),
        })
    }

    /// Overrides the outbound IP advertised in generated SPF records.
    #[must_use]
    pub const fn with_outbound_ip(mut self, ip: IpAddr) -> Self {
        self.outbound_ip = ip;
        self
    }

    /// The configured sending domain (also the EHLO identity).
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Renders `message` into wire bytes with the fixed header order and a
    /// `DKIM-Signature` prepended when signing succeeds.
    ///
    /// Never fails: a signing error produces the unsigned message with
    /// `degraded` set.
    #[must_use]
    pub fn build_signed_message(&self, message: &Message) -> SignedMessage {
        let id = Ulid::new().to_string();
        let message_id = format!("{id}@{}", self.domain);

        let from_value = message.from_name.as_ref().map_or_else(
            || message.from.to_string(),
            |name| format!("{name} <{}>", message.from),
        );
        let content_type = if message.html {
            "text/html; charset=utf-8"
        } else {
            "text/plain; charset=utf-8"
        };

        let headers: Vec<(String, String)> = [
            ("Message-ID", format!("<{message_id}>")),
            ("Date", chrono::Utc::now().to_rfc2822()),
            ("From", from_value),
            ("To", message.to.to_string()),
            ("Subject", message.subject.clone()),
            ("Return-Path", format!("<{}>", message.from)),
            ("Reply-To", message.from.to_string()),
            (
                "X-Mailer",
                format!("mailferry/{}", env!("CARGO_PKG_VERSION")),
            ),
            ("X-Priority", "3".to_string()),
            ("X-MSMail-Priority", "Normal".to_string()),
            ("Content-Type", content_type.to_string()),
            ("Content-Transfer-Encoding", "8bit".to_string()),
            ("MIME-Version", "1.0".to_string()),
            (
                "List-Unsubscribe",
                format!("<mailto:unsubscribe@{}>", self.domain),
            ),
            (
                "List-Unsubscribe-Post",
                "List-Unsubscribe=One-Click".to_string(),
            ),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        let body = canonical::normalize_line_endings(message.body.as_bytes());

        let mut degraded = self.key.is_degraded();
        let mut bytes = Vec::with_capacity(body.len() + 1024);

        match signer::sign_headers(&self.key, &self.domain, &headers, &body) {
            Ok(value) => {
                bytes.extend_from_slice(format!("DKIM-Signature: {value}\r\n").as_bytes());
            }
            Err(err) => {
                warn!(
                    domain = %self.domain,
                    error = %err,
                    "DKIM signing failed, transmitting unsigned"
                );
                degraded = true;
            }
        }

        for (name, value) in &headers {
            bytes.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&body);

        SignedMessage {
            bytes,
            message_id,
            degraded,
        }
    }

    /// Derives the SPF, DKIM, and DMARC TXT records `domain` must publish.
    #[must_use]
    pub fn dns_records(&self, domain: &str) -> AuthRecords {
        records::for_domain(
            domain,
            self.key.selector(),
            self.key.public_key_b64(),
            self.outbound_ip,
        )
    }
}

/// Best-effort discovery of the local outbound IP for SPF records. No
/// packet is sent; the socket is only connected to pick a route.
fn detect_outbound_ip() -> IpAddr {
    std::net::UdpSocket::bind(("0.0.0.0", 0))
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 80))?;
            socket.local_addr()
        })
        .map_or(IpAddr::V4(Ipv4Addr::LOCALHOST), |addr| addr.ip())
}
