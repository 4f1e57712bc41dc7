//! Multi-upstream MX resolution over UDP.

use std::{io, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::{
    MxRecord,
    packet::{self, PacketError},
};

/// Largest datagram accepted from an upstream.
const MAX_DATAGRAM: usize = 4096;

/// Errors surfaced to callers of [`Resolver::resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// An upstream answered authoritatively, but with zero MX records.
    #[error("no MX records published for {0}")]
    NoRecords(String),

    /// Every configured upstream failed (timeout, I/O, or malformed packet).
    #[error("no usable MX response for {domain} from any upstream: {last_error}")]
    UpstreamsExhausted { domain: String, last_error: String },
}

impl ResolveError {
    /// Returns `true` if this error is temporary and a later retry may succeed.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::UpstreamsExhausted { .. })
    }
}

/// Configuration for the MX resolver.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    /// Upstream resolvers, queried in order until one answers.
    #[serde(default = "default_upstreams")]
    pub upstreams: Vec<String>,

    /// Receive timeout per upstream, in seconds (default: 5).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_upstreams() -> Vec<String> {
    vec![
        "8.8.8.8:53".to_string(),
        "1.1.1.1:53".to_string(),
        "8.8.4.4:53".to_string(),
    ]
}

const fn default_timeout_secs() -> u64 {
    5
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            upstreams: default_upstreams(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Failure of one upstream; recovered by moving to the next.
#[derive(Debug, Error)]
enum QueryError {
    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("timed out waiting for a response")]
    Timeout,
}

/// MX resolver issuing one UDP query per upstream until one answers.
#[derive(Debug, Default)]
pub struct Resolver {
    config: DnsConfig,
}

impl Resolver {
    #[must_use]
    pub const fn new(config: DnsConfig) -> Self {
        Self { config }
    }

    /// Resolves the MX records for `domain`, sorted ascending by preference.
    ///
    /// A single upstream's failure is non-fatal; the next upstream is tried.
    /// An authoritative empty answer is final and not retried elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NoRecords`] for an empty authoritative answer
    /// and [`ResolveError::UpstreamsExhausted`] when no upstream produced a
    /// usable response.
    pub async fn resolve(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut last_error = None;

        for upstream in &self.config.upstreams {
            match query_upstream(upstream, domain, timeout).await {
                Ok(records) if records.is_empty() => {
                    return Err(ResolveError::NoRecords(domain.to_string()));
                }
                Ok(mut records) => {
                    records.sort_by_key(|r| r.preference);
                    debug!(domain, upstream = %upstream, count = records.len(), "resolved MX records");
                    return Ok(records);
                }
                Err(err) => {
                    warn!(domain, upstream = %upstream, error = %err, "DNS upstream failed");
                    last_error = Some(err.to_string());
                }
            }
        }

        Err(ResolveError::UpstreamsExhausted {
            domain: domain.to_string(),
            last_error: last_error.unwrap_or_else(|| "no upstreams configured".to_string()),
        })
    }
}

async fn query_upstream(
    upstream: &str,
    domain: &str,
    timeout: Duration,
) -> Result<Vec<MxRecord>, QueryError> {
    let id = rand::random::<u16>();
    let query = packet::encode_query(id, domain)?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(upstream).await?;
    socket.send(&query).await?;

    let mut buffer = [0_u8; MAX_DATAGRAM];
    let len = tokio::time::timeout(timeout, socket.recv(&mut buffer))
        .await
        .map_err(|_| QueryError::Timeout)??;

    Ok(packet::parse_mx_response(&buffer[..len], id)?)
}
