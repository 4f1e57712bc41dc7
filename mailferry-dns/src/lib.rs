//! MX resolution over raw DNS datagrams.
//!
//! Queries are encoded and responses decoded by hand per RFC 1035 (header,
//! question and answer sections, name compression) rather than through a
//! recursive-resolver library. Queries go to a small set of public
//! upstreams in turn; the first usable answer wins.

pub mod packet;
pub mod resolver;

use serde::{Deserialize, Serialize};

pub use resolver::{DnsConfig, ResolveError, Resolver};

/// Default port a resolved exchange is contacted on.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// A single MX answer: the exchange host and its preference.
///
/// Lower preference values are tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxRecord {
    /// The exchange hostname, without a trailing root dot.
    pub exchange: String,
    /// MX preference (lower value = tried earlier).
    pub preference: u16,
    /// Port the exchange accepts mail on (25 unless overridden).
    pub port: u16,
}

impl MxRecord {
    #[must_use]
    pub fn new(exchange: impl Into<String>, preference: u16) -> Self {
        Self {
            exchange: exchange.into(),
            preference,
            port: DEFAULT_SMTP_PORT,
        }
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Returns the full address as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.exchange, self.port)
    }
}
