//! The mailferry facade: configuration plus the outward-facing API over
//! the transport core, covering sending, MX diagnostics, authentication
//! records, and inbound-server introspection.

use std::{path::Path, path::PathBuf, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

use mailferry_auth::{AuthRecords, Authenticator, KeyError};
use mailferry_common::message::Message;
use mailferry_delivery::{DeliveryConfig, DeliveryEngine, DeliveryReport};
use mailferry_dns::{DnsConfig, MxRecord, ResolveError, Resolver};
use mailferry_smtp::server::ServerConfig;

pub use mailferry_common::address::EmailAddress;
pub use mailferry_common::message::Message as OutboundMessage;
pub use mailferry_smtp::server::{InboundListener, ServerHandle, ServerStatus};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The sending domain: EHLO identity, DKIM `d=` tag, Message-ID suffix.
    pub domain: String,

    /// DKIM selector label.
    #[serde(default = "default_selector")]
    pub selector: String,

    /// Directory holding `<domain>.pem` / `default.pem` DKIM keys.
    #[serde(default = "default_key_dir")]
    pub key_dir: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

fn default_selector() -> String {
    "default".to_string()
}

fn default_key_dir() -> PathBuf {
    PathBuf::from("keys")
}

impl Config {
    /// Loads and parses the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Ok(toml::from_str(&text)?)
    }
}

/// The outbound half of the core: message signing, delivery, diagnostics.
pub struct Mailer {
    engine: DeliveryEngine,
    authenticator: Arc<Authenticator>,
    resolver: Arc<Resolver>,
}

impl Mailer {
    /// Builds the authenticator, resolver, and delivery engine from one
    /// configuration.
    ///
    /// # Errors
    ///
    /// Fails when no DKIM key material could be loaded or synthesized.
    pub fn new(config: &Config) -> Result<Self, KeyError> {
        let authenticator = Arc::new(Authenticator::new(
            config.domain.as_str(),
            config.selector.as_str(),
            &config.key_dir,
        )?);
        let resolver = Arc::new(Resolver::new(config.dns.clone()));

        let engine = DeliveryEngine::new(
            config.delivery.clone(),
            Arc::clone(&resolver) as Arc<dyn mailferry_delivery::MxResolver>,
            Arc::clone(&authenticator),
        );

        Ok(Self {
            engine,
            authenticator,
            resolver,
        })
    }

    /// Signs and delivers one message, returning the aggregated outcome.
    pub async fn send(&self, message: &Message) -> DeliveryReport {
        self.engine.send(message).await
    }

    /// Diagnostic MX lookup through the production resolver.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] when resolution fails or no records are
    /// published.
    pub async fn resolve_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        self.resolver.resolve(domain).await
    }

    /// The SPF/DKIM/DMARC TXT records `domain` should publish.
    #[must_use]
    pub fn auth_dns_records(&self, domain: &str) -> AuthRecords {
        self.authenticator.dns_records(domain)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_defaults_fill_in() {
        let config: Config = toml::from_str("domain = \"example.com\"").unwrap();

        assert_eq!(config.domain, "example.com");
        assert_eq!(config.selector, "default");
        assert_eq!(config.key_dir, PathBuf::from("keys"));
        assert_eq!(config.server.port, 2525);
        assert_eq!(config.dns.timeout_secs, 5);
        assert_eq!(config.delivery.connect_timeout_secs, 30);
        assert_eq!(config.delivery.overall_budget_secs, None);
    }

    #[test]
    fn config_sections_override() {
        let config: Config = toml::from_str(
            r#"
            domain = "example.com"
            selector = "mail"

            [server]
            host = "127.0.0.1"
            port = 2626
            banner = "mx.example.com"

            [dns]
            upstreams = ["9.9.9.9:53"]
            timeout_secs = 3

            [delivery]
            connect_timeout_secs = 10
            overall_budget_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.selector, "mail");
        assert_eq!(config.server.port, 2626);
        assert_eq!(config.server.banner, "mx.example.com");
        assert_eq!(config.dns.upstreams, vec!["9.9.9.9:53"]);
        assert_eq!(config.delivery.overall_budget_secs, Some(120));
    }
}
