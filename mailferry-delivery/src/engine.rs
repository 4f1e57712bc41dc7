//! The outbound delivery engine.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use tracing::{debug, info, warn};

use mailferry_auth::Authenticator;
use mailferry_common::message::Message;
use mailferry_dns::MxRecord;
use mailferry_smtp::client::{ClientError, SmtpClient};
use mailferry_smtp::response::Response;

use crate::{error::DeliveryError, report::DeliveryReport, resolver::MxResolver};

/// Configuration for the delivery engine.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Bounded connect timeout per exchange, in seconds (default: 30).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout per dialogue step, in seconds (default: 60).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Optional wall-clock budget across all MX attempts of one delivery.
    /// Off by default, matching unbounded sequential failover.
    #[serde(default)]
    pub overall_budget_secs: Option<u64>,

    /// Relax certificate validation for opportunistic STARTTLS. Explicit
    /// and logged when exercised; unverified encryption still beats
    /// plaintext for opportunistic upgrades.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

const fn default_connect_timeout_secs() -> u64 {
    30
}

const fn default_command_timeout_secs() -> u64 {
    60
}

const fn default_accept_invalid_certs() -> bool {
    true
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            overall_budget_secs: None,
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

/// Sends signed messages to the recipient domain's exchanges, in ascending
/// preference order, sequentially, until one accepts.
pub struct DeliveryEngine {
    config: DeliveryConfig,
    resolver: Arc<dyn MxResolver>,
    authenticator: Arc<Authenticator>,
}

impl DeliveryEngine {
    #[must_use]
    pub fn new(
        config: DeliveryConfig,
        resolver: Arc<dyn MxResolver>,
        authenticator: Arc<Authenticator>,
    ) -> Self {
        Self {
            config,
            resolver,
            authenticator,
        }
    }

    /// Delivers `message`, returning the aggregated outcome.
    ///
    /// Never raises a fault past this boundary: every failure mode is
    /// folded into the report's classification.
    pub async fn send(&self, message: &Message) -> DeliveryReport {
        let result = match self.config.overall_budget_secs {
            Some(budget) => {
                tokio::time::timeout(Duration::from_secs(budget), self.send_inner(message))
                    .await
                    .unwrap_or_else(|_| {
                        Err(DeliveryError::Connect {
                            server: message.to.domain().to_string(),
                            reason: format!(
                                "delivery budget of {budget}s exhausted across all MX attempts"
                            ),
                        })
                    })
            }
            None => self.send_inner(message).await,
        };

        match result {
            Ok((server, message_id)) => {
                info!(server = %server, message_id = %message_id, "message delivered");
                DeliveryReport::delivered(server, message_id)
            }
            Err(err) => {
                warn!(error = %err, "delivery failed");
                DeliveryReport::failed(&err)
            }
        }
    }

    async fn send_inner(&self, message: &Message) -> Result<(String, String), DeliveryError> {
        let domain = message.to.domain();

        let mut records =
            self.resolver
                .resolve(domain)
                .await
                .map_err(|err| DeliveryError::NoMailServer {
                    domain: domain.to_string(),
                    reason: err.to_string(),
                })?;

        if records.is_empty() {
            return Err(DeliveryError::NoMailServer {
                domain: domain.to_string(),
                reason: "resolver returned no records".to_string(),
            });
        }

        // Ascending preference; a stable sort keeps equal-preference hosts
        // in answer order.
        records.sort_by_key(|record| record.preference);

        let signed = self.authenticator.build_signed_message(message);

        let mut last_error = None;
        for record in &records {
            debug!(
                exchange = %record.exchange,
                preference = record.preference,
                "attempting delivery"
            );

            match self.attempt(record, message, &signed.bytes).await {
                Ok(()) => return Ok((record.exchange.clone(), signed.message_id.clone())),
                Err(err) => {
                    warn!(
                        exchange = %record.exchange,
                        error = %err,
                        "delivery attempt failed, trying next exchange"
                    );
                    last_error = Some(err);
                }
            }
        }

        // records is non-empty, so at least one attempt ran and failed.
        Err(last_error.unwrap_or_else(|| DeliveryError::NoMailServer {
            domain: domain.to_string(),
            reason: "no delivery attempt was made".to_string(),
        }))
    }

    /// One complete SMTP dialogue with one exchange.
    async fn attempt(
        &self,
        record: &MxRecord,
        message: &Message,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        let server = record.exchange.as_str();
        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);

        let client = tokio::time::timeout(
            connect_timeout,
            SmtpClient::connect(&record.address(), record.exchange.clone()),
        )
        .await
        .map_err(|_| DeliveryError::Connect {
            server: server.to_string(),
            reason: format!("connect timed out after {}s", self.config.connect_timeout_secs),
        })?
        .map_err(|err| DeliveryError::Connect {
            server: server.to_string(),
            reason: err.to_string(),
        })?;
        let mut client = client.accept_invalid_certs(self.config.accept_invalid_certs);

        let greeting = self.step(server, "greeting", client.read_greeting()).await?;
        if greeting.code != 220 {
            return Err(reject(server, "greeting", &greeting));
        }

        let helo_domain = self.authenticator.domain();

        let mut capabilities = self.step(server, "EHLO", client.ehlo(helo_domain)).await?;
        if !capabilities.is_success() {
            // Legacy peers may only speak HELO.
            capabilities = self.step(server, "HELO", client.helo(helo_domain)).await?;
            if !capabilities.is_success() {
                return Err(reject(server, "HELO", &capabilities));
            }
        } else if capabilities.advertises("STARTTLS") {
            let reply = self.step(server, "STARTTLS", client.starttls()).await?;
            if reply.code == 220 {
                // The dialogue restarts over the encrypted channel.
                let upgraded = self.step(server, "EHLO", client.ehlo(helo_domain)).await?;
                if !upgraded.is_success() {
                    return Err(reject(server, "EHLO after STARTTLS", &upgraded));
                }
            } else {
                debug!(server, code = reply.code, "peer declined STARTTLS, staying plaintext");
            }
        }

        let reply = self
            .step(server, "MAIL FROM", client.mail_from(&message.from.to_string()))
            .await?;
        if reply.code != 250 {
            return Err(reject(server, "MAIL FROM", &reply));
        }

        let reply = self
            .step(server, "RCPT TO", client.rcpt_to(&message.to.to_string()))
            .await?;
        if reply.code != 250 {
            return Err(reject(server, "RCPT TO", &reply));
        }

        let reply = self.step(server, "DATA", client.data()).await?;
        if reply.code != 354 {
            return Err(reject(server, "DATA", &reply));
        }

        let reply = self.step(server, "message", client.send_payload(payload)).await?;
        if reply.code != 250 {
            return Err(reject(server, "message", &reply));
        }

        // The message is accepted; a failed QUIT is not a failed delivery.
        let quit_timeout = Duration::from_secs(self.config.command_timeout_secs);
        if tokio::time::timeout(quit_timeout, client.quit()).await.is_err() {
            debug!(server, "QUIT timed out after accepted delivery");
        }

        Ok(())
    }

    /// Runs one dialogue step under the command timeout, mapping transport
    /// failures into classified errors.
    async fn step<F>(
        &self,
        server: &str,
        step: &'static str,
        future: F,
    ) -> Result<Response, DeliveryError>
    where
        F: Future<Output = Result<Response, ClientError>>,
    {
        let timeout = Duration::from_secs(self.config.command_timeout_secs);

        tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| DeliveryError::Connect {
                server: server.to_string(),
                reason: format!("{step} timed out after {}s", self.config.command_timeout_secs),
            })?
            .map_err(|err| DeliveryError::Connect {
                server: server.to_string(),
                reason: format!("{step} failed: {err}"),
            })
    }
}

fn reject(server: &str, step: &'static str, reply: &Response) -> DeliveryError {
    DeliveryError::Protocol {
        server: server.to_string(),
        step,
        code: reply.code,
        reply: reply.message(),
    }
}
