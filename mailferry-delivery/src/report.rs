//! The outcome handed back to the caller of a delivery.

use serde::Serialize;

use crate::error::DeliveryError;

/// Classification of a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The recipient domain has no reachable mail server (resolution failed
    /// or returned nothing).
    NoMailServer,
    /// Every exchange failed at the transport level.
    Connect,
    /// An exchange rejected a dialogue step.
    Protocol,
    /// The message carried an invalid address.
    BadAddress,
}

/// One delivery's final outcome, aggregated across all MX attempts.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub success: bool,
    /// Plain-language description of what happened.
    pub message: String,
    /// The exchange that accepted or last rejected the message.
    pub server: Option<String>,
    /// The generated message identifier, on success.
    pub message_id: Option<String>,
    pub failure: Option<FailureKind>,
    /// `true` when retrying later cannot help (SMTP 5xx, bad input).
    pub permanent: bool,
}

impl DeliveryReport {
    pub(crate) fn delivered(server: String, message_id: String) -> Self {
        Self {
            success: true,
            message: format!("message accepted by {server}"),
            server: Some(server),
            message_id: Some(message_id),
            failure: None,
            permanent: false,
        }
    }

    pub(crate) fn failed(error: &DeliveryError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            server: error.server().map(ToString::to_string),
            message_id: None,
            failure: Some(error.kind()),
            permanent: error.is_permanent(),
        }
    }
}
