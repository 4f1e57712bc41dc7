//! Typed delivery failures.
//!
//! Resolution and per-host failures are recovered inside the engine by
//! advancing to the next exchange; only exhaustion surfaces one of these,
//! retaining the last observed SMTP status so 5xx permanent rejections are
//! distinguishable from 4xx/transport failures worth retrying.

use thiserror::Error;

use crate::report::FailureKind;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The recipient domain resolved to no usable mail server.
    #[error("no mail server accepts mail for {domain}: {reason}")]
    NoMailServer { domain: String, reason: String },

    /// Transport-level failure to reach or keep talking to an exchange.
    #[error("could not reach {server}: {reason}")]
    Connect { server: String, reason: String },

    /// The exchange answered a dialogue step with an unexpected status.
    #[error("{server} answered {step} with {code}: {reply}")]
    Protocol {
        server: String,
        step: &'static str,
        code: u16,
        reply: String,
    },

    /// Invalid sender or recipient address syntax.
    #[error("invalid address: {0}")]
    BadAddress(String),
}

impl DeliveryError {
    /// `true` when a retry cannot succeed: an SMTP 5xx rejection or bad
    /// input. Connection failures and 4xx replies are worth retrying.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Protocol { code: 500..=599, .. } | Self::BadAddress(_)
        )
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::NoMailServer { .. } => FailureKind::NoMailServer,
            Self::Connect { .. } => FailureKind::Connect,
            Self::Protocol { .. } => FailureKind::Protocol,
            Self::BadAddress(_) => FailureKind::BadAddress,
        }
    }

    /// The exchange involved in the failure, when one was reached.
    #[must_use]
    pub fn server(&self) -> Option<&str> {
        match self {
            Self::Connect { server, .. } | Self::Protocol { server, .. } => Some(server),
            Self::NoMailServer { .. } | Self::BadAddress(_) => None,
        }
    }
}
