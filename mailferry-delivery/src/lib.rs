//! Outbound message delivery.
//!
//! Resolves the recipient domain's MX hosts and works through them in
//! ascending preference order, one SMTP dialogue at a time, until an
//! exchange accepts the message or every exchange has failed. Failures are
//! classified so callers can tell a permanent rejection from one worth
//! retrying later.

pub mod engine;
pub mod error;
pub mod report;
pub mod resolver;

pub use engine::{DeliveryConfig, DeliveryEngine};
pub use error::DeliveryError;
pub use report::{DeliveryReport, FailureKind};
pub use resolver::MxResolver;
