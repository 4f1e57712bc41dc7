//! Wire-level SMTP: command and reply parsing, an outbound client with
//! opportunistic STARTTLS, and the inbound listener with per-connection
//! session state machines and mailbox delivery.

pub mod client;
pub mod command;
pub mod response;
pub mod server;
