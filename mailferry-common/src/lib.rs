pub mod address;
pub mod logging;
pub mod message;
pub mod status;

pub use tracing;

/// Control signal broadcast to listeners and their sessions.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
