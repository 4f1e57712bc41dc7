//! The inbound SMTP listener.
//!
//! Accepts connections on a configured socket and runs each session on its
//! own task, so the accept loop never blocks on a client's protocol
//! progress. Accepted messages are filed into the listener's mailbox
//! store, which stays reachable through cloneable [`ServerHandle`]s.

pub mod mailbox;
mod session;
pub mod state;

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::debug;

use mailferry_common::{Signal, internal};

use mailbox::{MailboxStore, ReceivedMessage};
use session::Session;

pub use session::SessionError;

/// Configuration for the inbound listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Hostname announced in the greeting and capability replies.
    #[serde(default = "default_banner")]
    pub banner: String,

    /// Maximum accepted message size in bytes; 0 disables the limit.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    2525
}

fn default_banner() -> String {
    "mailferry".to_string()
}

const fn default_max_message_size() -> usize {
    10_240_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            banner: default_banner(),
            max_message_size: default_max_message_size(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[from] io::Error),
}

/// State owned by one listener instance and shared with its sessions and
/// introspection handles.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) store: MailboxStore,
    pub(crate) banner: String,
    pub(crate) max_message_size: usize,
    local_addr: SocketAddr,
    running: AtomicBool,
}

/// Point-in-time view of a listener, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    pub host: String,
    pub port: u16,
    pub message_count: usize,
}

/// Introspection handle over a listener's mailbox store and status.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Every message this listener has accepted, in arrival order.
    #[must_use]
    pub fn received_messages(&self) -> Vec<ReceivedMessage> {
        self.shared.store.received_messages()
    }

    /// One folder of one recipient's mailbox.
    #[must_use]
    pub fn mailbox(&self, address: &str, folder: &str) -> Vec<ReceivedMessage> {
        self.shared.store.mailbox(address, folder)
    }

    #[must_use]
    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            running: self.shared.running.load(Ordering::SeqCst),
            host: self.shared.local_addr.ip().to_string(),
            port: self.shared.local_addr.port(),
            message_count: self.shared.store.message_count(),
        }
    }
}

/// The inbound SMTP listener.
pub struct InboundListener {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl InboundListener {
    /// Binds the configured socket. The listener is not serving yet; call
    /// [`InboundListener::serve`].
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let address = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { address, source })?;

        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                store: MailboxStore::default(),
                banner: config.banner,
                max_message_size: config.max_message_size,
                local_addr,
                running: AtomicBool::new(false),
            }),
        })
    }

    /// The address actually bound, useful when the configured port is 0.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Runs the accept loop until a shutdown signal arrives, then waits for
    /// the in-flight sessions to finish.
    ///
    /// # Errors
    ///
    /// Returns an error when accepting a connection fails.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), ServerError> {
        internal!(
            level = INFO,
            "SMTP listener serving on {}",
            self.shared.local_addr
        );
        self.shared.running.store(true, Ordering::SeqCst);

        let mut sessions = Vec::new();

        loop {
            tokio::select! {
                signal = shutdown.recv() => {
                    if matches!(signal, Ok(Signal::Shutdown) | Err(_)) {
                        internal!(level = INFO, "listener received shutdown, finishing sessions");
                        self.shared.running.store(false, Ordering::SeqCst);
                        join_all(sessions).await;
                        return Ok(());
                    }
                }

                connection = self.listener.accept() => {
                    let (stream, peer) = connection?;
                    debug!("connection received from {peer}");

                    let shared = Arc::clone(&self.shared);
                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = Session::new(stream, peer, shared).run().await {
                            internal!(level = ERROR, "session error: {err}");
                        }
                    }));
                }
            }
        }
    }
}
