//! End-to-end test harness: a real inbound listener on a loopback port and
//! a delivery engine whose resolver is scripted to point at it.
#![allow(dead_code)] // shared between integration test binaries

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;

use mailferry_auth::Authenticator;
use mailferry_common::Signal;
use mailferry_delivery::{DeliveryConfig, DeliveryEngine, MxResolver};
use mailferry_dns::{MxRecord, ResolveError};
use mailferry_smtp::server::{InboundListener, ServerConfig, ServerHandle};

/// A scripted resolver: every domain resolves to the harness listener.
struct LoopbackResolver {
    port: u16,
}

#[async_trait]
impl MxResolver for LoopbackResolver {
    async fn resolve(&self, _domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        Ok(vec![MxRecord::new("127.0.0.1", 10).with_port(self.port)])
    }
}

pub struct Harness {
    pub engine: DeliveryEngine,
    pub server: ServerHandle,
    pub addr: SocketAddr,
    shutdown: tokio::sync::broadcast::Sender<Signal>,
    task: tokio::task::JoinHandle<Result<(), mailferry_smtp::server::ServerError>>,
}

impl Harness {
    pub async fn start() -> Self {
        let listener = InboundListener::bind(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            banner: "harness.test".to_string(),
            ..ServerConfig::default()
        })
        .await
        .expect("bind inbound listener");

        let addr = listener.local_addr();
        let server = listener.handle();

        let (shutdown, receiver) = tokio::sync::broadcast::channel(1);
        let task = tokio::spawn(listener.serve(receiver));

        // Wait for the spawned accept loop to mark the server running before
        // handing control back to the test.
        while !server.status().running {
            tokio::task::yield_now().await;
        }

        let key_dir = tempfile::tempdir().expect("key dir");
        let authenticator = Authenticator::new("harness.test", "mail", key_dir.path())
            .expect("build authenticator");

        let engine = DeliveryEngine::new(
            DeliveryConfig {
                connect_timeout_secs: 5,
                command_timeout_secs: 5,
                ..DeliveryConfig::default()
            },
            Arc::new(LoopbackResolver { port: addr.port() }),
            Arc::new(authenticator),
        );

        Self {
            engine,
            server,
            addr,
            shutdown,
            task,
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(Signal::Shutdown);
        let _ = self.task.await;
    }
}
