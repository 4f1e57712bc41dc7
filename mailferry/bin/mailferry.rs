use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use mailferry::{Config, InboundListener, Mailer};
use mailferry_common::{Signal, logging};

#[derive(Parser)]
#[command(name = "mailferry", about = "A wire-level mail transport engine", version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "mailferry.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    let mailer = Mailer::new(&config).context("preparing DKIM key material")?;

    let records = mailer.auth_dns_records(&config.domain);
    tracing::info!(
        spf = %records.spf.value,
        dkim = %records.dkim.name,
        dmarc = %records.dmarc.name,
        "authentication records for {}",
        config.domain
    );

    let listener = InboundListener::bind(config.server.clone())
        .await
        .context("binding the inbound listener")?;
    let handle = listener.handle();

    let (shutdown, receiver) = tokio::sync::broadcast::channel(1);
    let server = tokio::spawn(listener.serve(receiver));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    let status = handle.status();
    tracing::info!(
        messages = status.message_count,
        "shutting down after handling {} message(s)",
        status.message_count
    );

    shutdown.send(Signal::Shutdown)?;
    server.await?.context("inbound listener failed")?;

    Ok(())
}
