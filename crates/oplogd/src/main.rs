//! Binary entry point: parses configuration, wires the Ingestor up to an
//! in-memory `OpStore`, and runs until a shutdown signal arrives.
//!
//! The UDP ingest listener and the HTTP/SSE transport that would drive
//! subscriber [`oplog_tail::TailSession`]s are external collaborators
//! and are not implemented here — this binary assembles
//! the core behind the trait seams they'd attach to.

mod cli;
mod config;

use std::sync::Arc;

use clap::Parser;
use oplog_ingest::Ingestor;
use oplog_stats::Stats;
use oplog_store::InMemoryOpStore;
use tokio::sync::watch;

use cli::AgentCli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = AgentCli::parse();
    init_tracing();

    let dry_run = cli.dry_run;
    let config = cli.into_config();

    if dry_run {
        tracing::info!(?config, "configuration resolved, dry-run requested, exiting");
        return Ok(());
    }

    tracing::info!(?config, "starting oplogd");

    let store = InMemoryOpStore::shared(oplog_store::InMemoryOpStoreConfig {
        max_entries: config.op_log_max_entries,
        ..oplog_store::InMemoryOpStoreConfig::default()
    });
    store.init(config.op_log_max_entries)?;

    let stats = Arc::new(Stats::new());
    let (ingestor, _sender, rx) = Ingestor::new(store, Arc::clone(&stats), config.ingestor_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingest_task = tokio::spawn(async move {
        ingestor.run(rx, shutdown_rx).await;
    });

    tracing::info!("oplogd ready; waiting for shutdown signal");
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| anyhow::anyhow!("failed to listen for shutdown signal: {err}"))?;

    tracing::info!("shutdown requested, draining in-flight operations");
    shutdown_tx
        .send(true)
        .map_err(|_| anyhow::anyhow!("ingest task exited before shutdown was requested"))?;
    ingest_task
        .await
        .map_err(|err| anyhow::anyhow!("ingest task panicked: {err}"))?;

    tracing::info!(snapshot = ?stats.snapshot(), "shutdown complete");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
