mod cli;
mod contract;
mod db;
mod decoding;
mod ingest;
mod reports;
mod rpc;
#[cfg(test)]
mod testing;
mod types;

use std::env;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use contract::TokenContract;
use db::DbPool;
use decoding::EventDecoder;
use ingest::{
    BalanceResolver, BlockExplorer, CheckpointStore, MemoryCheckpointStore, PgCheckpointStore,
    Scanner,
};
use reports::Report;
use rpc::{HttpConnector, NodeSupervisor, SupervisorConfig};
use types::config::contract::InterfaceSource;
use types::config::indexer::{CheckpointBackend, IndexerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = IndexerConfig::load(&cli.config)?;
    load_required_env_vars(&config, cli.report.is_none())?;

    let database_url = env::var(config.database.url_env_var()).with_context(|| {
        format!("{} not set", config.database.url_env_var())
    })?;
    let pool = Arc::new(
        DbPool::new(&database_url, config.database.max_connections())
            .await
            .context("failed to create database pool")?,
    );
    pool.run_migrations(&config.database.migrations_dir())
        .await
        .context("failed to run database migrations")?;

    match cli.report {
        Some(report) => print_report(&pool, report, cli.report_limit()).await,
        None => run_ingester(config, pool).await,
    }
}

fn load_required_env_vars(config: &IndexerConfig, needs_rpc: bool) -> anyhow::Result<()> {
    let mut required = vec![config.database.url_env_var()];
    if needs_rpc {
        required.push(config.chain.rpc_url_env_var.as_str());
    }

    let missing: Vec<&&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    dotenvy::dotenv().with_context(|| {
        format!(
            "Missing env vars {:?} and failed to load .env file",
            missing
        )
    })?;

    let still_missing: Vec<&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .copied()
        .collect();

    anyhow::ensure!(
        still_missing.is_empty(),
        "Missing required env vars after loading .env: {:?}",
        still_missing
    );

    Ok(())
}

async fn print_report(pool: &DbPool, report: Report, limit: Option<i64>) -> anyhow::Result<()> {
    let rows = report
        .run(pool, limit)
        .await
        .with_context(|| format!("failed to run {:?} report", report))?;

    for row in &rows {
        println!("{}", row);
    }
    tracing::info!("{:?} report returned {} rows", report, rows.len());
    Ok(())
}

async fn run_ingester(config: IndexerConfig, pool: Arc<DbPool>) -> anyhow::Result<()> {
    let rpc_url = env::var(&config.chain.rpc_url_env_var)
        .with_context(|| format!("{} not set", config.chain.rpc_url_env_var))?;
    let connector = HttpConnector::new(config.chain.rpc_client_config(&rpc_url)?);
    let supervisor = Arc::new(NodeSupervisor::new(connector, SupervisorConfig::default()));

    let tracked = config.contract.address;
    let decoder = match &config.contract.interface {
        InterfaceSource::AbiFile(path) => EventDecoder::from_abi_file(path),
        InterfaceSource::Signatures(signatures) => EventDecoder::from_signatures(signatures),
    }
    .context("failed to load contract interface")?;
    tracing::info!(
        "Tracking {} events of {} on {}",
        decoder.topic_map().len(),
        tracked,
        config.chain.name
    );

    let token = TokenContract::new(
        tracked,
        &config.contract.balance_of_signature,
        &config.contract.total_supply_signature,
    )
    .context("invalid token function signature")?;

    let node = supervisor.provider().await?;
    match token.total_supply(node.as_ref()).await {
        Ok(supply) => tracing::info!("Token total supply: {}", supply),
        Err(e) => tracing::warn!("Could not read total supply: {}", e),
    }

    let resolver = Arc::new(BalanceResolver::new(
        supervisor.clone(),
        token,
        pool.clone(),
        config.scanner.pin_balance_to_block(),
    ));
    let explorer = Arc::new(BlockExplorer::new(
        supervisor.clone(),
        Arc::new(decoder),
        resolver,
        tracked,
        config.scanner.explorer_config(),
    ));
    let checkpoints: Arc<dyn CheckpointStore> = match config.checkpoint {
        CheckpointBackend::Postgres => Arc::new(PgCheckpointStore::new(pool, tracked)),
        CheckpointBackend::Memory => Arc::new(MemoryCheckpointStore::default()),
    };

    let scanner_config = config.scanner.scanner_config();
    tracing::info!(
        "Scanning with up to {} concurrent blocks, polling every {:?}",
        scanner_config.max_concurrent_blocks,
        scanner_config.poll_interval
    );
    let scanner = Scanner::new(supervisor, explorer, checkpoints, scanner_config);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested, stopping scanner");
                cancel.cancel();
            }
        }
    });

    if let Err(e) = scanner.run(cancel).await {
        if let Some(block) = e.block() {
            tracing::error!("Next run resumes at or before block #{}", block);
        }
        return Err(e).context("block scan failed");
    }

    Ok(())
}
