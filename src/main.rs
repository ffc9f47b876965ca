#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

mod archive;
mod cli;
mod config;
mod db;
mod models;
mod scheduler;
mod slack;
mod translator;
mod utils;

use archive::Archiver;
use cli::{Cli, Commands};
use config::Config;
use db::{
    ConfigProperties, DatabaseManager, FileStore, LocalFileStore, MemoryFileStore,
    PropertySource,
};
use slack::{HttpTransport, SlackApiClient};
use utils::DateUtil;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    utils::logging::init_tracing(&config.logging);

    if let Err(err) = run(&cli, &config).await {
        error!("slack-archiver failed: {:#}", err);
        return Err(err);
    }
    Ok(())
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    let command = cli.command();
    if command == Commands::ValidateConfig {
        println!("{}", serde_json::to_string_pretty(&cli::config_summary(config))?);
        info!("configuration is valid");
        return Ok(());
    }

    let dates = match config.calendar.offset()? {
        Some(offset) => DateUtil::new(offset),
        None => DateUtil::local(),
    };

    let db_manager = if cli.dry_run {
        info!("dry run: tables are kept in memory");
        DatabaseManager::new_in_memory()
    } else {
        DatabaseManager::new(&config.storage).await?
    };
    db_manager.migrate().await?;
    info!("table store ready ({:?})", db_manager.kind());

    let files: Arc<dyn FileStore> = if cli.dry_run {
        Arc::new(MemoryFileStore::new())
    } else {
        Arc::new(LocalFileStore::new(&config.storage.files_root))
    };
    let properties: Arc<dyn PropertySource> = Arc::new(ConfigProperties::from_config(config));
    let transport = Arc::new(HttpTransport::new(config, properties)?);
    let client = SlackApiClient::from_config(config, transport, files, dates.clone());
    let archiver = Archiver::new(config, client, db_manager.table_store(), dates)?;

    let reports = match command {
        Commands::Channels => vec![archiver.sync_channels().await?],
        Commands::Members => vec![archiver.sync_members().await?],
        Commands::Messages => vec![archiver.sync_messages().await?],
        Commands::Replies => vec![archiver.sync_replies().await?],
        Commands::Run => archiver.run_all().await?,
        Commands::Status => {
            let progress = archiver.progress().await?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
            return Ok(());
        }
        Commands::ValidateConfig => Vec::new(),
    };

    for report in &reports {
        info!("{}", report);
    }
    Ok(())
}
