use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use crate::config::{API_TOKEN_PROPERTY, Config};

#[derive(Parser, Debug)]
#[command(name = "slack-archiver")]
#[command(about = "Incremental Slack conversation archiver", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,

    #[arg(long, help = "Keep every table in memory; nothing is persisted")]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Replace the stored channel list")]
    Channels,

    #[command(about = "Replace the stored member list")]
    Members,

    #[command(about = "Archive new messages of the next scheduled channel")]
    Messages,

    #[command(about = "Archive thread replies of the next scheduled channel")]
    Replies,

    #[command(about = "Run channels, members, messages and replies in order")]
    Run,

    #[command(about = "Validate the configuration file")]
    ValidateConfig,

    #[command(about = "Print per-channel checkpoint state as JSON")]
    Status,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }
}

/// Effective settings with secrets left out.
pub fn config_summary(config: &Config) -> Value {
    json!({
        "slack": {
            "api_url": config.slack.api_url,
            "channel_types": config.slack.channel_types,
            "page_limit": config.slack.page_limit,
            "max_pages": config.slack.max_pages,
            "retention_days": config.slack.retention_days,
            "request_delay_ms": config.slack.request_delay_ms,
            "download_files": config.slack.download_files,
        },
        "storage": {
            "location": config.storage.connection_string(),
            "files_root": config.storage.files_root,
        },
        "containers": config.containers,
        "calendar": {
            "utc_offset": config.calendar.utc_offset.as_deref().unwrap_or("local"),
        },
        "api_token": if config.properties.contains_key(API_TOKEN_PROPERTY) { "set" } else { "missing" },
    })
}
