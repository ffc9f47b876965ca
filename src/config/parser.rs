use std::collections::BTreeMap;
use std::path::Path;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::slack::ChannelVisibility;
use crate::utils::parse_utc_offset;

pub const API_TOKEN_PROPERTY: &str = "SlackApiToken";
const API_TOKEN_ENV: &str = "SLACK_ARCHIVER_API_TOKEN";
const DATABASE_URL_ENV: &str = "SLACK_ARCHIVER_DATABASE_URL";
const MAX_PAGE_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub containers: ContainersConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_channel_types")]
    pub channel_types: Vec<String>,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub download_files: bool,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            channel_types: default_channel_types(),
            page_limit: default_page_limit(),
            max_pages: default_max_pages(),
            retention_days: default_retention_days(),
            request_delay_ms: default_request_delay_ms(),
            user_agent: default_user_agent(),
            download_files: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "default_files_root")]
    pub files_root: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Sqlite,
    Memory,
}

impl StorageConfig {
    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn kind(&self) -> StorageKind {
        // every SQLite call opens its own connection, so `:memory:` would not persist
        let url = self.connection_string();
        if matches!(url.as_str(), "memory://" | ":memory:" | "sqlite://:memory:") {
            StorageKind::Memory
        } else {
            StorageKind::Sqlite
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        match self.kind() {
            StorageKind::Sqlite => {
                let url = self.connection_string();
                Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
            }
            StorageKind::Memory => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContainersConfig {
    #[serde(default = "default_system_container")]
    pub system: String,
    #[serde(default = "default_members_container")]
    pub members: String,
    #[serde(default = "default_messages_container")]
    pub messages: String,
    #[serde(default = "default_files_container")]
    pub files: String,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            system: default_system_container(),
            members: default_members_container(),
            messages: default_messages_container(),
            files: default_files_container(),
        }
    }
}

impl ContainersConfig {
    /// Container holding one channel's message and reply tables.
    pub fn channel(&self, channel_id: &str) -> String {
        format!("{}/{}", self.messages, channel_id)
    }

    /// Container holding one channel's downloaded attachments.
    pub fn channel_files(&self, channel_id: &str) -> String {
        format!("{}/{}", self.files, channel_id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CalendarConfig {
    #[serde(default)]
    pub utc_offset: Option<String>,
}

impl CalendarConfig {
    /// `Ok(None)` means "use the host's local offset".
    pub fn offset(&self) -> Result<Option<FixedOffset>, ConfigError> {
        match self.utc_offset.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => parse_utc_offset(value).map(Some).ok_or_else(|| {
                ConfigError::InvalidConfig(format!(
                    "calendar.utc_offset '{}' is not of the form +HH:MM",
                    value
                ))
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(&path)?;
        Self::load_from_str(&content, |key| std::env::var(key).ok())
    }

    pub fn load_from_str<F>(content: &str, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides(env);
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slack.api_url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "slack.api_url cannot be empty".to_string(),
            ));
        }

        if self.slack.page_limit == 0 || self.slack.page_limit > MAX_PAGE_LIMIT {
            return Err(ConfigError::InvalidConfig(format!(
                "slack.page_limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }

        if self.slack.max_pages == 0 {
            return Err(ConfigError::InvalidConfig(
                "slack.max_pages must be at least 1".to_string(),
            ));
        }

        self.channel_visibilities()?;

        if self.storage.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "storage location cannot be empty (set storage.url or storage.filename)".to_string(),
            ));
        }

        self.calendar.offset()?;

        Ok(())
    }

    pub fn channel_visibilities(&self) -> Result<Vec<ChannelVisibility>, ConfigError> {
        if self.slack.channel_types.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "slack.channel_types cannot be empty".to_string(),
            ));
        }

        self.slack
            .channel_types
            .iter()
            .map(|name| {
                name.parse::<ChannelVisibility>().map_err(|_| {
                    ConfigError::InvalidConfig(format!(
                        "unknown slack.channel_types entry '{}'",
                        name
                    ))
                })
            })
            .collect()
    }

    fn normalize(&mut self) {
        if let Some(token) = self.properties.get_mut(API_TOKEN_PROPERTY) {
            *token = sanitize_api_token(token);
        }
        if !self.slack.api_url.ends_with('/') {
            self.slack.api_url.push('/');
        }
    }

    fn apply_env_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env(API_TOKEN_ENV).filter(|value| !value.trim().is_empty()) {
            self.properties
                .insert(API_TOKEN_PROPERTY.to_string(), sanitize_api_token(&value));
        }
        if let Some(value) = env(DATABASE_URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.storage.url = Some(value);
        }
    }
}

fn default_api_url() -> String {
    "https://slack.com/api/".to_string()
}

fn default_channel_types() -> Vec<String> {
    vec!["public_channel".to_string(), "private_channel".to_string()]
}

fn default_page_limit() -> u32 {
    1000
}

fn default_max_pages() -> u32 {
    10
}

fn default_retention_days() -> u32 {
    90
}

fn default_request_delay_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    "slack-archiver".to_string()
}

fn default_files_root() -> String {
    "files".to_string()
}

fn default_system_container() -> String {
    "system".to_string()
}

fn default_members_container() -> String {
    "members".to_string()
}

fn default_messages_container() -> String {
    "messages".to_string()
}

fn default_files_container() -> String {
    "files".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn sanitize_api_token(token: &str) -> String {
    let trimmed = token.trim();
    let without_prefix = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .unwrap_or(trimmed);
    without_prefix.trim().to_string()
}
