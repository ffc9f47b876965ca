use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::FileStore;
use crate::utils::{AppError, AppResult, DateUtil};

pub mod pagination;
#[cfg(test)]
pub mod testing;
pub mod transport;
pub mod types;

use self::pagination::{HistoryPager, HistoryTarget};
pub use self::pagination::{HistoryWalk, PagingOptions};
pub use self::transport::{HttpTransport, SlackTransport};
pub use self::types::{
    ApiMethod, ChannelVisibility, RawAttachment, RawChannel, RawFile, RawMember, RawMessage,
    RawReaction, decode_entity, decode_list,
};

/// Read-only client for the parts of the Web API the archiver crawls.
pub struct SlackApiClient {
    transport: Arc<dyn SlackTransport>,
    files: Arc<dyn FileStore>,
    dates: DateUtil,
    paging: PagingOptions,
}

impl SlackApiClient {
    pub fn new(
        transport: Arc<dyn SlackTransport>,
        files: Arc<dyn FileStore>,
        dates: DateUtil,
        paging: PagingOptions,
    ) -> Self {
        Self {
            transport,
            files,
            dates,
            paging,
        }
    }

    pub fn from_config(
        config: &Config,
        transport: Arc<dyn SlackTransport>,
        files: Arc<dyn FileStore>,
        dates: DateUtil,
    ) -> Self {
        let paging = PagingOptions {
            page_limit: config.slack.page_limit,
            max_pages: config.slack.max_pages,
            retention_days: config.slack.retention_days,
            request_delay: Duration::from_millis(config.slack.request_delay_ms),
        };
        Self::new(transport, files, dates, paging)
    }

    pub fn paging(&self) -> PagingOptions {
        self.paging
    }

    pub async fn get_channels(
        &self,
        visibilities: &[ChannelVisibility],
    ) -> AppResult<Vec<RawChannel>> {
        let params = [("types", ChannelVisibility::join(visibilities))];
        let mut response = self.call(ApiMethod::ConversationsList, &params).await?;
        let channels = decode_list(
            ApiMethod::ConversationsList,
            &mut response,
            "channels",
            decode_entity,
        )?;
        info!("fetched {} channels", channels.len());
        Ok(channels)
    }

    pub async fn get_members(&self) -> AppResult<Vec<RawMember>> {
        let mut response = self.call(ApiMethod::UsersList, &[]).await?;
        let members = decode_list(ApiMethod::UsersList, &mut response, "members", decode_entity)?;
        info!("fetched {} members", members.len());
        Ok(members)
    }

    /// Messages newer than `oldest` (or the retention window), ascending by ts.
    pub async fn get_messages(
        &self,
        channel_id: &str,
        oldest: Option<&str>,
    ) -> AppResult<HistoryWalk> {
        let walk = self.message_pager(channel_id, oldest).collect().await?;
        debug!(
            "channel {} walked {} pages, {} messages, capped={}",
            channel_id,
            walk.pages,
            walk.items.len(),
            walk.capped
        );
        Ok(walk)
    }

    fn message_pager(&self, channel_id: &str, oldest: Option<&str>) -> HistoryPager<'_> {
        let cursor = match oldest.map(str::trim).filter(|ts| !ts.is_empty()) {
            Some(ts) => ts.to_string(),
            None => self.dates.ts_before_days(self.paging.retention_days),
        };
        HistoryPager::new(
            self,
            HistoryTarget::Channel {
                channel_id: channel_id.to_string(),
            },
            cursor,
        )
    }

    /// Every reply of a thread, parent excluded, ascending by ts.
    pub async fn get_replies(&self, channel_id: &str, parent_ts: &str) -> AppResult<HistoryWalk> {
        self.reply_pager(channel_id, parent_ts).collect().await
    }

    fn reply_pager(&self, channel_id: &str, parent_ts: &str) -> HistoryPager<'_> {
        HistoryPager::new(
            self,
            HistoryTarget::Thread {
                channel_id: channel_id.to_string(),
                parent_ts: parent_ts.to_string(),
            },
            parent_ts.to_string(),
        )
    }

    /// Fetches `url` with the API credentials and stores it as `id` in
    /// `container`, replacing any earlier copy.
    pub async fn download_file(&self, container: &str, url: &str, id: &str) -> AppResult<()> {
        let data = self.transport.download(url).await?;
        if self.files.exists(container, id).await? {
            self.files.remove(container, id).await?;
        }
        self.files.write(container, id, &data).await?;
        debug!("stored {} bytes as {}/{}", data.len(), container, id);
        Ok(())
    }

    pub(crate) async fn call(&self, method: ApiMethod, params: &[(&str, String)]) -> AppResult<Value> {
        let value = self.transport.get(method, params).await?;
        check_payload(method, value)
    }
}

/// Rejects payloads that carry an `error` field or `ok: false`.
fn check_payload(method: ApiMethod, value: Value) -> AppResult<Value> {
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let reason = error
            .as_str()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| error.to_string());
        return Err(AppError::remote(method.as_str(), reason));
    }
    if value.get("ok").and_then(Value::as_bool) == Some(false) {
        return Err(AppError::remote(method.as_str(), "unknown_error"));
    }
    Ok(value)
}
