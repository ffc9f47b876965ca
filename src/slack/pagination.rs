use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::{ApiMethod, RawMessage, SlackApiClient, decode_list};
use crate::utils::{AppResult, TsKey, compare_ts};

/// Which history endpoint a pager walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryTarget {
    Channel { channel_id: String },
    Thread { channel_id: String, parent_ts: String },
}

impl HistoryTarget {
    fn method(&self) -> ApiMethod {
        match self {
            HistoryTarget::Channel { .. } => ApiMethod::ConversationsHistory,
            HistoryTarget::Thread { .. } => ApiMethod::ConversationsReplies,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PagingOptions {
    pub page_limit: u32,
    pub max_pages: u32,
    pub retention_days: u32,
    pub request_delay: Duration,
}

impl Default for PagingOptions {
    fn default() -> Self {
        Self {
            page_limit: 1000,
            max_pages: 10,
            retention_days: 90,
            request_delay: Duration::from_millis(500),
        }
    }
}

/// Finite, capped sequence of history pages.
///
/// Each call to [`HistoryPager::next_page`] issues at most one request. The
/// sequence ends when the API stops reporting `has_more`, when a page brings
/// nothing that could move the cursor, or after `max_pages` requests. Hitting
/// the cap is not an error; the caller's checkpoint picks up from there on the
/// next run.
pub struct HistoryPager<'a> {
    client: &'a SlackApiClient,
    target: HistoryTarget,
    cursor: String,
    pages: u32,
    finished: bool,
    capped: bool,
}

impl<'a> HistoryPager<'a> {
    pub(super) fn new(client: &'a SlackApiClient, target: HistoryTarget, cursor: String) -> Self {
        Self {
            client,
            target,
            cursor,
            pages: 0,
            finished: false,
            capped: false,
        }
    }

    /// Items of the next page, parent excluded for threads.
    pub async fn next_page(&mut self) -> AppResult<Option<Vec<RawMessage>>> {
        if self.finished {
            return Ok(None);
        }
        let options = self.client.paging();
        if self.pages >= options.max_pages {
            self.finished = true;
            self.capped = true;
            debug!(
                "page cap of {} reached for {:?}, stopping at cursor {}",
                options.max_pages, self.target, self.cursor
            );
            return Ok(None);
        }

        if self.pages > 0 && !options.request_delay.is_zero() {
            tokio::time::sleep(options.request_delay).await;
        }

        let method = self.target.method();
        let oldest = self.cursor.clone();
        let mut response = self.client.call(method, &self.params(&oldest)).await?;
        self.pages += 1;

        let has_more = response
            .get("has_more")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut items = decode_list(method, &mut response, "messages", RawMessage::from_value)?;

        if matches!(self.target, HistoryTarget::Thread { .. }) && !items.is_empty() {
            // conversations.replies always leads with the thread parent
            items.remove(0);
        }

        match newest_ts(&items) {
            Some(ts) => self.cursor = ts,
            None => self.finished = true,
        }
        if !has_more {
            self.finished = true;
        }

        debug!(
            "{} page {} oldest={} items={} has_more={}",
            method,
            self.pages,
            oldest,
            items.len(),
            has_more
        );

        Ok(Some(items))
    }

    fn params(&self, oldest: &str) -> Vec<(&'static str, String)> {
        let limit = self.client.paging().page_limit.to_string();
        match &self.target {
            HistoryTarget::Channel { channel_id } => vec![
                ("channel", channel_id.clone()),
                ("limit", limit),
                ("oldest", oldest.to_string()),
            ],
            HistoryTarget::Thread {
                channel_id,
                parent_ts,
            } => vec![
                ("channel", channel_id.clone()),
                ("ts", parent_ts.clone()),
                ("limit", limit),
                ("oldest", oldest.to_string()),
            ],
        }
    }

    /// Drains the remaining pages into one ascending, ts-unique list.
    pub async fn collect(mut self) -> AppResult<HistoryWalk> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }

        Ok(HistoryWalk {
            items: sort_and_dedup(items),
            pages: self.pages,
            capped: self.capped,
        })
    }
}

/// Result of walking one channel or thread.
#[derive(Debug, Clone)]
pub struct HistoryWalk {
    pub items: Vec<RawMessage>,
    pub pages: u32,
    pub capped: bool,
}

fn newest_ts(items: &[RawMessage]) -> Option<String> {
    items
        .iter()
        .filter_map(|m| TsKey::parse(&m.ts).map(|key| (key, &m.ts)))
        .max_by_key(|(key, _)| *key)
        .map(|(_, ts)| ts.clone())
}

/// Ascending by numeric ts; later duplicates of the same ts are dropped.
/// Entries whose ts does not parse are never treated as duplicates.
pub fn sort_and_dedup(mut items: Vec<RawMessage>) -> Vec<RawMessage> {
    items.sort_by(|a, b| compare_ts(&a.ts, &b.ts));
    items.dedup_by(|later, earlier| {
        match (TsKey::parse(&later.ts), TsKey::parse(&earlier.ts)) {
            (Some(later), Some(earlier)) => later == earlier,
            _ => false,
        }
    });
    items
}
