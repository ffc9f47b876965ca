use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ContainersConfig;
use crate::db::TableStore;
use crate::models::{Channel, ChannelStatus};
use crate::translator::{from_rows, to_rows};
use crate::utils::{AppResult, DateUtil};

pub const CHANNELS_TABLE: &str = "channels";
pub const MEMBERS_TABLE: &str = "members";
pub const MESSAGE_STATUS_TABLE: &str = "messageStatus";
pub const REPLY_STATUS_TABLE: &str = "repliesStatus";

/// Which checkpoint table a selection reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Messages,
    Replies,
}

impl StatusKind {
    pub fn table(&self) -> &'static str {
        match self {
            StatusKind::Messages => MESSAGE_STATUS_TABLE,
            StatusKind::Replies => REPLY_STATUS_TABLE,
        }
    }
}

/// Round-robin selection of the next channel to crawl, driven by the
/// per-channel checkpoints in the system container.
pub struct ChannelScheduler {
    store: Arc<dyn TableStore>,
    containers: ContainersConfig,
    dates: DateUtil,
}

impl ChannelScheduler {
    pub fn new(store: Arc<dyn TableStore>, containers: ContainersConfig, dates: DateUtil) -> Self {
        Self {
            store,
            containers,
            dates,
        }
    }

    /// Next channel whose messages have not been crawled today, `""` when none.
    pub async fn message_target_channel_id(&self) -> AppResult<String> {
        self.target_channel_id(StatusKind::Messages).await
    }

    /// Next channel whose threads have not been crawled today, `""` when none.
    pub async fn reply_target_channel_id(&self) -> AppResult<String> {
        self.target_channel_id(StatusKind::Replies).await
    }

    async fn target_channel_id(&self, kind: StatusKind) -> AppResult<String> {
        let statuses = self.statuses(kind).await?;

        if !self.store.exists(&self.containers.members, CHANNELS_TABLE).await? {
            debug!("no channel list yet");
            return Ok(String::new());
        }
        let rows = self.store.load(&self.containers.members, CHANNELS_TABLE).await?;
        let channels: Vec<Channel> = from_rows(&rows)?;

        let today = self.dates.current_date_number();
        let selected = select_channel(&channels, &statuses, today, &self.dates);
        debug!(
            "{} selection among {} channels: {:?}",
            kind.table(),
            channels.len(),
            selected
        );
        Ok(selected.unwrap_or_default().to_string())
    }

    /// Checkpoints of one table, empty when the table does not exist yet.
    pub async fn statuses(&self, kind: StatusKind) -> AppResult<Vec<ChannelStatus>> {
        if !self.store.exists(&self.containers.system, kind.table()).await? {
            return Ok(Vec::new());
        }
        let rows = self.store.load(&self.containers.system, kind.table()).await?;
        Ok(from_rows(&rows)?)
    }

    pub async fn record_message_status(
        &self,
        channel_id: &str,
        last_ts: Option<&str>,
    ) -> AppResult<ChannelStatus> {
        self.record_status(StatusKind::Messages, channel_id, last_ts).await
    }

    pub async fn record_reply_status(
        &self,
        channel_id: &str,
        last_ts: Option<&str>,
    ) -> AppResult<ChannelStatus> {
        self.record_status(StatusKind::Replies, channel_id, last_ts).await
    }

    /// Upserts the checkpoint for `channel_id`, dated now.
    async fn record_status(
        &self,
        kind: StatusKind,
        channel_id: &str,
        last_ts: Option<&str>,
    ) -> AppResult<ChannelStatus> {
        let status =
            ChannelStatus::new(channel_id, last_ts, self.dates.current_datetime_string());
        self.store
            .update(
                &self.containers.system,
                kind.table(),
                &to_rows(std::slice::from_ref(&status)),
            )
            .await?;
        Ok(status)
    }
}

/// First channel in list order that has no checkpoint, or whose checkpoint
/// is dated before `today` (`yyyyMMdd`).
pub fn select_channel<'a>(
    channels: &'a [Channel],
    statuses: &[ChannelStatus],
    today: u32,
    dates: &DateUtil,
) -> Option<&'a str> {
    let by_channel: HashMap<&str, &ChannelStatus> = statuses
        .iter()
        .map(|status| (status.channel_id.as_str(), status))
        .collect();

    channels
        .iter()
        .find(|channel| match by_channel.get(channel.id.as_str()) {
            None => true,
            Some(status) => match dates.date_number_of_datetime(&status.last_updated_at) {
                Some(date) => date < today,
                None => {
                    warn!(
                        "unreadable checkpoint date '{}' for {}, treating as stale",
                        status.last_updated_at, channel.id
                    );
                    true
                }
            },
        })
        .map(|channel| channel.id.as_str())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::db::MemoryTableStore;
    use crate::slack::testing::frozen_dates;

    fn channel(id: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: format!("name-{id}"),
            is_private: false,
            topic: String::new(),
            purpose: String::new(),
        }
    }

    fn status(id: &str, updated: &str) -> ChannelStatus {
        ChannelStatus {
            channel_id: id.to_string(),
            last_ts: Some("1667577000.000".to_string()),
            last_updated_at: updated.to_string(),
        }
    }

    async fn scheduler_with(
        channels: &[&str],
        statuses: &[ChannelStatus],
    ) -> (Arc<MemoryTableStore>, ChannelScheduler) {
        let store = Arc::new(MemoryTableStore::new());
        let containers = ContainersConfig::default();
        let channels: Vec<Channel> = channels.iter().map(|id| channel(id)).collect();
        store
            .save(&containers.members, CHANNELS_TABLE, &to_rows(&channels))
            .await
            .unwrap();
        if !statuses.is_empty() {
            store
                .save(&containers.system, MESSAGE_STATUS_TABLE, &to_rows(statuses))
                .await
                .unwrap();
        }
        let scheduler = ChannelScheduler::new(store.clone(), containers, frozen_dates());
        (store, scheduler)
    }

    // frozen clock: 2022-11-05 01:02:03 +09:00
    const TODAY: &str = "2022-11-05 00:10:00";
    const YESTERDAY: &str = "2022-11-04 23:59:59";

    #[tokio::test]
    async fn untouched_channel_is_selected_first() {
        let (_, scheduler) = scheduler_with(&["A", "B", "C"], &[]).await;
        assert_eq!(scheduler.message_target_channel_id().await.unwrap(), "A");
    }

    #[tokio::test]
    async fn channels_done_today_are_skipped() {
        let (_, scheduler) =
            scheduler_with(&["A", "B", "C"], &[status("A", TODAY), status("B", TODAY)]).await;
        assert_eq!(scheduler.message_target_channel_id().await.unwrap(), "C");
    }

    #[tokio::test]
    async fn nothing_left_when_all_done_today() {
        let (_, scheduler) = scheduler_with(
            &["A", "B", "C"],
            &[status("A", TODAY), status("B", TODAY), status("C", TODAY)],
        )
        .await;
        assert_eq!(scheduler.message_target_channel_id().await.unwrap(), "");
    }

    #[tokio::test]
    async fn missing_channel_list_yields_empty_id() {
        let scheduler = ChannelScheduler::new(
            Arc::new(MemoryTableStore::new()),
            ContainersConfig::default(),
            frozen_dates(),
        );
        assert_eq!(scheduler.message_target_channel_id().await.unwrap(), "");
        assert_eq!(scheduler.reply_target_channel_id().await.unwrap(), "");
    }

    #[tokio::test]
    async fn reply_selection_reads_its_own_table() {
        let (_, scheduler) =
            scheduler_with(&["A", "B"], &[status("A", TODAY), status("B", TODAY)]).await;
        assert_eq!(scheduler.message_target_channel_id().await.unwrap(), "");
        assert_eq!(scheduler.reply_target_channel_id().await.unwrap(), "A");
    }

    #[tokio::test]
    async fn recorded_status_is_upserted_and_dated_now() {
        let (store, scheduler) = scheduler_with(&["A", "B"], &[status("A", YESTERDAY)]).await;
        assert_eq!(scheduler.message_target_channel_id().await.unwrap(), "A");

        let recorded = scheduler
            .record_message_status("A", Some("1667577700.000100"))
            .await
            .unwrap();
        assert_eq!(recorded.last_updated_at, "2022-11-05 01:02:03");
        assert_eq!(scheduler.message_target_channel_id().await.unwrap(), "B");

        scheduler.record_message_status("B", None).await.unwrap();
        assert_eq!(scheduler.message_target_channel_id().await.unwrap(), "");

        let rows = store
            .load(&ContainersConfig::default().system, MESSAGE_STATUS_TABLE)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], "1667577700.000100");
        assert_eq!(rows[1][1], "");
    }

    #[test_case(&[], 20221105, Some("A") ; "no checkpoints")]
    #[test_case(&[("A", YESTERDAY)], 20221105, Some("A") ; "stale first channel")]
    #[test_case(&[("A", TODAY)], 20221105, Some("B") ; "first done today")]
    #[test_case(&[("A", TODAY), ("B", TODAY)], 20221105, None ; "all done today")]
    #[test_case(&[("A", TODAY), ("B", TODAY)], 20221106, Some("A") ; "next day")]
    #[test_case(&[("A", TODAY), ("B", "garbage")], 20221105, Some("B") ; "unreadable date")]
    fn selection_follows_list_order(
        checkpoints: &[(&str, &str)],
        today: u32,
        expected: Option<&str>,
    ) {
        let channels = vec![channel("A"), channel("B")];
        let statuses: Vec<ChannelStatus> = checkpoints
            .iter()
            .map(|(id, updated)| status(id, updated))
            .collect();
        assert_eq!(
            select_channel(&channels, &statuses, today, &frozen_dates()),
            expected
        );
    }
}
