use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, ContainersConfig};
use crate::db::TableStore;
use crate::models::{Channel, ChannelStatus, FileRef, Member, Message, Reply};
use crate::scheduler::{CHANNELS_TABLE, ChannelScheduler, MEMBERS_TABLE, StatusKind};
use crate::slack::{ChannelVisibility, SlackApiClient};
use crate::translator::{Translator, from_rows, to_rows};
use crate::utils::{AppResult, DateUtil, compare_ts};

pub const MESSAGES_TABLE: &str = "messages";
pub const REPLIES_TABLE: &str = "replies";

/// Outcome of one job invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: &'static str,
    pub channel_id: Option<String>,
    pub records: usize,
    pub pages: u32,
    pub capped: bool,
    pub files: usize,
}

impl JobReport {
    fn new(job: &'static str) -> Self {
        Self {
            job,
            ..Default::default()
        }
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel_id.as_deref() {
            Some("") => write!(f, "{}: nothing left to archive today", self.job),
            Some(channel) => write!(
                f,
                "{} [{}]: {} records, {} pages{}, {} files",
                self.job,
                channel,
                self.records,
                self.pages,
                if self.capped { " (page cap reached)" } else { "" },
                self.files
            ),
            None => write!(f, "{}: {} records", self.job, self.records),
        }
    }
}

/// Checkpoint state of one channel, as printed by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProgress {
    pub channel_id: String,
    pub name: String,
    pub messages: Option<ChannelStatus>,
    pub replies: Option<ChannelStatus>,
    pub messages_done_today: bool,
    pub replies_done_today: bool,
}

/// The four archive jobs. Each one is a single bounded unit of work.
pub struct Archiver {
    client: SlackApiClient,
    store: Arc<dyn TableStore>,
    scheduler: ChannelScheduler,
    translator: Translator,
    containers: ContainersConfig,
    dates: DateUtil,
    visibilities: Vec<ChannelVisibility>,
    download_files: bool,
}

impl Archiver {
    pub fn new(
        config: &Config,
        client: SlackApiClient,
        store: Arc<dyn TableStore>,
        dates: DateUtil,
    ) -> AppResult<Self> {
        let visibilities = config.channel_visibilities()?;

        Ok(Self {
            scheduler: ChannelScheduler::new(
                store.clone(),
                config.containers.clone(),
                dates.clone(),
            ),
            translator: Translator::new(dates.clone()),
            client,
            store,
            containers: config.containers.clone(),
            dates,
            visibilities,
            download_files: config.slack.download_files,
        })
    }

    /// Replaces the channel list.
    pub async fn sync_channels(&self) -> AppResult<JobReport> {
        let raw = self.client.get_channels(&self.visibilities).await?;
        let channels = self.translator.translate_to_channels(raw);
        self.store
            .save(&self.containers.members, CHANNELS_TABLE, &to_rows(&channels))
            .await?;

        info!("saved {} channels", channels.len());
        Ok(JobReport {
            records: channels.len(),
            pages: 1,
            ..JobReport::new("channels")
        })
    }

    /// Replaces the member list (bots excluded).
    pub async fn sync_members(&self) -> AppResult<JobReport> {
        let raw = self.client.get_members().await?;
        let members = self.translator.translate_to_members(raw);
        self.store
            .save(&self.containers.members, MEMBERS_TABLE, &to_rows(&members))
            .await?;

        info!("saved {} members", members.len());
        Ok(JobReport {
            records: members.len(),
            pages: 1,
            ..JobReport::new("members")
        })
    }

    /// Crawls new messages of the next scheduled channel and advances its
    /// checkpoint.
    pub async fn sync_messages(&self) -> AppResult<JobReport> {
        let mut report = JobReport::new("messages");
        let channel_id = self.scheduler.message_target_channel_id().await?;
        report.channel_id = Some(channel_id.clone());
        if channel_id.is_empty() {
            info!("every channel's messages are archived for today");
            return Ok(report);
        }

        let container = self.containers.channel(&channel_id);
        let oldest = if self.store.exists(&container, MESSAGES_TABLE).await? {
            self.store.get_latest_ts(&container, MESSAGES_TABLE).await?
        } else {
            String::new()
        };
        info!(
            "archiving messages of {} newer than {}",
            channel_id,
            if oldest.is_empty() {
                "the retention window"
            } else {
                oldest.as_str()
            }
        );

        let walk = self.client.get_messages(&channel_id, Some(oldest.as_str())).await?;
        let members = self.members().await?;
        let messages = self.translator.translate_to_messages(&walk.items, &members);
        self.store
            .update(&container, MESSAGES_TABLE, &to_rows(&messages))
            .await?;

        report.records = messages.len();
        report.pages = walk.pages;
        report.capped = walk.capped;
        report.files = self
            .download_attachments(&channel_id, messages.iter().flat_map(|m| &m.files))
            .await?;

        let newest = messages
            .last()
            .map(|m| m.ts.as_str())
            .unwrap_or(oldest.as_str());
        self.scheduler
            .record_message_status(&channel_id, Some(newest))
            .await?;
        Ok(report)
    }

    /// Crawls every thread of the next scheduled channel. Threads are always
    /// walked in full; the upsert by ts keeps already stored replies single.
    pub async fn sync_replies(&self) -> AppResult<JobReport> {
        let mut report = JobReport::new("replies");
        let channel_id = self.scheduler.reply_target_channel_id().await?;
        report.channel_id = Some(channel_id.clone());
        if channel_id.is_empty() {
            info!("every channel's threads are archived for today");
            return Ok(report);
        }

        let container = self.containers.channel(&channel_id);
        let previous = self
            .scheduler
            .statuses(StatusKind::Replies)
            .await?
            .into_iter()
            .find(|status| status.channel_id == channel_id)
            .and_then(|status| status.last_ts);

        let messages: Vec<Message> = if self.store.exists(&container, MESSAGES_TABLE).await? {
            from_rows(&self.store.load(&container, MESSAGES_TABLE).await?)?
        } else {
            debug!("{} has no archived messages", channel_id);
            Vec::new()
        };
        let threads: Vec<&Message> = messages
            .iter()
            .filter(|m| m.reply_count > 0)
            .collect();
        info!(
            "archiving {} threads of {} ({} messages)",
            threads.len(),
            channel_id,
            messages.len()
        );

        let members = self.members().await?;
        let mut replies: Vec<Reply> = Vec::new();
        for thread in threads {
            let walk = self.client.get_replies(&channel_id, &thread.ts).await?;
            report.pages += walk.pages;
            report.capped |= walk.capped;
            replies.extend(self.translator.translate_to_replies(&walk.items, &members));
        }
        replies.sort_by(|a, b| compare_ts(&a.ts, &b.ts));

        if !replies.is_empty() {
            self.store
                .update(&container, REPLIES_TABLE, &to_rows(&replies))
                .await?;
        }
        report.records = replies.len();
        report.files = self
            .download_attachments(&channel_id, replies.iter().flat_map(|r| &r.files))
            .await?;

        let newest = replies
            .last()
            .map(|r| r.ts.as_str())
            .or(previous.as_deref());
        self.scheduler.record_reply_status(&channel_id, newest).await?;
        Ok(report)
    }

    /// Channels, members, then one channel each of messages and replies.
    pub async fn run_all(&self) -> AppResult<Vec<JobReport>> {
        Ok(vec![
            self.sync_channels().await?,
            self.sync_members().await?,
            self.sync_messages().await?,
            self.sync_replies().await?,
        ])
    }

    pub async fn progress(&self) -> AppResult<Vec<ChannelProgress>> {
        let channels: Vec<Channel> = if self
            .store
            .exists(&self.containers.members, CHANNELS_TABLE)
            .await?
        {
            from_rows(&self.store.load(&self.containers.members, CHANNELS_TABLE).await?)?
        } else {
            Vec::new()
        };
        let messages = self.scheduler.statuses(StatusKind::Messages).await?;
        let replies = self.scheduler.statuses(StatusKind::Replies).await?;
        let today = self.dates.current_date_number();
        let done_today = |status: &Option<ChannelStatus>| {
            status
                .as_ref()
                .and_then(|s| self.dates.date_number_of_datetime(&s.last_updated_at))
                == Some(today)
        };

        Ok(channels
            .into_iter()
            .map(|channel| {
                let find = |statuses: &[ChannelStatus]| {
                    statuses
                        .iter()
                        .find(|s| s.channel_id == channel.id)
                        .cloned()
                };
                let messages = find(&messages);
                let replies = find(&replies);
                ChannelProgress {
                    messages_done_today: done_today(&messages),
                    replies_done_today: done_today(&replies),
                    channel_id: channel.id,
                    name: channel.name,
                    messages,
                    replies,
                }
            })
            .collect())
    }

    async fn members(&self) -> AppResult<Vec<Member>> {
        if !self.store.exists(&self.containers.members, MEMBERS_TABLE).await? {
            warn!("member list missing, author names will be empty");
            return Ok(Vec::new());
        }
        let rows = self.store.load(&self.containers.members, MEMBERS_TABLE).await?;
        Ok(from_rows(&rows)?)
    }

    async fn download_attachments<'a>(
        &self,
        channel_id: &str,
        files: impl Iterator<Item = &'a FileRef>,
    ) -> AppResult<usize> {
        if !self.download_files {
            return Ok(0);
        }
        let container = self.containers.channel_files(channel_id);
        let mut stored = 0;
        for file in files {
            if file.id.is_empty() || file.download_url.is_empty() {
                warn!("file '{}' in {} has no download URL", file.name, channel_id);
                continue;
            }
            self.client
                .download_file(&container, &file.download_url, &file.id)
                .await?;
            stored += 1;
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::db::{FileStore, MemoryFileStore, MemoryTableStore, Row};
    use crate::scheduler::{MESSAGE_STATUS_TABLE, REPLY_STATUS_TABLE};
    use crate::slack::testing::{ScriptedTransport, fast_paging, frozen_dates};

    struct Harness {
        transport: ScriptedTransport,
        store: Arc<MemoryTableStore>,
        files: Arc<MemoryFileStore>,
        archiver: Archiver,
        containers: ContainersConfig,
    }

    fn harness(download_files: bool) -> Harness {
        let mut config = Config::load_from_str("storage:\n  url: memory://\n", |_| None).unwrap();
        config.slack.download_files = download_files;
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryTableStore::new());
        let files = Arc::new(MemoryFileStore::new());
        let client = SlackApiClient::new(
            Arc::new(transport.clone()),
            files.clone(),
            frozen_dates(),
            fast_paging(),
        );
        let archiver = Archiver::new(&config, client, store.clone(), frozen_dates()).unwrap();
        Harness {
            transport,
            store,
            files,
            archiver,
            containers: config.containers,
        }
    }

    fn channels_response() -> Value {
        json!({"ok": true, "channels": [
            {"id": "C2", "name": "random", "is_private": false,
             "topic": {"value": ""}, "purpose": {"value": ""}},
            {"id": "C1", "name": "general", "is_private": false,
             "topic": {"value": "t"}, "purpose": {"value": "p"}}
        ]})
    }

    fn members_response() -> Value {
        json!({"ok": true, "members": [
            {"id": "U1", "name": "alice", "profile": {"display_name": "Alice"}},
            {"id": "B1", "name": "bot", "is_bot": true}
        ]})
    }

    #[tokio::test]
    async fn channels_and_members_replace_their_tables() {
        let h = harness(false);
        h.transport.push(channels_response());
        h.transport.push(members_response());

        let channels = h.archiver.sync_channels().await.unwrap();
        let members = h.archiver.sync_members().await.unwrap();

        assert_eq!(channels.records, 2);
        assert_eq!(members.records, 1);
        let rows = h.store.load(&h.containers.members, CHANNELS_TABLE).await.unwrap();
        assert_eq!(rows[0][0], "C1");
        let rows = h.store.load(&h.containers.members, MEMBERS_TABLE).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn messages_job_walks_scheduled_channel_and_checkpoints() {
        let h = harness(false);
        h.transport.push(channels_response());
        h.transport.push(members_response());
        h.transport.push(json!({"ok": true, "has_more": false, "messages": [
            {"ts": "1667577600.000200", "user": "U1", "text": "second"},
            {"ts": "1667577500.000100", "user": "U1", "text": "first", "reply_count": 2,
             "latest_reply": "1667577650.000000"}
        ]}));
        h.archiver.sync_channels().await.unwrap();
        h.archiver.sync_members().await.unwrap();

        let report = h.archiver.sync_messages().await.unwrap();

        assert_eq!(report.channel_id.as_deref(), Some("C1"));
        assert_eq!(report.records, 2);
        assert_eq!(report.pages, 1);
        let rows = h.store.load("messages/C1", MESSAGES_TABLE).await.unwrap();
        assert_eq!(rows[0][0], "1667577500.000100");
        assert_eq!(rows[0][3], "Alice");
        let status = h
            .store
            .load(&h.containers.system, MESSAGE_STATUS_TABLE)
            .await
            .unwrap();
        assert_eq!(
            status[0],
            vec!["C1", "1667577600.000200", "2022-11-05 01:02:03"]
        );
        // the next run moves on to the other channel
        h.transport.push(json!({"ok": true, "has_more": false, "messages": []}));
        let next = h.archiver.sync_messages().await.unwrap();
        assert_eq!(next.channel_id.as_deref(), Some("C2"));
        assert_eq!(next.records, 0);

        let idle = h.archiver.sync_messages().await.unwrap();
        assert_eq!(idle.channel_id.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn messages_job_resumes_from_latest_stored_ts() {
        let h = harness(false);
        let general: Row = ["C1", "general", "false", "", ""]
            .iter()
            .map(|c| c.to_string())
            .collect();
        h.store
            .save(&h.containers.members, CHANNELS_TABLE, &[general])
            .await
            .unwrap();
        h.store
            .save(
                "messages/C1",
                MESSAGES_TABLE,
                &to_rows(&h.archiver.translator.translate_to_messages(
                    &[crate::slack::RawMessage::from_value(json!({"ts": "1667500000.000100"}))
                        .unwrap()],
                    &[],
                )),
            )
            .await
            .unwrap();
        h.transport.push(json!({"ok": true, "has_more": false, "messages": []}));

        h.archiver.sync_messages().await.unwrap();

        let requests = h.transport.requests();
        assert_eq!(
            requests[0].1[2],
            ("oldest".to_string(), "1667500000.000100".to_string())
        );
        let status = h.archiver.scheduler.statuses(StatusKind::Messages).await.unwrap();
        assert_eq!(status[0].last_ts.as_deref(), Some("1667500000.000100"));
    }

    #[tokio::test]
    async fn failed_walk_leaves_checkpoint_untouched() {
        let h = harness(false);
        h.transport.push(channels_response());
        h.archiver.sync_channels().await.unwrap();
        h.transport.push(json!({"ok": false, "error": "ratelimited"}));

        assert!(h.archiver.sync_messages().await.is_err());
        assert!(
            !h.store
                .exists(&h.containers.system, MESSAGE_STATUS_TABLE)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn replies_job_fetches_threads_and_downloads_files() {
        let h = harness(true);
        h.transport.push(channels_response());
        h.transport.push(members_response());
        h.transport.push(json!({"ok": true, "has_more": false, "messages": [
            {"ts": "1667577500.000100", "user": "U1", "text": "parent", "reply_count": 1,
             "latest_reply": "1667577550.000000"},
            {"ts": "1667577400.000100", "user": "U1", "text": "lonely"}
        ]}));
        h.archiver.sync_channels().await.unwrap();
        h.archiver.sync_members().await.unwrap();
        h.archiver.sync_messages().await.unwrap();

        h.transport.push(json!({"ok": true, "has_more": false, "messages": [
            {"ts": "1667577500.000100", "text": "parent"},
            {"ts": "1667577550.000000", "user": "U1", "text": "reply",
             "thread_ts": "1667577500.000100",
             "files": [{"id": "F1", "name": "a.png", "url_private_download": "https://files.example.com/F1"}]}
        ]}));
        h.transport
            .push_download("https://files.example.com/F1", b"png".to_vec());

        let report = h.archiver.sync_replies().await.unwrap();

        assert_eq!(report.channel_id.as_deref(), Some("C1"));
        assert_eq!(report.records, 1);
        assert_eq!(report.files, 1);
        let rows = h.store.load("messages/C1", REPLIES_TABLE).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "1667577550.000000");
        assert_eq!(rows[0][5], "1667577500.000100");
        assert_eq!(
            h.files.read("files/C1", "F1").await.unwrap(),
            b"png".to_vec()
        );
        let requests = h.transport.requests();
        let replies_calls = requests
            .iter()
            .filter(|(method, _)| *method == crate::slack::ApiMethod::ConversationsReplies)
            .count();
        assert_eq!(replies_calls, 1);
    }

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn replies_added_after_the_first_crawl_are_archived_next_day() {
        let h = harness(false);
        h.transport.push(channels_response());
        h.transport.push(members_response());
        h.transport.push(json!({"ok": true, "has_more": false, "messages": [
            {"ts": "1667577500.000100", "user": "U1", "text": "parent", "reply_count": 1,
             "latest_reply": "1667577550.000000"}
        ]}));
        h.archiver.sync_channels().await.unwrap();
        h.archiver.sync_members().await.unwrap();
        h.archiver.sync_messages().await.unwrap();
        h.transport.push(json!({"ok": true, "has_more": false, "messages": [
            {"ts": "1667577500.000100", "text": "parent"},
            {"ts": "1667577550.000000", "user": "U1", "text": "first reply",
             "thread_ts": "1667577500.000100"}
        ]}));
        let first = h.archiver.sync_replies().await.unwrap();
        assert_eq!(first.records, 1);

        // a day later; the stored parent still names the old latest reply
        h.store
            .save(
                &h.containers.system,
                REPLY_STATUS_TABLE,
                &[
                    row(&["C1", "1667577550.000000", "2022-11-04 10:00:00"]),
                    row(&["C2", "", "2022-11-05 00:00:00"]),
                ],
            )
            .await
            .unwrap();
        h.transport.push(json!({"ok": true, "has_more": false, "messages": [
            {"ts": "1667577500.000100", "text": "parent"},
            {"ts": "1667577550.000000", "user": "U1", "text": "first reply",
             "thread_ts": "1667577500.000100"},
            {"ts": "1667660000.000000", "user": "U1", "text": "late reply",
             "thread_ts": "1667577500.000100"}
        ]}));

        let second = h.archiver.sync_replies().await.unwrap();

        assert_eq!(second.channel_id.as_deref(), Some("C1"));
        let rows = h.store.load("messages/C1", REPLIES_TABLE).await.unwrap();
        let ts: Vec<_> = rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ts, vec!["1667577550.000000", "1667660000.000000"]);
        assert_eq!(rows[1][4], "late reply");
        let status = h.archiver.scheduler.statuses(StatusKind::Replies).await.unwrap();
        assert_eq!(status[0].last_ts.as_deref(), Some("1667660000.000000"));
        assert_eq!(status[0].last_updated_at, "2022-11-05 01:02:03");
        let replies_calls = h
            .transport
            .requests()
            .iter()
            .filter(|(method, _)| *method == crate::slack::ApiMethod::ConversationsReplies)
            .count();
        assert_eq!(replies_calls, 2);
    }

    #[test]
    fn report_display_mentions_cap() {
        let report = JobReport {
            channel_id: Some("C1".to_string()),
            records: 10,
            pages: 10,
            capped: true,
            ..JobReport::new("messages")
        };
        assert_eq!(
            report.to_string(),
            "messages [C1]: 10 records, 10 pages (page cap reached), 0 files"
        );
        assert_eq!(
            JobReport {
                channel_id: Some(String::new()),
                ..JobReport::new("replies")
            }
            .to_string(),
            "replies: nothing left to archive today"
        );
    }
}
