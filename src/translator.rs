use std::collections::HashMap;

use tracing::warn;

use crate::models::{Channel, FileRef, Member, Message, Reaction, Reply, UrlPreview};
use crate::slack::{RawAttachment, RawChannel, RawFile, RawMember, RawMessage, RawReaction};
use crate::utils::{DateUtil, compare_ts};

pub mod schema;

pub use self::schema::{from_rows, to_rows};

/// Maps raw Web API entities to canonical records.
#[derive(Debug, Clone)]
pub struct Translator {
    dates: DateUtil,
}

impl Translator {
    pub fn new(dates: DateUtil) -> Self {
        Self { dates }
    }

    /// Channels sorted by id.
    pub fn translate_to_channels(&self, entities: Vec<RawChannel>) -> Vec<Channel> {
        let mut channels: Vec<Channel> = entities
            .into_iter()
            .map(|entity| Channel {
                id: entity.id,
                name: entity.name.unwrap_or_default(),
                is_private: entity.is_private.unwrap_or(false),
                topic: entity.topic.and_then(|t| t.value).unwrap_or_default(),
                purpose: entity.purpose.and_then(|p| p.value).unwrap_or_default(),
            })
            .collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        channels
    }

    /// Human accounts sorted by id; bots are dropped.
    pub fn translate_to_members(&self, entities: Vec<RawMember>) -> Vec<Member> {
        let mut members: Vec<Member> = entities
            .into_iter()
            .filter(|entity| !entity.is_bot.unwrap_or(false))
            .map(|entity| {
                let profile = entity.profile.unwrap_or_default();
                Member {
                    id: entity.id,
                    name: entity.name.unwrap_or_default(),
                    display_name: profile.display_name.unwrap_or_default(),
                    deleted: entity.deleted.unwrap_or(false),
                    image_url: profile.image_original.filter(|url| !url.is_empty()),
                    is_bot: false,
                }
            })
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }

    pub fn translate_to_messages(&self, entities: &[RawMessage], members: &[Member]) -> Vec<Message> {
        let authors = AuthorIndex::new(members);
        let mut messages: Vec<Message> = entities
            .iter()
            .map(|entity| {
                let latest_reply_ts = entity.latest_reply.clone().unwrap_or_default();
                let edit = self.edit_marker(entity);
                Message {
                    ts: entity.ts.clone(),
                    created: self.datetime(&entity.ts),
                    user_id: entity.user.clone().unwrap_or_default(),
                    user_name: authors.name_of(entity.user.as_deref()),
                    text: entity.text.clone().unwrap_or_default(),
                    reply_count: entity.reply_count.unwrap_or(0),
                    latest_reply: self.datetime(&latest_reply_ts),
                    latest_reply_ts,
                    reactions: reactions(entity.reactions.as_deref()),
                    files: self.files(entity.files.as_deref()),
                    urls: urls(entity.attachments.as_deref()),
                    is_edited: edit.is_edited,
                    edited_ts: edit.ts,
                    edited: edit.at,
                    raw_json: entity.raw_json(),
                }
            })
            .collect();
        messages.sort_by(|a, b| compare_ts(&a.ts, &b.ts));
        messages
    }

    pub fn translate_to_replies(&self, entities: &[RawMessage], members: &[Member]) -> Vec<Reply> {
        let authors = AuthorIndex::new(members);
        let mut replies: Vec<Reply> = entities
            .iter()
            .map(|entity| {
                let edit = self.edit_marker(entity);
                Reply {
                    ts: entity.ts.clone(),
                    created: self.datetime(&entity.ts),
                    user_id: entity.user.clone().unwrap_or_default(),
                    user_name: authors.name_of(entity.user.as_deref()),
                    text: entity.text.clone().unwrap_or_default(),
                    thread_ts: entity.thread_ts.clone().unwrap_or_default(),
                    reactions: reactions(entity.reactions.as_deref()),
                    files: self.files(entity.files.as_deref()),
                    urls: urls(entity.attachments.as_deref()),
                    is_edited: edit.is_edited,
                    edited_ts: edit.ts,
                    edited: edit.at,
                    raw_json: entity.raw_json(),
                }
            })
            .collect();
        replies.sort_by(|a, b| compare_ts(&a.ts, &b.ts));
        replies
    }

    /// Calendar string for a ts; empty when the ts is empty or unparsable.
    fn datetime(&self, ts: &str) -> String {
        if ts.is_empty() {
            return String::new();
        }
        self.dates.datetime_string(ts).unwrap_or_else(|| {
            warn!("unparsable timestamp '{}'", ts);
            String::new()
        })
    }

    fn edit_marker(&self, entity: &RawMessage) -> EditMarker {
        match &entity.edited {
            Some(edited) => {
                let ts = edited.ts.clone().unwrap_or_default();
                EditMarker {
                    is_edited: true,
                    at: self.datetime(&ts),
                    ts,
                }
            }
            None => EditMarker::default(),
        }
    }

    fn files(&self, files: Option<&[RawFile]>) -> Vec<FileRef> {
        files
            .unwrap_or_default()
            .iter()
            .map(|file| FileRef {
                id: file.id.clone().unwrap_or_default(),
                created: self.datetime(file.created.as_deref().unwrap_or_default()),
                name: file.name.clone().unwrap_or_default(),
                mime_type: file.mimetype.clone().unwrap_or_default(),
                file_type: file.filetype.clone().unwrap_or_default(),
                download_url: file.url_private_download.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Default)]
struct EditMarker {
    is_edited: bool,
    ts: String,
    at: String,
}

struct AuthorIndex<'a> {
    by_id: HashMap<&'a str, &'a Member>,
}

impl<'a> AuthorIndex<'a> {
    fn new(members: &'a [Member]) -> Self {
        Self {
            by_id: members.iter().map(|m| (m.id.as_str(), m)).collect(),
        }
    }

    fn name_of(&self, user_id: Option<&str>) -> String {
        user_id
            .and_then(|id| self.by_id.get(id))
            .map(|member| member.author_name().to_string())
            .unwrap_or_default()
    }
}

fn reactions(reactions: Option<&[RawReaction]>) -> Vec<Reaction> {
    reactions
        .unwrap_or_default()
        .iter()
        .map(|r| Reaction {
            name: r.name.clone().unwrap_or_default(),
            count: r.count.unwrap_or(0),
        })
        .collect()
}

fn urls(attachments: Option<&[RawAttachment]>) -> Vec<UrlPreview> {
    attachments
        .unwrap_or_default()
        .iter()
        .map(|a| UrlPreview {
            url: a.original_url.clone().unwrap_or_default(),
            title: a.title.clone().unwrap_or_default(),
            text: a.text.clone().unwrap_or_default(),
        })
        .collect()
}
