use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::utils::{AppError, AppResult};

/// Web API methods the archiver reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    ConversationsList,
    UsersList,
    ConversationsHistory,
    ConversationsReplies,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::ConversationsList => "conversations.list",
            ApiMethod::UsersList => "users.list",
            ApiMethod::ConversationsHistory => "conversations.history",
            ApiMethod::ConversationsReplies => "conversations.replies",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation visibility filters accepted by `conversations.list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelVisibility {
    PublicChannel,
    PrivateChannel,
    DirectMessage,
}

impl ChannelVisibility {
    pub fn as_filter(&self) -> &'static str {
        match self {
            ChannelVisibility::PublicChannel => "public_channel",
            ChannelVisibility::PrivateChannel => "private_channel",
            ChannelVisibility::DirectMessage => "im,mpim",
        }
    }

    pub fn join(filters: &[ChannelVisibility]) -> String {
        filters
            .iter()
            .map(ChannelVisibility::as_filter)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for ChannelVisibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "public_channel" | "public" => Ok(ChannelVisibility::PublicChannel),
            "private_channel" | "private" => Ok(ChannelVisibility::PrivateChannel),
            "direct_message" | "im,mpim" | "im" => Ok(ChannelVisibility::DirectMessage),
            other => Err(format!("unknown channel visibility '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawTextValue {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_private: Option<bool>,
    #[serde(default)]
    pub topic: Option<RawTextValue>,
    #[serde(default)]
    pub purpose: Option<RawTextValue>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub image_original: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawMember {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub deleted: Option<bool>,
    #[serde(default)]
    pub is_bot: Option<bool>,
    #[serde(default)]
    pub profile: Option<RawProfile>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawEdited {
    #[serde(default)]
    pub ts: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawReaction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub filetype: Option<String>,
    #[serde(default)]
    pub url_private_download: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawAttachment {
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// A history or thread entry. Used for both top-level messages and replies;
/// `raw` keeps the payload exactly as received.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawMessage {
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub reply_count: Option<u32>,
    #[serde(default)]
    pub latest_reply: Option<String>,
    #[serde(default)]
    pub edited: Option<RawEdited>,
    #[serde(default)]
    pub reactions: Option<Vec<RawReaction>>,
    #[serde(default)]
    pub files: Option<Vec<RawFile>>,
    #[serde(default)]
    pub attachments: Option<Vec<RawAttachment>>,
    #[serde(skip)]
    pub raw: Value,
}

impl RawMessage {
    pub fn from_value(value: Value) -> AppResult<Self> {
        let mut message: RawMessage = serde_json::from_value(value.clone())
            .map_err(|e| AppError::Decode(format!("malformed message payload: {e}")))?;
        message.raw = value;
        Ok(message)
    }

    pub fn raw_json(&self) -> String {
        self.raw.to_string()
    }
}

/// Pulls a named array out of a response and decodes each element.
pub fn decode_list<T, F>(method: ApiMethod, response: &mut Value, key: &str, decode: F) -> AppResult<Vec<T>>
where
    F: Fn(Value) -> AppResult<T>,
{
    match response.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => items.into_iter().map(decode).collect(),
        Some(Value::Null) | None => Err(AppError::Decode(format!(
            "{} response has no '{}' list",
            method, key
        ))),
        Some(other) => Err(AppError::Decode(format!(
            "{} response field '{}' is not a list: {}",
            method, key, other
        ))),
    }
}

pub fn decode_entity<T: serde::de::DeserializeOwned>(value: Value) -> AppResult<T> {
    serde_json::from_value(value).map_err(|e| AppError::Decode(e.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Loose>::deserialize(deserializer)?.map(|value| match value {
        Loose::Str(s) => s,
        Loose::Int(i) => i.to_string(),
        Loose::Float(f) => f.to_string(),
        Loose::Bool(b) => b.to_string(),
    }))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Int(i)) => u32::try_from(i).ok(),
        Some(Loose::Float(f)) if f >= 0.0 => Some(f as u32),
        Some(Loose::Str(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
