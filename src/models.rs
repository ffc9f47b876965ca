use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub is_private: bool,
    pub topic: String,
    pub purpose: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub deleted: bool,
    pub image_url: Option<String>,
    pub is_bot: bool,
}

impl Member {
    /// Name shown as a message author: display name, then account name.
    pub fn author_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub id: String,
    pub created: String,
    pub name: String,
    pub mime_type: String,
    pub file_type: String,
    pub download_url: String,
}

/// Link preview taken from a message attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPreview {
    pub url: String,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub ts: String,
    pub created: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub reply_count: u32,
    pub latest_reply_ts: String,
    pub latest_reply: String,
    pub reactions: Vec<Reaction>,
    pub files: Vec<FileRef>,
    pub urls: Vec<UrlPreview>,
    pub is_edited: bool,
    pub edited_ts: String,
    pub edited: String,
    pub raw_json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub ts: String,
    pub created: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub thread_ts: String,
    pub reactions: Vec<Reaction>,
    pub files: Vec<FileRef>,
    pub urls: Vec<UrlPreview>,
    pub is_edited: bool,
    pub edited_ts: String,
    pub edited: String,
    pub raw_json: String,
}

/// Per-channel checkpoint. One record per channel in each status table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    pub channel_id: String,
    pub last_ts: Option<String>,
    /// `yyyy-MM-dd HH:mm:ss`; only the date part drives scheduling.
    pub last_updated_at: String,
}

impl ChannelStatus {
    /// An empty `last_ts` is stored as `None`; a row cell cannot tell the two apart.
    pub fn new(channel_id: &str, last_ts: Option<&str>, last_updated_at: String) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            last_ts: last_ts
                .map(str::trim)
                .filter(|ts| !ts.is_empty())
                .map(str::to_string),
            last_updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, display_name: &str) -> Member {
        Member {
            id: "U1".to_string(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            deleted: false,
            image_url: None,
            is_bot: false,
        }
    }

    #[test]
    fn author_name_prefers_display_name() {
        assert_eq!(member("name", "display").author_name(), "display");
        assert_eq!(member("name", "").author_name(), "name");
        assert_eq!(member("", "").author_name(), "");
    }

    #[test]
    fn empty_checkpoint_ts_is_absent() {
        let status = ChannelStatus::new("C1", Some(""), "2022-11-05 01:02:03".to_string());
        assert_eq!(status.last_ts, None);
        let status = ChannelStatus::new("C1", Some(" 1668924651 "), String::new());
        assert_eq!(status.last_ts.as_deref(), Some("1668924651"));
        assert_eq!(ChannelStatus::new("C1", None, String::new()).last_ts, None);
    }

    #[test]
    fn file_ref_serializes_camel_case_in_field_order() {
        let file = FileRef {
            id: "file1".to_string(),
            created: "2022-11-20 15:13:00".to_string(),
            name: "fileName1".to_string(),
            mime_type: "image/png".to_string(),
            file_type: "png".to_string(),
            download_url: "https://example.com/file1".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&file).unwrap(),
            r#"{"id":"file1","created":"2022-11-20 15:13:00","name":"fileName1","mimeType":"image/png","fileType":"png","downloadUrl":"https://example.com/file1"}"#
        );
    }
}
