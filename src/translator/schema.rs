use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::db::Row;
use crate::models::{Channel, ChannelStatus, Member, Message, Reply};
use crate::utils::AppError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("{entity} row has {actual} columns, expected {expected}")]
    Width {
        entity: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{entity} column '{column}' holds invalid value '{value}': {reason}")]
    Cell {
        entity: &'static str,
        column: &'static str,
        value: String,
        reason: String,
    },
}

impl From<RowError> for AppError {
    fn from(value: RowError) -> Self {
        AppError::Decode(value.to_string())
    }
}

/// Encoding of one field into a single flat cell.
pub trait CellValue: Sized {
    fn to_cell(&self) -> String;
    fn from_cell(cell: &str) -> Result<Self, String>;
}

impl CellValue for String {
    fn to_cell(&self) -> String {
        self.clone()
    }

    fn from_cell(cell: &str) -> Result<Self, String> {
        Ok(cell.to_string())
    }
}

impl CellValue for bool {
    fn to_cell(&self) -> String {
        self.to_string()
    }

    fn from_cell(cell: &str) -> Result<Self, String> {
        match cell.trim() {
            c if c.eq_ignore_ascii_case("true") => Ok(true),
            c if c.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err("expected true or false".to_string()),
        }
    }
}

impl CellValue for u32 {
    fn to_cell(&self) -> String {
        self.to_string()
    }

    fn from_cell(cell: &str) -> Result<Self, String> {
        cell.trim().parse().map_err(|e| format!("{e}"))
    }
}

/// Absent is stored as an empty cell, so `Some("")` reads back as `None`.
/// Constructors of optional fields normalise empty values to `None`.
impl CellValue for Option<String> {
    fn to_cell(&self) -> String {
        self.clone().unwrap_or_default()
    }

    fn from_cell(cell: &str) -> Result<Self, String> {
        Ok((!cell.is_empty()).then(|| cell.to_string()))
    }
}

/// Nested lists are stored as a JSON array; an empty cell reads back as `[]`.
impl<T: Serialize + DeserializeOwned> CellValue for Vec<T> {
    fn to_cell(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }

    fn from_cell(cell: &str) -> Result<Self, String> {
        if cell.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(cell).map_err(|e| e.to_string())
    }
}

/// Fixed, ordered column layout of an entity.
pub trait RowSchema: Sized {
    const ENTITY: &'static str;
    const COLUMNS: &'static [&'static str];

    fn to_row(&self) -> Row;
    fn from_row(row: &[String]) -> Result<Self, RowError>;
}

#[doc(hidden)]
pub fn decode_cell<T: CellValue>(
    entity: &'static str,
    column: &'static str,
    cell: Option<&String>,
) -> Result<T, RowError> {
    let cell = cell.map(String::as_str).unwrap_or_default();
    T::from_cell(cell).map_err(|reason| RowError::Cell {
        entity,
        column,
        value: cell.to_string(),
        reason,
    })
}

/// Derives both row directions from one field list, so the column order
/// cannot drift between encoding and decoding.
macro_rules! row_schema {
    ($ty:ident { $($field:ident => $column:literal),+ $(,)? }) => {
        impl RowSchema for $ty {
            const ENTITY: &'static str = stringify!($ty);
            const COLUMNS: &'static [&'static str] = &[$($column),+];

            fn to_row(&self) -> Row {
                vec![$(CellValue::to_cell(&self.$field)),+]
            }

            fn from_row(row: &[String]) -> Result<Self, RowError> {
                if row.len() != Self::COLUMNS.len() {
                    return Err(RowError::Width {
                        entity: Self::ENTITY,
                        expected: Self::COLUMNS.len(),
                        actual: row.len(),
                    });
                }
                let mut cells = row.iter();
                Ok(Self {
                    $($field: decode_cell(Self::ENTITY, $column, cells.next())?),+
                })
            }
        }
    };
}

row_schema!(Channel {
    id => "id",
    name => "name",
    is_private => "isPrivate",
    topic => "topic",
    purpose => "purpose",
});

row_schema!(Member {
    id => "id",
    name => "name",
    display_name => "displayName",
    deleted => "deleted",
    image_url => "imageUrl",
    is_bot => "isBot",
});

row_schema!(Message {
    ts => "ts",
    created => "created",
    user_id => "userId",
    user_name => "userName",
    text => "text",
    reply_count => "replyCount",
    latest_reply_ts => "latestReplyTs",
    latest_reply => "latestReply",
    reactions => "reactions",
    files => "files",
    urls => "urls",
    is_edited => "isEdited",
    edited_ts => "editedTs",
    edited => "edited",
    raw_json => "rawJson",
});

row_schema!(Reply {
    ts => "ts",
    created => "created",
    user_id => "userId",
    user_name => "userName",
    text => "text",
    thread_ts => "threadTs",
    reactions => "reactions",
    files => "files",
    urls => "urls",
    is_edited => "isEdited",
    edited_ts => "editedTs",
    edited => "edited",
    raw_json => "rawJson",
});

row_schema!(ChannelStatus {
    channel_id => "channelId",
    last_ts => "lastTs",
    last_updated_at => "lastUpdatedAt",
});

pub fn to_rows<T: RowSchema>(items: &[T]) -> Vec<Row> {
    items.iter().map(RowSchema::to_row).collect()
}

pub fn from_rows<T: RowSchema>(rows: &[Row]) -> Result<Vec<T>, RowError> {
    rows.iter().map(|row| T::from_row(row)).collect()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn column_lists_match_layout() {
        assert_eq!(Channel::COLUMNS.len(), 5);
        assert_eq!(Member::COLUMNS.len(), 6);
        assert_eq!(Message::COLUMNS.len(), 15);
        assert_eq!(Reply::COLUMNS.len(), 13);
        assert_eq!(ChannelStatus::COLUMNS, &["channelId", "lastTs", "lastUpdatedAt"]);
    }

    #[test]
    fn member_without_image_uses_empty_cell() {
        let member = Member {
            id: "member3".to_string(),
            name: "name3".to_string(),
            display_name: "display_name3".to_string(),
            deleted: false,
            image_url: None,
            is_bot: true,
        };
        let encoded = member.to_row();
        assert_eq!(
            encoded,
            row(&["member3", "name3", "display_name3", "false", "", "true"])
        );
        assert_eq!(Member::from_row(&encoded).unwrap(), member);
    }

    #[test]
    fn status_rows_decode() {
        let rows = vec![
            row(&["channel1", "1668783600", "2022-11-19 00:00:00"]),
            row(&["channel2", "", "2022-11-20 12:10:03"]),
        ];
        let statuses: Vec<ChannelStatus> = from_rows(&rows).unwrap();
        assert_eq!(statuses[0].last_ts.as_deref(), Some("1668783600"));
        assert_eq!(statuses[1].last_ts, None);
        assert_eq!(to_rows(&statuses), rows);
    }

    #[test]
    fn empty_optional_collapses_to_absent() {
        assert_eq!(Some(String::new()).to_cell(), "");
        assert_eq!(Option::<String>::from_cell(""), Ok(None));

        let status = ChannelStatus::new("channel1", Some(""), "2022-11-20 12:10:03".to_string());
        assert_eq!(
            from_rows::<ChannelStatus>(&to_rows(std::slice::from_ref(&status))).unwrap(),
            vec![status]
        );
    }

    #[test]
    fn short_row_is_rejected() {
        let err = Channel::from_row(&row(&["channel1", "name1"])).unwrap_err();
        assert_eq!(
            err,
            RowError::Width {
                entity: "Channel",
                expected: 5,
                actual: 2
            }
        );
    }

    #[test_case("yes" ; "word")]
    #[test_case("" ; "empty")]
    #[test_case("1" ; "digit")]
    fn bad_boolean_names_the_column(cell: &str) {
        let err = Channel::from_row(&row(&["c", "n", cell, "t", "p"])).unwrap_err();
        assert!(matches!(err, RowError::Cell { column: "isPrivate", .. }));
    }

    #[test_case("TRUE", true)]
    #[test_case("false", false)]
    #[test_case(" True ", true)]
    fn booleans_accept_any_case(cell: &str, expected: bool) {
        assert_eq!(bool::from_cell(cell), Ok(expected));
    }

    #[test]
    fn empty_list_cell_reads_as_empty_vec() {
        let parsed: Vec<crate::models::Reaction> = Vec::from_cell("").unwrap();
        assert!(parsed.is_empty());
        assert_eq!(Vec::<crate::models::Reaction>::new().to_cell(), "[]");
    }
}
