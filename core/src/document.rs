use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A crawled page in the shape it travels over the transport and lives in
/// the indexes.
///
/// `tokens` may arrive empty; the inverted index populates it from
/// `content` at indexing time and the cached sequence is what every
/// later length lookup sees. Unknown fields in a transport record are
/// ignored on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Content", default)]
    pub content: String,
    #[serde(rename = "Tokens", default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
    #[serde(
        rename = "FetchedAt",
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub fetched_at: Option<OffsetDateTime>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            content: content.into(),
            tokens: Vec::new(),
            fetched_at: None,
        }
    }
}
