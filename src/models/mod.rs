use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Tags arrive either as a JSON list or as a single comma-separated string.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(split_tags(&s)),
        StringOrVec::Vec(v) => Ok(v
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()),
    }
}

/// Dates are RFC 3339 in the API, but hand-written seed files often carry a
/// bare `YYYY-MM-DD` or a naive `YYYY-MM-DD HH:MM:SS` (read as UTC).
pub fn parse_post_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_post_date(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid post date '{}'", raw))),
    }
}

/// Splits the stored comma-joined form back into individual tags.
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

pub fn join_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: String,
    // Posts submitted without a date are stamped when saved.
    #[serde(default, deserialize_with = "deserialize_date")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub views: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tech: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub post_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub author_name: String,
    // Only the moderation queue shows addresses.
    #[serde(skip_serializing)]
    pub author_email: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub approved: bool,
}

/// Comment as shown in the moderation queue, email included.
#[derive(Debug, Serialize)]
pub struct PendingComment<'a> {
    #[serde(flatten)]
    pub comment: &'a Comment,
    pub author_email: &'a str,
}

/// Input for a new public comment, before it has an id or timestamp.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: String,
    pub parent_id: Option<i64>,
    pub author_name: String,
    pub author_email: String,
    pub content: String,
}

/// One node of the public comment forest.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Breadcrumb {
    pub name: String,
    pub url: String,
}

impl Breadcrumb {
    pub fn new(name: &str, url: &str) -> Self {
        Breadcrumb { name: name.to_string(), url: url.to_string() }
    }
}

pub mod db_operations;
