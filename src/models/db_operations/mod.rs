use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

pub mod comments_db_operations;
pub mod posts_db_operations;
pub mod services_db_operations;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
}

/// Timestamps are stored as RFC 3339 UTC text so that lexical order matches
/// chronological order.
pub fn to_db_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn from_db_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

/// Escapes LIKE wildcards so user text is matched literally (`ESCAPE '\'`).
pub fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_round_trip_at_second_precision() {
        let at = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 1).unwrap();
        let stored = to_db_timestamp(&at);
        assert_eq!(stored, "2024-02-29T23:59:01Z");
        assert_eq!(from_db_timestamp(0, &stored).unwrap(), at);
        assert!(from_db_timestamp(0, "yesterday").is_err());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("k8s"), "%k8s%");
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
    }
}
