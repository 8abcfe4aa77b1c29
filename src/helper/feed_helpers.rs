use crate::cache::TtlCache;
use crate::config::Config;
use crate::helper::public_helpers::cache_ttl;
use crate::models::db_operations::{posts_db_operations, DbError};
use crate::models::Post;
use crate::DbPool;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

impl FeedFormat {
    /// `/atom` always yields Atom; the other feed paths honour an Atom `Accept` header.
    pub fn negotiate(path: &str, accept: Option<&str>) -> Self {
        let wants_atom = accept.map_or(false, |accept| accept.contains("application/atom+xml"));
        if path.trim_end_matches('/') == "/atom" || wants_atom {
            FeedFormat::Atom
        } else {
            FeedFormat::Rss
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            FeedFormat::Rss => "application/rss+xml; charset=utf-8",
            FeedFormat::Atom => "application/atom+xml; charset=utf-8",
        }
    }

    fn template(self) -> &'static str {
        match self {
            FeedFormat::Rss => "feed/rss.xml",
            FeedFormat::Atom => "feed/atom.xml",
        }
    }

    fn cache_key(self) -> &'static str {
        match self {
            FeedFormat::Rss => "feed:rss",
            FeedFormat::Atom => "feed:atom",
        }
    }
}

#[derive(Serialize)]
struct FeedItem<'a> {
    id: &'a str,
    title: &'a str,
    link: String,
    summary: &'a str,
    content: &'a str,
    category: &'a str,
    tags: &'a [String],
    published_rfc2822: String,
    published_rfc3339: String,
}

fn feed_item<'a>(post: &'a Post, base_url: &str, fallback: DateTime<Utc>) -> FeedItem<'a> {
    let published = post.date.unwrap_or(fallback);
    FeedItem {
        id: &post.id,
        title: &post.title,
        link: format!("{}/blog/{}", base_url, post.id),
        summary: &post.summary,
        content: &post.content,
        category: &post.category,
        tags: &post.tags,
        published_rfc2822: published.to_rfc2822(),
        published_rfc3339: published.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// Renders the whole feed document for `posts` (newest first).
pub fn render_feed(tera: &Tera, config: &Config, posts: &[Post], format: FeedFormat, now: DateTime<Utc>) -> Result<String, tera::Error> {
    let base_url = config.site_base_url();
    let items: Vec<FeedItem> = posts.iter().map(|post| feed_item(post, base_url, now)).collect();
    let updated = posts.iter().filter_map(|post| post.date).max().unwrap_or(now);

    let mut ctx = Context::new();
    ctx.insert("site", &config.site);
    ctx.insert("base_url", base_url);
    ctx.insert("items", &items);
    ctx.insert("updated_rfc2822", &updated.to_rfc2822());
    ctx.insert("updated_rfc3339", &updated.to_rfc3339_opts(SecondsFormat::Secs, true));
    tera.render(format.template(), &ctx)
}

/// Cached feed document. Saving or deleting a post clears the cache.
pub fn cached_feed(
    pool: &DbPool,
    cache: &TtlCache<String, String>,
    tera: &Tera,
    config: &Config,
    format: FeedFormat,
    now: DateTime<Utc>,
) -> Result<String, FeedError> {
    cache.get_or_try_insert_with(format.cache_key().to_string(), Some(cache_ttl()), || {
        let posts = {
            let conn = pool.get()?;
            posts_db_operations::read_all_posts(&conn)?
        };
        Ok(render_feed(tera, config, &posts, format, now)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/rss", None, FeedFormat::Rss)]
    #[case("/feed", Some("text/html"), FeedFormat::Rss)]
    #[case("/atom", None, FeedFormat::Atom)]
    #[case("/rss", Some("application/atom+xml"), FeedFormat::Atom)]
    #[case("/feed", Some("application/atom+xml;q=0.9, */*"), FeedFormat::Atom)]
    fn format_follows_path_then_accept(#[case] path: &str, #[case] accept: Option<&str>, #[case] expected: FeedFormat) {
        assert_eq!(FeedFormat::negotiate(path, accept), expected);
    }

    #[test]
    fn content_types_match_formats() {
        assert!(FeedFormat::Rss.content_type().starts_with("application/rss+xml"));
        assert!(FeedFormat::Atom.content_type().starts_with("application/atom+xml"));
    }
}
