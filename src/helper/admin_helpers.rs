use crate::cache::TtlCache;
use crate::models::db_operations::{comments_db_operations, posts_db_operations, services_db_operations, DbError};
use crate::models::{Comment, Post, Service};
use crate::DbPool;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdminHelperError {
    #[error("Database error: {0}")]
    Database(DbError),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("{0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<DbError> for AdminHelperError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => AdminHelperError::NotFound(what),
            DbError::Invalid(msg) => AdminHelperError::Validation(msg),
            other => AdminHelperError::Database(other),
        }
    }
}

fn get_conn(pool: &DbPool) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, AdminHelperError> {
    pool.get().map_err(AdminHelperError::Pool)
}

fn slug_regex() -> &'static Regex {
    static SLUG: OnceLock<Regex> = OnceLock::new();
    SLUG.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("slug pattern is valid"))
}

/// Post ids become URLs, so they are restricted to lowercase slugs.
pub fn validate_post(post: &Post) -> Result<(), AdminHelperError> {
    if !slug_regex().is_match(&post.id) {
        return Err(AdminHelperError::Validation(
            "Post id must contain only lowercase letters, digits and hyphens".to_string(),
        ));
    }
    if post.title.trim().is_empty() {
        return Err(AdminHelperError::Validation("Post title is required".to_string()));
    }
    Ok(())
}

pub fn validate_service(service: &Service) -> Result<(), AdminHelperError> {
    if service.name.trim().is_empty() {
        return Err(AdminHelperError::Validation("Service name is required".to_string()));
    }
    Ok(())
}

/// Upserts a post and drops cached feeds and tags so they are rebuilt.
pub fn save_post(pool: &DbPool, cache: &TtlCache<String, String>, post: &Post) -> Result<Post, AdminHelperError> {
    validate_post(post)?;
    let conn = get_conn(pool)?;
    let stored = posts_db_operations::save_post(&conn, post)?;
    cache.clear();
    log::info!("Saved post '{}'", stored.id);
    Ok(stored)
}

pub fn delete_post(pool: &DbPool, cache: &TtlCache<String, String>, id: &str) -> Result<(), AdminHelperError> {
    let conn = get_conn(pool)?;
    if posts_db_operations::delete_post(&conn, id)? == 0 {
        return Err(AdminHelperError::NotFound(id.to_string()));
    }
    cache.clear();
    log::info!("Deleted post '{}' and its comments", id);
    Ok(())
}

pub fn save_service(pool: &DbPool, service: &Service) -> Result<(), AdminHelperError> {
    validate_service(service)?;
    let conn = get_conn(pool)?;
    services_db_operations::save_service(&conn, service)?;
    log::info!("Saved service '{}'", service.name);
    Ok(())
}

pub fn delete_service(pool: &DbPool, name: &str) -> Result<(), AdminHelperError> {
    let conn = get_conn(pool)?;
    if services_db_operations::delete_service(&conn, name)? == 0 {
        return Err(AdminHelperError::NotFound(name.to_string()));
    }
    log::info!("Deleted service '{}'", name);
    Ok(())
}

pub fn fetch_pending_comments(pool: &DbPool) -> Result<Vec<Comment>, AdminHelperError> {
    let conn = get_conn(pool)?;
    Ok(comments_db_operations::read_pending_comments(&conn)?)
}

pub fn approve_comment(pool: &DbPool, id: i64) -> Result<(), AdminHelperError> {
    let conn = get_conn(pool)?;
    comments_db_operations::approve_comment(&conn, id)?;
    log::info!("Approved comment {}", id);
    Ok(())
}

pub fn delete_comment(pool: &DbPool, id: i64) -> Result<(), AdminHelperError> {
    let conn = get_conn(pool)?;
    comments_db_operations::delete_comment(&conn, id)?;
    log::info!("Deleted comment {} and its replies", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};
    use crate::setup::db_setup::open_memory_pool;
    use rstest::rstest;
    use std::sync::Arc;

    fn post(id: &str, title: &str) -> Post {
        Post {
            id: id.to_string(),
            title: title.to_string(),
            date: None,
            category: "Homelab".to_string(),
            summary: String::new(),
            content: String::new(),
            tags: vec!["k8s".to_string()],
            views: 0,
        }
    }

    fn cache() -> TtlCache<String, String> {
        TtlCache::new(Arc::new(MockClock::default()) as Arc<dyn Clock>)
    }

    #[rstest]
    #[case::uppercase("My-Post", "Title")]
    #[case::space("my post", "Title")]
    #[case::empty_id("", "Title")]
    #[case::path("../etc", "Title")]
    #[case::blank_title("my-post", "  ")]
    fn invalid_posts_are_rejected(#[case] id: &str, #[case] title: &str) {
        assert!(matches!(validate_post(&post(id, title)), Err(AdminHelperError::Validation(_))));
    }

    #[test]
    fn saving_and_deleting_clears_cache() {
        let pool = open_memory_pool().unwrap();
        let cache = cache();

        cache.set("rss".to_string(), "stale".to_string(), None);
        save_post(&pool, &cache, &post("k3s-notes", "k3s notes")).unwrap();
        assert!(cache.is_empty());

        cache.set("rss".to_string(), "stale".to_string(), None);
        delete_post(&pool, &cache, "k3s-notes").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn deleting_unknown_items_is_not_found() {
        let pool = open_memory_pool().unwrap();
        assert!(matches!(delete_post(&pool, &cache(), "nope"), Err(AdminHelperError::NotFound(_))));
        assert!(matches!(delete_service(&pool, "nope"), Err(AdminHelperError::NotFound(_))));
        assert!(matches!(approve_comment(&pool, 7), Err(AdminHelperError::NotFound(_))));
        assert!(matches!(delete_comment(&pool, 7), Err(AdminHelperError::NotFound(_))));
    }

    #[test]
    fn service_needs_a_name() {
        let pool = open_memory_pool().unwrap();
        let service = Service {
            name: " ".to_string(),
            description: String::new(),
            url: String::new(),
            tech: String::new(),
            status: "active".to_string(),
            icon: String::new(),
        };
        assert!(matches!(save_service(&pool, &service), Err(AdminHelperError::Validation(_))));
    }
}
