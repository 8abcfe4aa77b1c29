use crate::cache::TtlCache;
use crate::models::db_operations::{posts_db_operations, services_db_operations, DbError};
use crate::models::{Post, Service};
use crate::DbPool;

pub const TAGS_CACHE_KEY: &str = "tags";

pub fn cache_ttl() -> chrono::Duration {
    chrono::Duration::minutes(5)
}

/// Query parameters are optional and blank values mean "not given".
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn fetch_posts(pool: &DbPool, category: Option<&str>) -> Result<Vec<Post>, DbError> {
    let conn = pool.get()?;
    match category {
        Some(category) => posts_db_operations::read_posts_by_category(&conn, category),
        None => posts_db_operations::read_all_posts(&conn),
    }
}

pub fn fetch_latest_posts(pool: &DbPool, limit: u32) -> Result<Vec<Post>, DbError> {
    let conn = pool.get()?;
    posts_db_operations::read_latest_posts(&conn, limit)
}

pub fn fetch_popular_posts(pool: &DbPool, limit: u32) -> Result<Vec<Post>, DbError> {
    let conn = pool.get()?;
    posts_db_operations::read_popular_posts(&conn, limit)
}

pub fn fetch_post(pool: &DbPool, id: &str) -> Result<Option<Post>, DbError> {
    let conn = pool.get()?;
    posts_db_operations::read_post(&conn, id)
}

/// Loads a post for its public page and counts the view. A failed counter
/// update is logged and does not stop the page from rendering.
pub fn fetch_post_for_reading(pool: &DbPool, id: &str) -> Result<Option<Post>, DbError> {
    let conn = pool.get()?;
    match posts_db_operations::increment_post_views(&conn, id) {
        Ok(()) => {}
        Err(DbError::NotFound(_)) => return Ok(None),
        Err(e) => log::warn!("Failed to record view for post '{}': {}", id, e),
    }
    posts_db_operations::read_post(&conn, id)
}

pub fn fetch_services(pool: &DbPool, status: Option<&str>) -> Result<Vec<Service>, DbError> {
    let conn = pool.get()?;
    services_db_operations::read_services(&conn, status)
}

/// Tag filter wins over free text; with neither, every post is returned.
pub fn search(pool: &DbPool, query: Option<&str>, tag: Option<&str>) -> Result<Vec<Post>, DbError> {
    let conn = pool.get()?;
    match (tag, query) {
        (Some(tag), _) => posts_db_operations::search_posts_by_tag(&conn, tag),
        (None, Some(query)) => posts_db_operations::search_posts(&conn, query),
        (None, None) => posts_db_operations::read_all_posts(&conn),
    }
}

/// Distinct sorted tags, served from the cache for a few minutes.
pub fn fetch_all_tags(pool: &DbPool, cache: &TtlCache<String, String>) -> Result<Vec<String>, DbError> {
    let cached = cache.get_or_try_insert_with(TAGS_CACHE_KEY.to_string(), Some(cache_ttl()), || {
        let conn = pool.get()?;
        let tags = posts_db_operations::read_all_tags(&conn)?;
        serde_json::to_string(&tags).map_err(|e| DbError::Invalid(e.to_string()))
    })?;
    serde_json::from_str(&cached).map_err(|e| DbError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};
    use crate::models::db_operations::posts_db_operations::save_post;
    use crate::setup::db_setup::open_memory_pool;
    use std::sync::Arc;

    fn post(id: &str, tags: &[&str]) -> Post {
        Post {
            id: id.to_string(),
            title: format!("Post {}", id),
            date: None,
            category: "Homelab".to_string(),
            summary: String::new(),
            content: "k3s on raspberry pi".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            views: 0,
        }
    }

    #[test]
    fn reading_a_post_counts_views() {
        let pool = open_memory_pool().unwrap();
        save_post(&pool.get().unwrap(), &post("a", &[])).unwrap();

        fetch_post_for_reading(&pool, "a").unwrap();
        let post = fetch_post_for_reading(&pool, "a").unwrap().unwrap();
        assert_eq!(post.views, 2);
        assert!(fetch_post_for_reading(&pool, "missing").unwrap().is_none());
    }

    #[test]
    fn search_prefers_tag_then_query() {
        let pool = open_memory_pool().unwrap();
        save_post(&pool.get().unwrap(), &post("a", &["pi"])).unwrap();
        save_post(&pool.get().unwrap(), &post("b", &["k8s"])).unwrap();

        assert_eq!(search(&pool, Some("raspberry"), Some("k8s")).unwrap().len(), 1);
        assert_eq!(search(&pool, Some("raspberry"), None).unwrap().len(), 2);
        assert_eq!(search(&pool, None, None).unwrap().len(), 2);
    }

    #[test]
    fn tags_are_cached_until_cleared() {
        let pool = open_memory_pool().unwrap();
        let cache = TtlCache::new(Arc::new(MockClock::default()) as Arc<dyn Clock>);
        save_post(&pool.get().unwrap(), &post("a", &["pi"])).unwrap();
        assert_eq!(fetch_all_tags(&pool, &cache).unwrap(), vec!["pi"]);

        save_post(&pool.get().unwrap(), &post("b", &["k8s"])).unwrap();
        assert_eq!(fetch_all_tags(&pool, &cache).unwrap(), vec!["pi"]);

        cache.clear();
        assert_eq!(fetch_all_tags(&pool, &cache).unwrap(), vec!["k8s", "pi"]);
    }

    #[test]
    fn blank_query_values_are_ignored() {
        assert_eq!(non_blank(&Some("  ".to_string())), None);
        assert_eq!(non_blank(&Some(" k8s ".to_string())), Some("k8s"));
        assert_eq!(non_blank(&None), None);
    }
}
