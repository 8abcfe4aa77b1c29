use crate::models::db_operations::{from_db_timestamp, like_pattern, to_db_timestamp, DbError};
use crate::models::{join_tags, split_tags, Post};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

const POST_COLUMNS: &str = "id, title, date, category, summary, content, tags, views";

fn row_to_post(row: &Row) -> rusqlite::Result<Post> {
    let date: String = row.get(2)?;
    let tags: String = row.get(6)?;
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        date: Some(from_db_timestamp(2, &date)?),
        category: row.get(3)?,
        summary: row.get(4)?,
        content: row.get(5)?,
        tags: split_tags(&tags),
        views: row.get(7)?,
    })
}

fn query_posts<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Post>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_post)?;

    let mut posts = Vec::new();
    for post in rows {
        posts.push(post?);
    }
    Ok(posts)
}

/// All posts, newest first.
pub fn read_all_posts(conn: &Connection) -> Result<Vec<Post>, DbError> {
    query_posts(
        conn,
        &format!("SELECT {} FROM posts ORDER BY date DESC, id", POST_COLUMNS),
        [],
    )
}

pub fn read_posts_by_category(conn: &Connection, category: &str) -> Result<Vec<Post>, DbError> {
    query_posts(
        conn,
        &format!("SELECT {} FROM posts WHERE category = ?1 ORDER BY date DESC, id", POST_COLUMNS),
        [category],
    )
}

pub fn read_latest_posts(conn: &Connection, limit: u32) -> Result<Vec<Post>, DbError> {
    query_posts(
        conn,
        &format!("SELECT {} FROM posts ORDER BY date DESC, id LIMIT ?1", POST_COLUMNS),
        [limit],
    )
}

/// Most viewed first; equal counts fall back to newest first.
pub fn read_popular_posts(conn: &Connection, limit: u32) -> Result<Vec<Post>, DbError> {
    query_posts(
        conn,
        &format!("SELECT {} FROM posts ORDER BY views DESC, date DESC, id LIMIT ?1", POST_COLUMNS),
        [limit],
    )
}

pub fn read_post(conn: &Connection, id: &str) -> Result<Option<Post>, DbError> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
            [id],
            row_to_post,
        )
        .optional()?)
}

pub fn post_exists(conn: &Connection, id: &str) -> Result<bool, DbError> {
    Ok(conn.query_row("SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)", [id], |row| row.get(0))?)
}

/// Creates or replaces a post keyed by id. The view counter of an existing
/// post is left untouched. Returns the post as stored.
pub fn save_post(conn: &Connection, post: &Post) -> Result<Post, DbError> {
    let date = post.date.unwrap_or_else(Utc::now);
    conn.execute(
        "INSERT INTO posts (id, title, date, category, summary, content, tags, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CURRENT_TIMESTAMP)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            date = excluded.date,
            category = excluded.category,
            summary = excluded.summary,
            content = excluded.content,
            tags = excluded.tags,
            updated_at = CURRENT_TIMESTAMP",
        params![
            post.id,
            post.title,
            to_db_timestamp(&date),
            post.category,
            post.summary,
            post.content,
            join_tags(&post.tags),
        ],
    )?;
    read_post(conn, &post.id)?.ok_or_else(|| DbError::NotFound(post.id.clone()))
}

/// Deletes a post and, through the foreign keys, all of its comments.
/// Returns the number of posts removed (0 or 1).
pub fn delete_post(conn: &Connection, id: &str) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id])?)
}

pub fn increment_post_views(conn: &Connection, id: &str) -> Result<(), DbError> {
    let updated = conn.execute("UPDATE posts SET views = views + 1 WHERE id = ?1", [id])?;
    if updated == 0 {
        return Err(DbError::NotFound(id.to_string()));
    }
    Ok(())
}

/// Case-insensitive substring search over title, content, category and tags.
/// An empty query matches nothing.
pub fn search_posts(conn: &Connection, query: &str) -> Result<Vec<Post>, DbError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = like_pattern(query);
    query_posts(
        conn,
        &format!(
            "SELECT {} FROM posts
             WHERE title LIKE ?1 ESCAPE '\\'
                OR content LIKE ?1 ESCAPE '\\'
                OR category LIKE ?1 ESCAPE '\\'
                OR tags LIKE ?1 ESCAPE '\\'
             ORDER BY date DESC, id",
            POST_COLUMNS
        ),
        [pattern],
    )
}

/// Posts carrying exactly `tag` (ignoring case). The LIKE prefilter is broad,
/// so every candidate is checked against its parsed tag list.
pub fn search_posts_by_tag(conn: &Connection, tag: &str) -> Result<Vec<Post>, DbError> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Ok(Vec::new());
    }
    let candidates = query_posts(
        conn,
        &format!("SELECT {} FROM posts WHERE tags LIKE ?1 ESCAPE '\\' ORDER BY date DESC, id", POST_COLUMNS),
        [like_pattern(tag)],
    )?;
    Ok(candidates
        .into_iter()
        .filter(|post| post.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
        .collect())
}

/// Every distinct tag across all posts, sorted.
pub fn read_all_tags(conn: &Connection) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare("SELECT DISTINCT tags FROM posts WHERE tags != ''")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut tags = BTreeSet::new();
    for tags_str in rows {
        tags.extend(split_tags(&tags_str?));
    }
    Ok(tags.into_iter().collect())
}
