use crate::models::db_operations::{from_db_timestamp, to_db_timestamp, DbError};
use crate::models::{Comment, NewComment};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COMMENT_COLUMNS: &str = "id, post_id, parent_id, author_name, author_email, content, created_at, approved";

fn row_to_comment(row: &Row) -> rusqlite::Result<Comment> {
    let created_at: String = row.get(6)?;
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        parent_id: row.get(2)?,
        author_name: row.get(3)?,
        author_email: row.get(4)?,
        content: row.get(5)?,
        created_at: from_db_timestamp(6, &created_at)?,
        approved: row.get(7)?,
    })
}

/// Stores a new, unapproved comment and returns it with its assigned id.
pub fn insert_comment(conn: &Connection, new: &NewComment, created_at: DateTime<Utc>) -> Result<Comment, DbError> {
    conn.execute(
        "INSERT INTO comments (post_id, parent_id, author_name, author_email, content, created_at, approved)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![
            new.post_id,
            new.parent_id,
            new.author_name,
            new.author_email,
            new.content,
            to_db_timestamp(&created_at),
        ],
    )?;
    let id = conn.last_insert_rowid();
    read_comment(conn, id)?.ok_or_else(|| DbError::NotFound(format!("comment {}", id)))
}

pub fn read_comment(conn: &Connection, id: i64) -> Result<Option<Comment>, DbError> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM comments WHERE id = ?1", COMMENT_COLUMNS),
            [id],
            row_to_comment,
        )
        .optional()?)
}

/// Approved comments of one post, oldest first.
pub fn read_approved_comments(conn: &Connection, post_id: &str) -> Result<Vec<Comment>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM comments WHERE post_id = ?1 AND approved = 1 ORDER BY created_at, id",
        COMMENT_COLUMNS
    ))?;
    let rows = stmt.query_map([post_id], row_to_comment)?;

    let mut comments = Vec::new();
    for comment in rows {
        comments.push(comment?);
    }
    Ok(comments)
}

/// The moderation queue across all posts, newest first.
pub fn read_pending_comments(conn: &Connection) -> Result<Vec<Comment>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM comments WHERE approved = 0 ORDER BY created_at DESC, id DESC",
        COMMENT_COLUMNS
    ))?;
    let rows = stmt.query_map([], row_to_comment)?;

    let mut comments = Vec::new();
    for comment in rows {
        comments.push(comment?);
    }
    Ok(comments)
}

pub fn count_approved_comments(conn: &Connection, post_id: &str) -> Result<i64, DbError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1 AND approved = 1",
        [post_id],
        |row| row.get(0),
    )?)
}

pub fn approve_comment(conn: &Connection, id: i64) -> Result<(), DbError> {
    let updated = conn.execute("UPDATE comments SET approved = 1 WHERE id = ?1", [id])?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("comment {}", id)));
    }
    Ok(())
}

/// Deletes a comment together with every reply beneath it.
pub fn delete_comment(conn: &Connection, id: i64) -> Result<(), DbError> {
    let deleted = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(DbError::NotFound(format!("comment {}", id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::posts_db_operations::{delete_post, save_post};
    use crate::models::db_operations::test_support::memory_db;
    use crate::models::Post;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn with_post(id: &str) -> Connection {
        let conn = memory_db();
        save_post(
            &conn,
            &Post {
                id: id.to_string(),
                title: "Post".to_string(),
                date: Some(base_time()),
                category: "Homelab".to_string(),
                summary: String::new(),
                content: String::new(),
                tags: vec![],
                views: 0,
            },
        )
        .unwrap();
        conn
    }

    fn new_comment(post_id: &str, parent_id: Option<i64>, author: &str) -> NewComment {
        NewComment {
            post_id: post_id.to_string(),
            parent_id,
            author_name: author.to_string(),
            author_email: format!("{}@example.com", author.to_lowercase()),
            content: format!("Comment from {}", author),
        }
    }

    #[test]
    fn new_comments_stay_hidden_until_approved() {
        let conn = with_post("p1");
        let stored = insert_comment(&conn, &new_comment("p1", None, "Ann"), base_time()).unwrap();
        assert!(!stored.approved);
        assert!(read_approved_comments(&conn, "p1").unwrap().is_empty());
        assert_eq!(count_approved_comments(&conn, "p1").unwrap(), 0);
        assert_eq!(read_pending_comments(&conn).unwrap().len(), 1);

        approve_comment(&conn, stored.id).unwrap();
        let visible = read_approved_comments(&conn, "p1").unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].author_email, "ann@example.com");
        assert!(read_pending_comments(&conn).unwrap().is_empty());
    }

    #[test]
    fn pending_queue_is_newest_first() {
        let conn = with_post("p1");
        let first = insert_comment(&conn, &new_comment("p1", None, "Ann"), base_time()).unwrap();
        let second = insert_comment(&conn, &new_comment("p1", None, "Bob"), base_time() + Duration::minutes(5)).unwrap();
        let ids: Vec<i64> = read_pending_comments(&conn).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn comment_for_unknown_post_violates_foreign_key() {
        let conn = with_post("p1");
        assert!(insert_comment(&conn, &new_comment("missing", None, "Ann"), base_time()).is_err());
    }

    #[test]
    fn deleting_post_cascades_to_comments() {
        let conn = with_post("p1");
        let root = insert_comment(&conn, &new_comment("p1", None, "Ann"), base_time()).unwrap();
        insert_comment(&conn, &new_comment("p1", Some(root.id), "Bob"), base_time()).unwrap();

        delete_post(&conn, "p1").unwrap();
        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0)).unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn deleting_parent_removes_replies() {
        let conn = with_post("p1");
        let root = insert_comment(&conn, &new_comment("p1", None, "Ann"), base_time()).unwrap();
        let reply = insert_comment(&conn, &new_comment("p1", Some(root.id), "Bob"), base_time()).unwrap();
        let nested = insert_comment(&conn, &new_comment("p1", Some(reply.id), "Cy"), base_time()).unwrap();

        delete_comment(&conn, root.id).unwrap();
        assert!(read_comment(&conn, reply.id).unwrap().is_none());
        assert!(read_comment(&conn, nested.id).unwrap().is_none());
    }

    #[test]
    fn moderating_unknown_comment_is_not_found() {
        let conn = with_post("p1");
        assert!(matches!(approve_comment(&conn, 42), Err(DbError::NotFound(_))));
        assert!(matches!(delete_comment(&conn, 42), Err(DbError::NotFound(_))));
    }
}
