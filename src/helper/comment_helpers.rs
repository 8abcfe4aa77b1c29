use crate::models::db_operations::{comments_db_operations, posts_db_operations, DbError};
use crate::models::{Comment, CommentNode, NewComment};
use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::OnceLock;
use thiserror::Error;

pub const MAX_AUTHOR_NAME_CHARS: usize = 100;
pub const MAX_AUTHOR_EMAIL_CHARS: usize = 254;
pub const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Error, Debug)]
pub enum CommentError {
    #[error("{0}")]
    Validation(String),
    #[error("Post not found")]
    PostNotFound,
    #[error("Database operation failed: {0}")]
    Db(#[from] DbError),
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid"))
}

fn required_field(fields: &HashMap<String, String>, key: &str, label: &str, max_chars: usize) -> Result<String, CommentError> {
    let value = fields.get(key).map(|s| s.trim()).unwrap_or("");
    if value.is_empty() {
        return Err(CommentError::Validation(format!("{} is required", label)));
    }
    if value.chars().count() > max_chars {
        return Err(CommentError::Validation(format!("{} is too long (max {} characters)", label, max_chars)));
    }
    Ok(value.to_string())
}

/// Checks the submitted form fields of a new comment. Only the shape of the
/// input is examined here; [`submit_comment`] checks it against the database.
pub fn validate_new_comment(post_id: &str, fields: &HashMap<String, String>) -> Result<NewComment, CommentError> {
    let author_name = required_field(fields, "author_name", "Author name", MAX_AUTHOR_NAME_CHARS)?;
    let author_email = required_field(fields, "author_email", "Author email", MAX_AUTHOR_EMAIL_CHARS)?;
    if !email_regex().is_match(&author_email) {
        return Err(CommentError::Validation("Author email is not a valid address".to_string()));
    }
    let content = required_field(fields, "content", "Comment content", MAX_CONTENT_CHARS)?;

    let parent_id = match fields.get("parent_id").map(|s| s.trim()) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| CommentError::Validation("Invalid parent comment".to_string()))?,
        ),
    };

    Ok(NewComment {
        post_id: post_id.to_string(),
        parent_id,
        author_name,
        author_email,
        content,
    })
}

/// Stores a validated comment for moderation. The post must exist and a
/// reply may only target an approved comment on the same post.
pub fn submit_comment(conn: &Connection, new: &NewComment, now: DateTime<Utc>) -> Result<Comment, CommentError> {
    if !posts_db_operations::post_exists(conn, &new.post_id)? {
        return Err(CommentError::PostNotFound);
    }
    if let Some(parent_id) = new.parent_id {
        match comments_db_operations::read_comment(conn, parent_id)? {
            Some(parent) if parent.approved && parent.post_id == new.post_id => {}
            _ => return Err(CommentError::Validation("Invalid parent comment".to_string())),
        }
    }
    Ok(comments_db_operations::insert_comment(conn, new, now)?)
}

/// Groups a chronological list of comments into a forest. Order within each
/// level is kept; replies whose parent is absent are dropped.
pub fn build_comment_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<Comment>> = HashMap::new();
    for comment in comments {
        match comment.parent_id {
            None => roots.push(comment),
            Some(parent_id) => children.entry(parent_id).or_default().push(comment),
        }
    }
    roots.into_iter().map(|root| attach_replies(root, &mut children)).collect()
}

fn attach_replies(comment: Comment, children: &mut HashMap<i64, Vec<Comment>>) -> CommentNode {
    let replies = children
        .remove(&comment.id)
        .unwrap_or_default()
        .into_iter()
        .map(|reply| attach_replies(reply, children))
        .collect();
    CommentNode { comment, replies }
}

/// HTML fragment for HTMX clients. All user text is escaped.
pub fn render_comments_html(tree: &[CommentNode]) -> String {
    if tree.is_empty() {
        return r#"<p class="no-comments">No comments yet. Be the first to comment!</p>"#.to_string();
    }
    let mut html = String::new();
    for node in tree {
        render_comment(&mut html, node, false);
    }
    html
}

fn render_comment(html: &mut String, node: &CommentNode, is_reply: bool) {
    let class = if is_reply { "comment comment-reply" } else { "comment" };
    let _ = write!(
        html,
        r#"<div class="{}" id="comment-{}"><div class="comment-header"><span class="comment-author">{}</span><span class="comment-date">{}</span></div><div class="comment-content">{}</div>"#,
        class,
        node.comment.id,
        html_escape::encode_text(&node.comment.author_name),
        node.comment.created_at.format("%B %-d, %Y at %-I:%M %p"),
        html_escape::encode_text(&node.comment.content).replace('\n', "<br>"),
    );
    for reply in &node.replies {
        render_comment(html, reply, true);
    }
    html.push_str("</div>");
}

pub fn render_submitted_html() -> String {
    r#"<div class="comment-notice comment-success">&#10003; Comment submitted for moderation. It will appear after approval.</div>"#
        .to_string()
}

pub fn render_error_html(message: &str) -> String {
    format!(
        r#"<div class="comment-notice comment-error">&#10007; {}</div>"#,
        html_escape::encode_text(message)
    )
}
