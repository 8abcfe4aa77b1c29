use crate::helper::comment_helpers::{self, CommentError};
use crate::helper::form_helpers::{is_htmx, parse_form};
use crate::middleware::{RateLimit, RateLimiter};
use crate::models::db_operations::{comments_db_operations, DbError};
use crate::models::Comment;
use crate::routes::json_error;
use crate::{AppState, DbPool};
use actix_web::http::{Method, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde_json::json;
use std::sync::Arc;

/// Public comment endpoints, mounted under `/api`. Submissions are rate limited.
pub fn config_api(cfg: &mut web::ServiceConfig, limiter: Arc<RateLimiter>) {
    cfg.service(
        web::resource("/posts/{id}/comments")
            .wrap(RateLimit::new(limiter).only(Method::POST))
            .route(web::get().to(get_comments))
            .route(web::post().to(post_comment)),
    );
}

fn load_comments(pool: &DbPool, post_id: &str) -> Result<(Vec<Comment>, i64), DbError> {
    let conn = pool.get()?;
    let comments = comments_db_operations::read_approved_comments(&conn, post_id)?;
    let count = comments_db_operations::count_approved_comments(&conn, post_id)?;
    Ok((comments, count))
}

async fn get_comments(req: HttpRequest, id: web::Path<String>, pool: web::Data<DbPool>) -> impl Responder {
    let post_id = id.into_inner();
    let (comments, count) = match load_comments(&pool, &post_id) {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("Error getting comments for post {}: {}", post_id, e);
            return HttpResponse::InternalServerError().body("Failed to retrieve comments");
        }
    };

    let tree = comment_helpers::build_comment_tree(comments);
    if is_htmx(&req) {
        return HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(comment_helpers::render_comments_html(&tree));
    }
    HttpResponse::Ok().json(json!({ "comments": tree, "count": count }))
}

fn comment_error_response(htmx: bool, status: StatusCode, message: &str) -> HttpResponse {
    if htmx {
        HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(comment_helpers::render_error_html(message))
    } else {
        json_error(status, message)
    }
}

async fn post_comment(
    req: HttpRequest,
    id: web::Path<String>,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> impl Responder {
    let htmx = is_htmx(&req);
    let post_id = id.into_inner();

    let fields = match parse_form(&body) {
        Ok(fields) => fields,
        Err(_) => return comment_error_response(htmx, StatusCode::BAD_REQUEST, "Invalid form data"),
    };
    let new_comment = match comment_helpers::validate_new_comment(&post_id, &fields) {
        Ok(new_comment) => new_comment,
        Err(e) => return comment_error_response(htmx, StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for comment on '{}': {}", post_id, e);
            return comment_error_response(htmx, StatusCode::INTERNAL_SERVER_ERROR, "Failed to save comment");
        }
    };

    match comment_helpers::submit_comment(&conn, &new_comment, state.clock.now()) {
        Ok(comment) => {
            log::info!("New comment {} on post '{}' awaiting moderation", comment.id, post_id);
            if htmx {
                HttpResponse::Created()
                    .content_type("text/html; charset=utf-8")
                    .body(comment_helpers::render_submitted_html())
            } else {
                HttpResponse::Created().json(json!({
                    "success": true,
                    "message": "Comment submitted for moderation",
                    "comment": comment,
                }))
            }
        }
        Err(CommentError::PostNotFound) => comment_error_response(htmx, StatusCode::NOT_FOUND, "Post not found"),
        Err(CommentError::Validation(message)) => comment_error_response(htmx, StatusCode::BAD_REQUEST, &message),
        Err(CommentError::Db(e)) => {
            log::error!("Error saving comment on '{}': {}", post_id, e);
            comment_error_response(htmx, StatusCode::INTERNAL_SERVER_ERROR, "Failed to save comment")
        }
    }
}
