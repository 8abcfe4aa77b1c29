use crate::config::Config;
use crate::helper::form_helpers::is_htmx;
use crate::helper::public_helpers::{self, non_blank};
use crate::routes::{base_context, json_error, render};
use crate::{AppState, DbPool};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use tera::Tera;

#[derive(Deserialize)]
pub struct CategoryQuery {
    category: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    status: Option<String>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    tag: Option<String>,
}

/// Read-only JSON endpoints, mounted under `/api`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts", web::get().to(get_posts))
        // Registered ahead of `/posts/{id}`, which would otherwise capture it.
        .route("/posts/popular", web::get().to(get_popular_posts))
        .route("/posts/{id}", web::get().to(get_post_by_id))
        .route("/services", web::get().to(get_services))
        .route("/search", web::get().to(search_posts))
        .route("/tags", web::get().to(get_tags));
}

async fn get_posts(pool: web::Data<DbPool>, query: web::Query<CategoryQuery>) -> impl Responder {
    let category = non_blank(&query.category);
    match public_helpers::fetch_posts(&pool, category) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => {
            log::error!("Failed to fetch posts (category {:?}): {}", category, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

const DEFAULT_POPULAR_LIMIT: u32 = 5;
const MAX_POPULAR_LIMIT: u32 = 50;

async fn get_popular_posts(pool: web::Data<DbPool>, query: web::Query<LimitQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_POPULAR_LIMIT).clamp(1, MAX_POPULAR_LIMIT);
    match public_helpers::fetch_popular_posts(&pool, limit) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => {
            log::error!("Failed to fetch popular posts: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_post_by_id(id: web::Path<String>, pool: web::Data<DbPool>) -> impl Responder {
    match public_helpers::fetch_post(&pool, &id) {
        Ok(Some(post)) => HttpResponse::Ok().json(post),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => {
            log::error!("Failed to fetch post '{}': {}", id, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_services(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    query: web::Query<StatusQuery>,
) -> impl Responder {
    let status = non_blank(&query.status);
    let services = match public_helpers::fetch_services(&pool, status) {
        Ok(services) => services,
        Err(e) => {
            log::error!("Failed to fetch services (status {:?}): {}", status, e);
            return HttpResponse::InternalServerError().finish();
        }
    };

    if is_htmx(&req) {
        let mut ctx = base_context(&config, "services");
        ctx.insert("services", &services);
        ctx.insert("status", &status);
        return render(&tera, "partials/services.html", &ctx);
    }
    HttpResponse::Ok().json(services)
}

async fn search_posts(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    query: web::Query<SearchQuery>,
) -> impl Responder {
    let q = non_blank(&query.q);
    let tag = non_blank(&query.tag);
    let posts = match public_helpers::search(&pool, q, tag) {
        Ok(posts) => posts,
        Err(e) => {
            log::error!("Search failed (q {:?}, tag {:?}): {}", q, tag, e);
            return HttpResponse::InternalServerError().finish();
        }
    };

    if is_htmx(&req) {
        let mut ctx = base_context(&config, "search");
        ctx.insert("posts", &posts);
        ctx.insert("query", &q.unwrap_or(""));
        ctx.insert("tag", &tag.unwrap_or(""));
        ctx.insert("searched", &true);
        return render(&tera, "partials/search_results.html", &ctx);
    }
    HttpResponse::Ok().json(json!({
        "posts": posts,
        "query": q.unwrap_or(""),
        "tag": tag.unwrap_or(""),
    }))
}

async fn get_tags(pool: web::Data<DbPool>, state: web::Data<AppState>) -> impl Responder {
    match public_helpers::fetch_all_tags(&pool, &state.cache) {
        Ok(tags) => HttpResponse::Ok().json(json!({ "tags": tags })),
        Err(e) => {
            log::error!("Failed to fetch tags: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
