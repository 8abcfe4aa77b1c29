use crate::config::Config;
use crate::helper::comment_helpers;
use crate::helper::form_helpers::is_htmx;
use crate::helper::public_helpers::{self, non_blank};
use crate::models::db_operations::comments_db_operations;
use crate::models::{Breadcrumb, Post};
use crate::routes::{base_context, render, render_with_status};
use crate::{AppState, DbPool};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use std::collections::BTreeSet;
use tera::Tera;

const HOME_POST_COUNT: u32 = 3;

#[derive(Deserialize)]
pub struct BlogQuery {
    category: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    tag: Option<String>,
}

#[derive(Deserialize)]
pub struct ServicesQuery {
    status: Option<String>,
}

pub fn config_pages(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(home))
        .route("/services", web::get().to(services))
        .route("/blog", web::get().to(blog))
        .route("/blog/{id}", web::get().to(blog_post))
        .route("/search", web::get().to(search))
        .route("/about", web::get().to(about));
}

fn server_error(what: &str, e: impl std::fmt::Display) -> HttpResponse {
    log::error!("Failed to load {}: {}", what, e);
    HttpResponse::InternalServerError().body("Internal Server Error")
}

async fn home(tera: web::Data<Tera>, config: web::Data<Config>, pool: web::Data<DbPool>) -> impl Responder {
    let posts = match public_helpers::fetch_latest_posts(&pool, HOME_POST_COUNT) {
        Ok(posts) => posts,
        Err(e) => return server_error("latest posts", e),
    };
    let services = match public_helpers::fetch_services(&pool, None) {
        Ok(services) => services,
        Err(e) => return server_error("services", e),
    };

    let mut ctx = base_context(&config, "home");
    ctx.insert("posts", &posts);
    ctx.insert("services", &services);
    render(&tera, "index.html", &ctx)
}

async fn services(
    req: HttpRequest,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
    query: web::Query<ServicesQuery>,
) -> impl Responder {
    let status = non_blank(&query.status);
    let services = match public_helpers::fetch_services(&pool, status) {
        Ok(services) => services,
        Err(e) => return server_error("services", e),
    };

    let mut ctx = base_context(&config, "services");
    ctx.insert("services", &services);
    ctx.insert("status", &status);
    ctx.insert("breadcrumbs", &[Breadcrumb::new("Home", "/"), Breadcrumb::new("Services", "/services")]);
    if is_htmx(&req) {
        return render(&tera, "partials/services.html", &ctx);
    }
    render(&tera, "services.html", &ctx)
}

fn categories(posts: &[Post]) -> Vec<&str> {
    posts
        .iter()
        .map(|post| post.category.as_str())
        .filter(|category| !category.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn blog(
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
    query: web::Query<BlogQuery>,
) -> impl Responder {
    // Category links are built from every post, not just the filtered page.
    let all_posts = match public_helpers::fetch_posts(&pool, None) {
        Ok(posts) => posts,
        Err(e) => return server_error("posts", e),
    };
    let category = non_blank(&query.category);
    let posts: Vec<&Post> = match category {
        Some(category) => all_posts.iter().filter(|post| post.category == category).collect(),
        None => all_posts.iter().collect(),
    };

    let mut ctx = base_context(&config, "blog");
    ctx.insert("posts", &posts);
    ctx.insert("categories", &categories(&all_posts));
    ctx.insert("category", &category);
    ctx.insert("breadcrumbs", &[Breadcrumb::new("Home", "/"), Breadcrumb::new("Blog", "/blog")]);
    render(&tera, "blog.html", &ctx)
}

async fn blog_post(
    id: web::Path<String>,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    let id = id.into_inner();
    let post = match public_helpers::fetch_post_for_reading(&pool, &id) {
        Ok(Some(post)) => post,
        Ok(None) => return render_not_found(&tera, &config),
        Err(e) => return server_error(&format!("post '{}'", id), e),
    };

    let comments = match pool.get() {
        Ok(conn) => comments_db_operations::read_approved_comments(&conn, &id),
        Err(e) => Err(e.into()),
    };
    let comments_html = match comments {
        Ok(comments) => comment_helpers::render_comments_html(&comment_helpers::build_comment_tree(comments)),
        Err(e) => {
            log::error!("Failed to load comments for post '{}': {}", id, e);
            String::new()
        }
    };

    let mut ctx = base_context(&config, "blog");
    ctx.insert("post", &post);
    ctx.insert("comments_html", &comments_html);
    ctx.insert(
        "breadcrumbs",
        &[
            Breadcrumb::new("Home", "/"),
            Breadcrumb::new("Blog", "/blog"),
            Breadcrumb::new(&post.title, &format!("/blog/{}", post.id)),
        ],
    );
    render(&tera, "post.html", &ctx)
}

async fn search(
    req: HttpRequest,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> impl Responder {
    let q = non_blank(&query.q);
    let tag = non_blank(&query.tag);

    // An empty search page shows the form, not every post.
    let posts = if q.is_none() && tag.is_none() {
        Vec::new()
    } else {
        match public_helpers::search(&pool, q, tag) {
            Ok(posts) => posts,
            Err(e) => return server_error("search results", e),
        }
    };
    let tags = public_helpers::fetch_all_tags(&pool, &state.cache).unwrap_or_else(|e| {
        log::error!("Failed to load tags: {}", e);
        Vec::new()
    });

    let mut ctx = base_context(&config, "search");
    ctx.insert("posts", &posts);
    ctx.insert("query", &q.unwrap_or(""));
    ctx.insert("tag", &tag.unwrap_or(""));
    ctx.insert("tags", &tags);
    ctx.insert("searched", &(q.is_some() || tag.is_some()));
    ctx.insert("breadcrumbs", &[Breadcrumb::new("Home", "/"), Breadcrumb::new("Search", "/search")]);
    if is_htmx(&req) {
        return render(&tera, "partials/search_results.html", &ctx);
    }
    render(&tera, "search.html", &ctx)
}

async fn about(tera: web::Data<Tera>, config: web::Data<Config>) -> impl Responder {
    let mut ctx = base_context(&config, "about");
    ctx.insert("breadcrumbs", &[Breadcrumb::new("Home", "/"), Breadcrumb::new("About", "/about")]);
    render(&tera, "about.html", &ctx)
}

pub fn render_not_found(tera: &Tera, config: &Config) -> HttpResponse {
    let ctx = base_context(config, "");
    render_with_status(tera, "404.html", &ctx, StatusCode::NOT_FOUND)
}

/// Fallback for every unmatched path.
pub async fn not_found(tera: web::Data<Tera>, config: web::Data<Config>) -> impl Responder {
    render_not_found(&tera, &config)
}
