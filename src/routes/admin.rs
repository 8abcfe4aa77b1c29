use crate::config::Config;
use crate::helper::admin_helpers::{self, AdminHelperError};
use crate::helper::public_helpers;
use crate::middleware::{AdminSession, RateLimit, RateLimiter, LOGIN_PATH, SESSION_COOKIE};
use crate::models::{PendingComment, Post, Service};
use crate::routes::{base_context, json_error, render};
use crate::{AppState, DbPool};
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_csrf::CsrfMiddleware;
use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::http::{Method, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use rand::prelude::StdRng;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tera::Tera;

const DASHBOARD_PATH: &str = "/admin";
const PLAIN_HTTP_CSRF_COOKIE: &str = "Csrf-Token";

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    username: String,
    password: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
pub struct LoginQuery {
    error: Option<String>,
}

/// The default `__Host-` cookie is always `Secure`, which browsers drop on
/// plain-http deployments; those get an unprefixed, non-secure cookie. The
/// login extractor finds the cookie through the scope's `cookie_config()`.
fn csrf_middleware(config: &Config) -> CsrfMiddleware<StdRng> {
    let csrf = CsrfMiddleware::<StdRng>::new().set_cookie(Method::GET, LOGIN_PATH);
    if config.use_secure_cookies {
        csrf
    } else {
        csrf.cookie_name(PLAIN_HTTP_CSRF_COOKIE).secure(false)
    }
}

/// HTML admin pages: login, logout and the dashboard.
pub fn config_pages(cfg: &mut web::ServiceConfig, config: &Config, limiter: Arc<RateLimiter>) {
    let csrf = csrf_middleware(config);
    cfg.service(
        web::scope("/admin")
            .app_data(csrf.cookie_config())
            .wrap(csrf)
            .service(
                web::resource("/login")
                    .wrap(RateLimit::new(limiter).only(Method::POST))
                    .route(web::get().to(show_login_form))
                    .route(web::post().to(handle_login)),
            )
            .route("/logout", web::get().to(handle_logout))
            .route("/logout", web::post().to(handle_logout))
            .route("", web::get().to(show_dashboard)),
    );
}

/// Authenticated JSON endpoints, mounted under `/api`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts", web::post().to(save_post_action))
        .route("/posts/{id}", web::delete().to(delete_post_action))
        .route("/services", web::post().to(save_service_action))
        .route("/services/{name}", web::delete().to(delete_service_action))
        .route("/admin/comments/pending", web::get().to(pending_comments))
        .route("/admin/comments/{id}/approve", web::post().to(approve_comment_action))
        .route("/admin/comments/{id}", web::delete().to(delete_comment_action));
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found().append_header(("location", location)).finish()
}

fn session_cookie(token: &str, config: &Config, ttl: chrono::Duration) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .secure(config.use_secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .finish()
}

async fn show_login_form(
    req: HttpRequest,
    tera: web::Data<Tera>,
    token: CsrfToken,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    query: web::Query<LoginQuery>,
) -> impl Responder {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if state.sessions.validate_and_refresh(cookie.value()) {
            return redirect(DASHBOARD_PATH);
        }
    }

    let mut ctx = base_context(&config, "admin");
    ctx.insert("csrf_token", token.get());
    if query.error.as_deref() == Some("invalid") {
        ctx.insert("error", "Invalid username or password.");
    }
    render(&tera, "admin/login.html", &ctx)
}

async fn handle_login(
    req: HttpRequest,
    form: Csrf<web::Form<LoginForm>>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
) -> impl Responder {
    let login_data = form.into_inner().into_inner();

    if !state.credentials.verify(&login_data.username, &login_data.password) {
        let client = crate::middleware::rate_limiter::client_ip(req.headers(), req.peer_addr());
        log::warn!("Failed admin login for '{}' from {}", login_data.username, client);
        return redirect(&format!("{}?error=invalid", LOGIN_PATH));
    }

    let (token, _expires_at) = state.sessions.create();
    log::info!("Admin '{}' logged in", login_data.username);
    HttpResponse::Found()
        .append_header(("location", DASHBOARD_PATH))
        .cookie(session_cookie(&token, &config, state.sessions.ttl()))
        .finish()
}

async fn handle_logout(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        state.sessions.delete(cookie.value());
    }
    let mut removal = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    removal.make_removal();
    HttpResponse::Found().append_header(("location", "/")).cookie(removal).finish()
}

async fn show_dashboard(
    _admin: AdminSession,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    let posts = public_helpers::fetch_posts(&pool, None);
    let services = public_helpers::fetch_services(&pool, None);
    let pending = admin_helpers::fetch_pending_comments(&pool);

    let (posts, services, pending) = match (posts, services, pending) {
        (Ok(posts), Ok(services), Ok(pending)) => (posts, services, pending),
        (posts, services, pending) => {
            let errors = [
                posts.err().map(|e| e.to_string()),
                services.err().map(|e| e.to_string()),
                pending.err().map(|e| e.to_string()),
            ];
            log::error!("Failed to load admin dashboard: {:?}", errors);
            return HttpResponse::InternalServerError().body("Failed to load dashboard");
        }
    };
    let pending: Vec<PendingComment> = pending
        .iter()
        .map(|comment| PendingComment { comment, author_email: &comment.author_email })
        .collect();

    let mut ctx = base_context(&config, "admin");
    ctx.insert("posts", &posts);
    ctx.insert("services", &services);
    ctx.insert("pending_comments", &pending);
    render(&tera, "admin/dashboard.html", &ctx)
}

fn admin_error_response(action: &str, e: AdminHelperError) -> HttpResponse {
    match e {
        AdminHelperError::Validation(message) => json_error(StatusCode::BAD_REQUEST, &message),
        AdminHelperError::NotFound(what) => json_error(StatusCode::NOT_FOUND, &format!("Not found: {}", what)),
        other => {
            log::error!("Failed to {}: {}", action, other);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

async fn save_post_action(
    _admin: AdminSession,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> impl Responder {
    let post: Post = match serde_json::from_slice(&body) {
        Ok(post) => post,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {}", e)),
    };
    match admin_helpers::save_post(&pool, &state.cache, &post) {
        Ok(stored) => HttpResponse::Ok().json(json!({ "success": true, "post": stored })),
        Err(e) => admin_error_response("save post", e),
    }
}

async fn delete_post_action(
    _admin: AdminSession,
    id: web::Path<String>,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
) -> impl Responder {
    match admin_helpers::delete_post(&pool, &state.cache, &id) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true })),
        Err(e) => admin_error_response("delete post", e),
    }
}

async fn save_service_action(_admin: AdminSession, pool: web::Data<DbPool>, body: web::Bytes) -> impl Responder {
    let service: Service = match serde_json::from_slice(&body) {
        Ok(service) => service,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {}", e)),
    };
    match admin_helpers::save_service(&pool, &service) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true, "service": service })),
        Err(e) => admin_error_response("save service", e),
    }
}

async fn delete_service_action(_admin: AdminSession, name: web::Path<String>, pool: web::Data<DbPool>) -> impl Responder {
    match admin_helpers::delete_service(&pool, &name) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true })),
        Err(e) => admin_error_response("delete service", e),
    }
}

async fn pending_comments(_admin: AdminSession, pool: web::Data<DbPool>) -> impl Responder {
    match admin_helpers::fetch_pending_comments(&pool) {
        Ok(comments) => {
            let pending: Vec<PendingComment> = comments
                .iter()
                .map(|comment| PendingComment { comment, author_email: &comment.author_email })
                .collect();
            HttpResponse::Ok().json(json!({ "comments": pending }))
        }
        Err(e) => admin_error_response("load pending comments", e),
    }
}

fn parse_comment_id(raw: &str) -> Result<i64, HttpResponse> {
    raw.parse::<i64>()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "Invalid comment ID"))
}

async fn approve_comment_action(_admin: AdminSession, id: web::Path<String>, pool: web::Data<DbPool>) -> impl Responder {
    let id = match parse_comment_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match admin_helpers::approve_comment(&pool, id) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true, "message": "Comment approved" })),
        Err(e) => admin_error_response("approve comment", e),
    }
}

async fn delete_comment_action(_admin: AdminSession, id: web::Path<String>, pool: web::Data<DbPool>) -> impl Responder {
    let id = match parse_comment_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match admin_helpers::delete_comment(&pool, id) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true, "message": "Comment deleted" })),
        Err(e) => admin_error_response("delete comment", e),
    }
}
