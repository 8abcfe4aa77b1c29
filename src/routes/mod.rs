use crate::config::Config;
use crate::middleware::RateLimiter;
use actix_cors::Cors;
use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use tera::{Context, Tera};

pub mod admin;
pub mod comments;
pub mod feed;
pub mod pages;
pub mod public;

/// Registers every route of the site. `limiter` guards the login and
/// comment submission endpoints.
pub fn config_routes(cfg: &mut web::ServiceConfig, config: &Config, limiter: Arc<RateLimiter>) {
    let comment_limiter = limiter.clone();
    cfg.route("/health", web::get().to(health))
        .service(
            web::scope("/api")
                .wrap(api_cors(config))
                .configure(public::config_api)
                .configure(move |cfg| comments::config_api(cfg, comment_limiter))
                .configure(admin::config_api),
        )
        .configure(feed::config_feeds)
        .configure(move |cfg| admin::config_pages(cfg, config, limiter))
        .configure(pages::config_pages)
        .default_service(web::route().to(pages::not_found));
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "healthy" }))
}

/// Normalises a configured origin to `scheme://host[:port]`, dropping
/// anything that is not an http(s) URL.
fn normalise_origin(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(parsed.origin().ascii_serialization()),
        _ => None,
    }
}

/// CORS for the JSON API. The site's own origin is always allowed so that
/// its htmx requests pass; `ALLOWED_ORIGINS` adds more, or `*` opens it up.
pub fn api_cors(config: &Config) -> Cors {
    let methods = vec!["GET", "POST", "DELETE"];
    let headers = vec![header::ACCEPT, header::CONTENT_TYPE];

    if config.allowed_origins.trim() == "*" {
        return Cors::default()
            .allow_any_origin()
            .allowed_methods(methods)
            .allowed_headers(headers)
            .max_age(3600);
    }

    let mut cors = Cors::default();
    let configured = config.allowed_origins.split(',').filter(|s| !s.trim().is_empty());
    for raw in std::iter::once(config.site.url.as_str()).chain(configured) {
        match normalise_origin(raw) {
            Some(origin) => cors = cors.allowed_origin(&origin),
            None => log::warn!("Ignoring invalid CORS origin '{}'", raw),
        }
    }
    cors.allowed_methods(methods)
        .allowed_headers(headers)
        .allowed_header("HX-Request")
        .allowed_header("HX-Current-URL")
        .allowed_header("HX-Target")
        .allowed_header("HX-Trigger")
        .supports_credentials()
        .max_age(3600)
}

/// Fields every page template expects.
pub fn base_context(config: &Config, active: &str) -> Context {
    let mut ctx = Context::new();
    ctx.insert("site", &config.site);
    ctx.insert("base_url", config.site_base_url());
    ctx.insert("active", active);
    ctx.insert("current_year", &chrono::Utc::now().format("%Y").to_string());
    ctx
}

pub fn render(tera: &Tera, template: &str, ctx: &Context) -> HttpResponse {
    render_with_status(tera, template, ctx, StatusCode::OK)
}

pub fn render_with_status(tera: &Tera, template: &str, ctx: &Context, status: StatusCode) -> HttpResponse {
    match tera.render(template, ctx) {
        Ok(rendered) => HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(rendered),
        Err(e) => {
            log::error!("Failed to render template '{}': {:?}", template, e);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

pub fn json_error(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_normalised() {
        assert_eq!(normalise_origin("https://lab.example.org/blog/"), Some("https://lab.example.org".to_string()));
        assert_eq!(normalise_origin(" http://localhost:8082 "), Some("http://localhost:8082".to_string()));
        assert_eq!(normalise_origin("ftp://files.example.org"), None);
        assert_eq!(normalise_origin("not a url"), None);
    }
}
