use crate::config::Config;
use crate::helper::feed_helpers::{self, FeedFormat};
use crate::{AppState, DbPool};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use tera::Tera;

/// `/rss` and `/feed` serve RSS 2.0 unless the client asks for Atom; `/atom` is always Atom.
pub fn config_feeds(cfg: &mut web::ServiceConfig) {
    cfg.route("/rss", web::get().to(serve_feed))
        .route("/feed", web::get().to(serve_feed))
        .route("/atom", web::get().to(serve_feed));
}

async fn serve_feed(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
) -> impl Responder {
    let accept = req.headers().get(header::ACCEPT).and_then(|value| value.to_str().ok());
    let format = FeedFormat::negotiate(req.path(), accept);

    match feed_helpers::cached_feed(&pool, &state.cache, &tera, &config, format, state.clock.now()) {
        Ok(body) => HttpResponse::Ok().content_type(format.content_type()).body(body),
        Err(e) => {
            log::error!("Failed to build {:?} feed: {}", format, e);
            HttpResponse::InternalServerError().body("Failed to generate feed")
        }
    }
}
