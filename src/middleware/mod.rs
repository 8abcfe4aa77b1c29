use actix_web::{dev, http::StatusCode, web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use std::fmt;
use std::future::{ready, Ready};

use crate::AppState;

pub mod rate_limiter;
pub mod session_store;

pub use rate_limiter::{RateLimit, RateLimiter};
pub use session_store::{AdminCredentials, SessionStore, SESSION_COOKIE};

pub const LOGIN_PATH: &str = "/admin/login";

/// Rejection for requests without a live admin session. Renders as a
/// redirect to the login page instead of an error body.
#[derive(Debug)]
pub struct AuthRedirect;

impl fmt::Display for AuthRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "admin session required")
    }
}

impl ResponseError for AuthRedirect {
    fn status_code(&self) -> StatusCode {
        StatusCode::FOUND
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Found().append_header(("location", LOGIN_PATH)).finish()
    }
}

/// Present in a handler's arguments only when the request carries a valid
/// `session_token` cookie. Each successful extraction refreshes the session.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub token: String,
}

impl FromRequest for AdminSession {
    type Error = AuthRedirect;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let state = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state,
            None => {
                log::error!("AppState missing from app data; rejecting admin request.");
                return ready(Err(AuthRedirect));
            }
        };

        match req.cookie(SESSION_COOKIE) {
            Some(cookie) if state.sessions.validate_and_refresh(cookie.value()) => {
                ready(Ok(AdminSession { token: cookie.value().to_string() }))
            }
            _ => ready(Err(AuthRedirect)),
        }
    }
}
