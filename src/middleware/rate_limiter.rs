use crate::clock::Clock;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header::HeaderMap, Method},
    Error, HttpResponse,
};
use chrono::{DateTime, Utc};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests. Please try again later.";

struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

impl Bucket {
    fn refill(&mut self, now: DateTime<Utc>, rate: f64, burst: f64) {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last_refill = now;
    }
}

/// Per-client token bucket: up to `burst` requests at once, refilled
/// continuously at `per_second`.
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Bucket>>,
    per_second: f64,
    burst: f64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(per_second: f64, burst: u32, clock: Arc<dyn Clock>) -> Self {
        RateLimiter {
            buckets: RwLock::new(HashMap::new()),
            per_second,
            burst: f64::from(burst),
            clock,
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Bucket>> {
        self.buckets.write().unwrap_or_else(|poisoned| {
            log::error!("RwLock for rate limit buckets was poisoned! Recovering.");
            poisoned.into_inner()
        })
    }

    /// Spends one token for `client` if one is available.
    pub fn allow(&self, client: &str) -> bool {
        let now = self.clock.now();
        let mut buckets = self.write();
        let bucket = buckets
            .entry(client.to_string())
            .or_insert_with(|| Bucket { tokens: self.burst, last_refill: now });
        bucket.refill(now, self.per_second, self.burst);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Forgets clients whose bucket has refilled completely; they would start
    /// from a full bucket anyway. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let (per_second, burst) = (self.per_second, self.burst);
        let mut buckets = self.write();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            bucket.refill(now, per_second, burst);
            bucket.tokens < burst
        });
        before - buckets.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.write().len()
    }
}

/// Client address as seen through the reverse proxy: the first
/// `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer_addr: Option<SocketAddr>) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("X-Real-IP")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .or_else(|| peer_addr.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware factory. Wrap a resource with it to limit every method, or
/// narrow it with [`RateLimit::only`].
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    methods: Option<Vec<Method>>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        RateLimit { limiter, methods: None }
    }

    pub fn only(mut self, method: Method) -> Self {
        self.methods.get_or_insert_with(Vec::new).push(method);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            methods: self.methods.clone(),
        })
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    methods: Option<Vec<Method>>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let applies = self
            .methods
            .as_ref()
            .map_or(true, |methods| methods.contains(req.method()));

        if applies {
            let client = client_ip(req.headers(), req.peer_addr());
            if !self.limiter.allow(&client) {
                log::warn!("Rate limit exceeded for {} on {}", client, req.path());
                return Box::pin(async move {
                    let (http_req, _payload) = req.into_parts();
                    let res = HttpResponse::TooManyRequests()
                        .content_type("text/plain; charset=utf-8")
                        .body(TOO_MANY_REQUESTS_MESSAGE)
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, res))
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use actix_web::http::header::{HeaderName, HeaderValue};
    use actix_web::{test as actix_test, web, App};
    use chrono::Duration;

    fn limiter(per_second: f64, burst: u32) -> (Arc<MockClock>, RateLimiter) {
        let clock = Arc::new(MockClock::default());
        let limiter = RateLimiter::new(per_second, burst, clock.clone());
        (clock, limiter)
    }

    #[test]
    fn request_past_burst_is_rejected() {
        let (_, limiter) = limiter(5.0, 10);
        for _ in 0..10 {
            assert!(limiter.allow("10.0.0.1"));
        }
        assert!(!limiter.allow("10.0.0.1"));
        // Other clients have their own bucket.
        assert!(limiter.allow("10.0.0.2"));
    }

    #[test]
    fn tokens_refill_fractionally() {
        let (clock, limiter) = limiter(5.0, 2);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));

        clock.advance(Duration::milliseconds(100));
        assert!(!limiter.allow("a"));
        clock.advance(Duration::milliseconds(100));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn refill_never_exceeds_burst() {
        let (clock, limiter) = limiter(5.0, 3);
        limiter.allow("a");
        clock.advance(Duration::hours(1));
        for _ in 0..3 {
            assert!(limiter.allow("a"));
        }
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn idle_buckets_are_evicted() {
        let (clock, limiter) = limiter(1.0, 5);
        limiter.allow("busy");
        limiter.allow("idle");
        clock.advance(Duration::seconds(2));
        limiter.allow("busy");
        limiter.allow("busy");

        assert_eq!(limiter.evict_idle(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn client_ip_prefers_proxy_headers() {
        let peer: Option<SocketAddr> = Some("192.168.1.9:5555".parse().unwrap());
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1"), ("x-real-ip", "198.51.100.2")]), peer),
            "203.0.113.7"
        );
        assert_eq!(client_ip(&headers(&[("x-real-ip", "198.51.100.2")]), peer), "198.51.100.2");
        assert_eq!(client_ip(&HeaderMap::new(), peer), "192.168.1.9");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[actix_web::test]
    async fn middleware_limits_only_selected_methods() {
        let limiter = Arc::new(RateLimiter::new(1.0, 1, Arc::new(MockClock::default())));
        let app = actix_test::init_service(
            App::new().service(
                web::resource("/login")
                    .wrap(RateLimit::new(limiter).only(Method::POST))
                    .route(web::get().to(|| async { HttpResponse::Ok().finish() }))
                    .route(web::post().to(|| async { HttpResponse::Ok().finish() })),
            ),
        )
        .await;

        let post = || actix_test::TestRequest::post().uri("/login").insert_header(("X-Forwarded-For", "203.0.113.7"));
        assert_eq!(actix_test::call_service(&app, post().to_request()).await.status(), 200);
        let limited = actix_test::call_service(&app, post().to_request()).await;
        assert_eq!(limited.status(), 429);
        assert_eq!(actix_test::read_body(limited).await, TOO_MANY_REQUESTS_MESSAGE);

        for _ in 0..3 {
            let res = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/login").to_request()).await;
            assert_eq!(res.status(), 200);
        }
    }
}
