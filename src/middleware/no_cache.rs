use axum::extract::Request;
use axum::http::header::{HeaderValue, CACHE_CONTROL};
use axum::middleware::Next;
use axum::response::Response;

/// Admin responses are never cacheable
pub const NO_CACHE: &str = "no-cache, no-store, max-age=1";

/// Middleware that stamps cache-disabling headers on every response
pub async fn no_cache_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    response
}
