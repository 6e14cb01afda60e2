//! Page cache middleware.
//!
//! Serves stored copies of `GET` responses and records fresh `200 OK`
//! renders. Responses that set cookies are never stored.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use http_body_util::BodyExt;
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::{CacheConfig, METRIC_HIT, METRIC_MISS, METRIC_STORE, PageCache, PageKey};
use super::store::CachedResponse;
use crate::application::error::ErrorReport;

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<dyn PageCache>,
    /// Cookie whose value separates one visitor's pages from another's.
    pub session_cookie: Arc<str>,
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.is_enabled() || request.method() != Method::GET {
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    let session = jar
        .get(&cache.session_cookie)
        .map(|cookie| cookie.value().to_string());
    let key = PageKey::new(request.uri().path(), request.uri().query(), session.as_deref());

    if let Some(cached) = cache.store.get(&key) {
        counter!(METRIC_HIT).increment(1);
        debug!(cache = "page", outcome = "hit", "serving cached page");
        return cached.into_response();
    }

    counter!(METRIC_MISS).increment(1);
    debug!(cache = "page", outcome = "miss", "rendering page");

    let response = next.run(request).await;
    if !should_store_response(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    match BodyExt::collect(body).await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            cache.store.put(
                key,
                CachedResponse::new(parts.status, &parts.headers, bytes.clone()),
            );
            counter!(METRIC_STORE).increment(1);
            debug!(cache = "page", outcome = "store", "stored rendered page");
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(error) => {
            warn!(
                cache = "page",
                error = %error,
                "failed to buffer rendered page"
            );
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_message(
                "cache::middleware::page_cache_layer",
                StatusCode::INTERNAL_SERVER_ERROR,
                error.to_string(),
            )
            .attach(&mut response);
            response
        }
    }
}

fn should_store_response(response: &Response) -> bool {
    response.status() == StatusCode::OK && !response.headers().contains_key(header::SET_COOKIE)
}
