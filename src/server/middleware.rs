//! Derivative middleware for `/uploads`.
//!
//! Sits in front of the static file service. Requests with `w`, `q` or
//! `format` parameters are answered with a derivative; everything else,
//! and every derivative that could not be produced, falls through to the
//! static file service.
//!
//! # Responses
//!
//! | Outcome              | Status | Body         | `X-Image-Cache` |
//! |----------------------|--------|--------------|-----------------|
//! | Fresh cache entry    | 200    | derivative   | `HIT`           |
//! | Generated now        | 200    | derivative   | `MISS`          |
//! | No parameters        | static | original     | -               |
//! | Transcoding failed   | static | original     | -               |
//! | Missing or rejected  | 404    | JSON error   | -               |

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::derivative::{normalize_relative, Derivative, DerivativeQuery, Derived, Transform};

use super::handlers::AppState;

/// Header reporting whether a derivative came from the cache.
pub const X_IMAGE_CACHE: HeaderName = HeaderName::from_static("x-image-cache");

/// Serve derivatives for image requests, delegating the rest.
///
/// Must be layered on a router nested at `/uploads` so that the request
/// path is relative to the upload root.
pub async fn derivative_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let relative = match normalize_relative(request.uri().path()) {
        Ok(relative) => relative,
        Err(e) => return e.into_response(),
    };

    // HEAD takes the same path so its headers match GET
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return with_default_cache_control(next.run(request).await, &state);
    }

    // Unparsable query strings are treated as plain static requests
    let query = Query::<DerivativeQuery>::try_from_uri(request.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());

    let derivative_request = match Transform::parse(&relative, &query, accept) {
        Transform::NoTransform => {
            return with_default_cache_control(next.run(request).await, &state);
        }
        Transform::Derive(derivative_request) => derivative_request,
    };

    match state.service.derive(&derivative_request).await {
        Ok(Derived::Hit(derivative)) => derivative_response(derivative, "HIT", &state),
        Ok(Derived::Miss(derivative)) => derivative_response(derivative, "MISS", &state),
        Ok(Derived::Fallback) => {
            debug!(source = %relative, "Serving original after failed transform");
            with_default_cache_control(next.run(request).await, &state)
        }
        Err(e) => e.into_response(),
    }
}

fn derivative_response(derivative: Derivative, cache_status: &str, state: &AppState) -> Response {
    (
        [
            (header::CONTENT_TYPE, derivative.format.content_type().to_string()),
            (header::CACHE_CONTROL, state.cache_control()),
            (X_IMAGE_CACHE, cache_status.to_string()),
        ],
        derivative.data,
    )
        .into_response()
}

/// Add the image `Cache-Control` to successful responses that lack one.
fn with_default_cache_control(mut response: Response, state: &AppState) -> Response {
    if response.status().is_success() && !response.headers().contains_key(header::CACHE_CONTROL) {
        if let Ok(value) = HeaderValue::from_str(&state.cache_control()) {
            response.headers_mut().insert(header::CACHE_CONTROL, value);
        }
    }
    response
}
