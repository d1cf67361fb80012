// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Security headers middleware.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Headers sent on every response.
const BASE_HEADERS: &[(&str, &str)] = &[
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    (
        "Content-Security-Policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
    ("Referrer-Policy", "no-referrer"),
];

const HSTS: &str = "max-age=31536000; includeSubDomains";

/// Add security headers to all responses.
///
/// Responses carry session and workout data, so nothing is cacheable.
/// HSTS is only sent when the front end itself is served over https.
pub async fn add_security_headers(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    for (name, value) in BASE_HEADERS {
        headers.insert(*name, HeaderValue::from_static(*value));
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    if state.config.frontend_url.starts_with("https://") {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::MemoryBackend;
    use crate::App;
    use axum::body::Body;
    use axum::{routing::get, Router};
    use tower::ServiceExt; // for oneshot

    async fn app_for(frontend_url: &str) -> Router {
        let mut config = Config::test_default();
        config.frontend_url = frontend_url.to_string();
        let app = App::with_backend(config, Arc::new(MemoryBackend::new(false))).await;
        let state = app.state();
        Router::new()
            .route("/", get(|| async { "Hello" }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                add_security_headers,
            ))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_security_headers() {
        let response = app_for("http://localhost:5173")
            .await
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let headers = response.headers();

        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert_eq!(
            headers.get("Content-Security-Policy").unwrap(),
            "default-src 'none'; frame-ancestors 'none'"
        );
        assert_eq!(headers.get("Referrer-Policy").unwrap(), "no-referrer");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert!(headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[tokio::test]
    async fn test_hsts_for_https_frontend() {
        let response = app_for("https://workouts.example.com")
            .await
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::STRICT_TRANSPORT_SECURITY)
                .unwrap(),
            HSTS
        );
    }
}
