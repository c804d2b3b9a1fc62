use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::background::panic_message;
use crate::error::{AppError, ServerErrorDetail};
use crate::metrics::Metrics;
use crate::rate_limiter::ClientRegistry;

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);

    info!(
        target: "greenlight::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    if let Some(ServerErrorDetail(detail)) = response.extensions().get::<ServerErrorDetail>() {
        error!(
            target: "greenlight::middleware",
            request_id = %request_id,
            request_method = %method,
            request_url = %uri,
            error = %detail,
            "Server error"
        );
    }

    info!(
        target: "greenlight::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}

/// Counts requests, responses and total handling time.
pub async fn track_metrics(State(metrics): State<Arc<Metrics>>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    metrics.request_received();

    let response = next.run(request).await;

    metrics.response_sent(start.elapsed());
    response
}

/// Converts a panic anywhere downstream into a 500 and asks the client to
/// close the connection.
pub async fn recover_panic(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(&*panic);
            error!(
                target: "greenlight::middleware",
                request_method = %method,
                request_url = %uri,
                panic = %message,
                "Recovered from panic"
            );

            let mut response = AppError::Internal(message).into_response();
            // Already logged above.
            response.extensions_mut().remove::<ServerErrorDetail>();
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}

/// Per-client rate limiting keyed on the peer address of the connection.
pub async fn rate_limit(
    State(registry): State<Arc<ClientRegistry>>,
    request: Request,
    next: Next,
) -> Response {
    if !registry.enabled() {
        return next.run(request).await;
    }

    let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() else {
        return AppError::internal("unable to determine client address").into_response();
    };

    if !registry.allow(addr.ip()) {
        return AppError::RateLimitExceeded.into_response();
    }

    next.run(request).await
}

fn get_client_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return first_ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit_config::LimiterSettings;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn test_get_client_ip_with_forwarded_header() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("192.168.1.1, 10.0.0.1"));

        assert_eq!(get_client_ip(&request), "192.168.1.1");
    }

    #[test]
    fn test_get_client_ip_with_real_ip_header() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(get_client_ip(&request), "203.0.113.1");
    }

    #[test]
    fn test_get_client_ip_from_connection() {
        let mut request = Request::new(Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 5000))));

        assert_eq!(get_client_ip(&request), "10.1.2.3");
    }

    #[test]
    fn test_get_client_ip_fallback() {
        let request = Request::new(Body::empty());
        assert_eq!(get_client_ip(&request), "unknown");
    }

    #[tokio::test]
    async fn test_panic_becomes_500_with_connection_close() {
        let app = Router::new()
            .route("/", get(|| async {
                panic!("handler blew up");
                #[allow(unreachable_code)]
                ()
            }))
            .layer(middleware::from_fn(recover_panic));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert!(response.extensions().get::<ServerErrorDetail>().is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_without_peer_address_is_server_error() {
        let registry = Arc::new(ClientRegistry::new(LimiterSettings::default()));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(registry, rate_limit));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_rate_limit_disabled_ignores_peer_address() {
        let registry = Arc::new(ClientRegistry::new(LimiterSettings::disabled()));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(registry, rate_limit));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_count_requests() {
        let metrics = Arc::new(Metrics::new());
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(metrics.clone(), track_metrics));

        for _ in 0..3 {
            app.clone()
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests_received, 3);
        assert_eq!(snapshot.total_responses_sent, 3);
    }
}
