//! HTTP server wiring and lifecycle.

use std::net::SocketAddr;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tracing::{error, info};

use super::{gate, handlers, AppState};
use crate::error::{Result, TollgateError};
use crate::quota::QuotaEngine;

/// HTTP server for the gateway.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared handler state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server around a quota engine.
    pub fn new(addr: SocketAddr, engine: QuotaEngine) -> Self {
        Self {
            addr,
            state: AppState { engine },
        }
    }

    /// Build the router, with the access gate layered over the protected
    /// routes only. The status and health endpoints perform their own
    /// screening so they never consume quota.
    fn router(&self) -> Router {
        let protected = Router::new()
            .route("/1.1/search/tweets.json", get(handlers::search))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                gate::authorize,
            ));

        Router::new()
            .merge(protected)
            .route(
                "/1.1/application/rate_limit_status.json",
                get(handlers::rate_limit_status),
            )
            .route("/health", get(handlers::health))
            .with_state(self.state.clone())
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server runs until the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TollgateError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuotaConfig;
    use crate::quota::WindowRecord;
    use crate::store::{MemoryWindowStore, StoreError, WindowStore};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    const AUTHORIZATION: &str =
        "OAuth oauth_consumer_key=\"test-consumer-key\", oauth_signature=\"sig\"";

    struct UnreachableStore;

    #[async_trait]
    impl WindowStore for UnreachableStore {
        async fn load(
            &self,
            _client_id: &str,
        ) -> std::result::Result<Option<WindowRecord>, StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }

        async fn store(
            &self,
            _client_id: &str,
            _record: &WindowRecord,
        ) -> std::result::Result<(), StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }

        async fn is_ready(&self) -> bool {
            false
        }
    }

    fn router_with(store: Arc<dyn WindowStore>, limit: u32) -> Router {
        let engine = QuotaEngine::new(
            store,
            QuotaConfig {
                limit,
                window_secs: 900,
            },
        );
        HttpServer::new("127.0.0.1:0".parse().unwrap(), engine).router()
    }

    fn get_request(uri: &str, authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credential_is_rejected_before_quota() {
        let store = Arc::new(MemoryWindowStore::new());
        let app = router_with(store.clone(), 5);

        let response = app
            .oneshot(get_request("/1.1/search/tweets.json?q=rust", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["errors"][0]["code"], 215);
        assert_eq!(body["errors"][0]["message"], "Bad Authentication data");
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_credential_is_rejected() {
        let app = router_with(Arc::new(MemoryWindowStore::new()), 5);

        let response = app
            .oneshot(get_request(
                "/1.1/search/tweets.json?q=rust",
                Some("Bearer not-an-oauth-envelope"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admitted_request_carries_limit_headers() {
        let app = router_with(Arc::new(MemoryWindowStore::new()), 5);

        let response = app
            .oneshot(get_request(
                "/1.1/search/tweets.json?q=rust",
                Some(AUTHORIZATION),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[gate::LIMIT_HEADER], "5");
        assert_eq!(headers[gate::REMAINING_HEADER], "4");
        let reset: i64 = headers[gate::RESET_HEADER].to_str().unwrap().parse().unwrap();
        assert!(reset > 0);

        let body = json_body(response).await;
        assert_eq!(body["search_metadata"]["query"], "rust");
    }

    #[tokio::test]
    async fn test_exhausted_quota_returns_429_with_metadata() {
        let app = router_with(Arc::new(MemoryWindowStore::new()), 1);

        let admitted = app
            .clone()
            .oneshot(get_request(
                "/1.1/search/tweets.json?q=rust",
                Some(AUTHORIZATION),
            ))
            .await
            .unwrap();
        assert_eq!(admitted.status(), StatusCode::OK);

        let rejected = app
            .oneshot(get_request(
                "/1.1/search/tweets.json?q=rust",
                Some(AUTHORIZATION),
            ))
            .await
            .unwrap();

        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rejected.headers()[gate::REMAINING_HEADER], "0");
        let body = json_body(rejected).await;
        assert_eq!(body["errors"][0]["code"], 88);
        assert_eq!(body["errors"][0]["message"], "Rate limit exceeded");
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_valid_credential() {
        let app = router_with(Arc::new(UnreachableStore), 5);

        let response = app
            .oneshot(get_request(
                "/1.1/search/tweets.json?q=rust",
                Some(AUTHORIZATION),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"], "service_unavailable");
        assert_eq!(body["reason"], "authentication_unavailable");
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_missing_credential_too() {
        let app = router_with(Arc::new(UnreachableStore), 5);

        let response = app
            .oneshot(get_request("/1.1/search/tweets.json?q=rust", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_endpoint_reports_without_consuming() {
        let store = Arc::new(MemoryWindowStore::new());
        let app = router_with(store.clone(), 5);
        let status_uri = "/1.1/application/rate_limit_status.json";

        let first = app
            .clone()
            .oneshot(get_request(status_uri, Some(AUTHORIZATION)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let body = json_body(first).await;
        assert_eq!(body["limit"], 5);
        assert_eq!(body["remaining"], 5);
        assert_eq!(store.record_count(), 0);

        app.clone()
            .oneshot(get_request(
                "/1.1/search/tweets.json?q=rust",
                Some(AUTHORIZATION),
            ))
            .await
            .unwrap();

        let second = app
            .oneshot(get_request(status_uri, Some(AUTHORIZATION)))
            .await
            .unwrap();
        let body = json_body(second).await;
        assert_eq!(body["remaining"], 4);
    }

    #[tokio::test]
    async fn test_status_endpoint_requires_credential() {
        let app = router_with(Arc::new(MemoryWindowStore::new()), 5);

        let response = app
            .oneshot(get_request("/1.1/application/rate_limit_status.json", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_store_readiness() {
        let app = router_with(Arc::new(MemoryWindowStore::new()), 5);

        let response = app.oneshot(get_request("/health", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store_ready"], true);
    }
}
