//! Access gate: credential screening and quota enforcement middleware.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use super::AppState;
use crate::quota::{Decision, QuotaError};

/// Response header carrying the quota ceiling.
pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
/// Response header carrying the remaining count at decision time.
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
/// Response header carrying the window reset timestamp.
pub const RESET_HEADER: &str = "x-rate-limit-reset";

/// Structural marker a credential envelope must carry to be recognized.
const CREDENTIAL_MARKER: &str = "OAuth oauth_consumer_key";
const CONSUMER_KEY_PARAM: &str = "oauth_consumer_key=\"";

/// Middleware guarding the protected endpoints.
///
/// Screens the request in order: store liveness, credential envelope, quota.
/// Each rejection is terminal and distinct; only admitted requests reach the
/// inner handler. Admitted and quota-rejected responses both carry the
/// rate-limit metadata headers.
pub async fn authorize(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.engine.store_ready().await {
        warn!("Window store not ready, refusing authorization");
        return store_unavailable();
    }

    let Some(client_id) = client_key(request.headers()) else {
        debug!("Request credential missing or malformed");
        return bad_authentication();
    };

    let limit = state.engine.quota().limit;
    match state.engine.evaluate(&client_id, Utc::now().timestamp()).await {
        Ok(decision) if decision.admitted => {
            let mut response = next.run(request).await;
            apply_limit_headers(response.headers_mut(), limit, &decision);
            response
        }
        Ok(decision) => {
            debug!(client_id = %client_id, resets_at = decision.resets_at, "Request over quota");
            rate_limit_exceeded(limit, &decision)
        }
        Err(QuotaError::StoreUnavailable(reason)) => {
            warn!(%reason, "Quota evaluation failed, failing closed");
            store_unavailable()
        }
    }
}

/// Derive the stable per-client key from the request credential.
///
/// The credential must look like an OAuth 1.0a envelope; the value of its
/// `oauth_consumer_key` parameter identifies the client. Returns `None` when
/// the header is absent or carries no parsable key.
pub fn client_key(headers: &HeaderMap) -> Option<String> {
    let authorization = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    if !authorization.contains(CREDENTIAL_MARKER) {
        return None;
    }
    let (_, tail) = authorization.split_once(CONSUMER_KEY_PARAM)?;
    let (key, _) = tail.split_once('"')?;
    if key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

/// Attach the rate-limit metadata headers to a decision-bearing response.
fn apply_limit_headers(headers: &mut HeaderMap, limit: u32, decision: &Decision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.resets_at));
}

fn rate_limit_exceeded(limit: u32, decision: &Decision) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "errors": [{ "code": 88, "message": "Rate limit exceeded" }]
        })),
    )
        .into_response();
    apply_limit_headers(response.headers_mut(), limit, decision);
    response
}

pub(super) fn bad_authentication() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "errors": [{ "message": "Bad Authentication data", "code": 215 }]
        })),
    )
        .into_response()
}

pub(super) fn store_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "service_unavailable",
            "reason": "authentication_unavailable"
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_authorization(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_client_key_from_oauth_envelope() {
        let headers = headers_with_authorization(
            "OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", \
             oauth_nonce=\"kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\"",
        );

        assert_eq!(
            client_key(&headers).as_deref(),
            Some("xvz1evFS4wEEPTGEFPHBog")
        );
    }

    #[test]
    fn test_client_key_missing_header() {
        assert_eq!(client_key(&HeaderMap::new()), None);
    }

    #[test]
    fn test_client_key_wrong_scheme() {
        let headers = headers_with_authorization("Bearer AAAA.BBBB.CCCC");
        assert_eq!(client_key(&headers), None);
    }

    #[test]
    fn test_client_key_unquoted_value_is_malformed() {
        let headers = headers_with_authorization("OAuth oauth_consumer_key=raw-value");
        assert_eq!(client_key(&headers), None);
    }

    #[test]
    fn test_client_key_empty_value_is_malformed() {
        let headers = headers_with_authorization("OAuth oauth_consumer_key=\"\"");
        assert_eq!(client_key(&headers), None);
    }
}
