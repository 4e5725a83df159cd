//! Guard middleware for axum
//!
//! Picks the guard for the request method and checks client IP, path and
//! token before the request reaches a handler. Tokens come from the `jwt`
//! query parameter or an `Authorization: Bearer` header.

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::common::normalize_path;
use crate::security::guard::GuardSet;

/// Token presented with a request, if any
pub fn extract_token(request: &Request<Body>) -> Option<String> {
    if let Ok(Query(params)) = Query::<HashMap<String, String>>::try_from_uri(request.uri()) {
        if let Some(token) = params.get("jwt").filter(|t| !t.is_empty()) {
            return Some(token.clone());
        }
    }

    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim().to_string())
    } else {
        None
    }
}

/// Reject requests the guard for their method does not permit
pub async fn guard_middleware(
    State(guards): State<Arc<GuardSet>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_ip = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let path = normalize_path(&percent_decode_str(request.uri().path()).decode_utf8_lossy());
    let token = extract_token(&request);

    match guards.authorize(request.method(), client_ip, &path, token.as_deref()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!(
                method = %request.method(),
                path = %path,
                "Request rejected: {}",
                e
            );
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Unauthorized",
                    "message": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_token_from_query() {
        let req = request("/a.txt?jwt=abc.def.ghi", None);
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_token_from_bearer_header() {
        let req = request("/a.txt", Some("BEARER abc.def.ghi"));
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def.ghi"));

        let req = request("/a.txt", Some("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_token(&req), None);
    }

    #[test]
    fn test_no_token() {
        assert_eq!(extract_token(&request("/a.txt?x=1", None)), None);
    }
}
