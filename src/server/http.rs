//! HTTP API of the filer core
//!
//! Routes:
//! - `GET /status`: current master, backend and server settings
//! - `/admin/mv?from=&to=`: move a file or directory (embedded backend only)
//! - `/admin/register?path=&fileId=`: map a path to an existing file id
//!   (embedded backend only)
//!
//! Admin parameters come from a urlencoded form body or the query string;
//! the body wins when both carry a value.
//!
//! Every route sits behind the guard for its HTTP method.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::Error;
use crate::filer::MetadataBackend;
use crate::master::MasterCell;
use crate::security::{guard_middleware, EncodedJwt, GuardSet, TokenIssuer};

/// Shared state for filer handlers
#[derive(Clone)]
pub struct FilerState {
    pub master: MasterCell,
    pub backend: MetadataBackend,
    pub tokens: TokenIssuer,
    pub collection: String,
    pub default_replication: String,
    pub redirect_on_read: bool,
    pub disable_dir_listing: bool,
    pub max_mb: u32,
}

impl FilerState {
    /// Current master, for proxying requests that must go through it
    pub fn master_node(&self) -> String {
        self.master.get()
    }

    /// Token granting access to `fid` on volume servers
    pub fn jwt(&self, fid: &str) -> crate::Result<EncodedJwt> {
        self.tokens.issue(fid)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (
            self.to_http_status(),
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Build the router; admin routes only exist for the embedded backend
pub fn create_router(state: FilerState, guards: Arc<GuardSet>) -> Router {
    let body_limit = (state.max_mb.max(1) as usize) * 1024 * 1024;

    let mut router = Router::new().route("/status", get(status));
    if state.backend.supports_admin() {
        router = router
            .route("/admin/mv", get(move_handler).post(move_handler))
            .route("/admin/register", get(register_handler).post(register_handler));
    }

    router
        .layer(middleware::from_fn_with_state(guards, guard_middleware))
        .layer(middleware::from_fn(request_tracing_middleware))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status(State(state): State<FilerState>) -> impl IntoResponse {
    Json(json!({
        "version": crate::VERSION,
        "master": state.master_node(),
        "backend": state.backend.kind().to_string(),
        "admin": state.backend.supports_admin(),
        "collection": state.collection,
        "replication": state.default_replication,
        "redirect_on_read": state.redirect_on_read,
        "disable_dir_listing": state.disable_dir_listing,
        "max_mb": state.max_mb,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct MoveParams {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
}

impl MoveParams {
    fn merge(form: Option<Form<Self>>, query: Self) -> Self {
        let form = form.map(|Form(f)| f).unwrap_or_default();
        Self {
            from: first_non_empty(form.from, query.from),
            to: first_non_empty(form.to, query.to),
        }
    }
}

fn first_non_empty(primary: String, fallback: String) -> String {
    if primary.is_empty() {
        fallback
    } else {
        primary
    }
}

async fn move_handler(
    State(state): State<FilerState>,
    Query(query): Query<MoveParams>,
    form: Option<Form<MoveParams>>,
) -> Response {
    let params = MoveParams::merge(form, query);
    if params.from.is_empty() || params.to.is_empty() {
        return Error::InvalidPath("both 'from' and 'to' are required".into()).into_response();
    }
    match state.backend.filer().move_path(&params.from, &params.to).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::debug!("moving {} -> {}: {}", params.from, params.to, e);
            e.into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RegisterParams {
    #[serde(default)]
    path: String,
    #[serde(default, rename = "fileId")]
    file_id: String,
}

impl RegisterParams {
    fn merge(form: Option<Form<Self>>, query: Self) -> Self {
        let form = form.map(|Form(f)| f).unwrap_or_default();
        Self {
            path: first_non_empty(form.path, query.path),
            file_id: first_non_empty(form.file_id, query.file_id),
        }
    }
}

async fn register_handler(
    State(state): State<FilerState>,
    Query(query): Query<RegisterParams>,
    form: Option<Form<RegisterParams>>,
) -> Response {
    let params = RegisterParams::merge(form, query);
    if params.path.is_empty() || params.file_id.is_empty() {
        return Error::InvalidPath("both 'path' and 'fileId' are required".into()).into_response();
    }
    match state
        .backend
        .filer()
        .create_file(&params.path, &params.file_id)
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::debug!("registering {} -> {}: {}", params.path, params.file_id, e);
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filer::EmbeddedFiler;
    use crate::security::verify_token;
    use tempfile::TempDir;

    fn state(dir: &TempDir, secret: &str) -> FilerState {
        FilerState {
            master: MasterCell::new("m1:9333"),
            backend: MetadataBackend::Embedded(Arc::new(
                EmbeddedFiler::open(dir.path()).unwrap(),
            )),
            tokens: TokenIssuer::new(secret),
            collection: String::new(),
            default_replication: String::new(),
            redirect_on_read: true,
            disable_dir_listing: false,
            max_mb: 32,
        }
    }

    #[test]
    fn test_jwt_for_fid() {
        let dir = TempDir::new().unwrap();
        let token = state(&dir, "s3cret").jwt("3,01637037d6").unwrap();
        assert!(verify_token("s3cret", token.as_str(), "3,01637037d6").is_ok());

        let dir = TempDir::new().unwrap();
        assert!(state(&dir, "").jwt("3,01637037d6").unwrap().is_empty());
    }

    #[test]
    fn test_form_values_win_over_query() {
        let form = MoveParams {
            from: "/a".into(),
            to: String::new(),
        };
        let query = MoveParams {
            from: "/ignored".into(),
            to: "/b".into(),
        };
        let params = MoveParams::merge(Some(Form(form)), query);
        assert_eq!(params.from, "/a");
        assert_eq!(params.to, "/b");

        let query = RegisterParams {
            path: "/x".into(),
            file_id: "1,01".into(),
        };
        let params = RegisterParams::merge(None, query);
        assert_eq!(params.path, "/x");
        assert_eq!(params.file_id, "1,01");
    }

    #[test]
    fn test_error_response_status() {
        let response = Error::UnsupportedOperation("move").into_response();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let response = Error::NotFound("/a".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
