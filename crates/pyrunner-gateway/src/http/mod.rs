pub mod health;
pub mod jobs;
pub mod runs;

use axum::{http::StatusCode, Json};
use pyrunner_core::PyrunnerError;
use serde_json::{json, Value};
use tracing::error;

/// Handler error: status plus `{"error", "code"}` body.
pub type ApiError = (StatusCode, Json<Value>);

pub(crate) fn api_error(err: PyrunnerError) -> ApiError {
    let status = match &err {
        PyrunnerError::JobNotFound { .. } | PyrunnerError::RunNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        PyrunnerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(code = err.code(), "request failed: {err}");
    }
    (
        status,
        Json(json!({ "error": err.to_string(), "code": err.code() })),
    )
}

pub(crate) fn store_error(err: pyrunner_store::StoreError) -> ApiError {
    api_error(PyrunnerError::Database(err.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, Router};
    use pyrunner_core::config::ExecutionConfig;
    use pyrunner_store::{SqliteStore, StoreRouter};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::app::{build_router, AppState};

    pub fn app() -> (Arc<SqliteStore>, Router) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let state = AppState::new(ExecutionConfig::default(), StoreRouter::new(store.clone()));
        (store, build_router(Arc::new(state)))
    }

    pub async fn send(app: Router, req: Request<Body>) -> (axum::http::StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    pub fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}
