//! Run history endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use pyrunner_core::{JobId, PyrunnerError, RunId};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{api_error, store_error, ApiError};
use crate::app::AppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /jobs/{id}/runs?limit=N — newest first, read from the database the
/// job's runs are routed to.
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let job_id = JobId::from(id);
    let job = state
        .stores
        .default_store()
        .get_job(&job_id)
        .map_err(store_error)?
        .ok_or_else(|| {
            api_error(PyrunnerError::JobNotFound {
                id: job_id.to_string(),
            })
        })?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let runs = state
        .stores
        .for_alias(job.db_alias.as_deref())
        .list_runs(&job.id, limit)
        .map_err(store_error)?;
    Ok(Json(json!({ "job_id": job.id, "runs": runs })))
}

/// GET /runs/{id} — searches every configured database.
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let run_id = RunId::from(id);
    for store in state.stores.stores() {
        if let Some(run) = store.get_run(&run_id).map_err(store_error)? {
            return Ok(Json(json!(run)));
        }
    }
    Err(api_error(PyrunnerError::RunNotFound {
        id: run_id.to_string(),
    }))
}
