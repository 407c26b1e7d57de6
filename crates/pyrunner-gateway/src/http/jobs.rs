//! Job endpoints — listing and manual triggering.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use pyrunner_core::{JobId, PyrunnerError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{api_error, store_error, ApiError};
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerBody {
    /// Input batch passed to the script after the run id.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct RunNowBody {
    pub job_ids: Vec<JobId>,
}

/// GET /jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let jobs = state
        .stores
        .default_store()
        .list_jobs()
        .map_err(store_error)?;
    Ok(Json(json!({ "jobs": jobs })))
}

/// POST /jobs/{id}/run
///
/// Starts the job in the background and answers 202 straight away; the
/// outcome lands in the job's run history.
pub async fn trigger_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TriggerBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
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
    if !job.enabled {
        return Err(api_error(PyrunnerError::InvalidRequest(format!(
            "job {} is disabled",
            job.id
        ))));
    }

    info!(job_id = %job.id, files = body.files.len(), "manual trigger");
    state.executor.spawn_job(job.id.clone(), body.files.clone());
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "job_id": job.id,
            "files": body.files,
        })),
    ))
}

/// POST /jobs/run-now
pub async fn run_now(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunNowBody>,
) -> Json<Value> {
    let report = state.executor.run_now(&body.job_ids);
    Json(json!(report))
}
