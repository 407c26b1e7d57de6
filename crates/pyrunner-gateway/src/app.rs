use axum::{
    routing::{get, post},
    Router,
};
use pyrunner_core::config::ExecutionConfig;
use pyrunner_engine::Executor;
use pyrunner_store::StoreRouter;
use std::sync::Arc;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub stores: StoreRouter,
    pub executor: Arc<Executor>,
}

impl AppState {
    pub fn new(execution: ExecutionConfig, stores: StoreRouter) -> Self {
        let executor = Arc::new(Executor::new(stores.clone(), execution));
        Self {
            stores,
            executor,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/jobs", get(crate::http::jobs::list_jobs))
        .route("/jobs/run-now", post(crate::http::jobs::run_now))
        .route("/jobs/{id}/run", post(crate::http::jobs::trigger_job))
        .route("/jobs/{id}/runs", get(crate::http::runs::list_runs))
        .route("/runs/{id}", get(crate::http::runs::get_run))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
