pub mod simulation;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(simulation::healthz))
        .route("/simulation/start", post(simulation::start))
        .route("/simulation/linear-chat", post(simulation::linear_chat))
        .route("/simulation/progress", post(simulation::manual_advance))
        .route("/simulation/progress/:user_progress_id", get(simulation::get_progress))
        .route("/simulation/grade", get(simulation::grade))
        .route("/simulation/user-responses", get(simulation::user_responses))
        .with_state(state)
}
