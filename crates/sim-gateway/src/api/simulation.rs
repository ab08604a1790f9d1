//! Simulation API endpoints — the HTTP surface over the turn engine.
//!
//! - `POST /simulation/start`          — begin a run, wiping any prior progress
//! - `POST /simulation/linear-chat`    — run one turn
//! - `POST /simulation/progress`       — explicit manual scene advance (`submit` flow)
//! - `GET  /simulation/progress/:id`   — progress snapshot
//! - `GET  /simulation/grade`         — post-hoc grading
//! - `GET  /simulation/user-responses` — structured transcript for one scene

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sim_domain::entities::{Scene, Scenario, UserProgress};
use sim_domain::Error;
use sim_engine::grader;
use sim_engine::progression;
use sim_engine::Orchestrator;
use sim_providers::registry::Role;
use sim_store::ProgressBusy;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn domain_error_response(err: Error) -> Response {
    api_error(err.status_code(), err.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /simulation/start
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub user_id: String,
    pub scenario_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub user_progress_id: Uuid,
    pub scenario: Scenario,
    pub current_scene: Scene,
    pub simulation_status: sim_domain::entities::ProgressStatus,
}

pub async fn start(
    State(state): State<AppState>,
    Json(body): Json<StartRequest>,
) -> impl IntoResponse {
    let result = (|| -> sim_domain::Result<StartResponse> {
        let progress = state.store.start_simulation(&body.user_id, body.scenario_id)?;
        let scenario = state.store.get_scenario(body.scenario_id)?;
        let current_scene_id = progress
            .current_scene_id
            .ok_or_else(|| Error::SceneHasNoScenes(body.scenario_id))?;
        let current_scene = state.store.get_scene(current_scene_id)?;
        Ok(StartResponse {
            user_progress_id: progress.id,
            scenario,
            current_scene,
            simulation_status: progress.status,
        })
    })();

    match result {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => domain_error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /simulation/linear-chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct LinearChatRequest {
    pub user_progress_id: Uuid,
    #[serde(default)]
    pub scene_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LinearChatResponse {
    pub message: String,
    pub scene_id: Uuid,
    pub scene_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scene_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scene: Option<Scene>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<Uuid>,
    pub turn_count: u32,
}

pub async fn linear_chat(
    State(state): State<AppState>,
    Json(body): Json<LinearChatRequest>,
) -> impl IntoResponse {
    let _permit = match state.progress_locks.try_acquire(body.user_progress_id) {
        Ok(p) => p,
        Err(ProgressBusy) => {
            sim_domain::trace::TraceEvent::TurnBusy {
                progress_id: body.user_progress_id,
            }
            .emit();
            return api_error(StatusCode::CONFLICT, ProgressBusy.to_string());
        }
    };

    let orchestrator = Orchestrator::new(&state.store, &state.providers, state.context_window_turns);
    match orchestrator
        .handle_turn(body.user_progress_id, body.scene_id, &body.message)
        .await
    {
        Ok(outcome) => Json(LinearChatResponse {
            message: outcome.reply,
            scene_id: outcome.scene_id,
            scene_completed: outcome.scene_completed,
            next_scene_id: outcome.next_scene_id,
            next_scene: outcome.next_scene,
            persona_name: outcome.persona_name,
            persona_id: outcome.persona_id,
            turn_count: outcome.turn_count,
        })
        .into_response(),
        Err(e) => domain_error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /simulation/progress (explicit manual advance)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ManualAdvanceRequest {
    pub user_progress_id: Uuid,
    pub current_scene_id: Uuid,
    pub goal_achieved: bool,
    pub forced_progression: bool,
}

#[derive(Debug, Serialize)]
pub struct SceneProgressResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scene: Option<Scene>,
    pub simulation_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_summary: Option<String>,
}

pub async fn manual_advance(
    State(state): State<AppState>,
    Json(body): Json<ManualAdvanceRequest>,
) -> impl IntoResponse {
    let _permit = match state.progress_locks.try_acquire(body.user_progress_id) {
        Ok(p) => p,
        Err(ProgressBusy) => return api_error(StatusCode::CONFLICT, ProgressBusy.to_string()),
    };

    let result = (|| -> sim_domain::Result<SceneProgressResponse> {
        let progress = state.store.get_progress(body.user_progress_id)?;
        if progress.status == sim_domain::entities::ProgressStatus::Completed {
            return Err(Error::ProgressCompleted(body.user_progress_id));
        }
        let scenario = state.store.get_scenario(progress.scenario_id)?;
        let scenes = state.store.scenes_for_scenario(scenario.id)?;
        let current_scene = state.store.get_scene(body.current_scene_id)?;

        let outcome = state.store.run_turn_transaction(body.user_progress_id, |ctx| {
            Ok(progression::manual_advance(
                ctx,
                &scenes,
                &current_scene,
                body.forced_progression,
                body.goal_achieved,
                Utc::now(),
            ))
        })?;

        let completion_summary = outcome
            .simulation_complete
            .then(|| format!("Simulation complete after {} scene(s).", scenes.len()));

        Ok(SceneProgressResponse {
            success: true,
            next_scene: outcome.next_scene,
            simulation_complete: outcome.simulation_complete,
            completion_summary,
        })
    })();

    match result {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => domain_error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /simulation/progress/:user_progress_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
pub struct ProgressSnapshotResponse {
    pub progress: UserProgress,
    pub scene_progress: Vec<sim_domain::entities::SceneProgress>,
}

pub async fn get_progress(
    State(state): State<AppState>,
    Path(user_progress_id): Path<Uuid>,
) -> impl IntoResponse {
    let result = (|| -> sim_domain::Result<ProgressSnapshotResponse> {
        let progress = state.store.get_progress(user_progress_id)?;
        let scene_progress = state.store.all_scene_progress(user_progress_id)?;
        Ok(ProgressSnapshotResponse { progress, scene_progress })
    })();

    match result {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => domain_error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /simulation/grade
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct GradeQuery {
    pub user_progress_id: Uuid,
}

pub async fn grade(State(state): State<AppState>, Query(q): Query<GradeQuery>) -> impl IntoResponse {
    let (provider, opts) = match state.providers.resolve(Role::Persona) {
        Ok(p) => p,
        Err(e) => return domain_error_response(e),
    };

    match grader::grade(&state.store, provider.as_ref(), &opts, q.user_progress_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => domain_error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /simulation/user-responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct UserResponsesQuery {
    pub user_progress_id: Uuid,
    pub scene_id: Uuid,
}

pub async fn user_responses(
    State(state): State<AppState>,
    Query(q): Query<UserResponsesQuery>,
) -> impl IntoResponse {
    let turns = state.store.turns_for_scene(q.user_progress_id, q.scene_id);
    Json(turns).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /healthz
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "tracked_progress_locks": state.progress_locks.tracked_count(),
    }))
}
