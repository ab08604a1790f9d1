//! Structured lifecycle events, logged via `tracing` at the sites that
//! produce them. Kept as a typed enum (rather than ad-hoc `info!` fields
//! scattered everywhere) so the shape of what gets logged is reviewable in
//! one place.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SimulationStarted {
        progress_id: Uuid,
        scenario_id: Uuid,
    },
    SceneAdvanced {
        progress_id: Uuid,
        from_scene: Uuid,
        to_scene: Option<Uuid>,
        forced: bool,
    },
    TurnBusy {
        progress_id: Uuid,
    },
    ValidatorFallback {
        progress_id: Uuid,
        reason: String,
    },
    GradeCompleted {
        progress_id: Uuid,
        overall_score: u8,
    },
}

impl TraceEvent {
    /// Emit this event as a structured `tracing::info!` record.
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => tracing::info!(target: "sim.trace", event = %json),
            Err(_) => tracing::info!(target: "sim.trace", event = "unserializable"),
        }
    }
}
