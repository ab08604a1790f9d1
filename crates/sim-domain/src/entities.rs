use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A case study: scenes, personas, learning objectives, and a student role.
///
/// Immutable-by-runtime authoring artifact — the core never mutates a
/// `Scenario` after creation; it only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub challenge: String,
    pub industry: String,
    pub learning_objectives: Vec<String>,
    pub student_role: String,
    pub created_at: DateTime<Utc>,
}

/// One linear step in a scenario's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub title: String,
    pub description: String,
    pub user_goal: String,
    /// The graded criterion. May differ from `user_goal`; falls back to the
    /// first learning objective, then to `user_goal`, when absent at the
    /// call site (see `Scene::success_metric`).
    pub success_metric: Option<String>,
    /// Unique within a scenario; linear progression uses strict increase.
    pub scene_order: i32,
    pub timeout_turns: u32,
    pub max_attempts: u32,
    /// Personas involved in this scene, by persona id (subset of the
    /// scenario's persona set).
    pub personas_involved: Vec<Uuid>,
}

pub const DEFAULT_TIMEOUT_TURNS: u32 = 15;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

impl Scene {
    /// The criterion validator and grader must judge against: the scene's
    /// own success metric, or (absent) the scenario's first learning
    /// objective, or (absent that too) the scene's user goal.
    pub fn effective_success_metric<'a>(&'a self, scenario: &'a Scenario) -> &'a str {
        if let Some(metric) = self.success_metric.as_deref().filter(|m| !m.is_empty()) {
            return metric;
        }
        if let Some(first) = scenario.learning_objectives.first() {
            return first.as_str();
        }
        &self.user_goal
    }
}

/// An AI-played character with background, goals, and personality traits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub name: String,
    pub role: String,
    pub background: String,
    pub correlation: String,
    pub primary_goals: Vec<String>,
    /// Trait name -> strength, 0-10.
    pub personality_traits: HashMap<String, u8>,
}

impl Persona {
    /// Stable, URL-safe mention id: lowercase name with spaces replaced by
    /// underscores. This is the canonical handle a user types as `@<id>`.
    pub fn mention_id(&self) -> String {
        self.name.trim().to_lowercase().replace(' ', "_")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    WaitingForBegin,
    InProgress,
    Completed,
    Abandoned,
}

/// One learner's run of one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProgress {
    pub id: Uuid,
    pub user_id: String,
    pub scenario_id: Uuid,
    pub current_scene_id: Option<Uuid>,
    pub status: ProgressStatus,
    /// Deduplicated, append-only until reset.
    pub scenes_completed: Vec<Uuid>,
    pub total_attempts: u32,
    pub hints_used: u32,
    pub forced_progressions: u32,
    pub session_count: u32,
    pub orchestrator_data: OrchestratorData,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UserProgress {
    /// Append `scene_id` to `scenes_completed` if not already present.
    pub fn mark_scene_completed(&mut self, scene_id: Uuid) {
        if !self.scenes_completed.contains(&scene_id) {
            self.scenes_completed.push(scene_id);
        }
    }
}

/// The persisted `orchestrator_data` column: a typed value object rather
/// than a raw untyped map, per the design note that nested mutations to a
/// JSON column must be explicitly re-encoded and marked dirty.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestratorData {
    pub state: OrchestratorState,
    pub snapshot: Option<ScenarioSnapshot>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub current_scene_id: Option<Uuid>,
    pub current_scene_index: i32,
    pub turn_count: u32,
    pub simulation_started: bool,
    pub user_ready: bool,
    #[serde(default)]
    pub state_variables: serde_json::Value,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            current_scene_id: None,
            current_scene_index: 0,
            turn_count: 0,
            simulation_started: false,
            user_ready: false,
            state_variables: serde_json::json!({}),
        }
    }
}

/// Scenario content snapshotted into `orchestrator_data` at
/// `start_simulation` time, so the orchestrator never re-queries the
/// authoring store mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSnapshot {
    pub scenario_id: Uuid,
    pub scenes: Vec<SceneSnapshot>,
    pub personas: Vec<PersonaSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub scene_id: Uuid,
    pub title: String,
    pub scene_order: i32,
    /// Names of personas involved, for display without a join.
    pub personas_involved: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSnapshot {
    pub persona_id: Uuid,
    pub mention_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneProgressStatus {
    NotStarted,
    InProgress,
    Completed,
    Skipped,
}

/// Per-(progress, scene) attempt record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneProgress {
    pub id: Uuid,
    pub progress_id: Uuid,
    pub scene_id: Uuid,
    pub status: SceneProgressStatus,
    pub attempts: u32,
    pub hints_used: u32,
    pub goal_achieved: bool,
    pub forced_progression: bool,
    pub messages_sent: u32,
    pub ai_responses: u32,
    pub goal_achievement_score: Option<u8>,
    pub interaction_quality: Option<f32>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SceneProgress {
    pub fn new(progress_id: Uuid, scene_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            progress_id,
            scene_id,
            status: SceneProgressStatus::InProgress,
            attempts: 0,
            hints_used: 0,
            goal_achieved: false,
            forced_progression: false,
            messages_sent: 0,
            ai_responses: 0,
            goal_achievement_score: None,
            interaction_quality: None,
            started_at: now,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    AiPersona,
    Orchestrator,
    System,
    Hint,
}

/// An append-only turn record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLog {
    pub id: Uuid,
    pub progress_id: Uuid,
    pub scene_id: Uuid,
    pub message_type: MessageType,
    pub sender_name: String,
    pub persona_id: Option<Uuid>,
    pub message_content: String,
    pub message_order: u32,
    pub attempt_number: u32,
    pub processing_time_ms: Option<u64>,
    pub model_version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The control sentinel that forces progression without going through the
/// validator; UI-only, MUST NOT appear in the conversation log.
pub const SUBMIT_FOR_GRADING: &str = "SUBMIT_FOR_GRADING";
