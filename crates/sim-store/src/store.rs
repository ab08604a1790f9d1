//! The Domain Store (C1): persistent entities and invariant-preserving
//! reads/writes.
//!
//! This codebase has no SQL dependency anywhere in its stack, so "the
//! shared relational store" is realized the way the rest of this codebase
//! realizes persisted state: JSON-file-backed, `parking_lot`-guarded
//! in-memory structures with an explicit flush to disk, following the
//! load-on-construct + `RwLock<HashMap<_>>` shape used throughout this
//! codebase's other stores.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sim_domain::entities::{
    ConversationLog, MessageType, OrchestratorData, OrchestratorState, Persona, PersonaSnapshot,
    ProgressStatus, Scenario, ScenarioSnapshot, Scene, SceneProgress, SceneSnapshot, UserProgress,
};
use sim_domain::trace::TraceEvent;
use sim_domain::{Error, Result};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Authoring-side records (scenario/scene/persona): read-mostly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioRecord {
    scenario: Scenario,
    /// Sorted by `scene_order` ascending.
    scenes: Vec<Scene>,
    /// Declaration order — the fuzzy mention resolver's ambiguity rule
    /// depends on this order being preserved.
    personas: Vec<Persona>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime records (progress + per-scene attempt rows)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressRecord {
    progress: UserProgress,
    /// Keyed by scene id — one row per (progress, scene), matching the
    /// data model's uniqueness invariant directly.
    scene_progress: HashMap<Uuid, SceneProgress>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation log: append-only, JSONL-persisted, indexed for cheap
// "recent N turns" queries.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ConversationLogStore {
    entries: Vec<ConversationLog>,
    /// (progress_id, scene_id) -> indices into `entries`, in append order.
    index: HashMap<(Uuid, Uuid), Vec<usize>>,
    path: PathBuf,
}

impl ConversationLogStore {
    fn load(path: PathBuf) -> Result<Self> {
        let mut entries = Vec::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                entries.push(serde_json::from_str(line)?);
            }
        }
        let mut store = Self {
            entries: Vec::new(),
            index: HashMap::new(),
            path,
        };
        for entry in entries.drain(..) {
            store.index_entry(&entry);
            store.entries.push(entry);
        }
        Ok(store)
    }

    fn index_entry(&mut self, entry: &ConversationLog) {
        let key = (entry.progress_id, entry.scene_id);
        self.index.entry(key).or_default().push(self.entries.len());
    }

    /// Append `entry` to memory and to the on-disk JSONL file.
    fn append(&mut self, entry: ConversationLog) -> Result<()> {
        let line = serde_json::to_string(&entry)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        use std::io::Write;
        writeln!(file, "{line}")?;
        self.index_entry(&entry);
        self.entries.push(entry);
        Ok(())
    }

    fn max_orders_for_progress(&self, progress_id: Uuid) -> HashMap<Uuid, u32> {
        let mut out = HashMap::new();
        for ((pid, scene_id), indices) in &self.index {
            if *pid != progress_id {
                continue;
            }
            let max = indices
                .iter()
                .map(|&i| self.entries[i].message_order)
                .max()
                .unwrap_or(0);
            out.insert(*scene_id, max);
        }
        out
    }

    fn recent(&self, progress_id: Uuid, scene_id: Uuid, limit: usize) -> Vec<ConversationLog> {
        let Some(indices) = self.index.get(&(progress_id, scene_id)) else {
            return Vec::new();
        };
        indices
            .iter()
            .rev()
            .take(limit)
            .map(|&i| self.entries[i].clone())
            .rev()
            .collect()
    }

    fn for_progress_and_scene(&self, progress_id: Uuid, scene_id: Uuid) -> Vec<ConversationLog> {
        self.index
            .get(&(progress_id, scene_id))
            .map(|indices| indices.iter().map(|&i| self.entries[i].clone()).collect())
            .unwrap_or_default()
    }

    fn for_progress(&self, progress_id: Uuid) -> Vec<ConversationLog> {
        self.entries
            .iter()
            .filter(|e| e.progress_id == progress_id)
            .cloned()
            .collect()
    }

    fn remove_for_progress_ids(&mut self, ids: &[Uuid]) -> Result<()> {
        self.entries.retain(|e| !ids.contains(&e.progress_id));
        self.index.clear();
        for i in 0..self.entries.len() {
            let key = (self.entries[i].progress_id, self.entries[i].scene_id);
            self.index.entry(key).or_default().push(i);
        }
        self.rewrite()
    }

    fn rewrite(&self) -> Result<()> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        fs::write(&self.path, out)?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn transaction context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mutable view over exactly one `UserProgress`'s state for the duration of
/// one turn. Changes made here are only persisted if the closure passed to
/// [`DomainStore::run_turn_transaction`] returns `Ok` — this is the
/// "single transaction per turn; rollback on exception" contract (spec
/// §4.1/§5) made concrete without a SQL transaction to lean on.
pub struct TurnCtx {
    pub progress: UserProgress,
    scene_progress: HashMap<Uuid, SceneProgress>,
    pending_log: Vec<ConversationLog>,
    next_order: HashMap<Uuid, u32>,
}

impl TurnCtx {
    pub fn scene_progress(&self, scene_id: Uuid) -> Option<&SceneProgress> {
        self.scene_progress.get(&scene_id)
    }

    pub fn scene_progress_mut(&mut self, scene_id: Uuid) -> Option<&mut SceneProgress> {
        self.scene_progress.get_mut(&scene_id)
    }

    /// Insert a fresh `in_progress` `SceneProgress` row for `scene_id` if
    /// one doesn't already exist for this progress, and return it.
    pub fn start_scene_progress(&mut self, scene_id: Uuid, now: DateTime<Utc>) -> &mut SceneProgress {
        self.scene_progress
            .entry(scene_id)
            .or_insert_with(|| SceneProgress::new(self.progress.id, scene_id, now))
    }

    /// Append a conversation log row, assigning the next strictly
    /// increasing `message_order` for (progress, scene). Returns the
    /// assigned order.
    #[allow(clippy::too_many_arguments)]
    pub fn append_log(
        &mut self,
        scene_id: Uuid,
        message_type: MessageType,
        sender_name: impl Into<String>,
        persona_id: Option<Uuid>,
        message_content: impl Into<String>,
        attempt_number: u32,
        processing_time_ms: Option<u64>,
        model_version: Option<String>,
        now: DateTime<Utc>,
    ) -> u32 {
        let order = self.next_order.entry(scene_id).or_insert(0);
        *order += 1;
        let assigned = *order;
        self.pending_log.push(ConversationLog {
            id: Uuid::new_v4(),
            progress_id: self.progress.id,
            scene_id,
            message_type,
            sender_name: sender_name.into(),
            persona_id,
            message_content: message_content.into(),
            message_order: assigned,
            attempt_number,
            processing_time_ms,
            model_version,
            timestamp: now,
        });
        assigned
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DomainStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DomainStore {
    state_path: PathBuf,
    scenarios: RwLock<HashMap<Uuid, ScenarioRecord>>,
    progress: RwLock<HashMap<Uuid, ProgressRecord>>,
    conversation_log: RwLock<ConversationLogStore>,
}

impl DomainStore {
    /// Load persisted state from `state_path`, creating the directory and
    /// starting from empty tables if nothing is there yet.
    pub fn load(state_path: impl Into<PathBuf>) -> Result<Self> {
        let state_path = state_path.into();
        fs::create_dir_all(&state_path)?;

        let scenarios = load_json(&state_path.join("scenarios.json"))?.unwrap_or_default();
        let progress = load_json(&state_path.join("progress.json"))?.unwrap_or_default();
        let conversation_log =
            ConversationLogStore::load(state_path.join("conversation_log.jsonl"))?;

        Ok(Self {
            state_path,
            scenarios: RwLock::new(scenarios),
            progress: RwLock::new(progress),
            conversation_log: RwLock::new(conversation_log),
        })
    }

    fn flush_scenarios(&self) -> Result<()> {
        write_json(&self.state_path.join("scenarios.json"), &*self.scenarios.read())
    }

    fn flush_progress(&self) -> Result<()> {
        write_json(&self.state_path.join("progress.json"), &*self.progress.read())
    }

    // ── C1: creation operations ─────────────────────────────────────

    /// Create a scenario with its scenes and personas. Rejects a scenario
    /// with no scenes at creation time (spec §4.1 `SceneHasNoScenes`).
    pub fn create_scenario(
        &self,
        scenario: Scenario,
        mut scenes: Vec<Scene>,
        personas: Vec<Persona>,
    ) -> Result<()> {
        if scenes.is_empty() {
            return Err(Error::SceneHasNoScenes(scenario.id));
        }
        scenes.sort_by_key(|s| s.scene_order);
        self.scenarios.write().insert(
            scenario.id,
            ScenarioRecord {
                scenario,
                scenes,
                personas,
            },
        );
        self.flush_scenarios()
    }

    // ── C1: start_simulation ─────────────────────────────────────────

    /// Delete all prior progress/scene-progress/conversation-log rows for
    /// (user_id, scenario_id), then insert a fresh `UserProgress` pointing
    /// at the first scene, with its `SceneProgress` and orchestrator
    /// snapshot (spec §4.1).
    pub fn start_simulation(&self, user_id: &str, scenario_id: Uuid) -> Result<UserProgress> {
        if user_id.trim().is_empty() {
            return Err(Error::MissingUser);
        }

        let record = {
            let scenarios = self.scenarios.read();
            scenarios
                .get(&scenario_id)
                .cloned()
                .ok_or(Error::ScenarioNotFound(scenario_id))?
        };
        if record.scenes.is_empty() {
            return Err(Error::SceneHasNoScenes(scenario_id));
        }
        let first_scene = record
            .scenes
            .iter()
            .min_by_key(|s| s.scene_order)
            .expect("non-empty scenes")
            .clone();

        let prior_ids: Vec<Uuid> = {
            let mut progress_map = self.progress.write();
            let ids: Vec<Uuid> = progress_map
                .values()
                .filter(|r| r.progress.user_id == user_id && r.progress.scenario_id == scenario_id)
                .map(|r| r.progress.id)
                .collect();
            for id in &ids {
                progress_map.remove(id);
            }
            ids
        };
        if !prior_ids.is_empty() {
            self.conversation_log.write().remove_for_progress_ids(&prior_ids)?;
        }

        let now = Utc::now();
        let progress_id = Uuid::new_v4();
        let snapshot = ScenarioSnapshot {
            scenario_id,
            scenes: record
                .scenes
                .iter()
                .map(|s| SceneSnapshot {
                    scene_id: s.id,
                    title: s.title.clone(),
                    scene_order: s.scene_order,
                    personas_involved: s
                        .personas_involved
                        .iter()
                        .filter_map(|pid| record.personas.iter().find(|p| p.id == *pid))
                        .map(|p| p.name.clone())
                        .collect(),
                })
                .collect(),
            personas: record
                .personas
                .iter()
                .map(|p| PersonaSnapshot {
                    persona_id: p.id,
                    mention_id: p.mention_id(),
                    name: p.name.clone(),
                })
                .collect(),
        };

        let progress = UserProgress {
            id: progress_id,
            user_id: user_id.to_string(),
            scenario_id,
            current_scene_id: Some(first_scene.id),
            status: ProgressStatus::WaitingForBegin,
            scenes_completed: vec![],
            total_attempts: 0,
            hints_used: 0,
            forced_progressions: 0,
            session_count: 1,
            orchestrator_data: OrchestratorData {
                state: OrchestratorState {
                    current_scene_id: Some(first_scene.id),
                    current_scene_index: 0,
                    turn_count: 0,
                    simulation_started: false,
                    user_ready: false,
                    state_variables: serde_json::json!({}),
                },
                snapshot: Some(snapshot),
                extra: serde_json::json!({}),
            },
            started_at: now,
            last_activity_at: now,
            completed_at: None,
        };

        let mut scene_progress = HashMap::new();
        scene_progress.insert(first_scene.id, SceneProgress::new(progress_id, first_scene.id, now));

        self.progress.write().insert(
            progress_id,
            ProgressRecord {
                progress: progress.clone(),
                scene_progress,
            },
        );
        self.flush_progress()?;
        TraceEvent::SimulationStarted {
            progress_id,
            scenario_id,
        }
        .emit();
        Ok(progress)
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub fn get_scenario(&self, scenario_id: Uuid) -> Result<Scenario> {
        self.scenarios
            .read()
            .get(&scenario_id)
            .map(|r| r.scenario.clone())
            .ok_or(Error::ScenarioNotFound(scenario_id))
    }

    pub fn get_scene(&self, scene_id: Uuid) -> Result<Scene> {
        self.scenarios
            .read()
            .values()
            .find_map(|r| r.scenes.iter().find(|s| s.id == scene_id).cloned())
            .ok_or(Error::SceneNotFound(scene_id))
    }

    pub fn scenes_for_scenario(&self, scenario_id: Uuid) -> Result<Vec<Scene>> {
        self.scenarios
            .read()
            .get(&scenario_id)
            .map(|r| r.scenes.clone())
            .ok_or(Error::ScenarioNotFound(scenario_id))
    }

    /// Personas involved in `scene_id`, in scenario declaration order.
    pub fn personas_involved_in_scene(&self, scene_id: Uuid) -> Result<Vec<Persona>> {
        let scenarios = self.scenarios.read();
        let record = scenarios
            .values()
            .find(|r| r.scenes.iter().any(|s| s.id == scene_id))
            .ok_or(Error::SceneNotFound(scene_id))?;
        let scene = record.scenes.iter().find(|s| s.id == scene_id).unwrap();
        Ok(record
            .personas
            .iter()
            .filter(|p| scene.personas_involved.contains(&p.id))
            .cloned()
            .collect())
    }

    /// All personas declared on the scenario, in declaration order — the
    /// population the fuzzy mention resolver searches.
    pub fn personas_for_scenario(&self, scenario_id: Uuid) -> Result<Vec<Persona>> {
        self.scenarios
            .read()
            .get(&scenario_id)
            .map(|r| r.personas.clone())
            .ok_or(Error::ScenarioNotFound(scenario_id))
    }

    pub fn get_progress(&self, progress_id: Uuid) -> Result<UserProgress> {
        self.progress
            .read()
            .get(&progress_id)
            .map(|r| r.progress.clone())
            .ok_or(Error::ProgressNotFound(progress_id))
    }

    pub fn get_scene_progress(&self, progress_id: Uuid, scene_id: Uuid) -> Result<SceneProgress> {
        self.progress
            .read()
            .get(&progress_id)
            .and_then(|r| r.scene_progress.get(&scene_id).cloned())
            .ok_or(Error::ProgressNotFound(progress_id))
    }

    pub fn all_scene_progress(&self, progress_id: Uuid) -> Result<Vec<SceneProgress>> {
        self.progress
            .read()
            .get(&progress_id)
            .map(|r| r.scene_progress.values().cloned().collect())
            .ok_or(Error::ProgressNotFound(progress_id))
    }

    /// Last `limit` turns for (progress, scene), in chronological order.
    pub fn recent_turns(&self, progress_id: Uuid, scene_id: Uuid, limit: usize) -> Vec<ConversationLog> {
        self.conversation_log.read().recent(progress_id, scene_id, limit)
    }

    pub fn turns_for_scene(&self, progress_id: Uuid, scene_id: Uuid) -> Vec<ConversationLog> {
        self.conversation_log
            .read()
            .for_progress_and_scene(progress_id, scene_id)
    }

    pub fn all_turns_for_progress(&self, progress_id: Uuid) -> Vec<ConversationLog> {
        self.conversation_log.read().for_progress(progress_id)
    }

    // ── Turn transaction ─────────────────────────────────────────────

    /// Run one turn's mutations against a private copy of the progress
    /// row's state; only commits (writes back + flushes to disk) if `body`
    /// returns `Ok`. On `Err`, nothing is persisted and `turn_count` is not
    /// advanced — the rollback contract of spec §4.1/§5.
    pub fn run_turn_transaction<T>(
        &self,
        progress_id: Uuid,
        body: impl FnOnce(&mut TurnCtx) -> Result<T>,
    ) -> Result<T> {
        let record = {
            let progress = self.progress.read();
            progress
                .get(&progress_id)
                .cloned()
                .ok_or(Error::ProgressNotFound(progress_id))?
        };
        let next_order = self.conversation_log.read().max_orders_for_progress(progress_id);

        let mut ctx = TurnCtx {
            progress: record.progress,
            scene_progress: record.scene_progress,
            pending_log: Vec::new(),
            next_order,
        };

        let result = body(&mut ctx)?;

        self.progress.write().insert(
            progress_id,
            ProgressRecord {
                progress: ctx.progress,
                scene_progress: ctx.scene_progress,
            },
        );
        {
            let mut log = self.conversation_log.write();
            for entry in ctx.pending_log {
                log.append(entry)?;
            }
        }
        self.flush_progress()?;
        Ok(result)
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&raw)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn seed(store: &DomainStore) -> (Uuid, Uuid, Uuid, Uuid) {
        let scenario_id = Uuid::new_v4();
        let persona_id = Uuid::new_v4();
        let scene_a = Uuid::new_v4();
        let scene_b = Uuid::new_v4();

        let scenario = Scenario {
            id: scenario_id,
            title: "Budget negotiation".into(),
            description: "desc".into(),
            challenge: "challenge".into(),
            industry: "finance".into(),
            learning_objectives: vec!["Negotiate confidently".into()],
            student_role: "analyst".into(),
            created_at: Utc::now(),
        };
        let persona = Persona {
            id: persona_id,
            scenario_id,
            name: "CFO Dana".into(),
            role: "CFO".into(),
            background: "".into(),
            correlation: "".into(),
            primary_goals: vec![],
            personality_traits: Map::new(),
        };
        let scenes = vec![
            Scene {
                id: scene_a,
                scenario_id,
                title: "Opening".into(),
                description: "desc".into(),
                user_goal: "Greet the CFO".into(),
                success_metric: Some("Greet the CFO".into()),
                scene_order: 0,
                timeout_turns: 1,
                max_attempts: 5,
                personas_involved: vec![persona_id],
            },
            Scene {
                id: scene_b,
                scenario_id,
                title: "Negotiation".into(),
                description: "desc".into(),
                user_goal: "Agree on budget".into(),
                success_metric: None,
                scene_order: 1,
                timeout_turns: 5,
                max_attempts: 5,
                personas_involved: vec![persona_id],
            },
        ];
        store
            .create_scenario(scenario, scenes, vec![persona])
            .unwrap();
        (scenario_id, persona_id, scene_a, scene_b)
    }

    #[test]
    fn start_simulation_creates_progress_on_first_scene() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, _, scene_a, _) = seed(&store);

        let progress = store.start_simulation("user-1", scenario_id).unwrap();
        assert_eq!(progress.current_scene_id, Some(scene_a));
        assert_eq!(progress.status, ProgressStatus::WaitingForBegin);
        assert!(progress.orchestrator_data.snapshot.is_some());

        let scene_progress = store.get_scene_progress(progress.id, scene_a).unwrap();
        assert_eq!(scene_progress.status, sim_domain::entities::SceneProgressStatus::InProgress);
    }

    #[test]
    fn start_simulation_deletes_prior_run_for_same_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, _, scene_a, _) = seed(&store);

        let first = store.start_simulation("user-1", scenario_id).unwrap();
        store
            .run_turn_transaction(first.id, |ctx| {
                ctx.append_log(
                    scene_a,
                    MessageType::User,
                    "user-1",
                    None,
                    "hello",
                    1,
                    None,
                    None,
                    Utc::now(),
                );
                Ok(())
            })
            .unwrap();

        let second = store.start_simulation("user-1", scenario_id).unwrap();
        assert_ne!(first.id, second.id);
        assert!(store.get_progress(first.id).is_err());
        assert!(store.turns_for_scene(first.id, scene_a).is_empty());
    }

    #[test]
    fn unknown_scenario_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let err = store.start_simulation("user-1", Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::ScenarioNotFound(_)));
    }

    #[test]
    fn scenario_with_no_scenes_is_rejected_at_creation() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let scenario = Scenario {
            id: Uuid::new_v4(),
            title: "empty".into(),
            description: "".into(),
            challenge: "".into(),
            industry: "".into(),
            learning_objectives: vec![],
            student_role: "".into(),
            created_at: Utc::now(),
        };
        let err = store.create_scenario(scenario, vec![], vec![]).unwrap_err();
        assert!(matches!(err, Error::SceneHasNoScenes(_)));
    }

    #[test]
    fn message_order_strictly_increases_within_progress_scene() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, _, scene_a, _) = seed(&store);
        let progress = store.start_simulation("user-1", scenario_id).unwrap();

        for i in 0..3 {
            store
                .run_turn_transaction(progress.id, |ctx| {
                    ctx.append_log(
                        scene_a,
                        MessageType::User,
                        "user-1",
                        None,
                        format!("turn {i}"),
                        1,
                        None,
                        None,
                        Utc::now(),
                    );
                    Ok(())
                })
                .unwrap();
        }

        let turns = store.turns_for_scene(progress.id, scene_a);
        let orders: Vec<u32> = turns.iter().map(|t| t.message_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn failed_transaction_does_not_persist_anything() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, _, scene_a, _) = seed(&store);
        let progress = store.start_simulation("user-1", scenario_id).unwrap();

        let result: Result<()> = store.run_turn_transaction(progress.id, |ctx| {
            ctx.append_log(
                scene_a,
                MessageType::User,
                "user-1",
                None,
                "will be rolled back",
                1,
                None,
                None,
                Utc::now(),
            );
            Err(Error::Other("boom".into()))
        });
        assert!(result.is_err());
        assert!(store.turns_for_scene(progress.id, scene_a).is_empty());
    }

    #[test]
    fn reload_from_disk_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let (scenario_id, progress_id, scene_a) = {
            let store = DomainStore::load(dir.path()).unwrap();
            let (scenario_id, _, scene_a, _) = seed(&store);
            let progress = store.start_simulation("user-1", scenario_id).unwrap();
            (scenario_id, progress.id, scene_a)
        };

        let reloaded = DomainStore::load(dir.path()).unwrap();
        let progress = reloaded.get_progress(progress_id).unwrap();
        assert_eq!(progress.scenario_id, scenario_id);
        assert_eq!(progress.current_scene_id, Some(scene_a));
    }
}
