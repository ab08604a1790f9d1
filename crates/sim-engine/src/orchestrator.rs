//! Orchestrator (C6): the per-turn façade wrapping the router, persona
//! responder, goal validator, and progression engine.
//!
//! Mirrors the teacher's `run_turn` phase structure (pre-flight -> context
//! -> LLM -> finalize) but collapsed to one non-streaming round trip per
//! turn, since this system has no tool-call loop and no streaming (spec §1
//! Non-goals).

use std::fmt::Write as _;

use chrono::Utc;
use sim_domain::entities::{MessageType, Scene};
use sim_domain::mention::resolve_mention;
use sim_domain::{Error, Result};
use sim_providers::registry::{ProviderRegistry, Role};
use sim_store::DomainStore;
use uuid::Uuid;

use crate::progression::{self, ProgressionResult};
use crate::router::{self, TurnClass};
use crate::validator;

/// One turn's outcome, shaped to answer the `linear-chat` HTTP contract
/// directly (spec §6).
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub persona_name: Option<String>,
    pub persona_id: Option<Uuid>,
    pub scene_id: Uuid,
    pub scene_completed: bool,
    pub next_scene_id: Option<Uuid>,
    pub next_scene: Option<Scene>,
    pub turn_count: u32,
    pub simulation_complete: bool,
}

const ORCHESTRATOR_SENDER: &str = "ChatOrchestrator";

pub struct Orchestrator<'a> {
    store: &'a DomainStore,
    providers: &'a ProviderRegistry,
    context_window_turns: usize,
}

impl<'a> Orchestrator<'a> {
    pub fn new(store: &'a DomainStore, providers: &'a ProviderRegistry, context_window_turns: usize) -> Self {
        Self {
            store,
            providers,
            context_window_turns,
        }
    }

    /// Run one turn's full lifecycle (spec §4.6, steps 1-7).
    pub async fn handle_turn(&self, progress_id: Uuid, requested_scene_id: Option<Uuid>, raw_text: &str) -> Result<TurnOutcome> {
        let progress = self.store.get_progress(progress_id)?;
        if progress.status == sim_domain::entities::ProgressStatus::Completed {
            return Err(Error::ProgressCompleted(progress_id));
        }
        let scenario = self.store.get_scenario(progress.scenario_id)?;
        let scenes = self.store.scenes_for_scenario(scenario.id)?;

        // Step 3: the request's scene reference is advisory only — the
        // orchestrator's own `current_scene_id` is authoritative, and a
        // stale client value (from before a previous progression) is
        // silently corrected rather than rejected.
        let current_scene_id = progress
            .current_scene_id
            .ok_or_else(|| Error::Other("progress has no current scene".into()))?;
        let _ = requested_scene_id;
        let current_scene = scenes
            .iter()
            .find(|s| s.id == current_scene_id)
            .cloned()
            .ok_or(Error::SceneNotFound(current_scene_id))?;

        let class = router::classify(raw_text);

        match class {
            TurnClass::Begin => self.handle_begin(progress_id, &scenario, &scenes, &current_scene),
            TurnClass::Help => self.handle_help(progress_id, &current_scene),
            TurnClass::Submit => self.handle_submit(progress_id, &scenario, &scenes, &current_scene),
            TurnClass::Mention(token) => {
                self.handle_user_turn(progress_id, &scenario, &scenes, &current_scene, raw_text, Some(token))
                    .await
            }
            TurnClass::Plain => {
                self.handle_user_turn(progress_id, &scenario, &scenes, &current_scene, raw_text, None)
                    .await
            }
        }
    }

    fn handle_begin(
        &self,
        progress_id: Uuid,
        scenario: &sim_domain::entities::Scenario,
        scenes: &[Scene],
        current_scene: &Scene,
    ) -> Result<TurnOutcome> {
        let personas = self.store.personas_involved_in_scene(current_scene.id)?;
        let prologue = build_prologue(scenario, scenes, current_scene, &personas);

        self.store.run_turn_transaction(progress_id, |ctx| {
            ctx.progress.status = sim_domain::entities::ProgressStatus::InProgress;
            ctx.progress.orchestrator_data.state.simulation_started = true;
            ctx.progress.last_activity_at = Utc::now();
            Ok(())
        })?;

        Ok(TurnOutcome {
            reply: prologue,
            persona_name: Some(ORCHESTRATOR_SENDER.to_string()),
            persona_id: None,
            scene_id: current_scene.id,
            scene_completed: false,
            next_scene_id: None,
            next_scene: None,
            turn_count: 0,
            simulation_complete: false,
        })
    }

    fn handle_help(&self, progress_id: Uuid, current_scene: &Scene) -> Result<TurnOutcome> {
        let progress = self.store.get_progress(progress_id)?;
        let turn_count = progress.orchestrator_data.state.turn_count;
        let personas = self.store.personas_involved_in_scene(current_scene.id)?;
        let text = build_help_text(current_scene, turn_count, &personas);

        Ok(TurnOutcome {
            reply: text,
            persona_name: Some(ORCHESTRATOR_SENDER.to_string()),
            persona_id: None,
            scene_id: current_scene.id,
            scene_completed: false,
            next_scene_id: None,
            next_scene: None,
            turn_count,
            simulation_complete: false,
        })
    }

    fn handle_submit(
        &self,
        progress_id: Uuid,
        _scenario: &sim_domain::entities::Scenario,
        scenes: &[Scene],
        current_scene: &Scene,
    ) -> Result<TurnOutcome> {
        let outcome = self.store.run_turn_transaction(progress_id, |ctx| {
            let now = Utc::now();
            let advanced = progression::force_submit(ctx, scenes, current_scene, now);
            ctx.progress.last_activity_at = now;
            Ok(advanced)
        })?;

        let turn_count_after = self.store.get_progress(progress_id)?.orchestrator_data.state.turn_count;

        Ok(TurnOutcome {
            reply: submit_acknowledgement(&outcome),
            persona_name: Some(ORCHESTRATOR_SENDER.to_string()),
            persona_id: None,
            scene_id: current_scene.id,
            scene_completed: true,
            next_scene_id: outcome.next_scene.as_ref().map(|s| s.id),
            next_scene: outcome.next_scene,
            turn_count: turn_count_after,
            simulation_complete: outcome.simulation_complete,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_user_turn(
        &self,
        progress_id: Uuid,
        scenario: &sim_domain::entities::Scenario,
        scenes: &[Scene],
        current_scene: &Scene,
        raw_text: &str,
        mention_token: Option<String>,
    ) -> Result<TurnOutcome> {
        let attempts = self
            .store
            .get_scene_progress(progress_id, current_scene.id)
            .map(|sp| sp.attempts)
            .unwrap_or(0);
        let recent_turns = self.store.recent_turns(progress_id, current_scene.id, self.context_window_turns);

        let personas = self.store.personas_involved_in_scene(current_scene.id)?;
        let resolved_persona = mention_token
            .as_deref()
            .and_then(|token| resolve_mention(token, &personas).cloned());

        let (persona_opt, opts) = self.providers.resolve(Role::Persona)?;
        let (reply_text, persona_name, persona_id) = match &resolved_persona {
            Some(persona) => {
                let reply = crate::persona::respond(
                    persona_opt.as_ref(),
                    &opts,
                    persona,
                    current_scene,
                    scenario,
                    attempts,
                    &recent_turns,
                    raw_text,
                )
                .await;
                (reply.text, persona.name.clone(), Some(persona.id))
            }
            None => (generic_nudge(&personas), ORCHESTRATOR_SENDER.to_string(), None),
        };

        let (validator_provider, validator_opts) = self.providers.resolve(Role::Validator)?;
        let decision = validator::validate(
            validator_provider.as_ref(),
            &validator_opts,
            current_scene,
            scenario,
            attempts,
            &recent_turns,
            raw_text,
            progress_id,
        )
        .await;

        let now = Utc::now();
        let (progression_result, turn_count_after) = self.store.run_turn_transaction(progress_id, |ctx| {
            ctx.progress.orchestrator_data.state.turn_count += 1;
            ctx.progress.total_attempts += 1;
            if let Some(sp) = ctx.scene_progress_mut(current_scene.id) {
                sp.attempts += 1;
                sp.messages_sent += 1;
                sp.ai_responses += 1;
            }
            ctx.append_log(
                current_scene.id,
                MessageType::User,
                "learner",
                None,
                raw_text,
                attempts + 1,
                None,
                None,
                now,
            );

            let result = progression::evaluate_after_user_turn(ctx, scenes, current_scene, &decision, now);

            let mut assistant_text = reply_text.clone();
            if let ProgressionResult::Continued { hint: Some(hint) } = &result {
                let _ = write!(assistant_text, "\n\n{hint}");
            }
            let reply_message_type = if persona_id.is_some() { MessageType::AiPersona } else { MessageType::Orchestrator };
            ctx.append_log(
                current_scene.id,
                reply_message_type,
                persona_name.as_str(),
                persona_id,
                assistant_text.as_str(),
                attempts + 1,
                None,
                None,
                now,
            );

            ctx.progress.last_activity_at = now;
            let turn_count = ctx.progress.orchestrator_data.state.turn_count;
            Ok((result, turn_count))
        })?;

        let (scene_completed, next_scene_id, next_scene, simulation_complete, final_text) = match progression_result {
            ProgressionResult::Advanced(advance) => (
                true,
                advance.next_scene.as_ref().map(|s| s.id),
                advance.next_scene,
                advance.simulation_complete,
                reply_text.clone(),
            ),
            ProgressionResult::Continued { hint } => {
                let mut text = reply_text.clone();
                if let Some(hint) = hint {
                    let _ = write!(text, "\n\n{hint}");
                }
                (false, None, None, false, text)
            }
        };

        Ok(TurnOutcome {
            reply: final_text,
            persona_name: Some(persona_name),
            persona_id,
            scene_id: current_scene.id,
            scene_completed,
            next_scene_id,
            next_scene,
            turn_count: turn_count_after,
            simulation_complete,
        })
    }
}

fn build_prologue(
    scenario: &sim_domain::entities::Scenario,
    scenes: &[Scene],
    current_scene: &Scene,
    personas: &[sim_domain::entities::Persona],
) -> String {
    let scene_number = scenes.iter().position(|s| s.id == current_scene.id).unwrap_or(0) + 1;
    let mut out = String::new();
    let _ = writeln!(out, "Scene {scene_number} — {}", current_scene.title);
    let _ = writeln!(out, "_{}_", current_scene.description);
    out.push('\n');
    out.push_str("Objectives:\n");
    if scenario.learning_objectives.is_empty() {
        let _ = writeln!(out, "- {}", current_scene.user_goal);
    } else {
        for objective in &scenario.learning_objectives {
            let _ = writeln!(out, "- {objective}");
        }
    }
    out.push('\n');
    out.push_str("In this scene:\n");
    for persona in personas {
        let _ = writeln!(out, "- @{} — {} ({})", persona.mention_id(), persona.name, persona.role);
    }
    out.push('\n');
    let _ = write!(out, "You have {} turn(s) to complete this scene.", current_scene.timeout_turns);
    out
}

fn build_help_text(current_scene: &Scene, turn_count: u32, personas: &[sim_domain::entities::Persona]) -> String {
    let remaining = current_scene.timeout_turns.saturating_sub(turn_count);
    let mentions: Vec<String> = personas.iter().map(|p| format!("@{}", p.mention_id())).collect();
    format!(
        "Goal: {}\nTurns remaining in this scene: {remaining}\nYou can address: {}",
        current_scene.user_goal,
        mentions.join(", ")
    )
}

fn generic_nudge(personas: &[sim_domain::entities::Persona]) -> String {
    let mentions: Vec<String> = personas.iter().map(|p| format!("@{}", p.mention_id())).collect();
    if mentions.is_empty() {
        "I'm not sure who that's meant for — try addressing one of the people in this scene directly.".to_string()
    } else {
        format!(
            "I'm not sure who that's meant for. Try addressing someone directly, for example {}.",
            mentions.join(" or ")
        )
    }
}

fn submit_acknowledgement(outcome: &progression::AdvanceOutcome) -> String {
    match &outcome.next_scene {
        Some(next) => format!("Submitted for grading. Moving on to: {}.", next.title),
        None => "Submitted for grading. That was the final scene — the simulation is complete.".to_string(),
    }
}
