//! Scene Progression Engine (C5): the single authority for scene state
//! transitions.
//!
//! Rule order (first true wins), per spec §4.5:
//! 1. Timeout reached and the validator did NOT judge the goal achieved ->
//!    forced progression, `goal_achieved=false` (unless a prior turn in
//!    this scene already achieved it — that flag is never un-set).
//! 2. Timeout reached and the validator DID judge the goal achieved ->
//!    natural progression, `forced_progression=false`.
//! 3. Timeout not reached and the validator wants to progress -> the
//!    signal is discarded; the learner continues in the scene. This is the
//!    "turn budget wins" policy (spec §9), a deliberate, non-configurable
//!    choice.
//! 4. Timeout not reached and the validator wants a hint -> the hint is
//!    surfaced and `hints_used` increments; no scene transition.
//! 5. Otherwise -> continue in scene, no change.
//!
//! Rules 1 and 2 share the same trigger (`turn_count >= timeout_turns`);
//! they're kept as two branches rather than one so the `forced_progression`
//! / `goal_achieved` distinction spec's design notes call out stays
//! observable, instead of collapsing to "always forced" the moment the
//! budget is hit.

use chrono::{DateTime, Utc};
use sim_domain::entities::{Scene, SceneProgressStatus};
use sim_domain::trace::TraceEvent;
use sim_store::TurnCtx;
use uuid::Uuid;

use crate::validator::{NextAction, ValidatorDecision};

#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    pub forced: bool,
    pub simulation_complete: bool,
    pub next_scene: Option<Scene>,
}

#[derive(Debug, Clone)]
pub enum ProgressionResult {
    /// No scene transition. `hint` is `Some` when a hint was surfaced.
    Continued { hint: Option<String> },
    Advanced(AdvanceOutcome),
}

/// Mark the current scene's `SceneProgress` completed and either move to
/// the next scene by `scene_order`, or complete the run if none exists.
/// Shared by timeout-forced advancement, validator-earned advancement, and
/// the `submit` control class.
fn advance(
    ctx: &mut TurnCtx,
    scenario_scenes: &[Scene],
    current_scene: &Scene,
    forced: bool,
    goal_achieved_this_turn: bool,
    now: DateTime<Utc>,
) -> AdvanceOutcome {
    let progress_id = ctx.progress.id;

    if let Some(sp) = ctx.scene_progress_mut(current_scene.id) {
        sp.status = SceneProgressStatus::Completed;
        sp.forced_progression = forced;
        sp.goal_achieved = sp.goal_achieved || goal_achieved_this_turn;
        sp.completed_at = Some(now);
    }
    ctx.progress.mark_scene_completed(current_scene.id);
    if forced {
        ctx.progress.forced_progressions += 1;
    }

    let next_scene = scenario_scenes
        .iter()
        .filter(|s| s.scene_order > current_scene.scene_order)
        .min_by_key(|s| s.scene_order)
        .cloned();

    let outcome = match &next_scene {
        Some(next) => {
            ctx.progress.current_scene_id = Some(next.id);
            ctx.progress.orchestrator_data.state.current_scene_id = Some(next.id);
            ctx.progress.orchestrator_data.state.current_scene_index += 1;
            ctx.progress.orchestrator_data.state.turn_count = 0;
            ctx.start_scene_progress(next.id, now);
            AdvanceOutcome {
                forced,
                simulation_complete: false,
                next_scene: Some(next.clone()),
            }
        }
        None => {
            ctx.progress.status = sim_domain::entities::ProgressStatus::Completed;
            ctx.progress.completed_at = Some(now);
            ctx.progress.orchestrator_data.state.turn_count = 0;
            AdvanceOutcome {
                forced,
                simulation_complete: true,
                next_scene: None,
            }
        }
    };

    TraceEvent::SceneAdvanced {
        progress_id,
        from_scene: current_scene.id,
        to_scene: outcome.next_scene.as_ref().map(|s| s.id),
        forced,
    }
    .emit();
    outcome
}

/// Evaluate the progression rules after a real user turn (`mention` or
/// `plain` class) and apply whatever transition results.
pub fn evaluate_after_user_turn(
    ctx: &mut TurnCtx,
    scenario_scenes: &[Scene],
    current_scene: &Scene,
    decision: &ValidatorDecision,
    now: DateTime<Utc>,
) -> ProgressionResult {
    let turn_count = ctx.progress.orchestrator_data.state.turn_count;
    let timeout_reached = turn_count >= current_scene.timeout_turns;
    let validator_wants_progress = decision.should_progress
        || matches!(decision.next_action, NextAction::Progress | NextAction::ForceProgress);

    if timeout_reached {
        if validator_wants_progress {
            return ProgressionResult::Advanced(advance(ctx, scenario_scenes, current_scene, false, true, now));
        }
        return ProgressionResult::Advanced(advance(ctx, scenario_scenes, current_scene, true, false, now));
    }

    if matches!(decision.next_action, NextAction::Hint) {
        ctx.progress.hints_used += 1;
        if let Some(sp) = ctx.scene_progress_mut(current_scene.id) {
            sp.hints_used += 1;
        }
        return ProgressionResult::Continued {
            hint: decision.hint_message.clone(),
        };
    }

    ProgressionResult::Continued { hint: None }
}

/// Explicit manual advance via the `/simulation/progress` endpoint: the
/// caller asserts `goal_achieved`/`forced_progression` directly rather than
/// going through the validator. Reuses the same advancement primitive so
/// the resulting state is indistinguishable from a validator- or
/// timeout-driven transition.
pub fn manual_advance(
    ctx: &mut TurnCtx,
    scenario_scenes: &[Scene],
    current_scene: &Scene,
    forced_progression: bool,
    goal_achieved: bool,
    now: DateTime<Utc>,
) -> AdvanceOutcome {
    advance(ctx, scenario_scenes, current_scene, forced_progression, goal_achieved, now)
}

/// Forced progression via the `submit` control class: skips the validator
/// entirely and reuses the same advancement primitive.
pub fn force_submit(
    ctx: &mut TurnCtx,
    scenario_scenes: &[Scene],
    current_scene: &Scene,
    now: DateTime<Utc>,
) -> AdvanceOutcome {
    let already_achieved = ctx
        .scene_progress(current_scene.id)
        .map(|sp| sp.goal_achieved)
        .unwrap_or(false);
    advance(ctx, scenario_scenes, current_scene, false, already_achieved, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sim_domain::entities::{Persona, Scenario, SceneProgressStatus};
    use sim_store::DomainStore;
    use std::collections::HashMap;

    fn seed(store: &DomainStore, timeout_a: u32) -> (Uuid, Uuid, Uuid) {
        let scenario_id = Uuid::new_v4();
        let scene_a = Uuid::new_v4();
        let scene_b = Uuid::new_v4();
        let scenario = Scenario {
            id: scenario_id,
            title: "t".into(),
            description: "d".into(),
            challenge: "c".into(),
            industry: "i".into(),
            learning_objectives: vec!["objective".into()],
            student_role: "analyst".into(),
            created_at: Utc::now(),
        };
        let scenes = vec![
            scene(scene_a, scenario_id, 0, timeout_a),
            scene(scene_b, scenario_id, 1, 5),
        ];
        let persona = Persona {
            id: Uuid::new_v4(),
            scenario_id,
            name: "CFO".into(),
            role: "CFO".into(),
            background: "".into(),
            correlation: "".into(),
            primary_goals: vec![],
            personality_traits: HashMap::new(),
        };
        store.create_scenario(scenario, scenes, vec![persona]).unwrap();
        (scenario_id, scene_a, scene_b)
    }

    fn scene(id: Uuid, scenario_id: Uuid, order: i32, timeout: u32) -> Scene {
        Scene {
            id,
            scenario_id,
            title: format!("Scene {order}"),
            description: "d".into(),
            user_goal: "goal".into(),
            success_metric: Some("metric".into()),
            scene_order: order,
            timeout_turns: timeout,
            max_attempts: 5,
            personas_involved: vec![],
        }
    }

    fn decision(should_progress: bool, next_action: NextAction) -> ValidatorDecision {
        ValidatorDecision {
            goal_achieved: should_progress,
            confidence_score: 1.0,
            reasoning: "r".into(),
            next_action,
            hint_message: Some("try again".into()),
            should_progress,
        }
    }

    #[test]
    fn timeout_without_validator_agreement_is_forced_and_not_achieved() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, scene_a, scene_b) = seed(&store, 2);
        let progress = store.start_simulation("u1", scenario_id).unwrap();
        let scenes = store.scenes_for_scenario(scenario_id).unwrap();
        let scene_a_obj = scenes.iter().find(|s| s.id == scene_a).unwrap().clone();

        let outcome = store
            .run_turn_transaction(progress.id, |ctx| {
                ctx.progress.orchestrator_data.state.turn_count = 2;
                let result = evaluate_after_user_turn(
                    ctx,
                    &scenes,
                    &scene_a_obj,
                    &decision(false, NextAction::Continue),
                    Utc::now(),
                );
                Ok(result)
            })
            .unwrap();

        match outcome {
            ProgressionResult::Advanced(a) => {
                assert!(a.forced);
                assert_eq!(a.next_scene.unwrap().id, scene_b);
            }
            _ => panic!("expected advancement"),
        }
        let sp = store.get_scene_progress(progress.id, scene_a).unwrap();
        assert_eq!(sp.status, SceneProgressStatus::Completed);
        assert!(!sp.goal_achieved);
        assert!(sp.forced_progression);

        let progress_after = store.get_progress(progress.id).unwrap();
        assert_eq!(progress_after.current_scene_id, Some(scene_b));
        assert_eq!(progress_after.orchestrator_data.state.turn_count, 0);
    }

    #[test]
    fn timeout_with_validator_agreement_is_natural_progression() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, scene_a, _scene_b) = seed(&store, 1);
        let progress = store.start_simulation("u1", scenario_id).unwrap();
        let scenes = store.scenes_for_scenario(scenario_id).unwrap();
        let scene_a_obj = scenes.iter().find(|s| s.id == scene_a).unwrap().clone();

        store
            .run_turn_transaction(progress.id, |ctx| {
                ctx.progress.orchestrator_data.state.turn_count = 1;
                Ok(evaluate_after_user_turn(
                    ctx,
                    &scenes,
                    &scene_a_obj,
                    &decision(true, NextAction::Progress),
                    Utc::now(),
                ))
            })
            .unwrap();

        let sp = store.get_scene_progress(progress.id, scene_a).unwrap();
        assert!(sp.goal_achieved);
        assert!(!sp.forced_progression);
    }

    #[test]
    fn validator_progress_before_timeout_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, scene_a, _) = seed(&store, 5);
        let progress = store.start_simulation("u1", scenario_id).unwrap();
        let scenes = store.scenes_for_scenario(scenario_id).unwrap();
        let scene_a_obj = scenes.iter().find(|s| s.id == scene_a).unwrap().clone();

        let result = store
            .run_turn_transaction(progress.id, |ctx| {
                ctx.progress.orchestrator_data.state.turn_count = 1;
                Ok(evaluate_after_user_turn(
                    ctx,
                    &scenes,
                    &scene_a_obj,
                    &decision(true, NextAction::Progress),
                    Utc::now(),
                ))
            })
            .unwrap();

        assert!(matches!(result, ProgressionResult::Continued { hint: None }));
        let progress_after = store.get_progress(progress.id).unwrap();
        assert_eq!(progress_after.current_scene_id, Some(scene_a));
    }

    #[test]
    fn hint_action_surfaces_hint_and_increments_counter() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, scene_a, _) = seed(&store, 5);
        let progress = store.start_simulation("u1", scenario_id).unwrap();
        let scenes = store.scenes_for_scenario(scenario_id).unwrap();
        let scene_a_obj = scenes.iter().find(|s| s.id == scene_a).unwrap().clone();

        let result = store
            .run_turn_transaction(progress.id, |ctx| {
                ctx.progress.orchestrator_data.state.turn_count = 1;
                Ok(evaluate_after_user_turn(
                    ctx,
                    &scenes,
                    &scene_a_obj,
                    &decision(false, NextAction::Hint),
                    Utc::now(),
                ))
            })
            .unwrap();

        match result {
            ProgressionResult::Continued { hint } => assert_eq!(hint.as_deref(), Some("try again")),
            _ => panic!("expected a hint, no transition"),
        }
        let progress_after = store.get_progress(progress.id).unwrap();
        assert_eq!(progress_after.hints_used, 1);
    }

    #[test]
    fn force_submit_advances_regardless_of_turn_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, scene_a, scene_b) = seed(&store, 10);
        let progress = store.start_simulation("u1", scenario_id).unwrap();
        let scenes = store.scenes_for_scenario(scenario_id).unwrap();
        let scene_a_obj = scenes.iter().find(|s| s.id == scene_a).unwrap().clone();

        let outcome = store
            .run_turn_transaction(progress.id, |ctx| {
                ctx.progress.orchestrator_data.state.turn_count = 1;
                Ok(force_submit(ctx, &scenes, &scene_a_obj, Utc::now()))
            })
            .unwrap();

        assert!(!outcome.forced);
        assert_eq!(outcome.next_scene.unwrap().id, scene_b);
        let progress_after = store.get_progress(progress.id).unwrap();
        assert_eq!(progress_after.current_scene_id, Some(scene_b));
    }

    #[test]
    fn advancing_past_last_scene_completes_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, _scene_a, scene_b) = seed(&store, 5);
        let progress = store.start_simulation("u1", scenario_id).unwrap();
        let scenes = store.scenes_for_scenario(scenario_id).unwrap();
        let scene_b_obj = scenes.iter().find(|s| s.id == scene_b).unwrap().clone();

        let outcome = store
            .run_turn_transaction(progress.id, |ctx| {
                ctx.progress.current_scene_id = Some(scene_b);
                ctx.start_scene_progress(scene_b, Utc::now());
                ctx.progress.orchestrator_data.state.turn_count = 5;
                Ok(evaluate_after_user_turn(
                    ctx,
                    &scenes,
                    &scene_b_obj,
                    &decision(false, NextAction::Continue),
                    Utc::now(),
                ))
            })
            .unwrap();

        match outcome {
            ProgressionResult::Advanced(a) => assert!(a.simulation_complete),
            _ => panic!("expected completion"),
        }
        let progress_after = store.get_progress(progress.id).unwrap();
        assert_eq!(progress_after.status, sim_domain::entities::ProgressStatus::Completed);
        assert!(progress_after.completed_at.is_some());
    }
}
