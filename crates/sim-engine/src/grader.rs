//! Grader (C7): post-hoc per-scene and overall evaluation of a finished run.
//!
//! Per-scene grading judges only the scene's success metric (learning
//! objectives are explicitly excluded, spec §4.7/§8); only the overall
//! feedback call sees the full learning-objectives list, and its own
//! suggested score is always discarded in favor of the arithmetic mean.

use sim_domain::entities::SUBMIT_FOR_GRADING;
use sim_domain::tool::Message;
use sim_domain::Result;
use sim_providers::{ChatOptions, LlmProvider};
use sim_store::DomainStore;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SceneGrade {
    pub scene_id: Uuid,
    pub title: String,
    pub objective: String,
    pub user_responses: Vec<String>,
    pub score: u8,
    pub feedback: String,
    pub teaching_notes: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct GradeReport {
    pub overall_score: u8,
    pub overall_feedback: String,
    pub scenes: Vec<SceneGrade>,
}

#[derive(Debug, serde::Deserialize)]
struct SceneScoreResponse {
    score: u8,
    feedback: String,
}

#[derive(Debug, serde::Deserialize)]
struct OverallFeedbackResponse {
    overall_feedback: String,
}

/// Best-effort extraction of a JSON object embedded in prose — models
/// asked for "just JSON" sometimes wrap it in commentary.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

async fn grade_scene(
    provider: &dyn LlmProvider,
    opts: &ChatOptions,
    objective: &str,
    responses: &[String],
    fallback_score: u8,
) -> (u8, String) {
    let prompt = format!(
        "Grade ONLY whether this success metric was met: \"{objective}\". Ignore learning \
         outcomes. Be moderately lenient: on-topic, good-faith attempts should score 60 or above. \
         Completely off-topic or irrelevant responses should score very low. The learner's \
         responses in this scene, in order:\n{responses}\n\nReturn strict JSON: {{\"score\": \
         <0-100 integer>, \"feedback\": \"<short explanation>\"}}.",
        responses = responses
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}", i + 1, r))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    let messages = vec![Message::user(prompt)];

    match provider.chat(&messages, opts).await {
        Ok(completion) => match extract_json_object(&completion.content)
            .and_then(|json| serde_json::from_str::<SceneScoreResponse>(json).ok())
        {
            Some(parsed) => (parsed.score.min(100), parsed.feedback),
            None => (
                fallback_score,
                "automated grading output could not be parsed; using recorded progress score"
                    .to_string(),
            ),
        },
        Err(_) => (
            fallback_score,
            "automated grading was unavailable; using recorded progress score".to_string(),
        ),
    }
}

/// Grade a completed (or in-progress) run: per-scene scores against each
/// scene's success metric, and an overall LLM-written narrative against the
/// scenario's learning objectives. The reported overall number is always
/// the arithmetic mean of per-scene scores — the LLM's own opinion of the
/// overall score, if any, is discarded.
pub async fn grade(
    store: &DomainStore,
    provider: &dyn LlmProvider,
    opts: &ChatOptions,
    progress_id: Uuid,
) -> Result<GradeReport> {
    let progress = store.get_progress(progress_id)?;
    let scenario = store.get_scenario(progress.scenario_id)?;
    let scenes = store.scenes_for_scenario(scenario.id)?;

    let mut scene_grades = Vec::with_capacity(scenes.len());
    let mut all_user_responses: Vec<String> = Vec::new();

    for scene in &scenes {
        let turns = store.turns_for_scene(progress_id, scene.id);
        let responses: Vec<String> = turns
            .iter()
            .filter(|t| {
                t.message_type == sim_domain::entities::MessageType::User
                    && t.message_content != SUBMIT_FOR_GRADING
            })
            .map(|t| t.message_content.clone())
            .collect();
        all_user_responses.extend(responses.iter().cloned());

        let objective = scene.effective_success_metric(&scenario).to_string();
        let fallback_score = store
            .get_scene_progress(progress_id, scene.id)
            .ok()
            .and_then(|sp| sp.goal_achievement_score)
            .unwrap_or(0);

        let (score, feedback) = if responses.is_empty() {
            (
                fallback_score,
                "the learner had no substantive responses to grade in this scene".to_string(),
            )
        } else {
            grade_scene(provider, opts, &objective, &responses, fallback_score).await
        };

        scene_grades.push(SceneGrade {
            scene_id: scene.id,
            title: scene.title.clone(),
            objective,
            user_responses: responses,
            score,
            feedback,
            teaching_notes: String::new(),
        });
    }

    let overall_score = if scene_grades.is_empty() {
        0
    } else {
        let sum: u32 = scene_grades.iter().map(|s| s.score as u32).sum();
        ((sum as f64 / scene_grades.len() as f64).round()) as u8
    };

    let overall_feedback = overall_feedback(provider, opts, &scenario.learning_objectives, &all_user_responses).await;

    sim_domain::trace::TraceEvent::GradeCompleted {
        progress_id,
        overall_score,
    }
    .emit();

    Ok(GradeReport {
        overall_score,
        overall_feedback,
        scenes: scene_grades,
    })
}

async fn overall_feedback(
    provider: &dyn LlmProvider,
    opts: &ChatOptions,
    learning_objectives: &[String],
    all_user_responses: &[String],
) -> String {
    if all_user_responses.is_empty() {
        return "The learner did not provide any substantive responses to evaluate.".to_string();
    }
    let prompt = format!(
        "A learner completed a business simulation with these learning objectives:\n{objectives}\n\n\
         Here are all of their responses across the simulation, in order:\n{responses}\n\n\
         Write a short overall feedback narrative (2-4 sentences) assessing how well they \
         engaged with the learning objectives. Return strict JSON: {{\"overall_feedback\": \
         \"<narrative>\"}}. Do not include a numeric score; one will be computed separately.",
        objectives = learning_objectives.join("\n- "),
        responses = all_user_responses
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}", i + 1, r))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    let messages = vec![Message::user(prompt)];

    match provider.chat(&messages, opts).await {
        Ok(completion) => extract_json_object(&completion.content)
            .and_then(|json| serde_json::from_str::<OverallFeedbackResponse>(json).ok())
            .map(|parsed| parsed.overall_feedback)
            .unwrap_or_else(|| {
                "Automated feedback could not be parsed; the score above reflects per-scene results.".to_string()
            }),
        Err(_) => {
            "Automated feedback is unavailable right now; the score above reflects per-scene results.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sim_domain::entities::{MessageType, Persona, Scenario, Scene};
    use sim_providers::mock::MockProvider;
    use std::collections::HashMap;

    fn seed(store: &DomainStore) -> (Uuid, Vec<Uuid>) {
        let scenario_id = Uuid::new_v4();
        let scene_ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let scenario = Scenario {
            id: scenario_id,
            title: "t".into(),
            description: "d".into(),
            challenge: "c".into(),
            industry: "i".into(),
            learning_objectives: vec!["Negotiate confidently".into()],
            student_role: "analyst".into(),
            created_at: Utc::now(),
        };
        let scenes: Vec<Scene> = scene_ids
            .iter()
            .enumerate()
            .map(|(i, id)| Scene {
                id: *id,
                scenario_id,
                title: format!("Scene {i}"),
                description: "d".into(),
                user_goal: "goal".into(),
                success_metric: Some(format!("metric {i}")),
                scene_order: i as i32,
                timeout_turns: 5,
                max_attempts: 5,
                personas_involved: vec![],
            })
            .collect();
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
        (scenario_id, scene_ids)
    }

    #[tokio::test]
    async fn overall_score_is_mean_of_scene_scores() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, scene_ids) = seed(&store);
        let progress = store.start_simulation("u1", scenario_id).unwrap();

        let provider = MockProvider::new("mock");
        let scores = [80u8, 60, 40];
        for (i, scene_id) in scene_ids.iter().enumerate() {
            store
                .run_turn_transaction(progress.id, |ctx| {
                    ctx.start_scene_progress(*scene_id, Utc::now());
                    ctx.append_log(
                        *scene_id,
                        MessageType::User,
                        "u1",
                        None,
                        "a good faith attempt",
                        1,
                        None,
                        None,
                        Utc::now(),
                    );
                    Ok(())
                })
                .unwrap();
            provider.push_chat_reply(format!("{{\"score\": {}, \"feedback\": \"ok\"}}", scores[i]));
        }
        // Overall feedback call pops one more reply after the three scene calls.
        provider.push_chat_reply("{\"overall_feedback\": \"Solid engagement overall.\"}".to_string());

        let opts = ChatOptions::default();
        let report = grade(&store, &provider, &opts, progress.id).await.unwrap();
        assert_eq!(report.overall_score, 60);
        assert_eq!(report.scenes.len(), 3);
        assert_eq!(report.overall_feedback, "Solid engagement overall.");
    }

    #[tokio::test]
    async fn scene_with_no_responses_falls_back_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, _scene_ids) = seed(&store);
        let progress = store.start_simulation("u1", scenario_id).unwrap();

        let provider = MockProvider::new("mock");
        let opts = ChatOptions::default();
        let report = grade(&store, &provider, &opts, progress.id).await.unwrap();
        assert_eq!(report.overall_score, 0);
        assert!(report.scenes.iter().all(|s| s.score == 0));
    }

    #[tokio::test]
    async fn submit_sentinel_is_excluded_from_graded_responses() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::load(dir.path()).unwrap();
        let (scenario_id, scene_ids) = seed(&store);
        let progress = store.start_simulation("u1", scenario_id).unwrap();
        let scene_id = scene_ids[0];

        store
            .run_turn_transaction(progress.id, |ctx| {
                ctx.append_log(
                    scene_id,
                    MessageType::User,
                    "u1",
                    None,
                    SUBMIT_FOR_GRADING,
                    1,
                    None,
                    None,
                    Utc::now(),
                );
                Ok(())
            })
            .unwrap();

        let provider = MockProvider::new("mock");
        let opts = ChatOptions::default();
        let report = grade(&store, &provider, &opts, progress.id).await.unwrap();
        let scene0 = report.scenes.iter().find(|s| s.scene_id == scene_id).unwrap();
        assert!(scene0.user_responses.is_empty());
    }
}
