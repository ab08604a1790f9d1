//! Goal Validator (C4): LLM-as-judge on the last user turn.
//!
//! Judges only the scene's success metric (secondarily its goal); learning
//! objectives are explicitly excluded from this decision (spec §4.4/§8).

use sim_domain::entities::{ConversationLog, Scenario, Scene};
use sim_domain::tool::{Message, ToolDefinition};
use sim_domain::trace::TraceEvent;
use sim_providers::{ChatOptions, LlmProvider};
use uuid::Uuid;

/// Generic acknowledgements that never count as a goal-directed attempt,
/// regardless of scene. Checked before any LLM call.
const GENERIC_REPLIES: &[&str] = &["test", "hello", "ok", "hi", "thanks", "hey", "goodbye", "bye"];
const SHORT_REPLY_THRESHOLD: usize = 3;

const FALLBACK_HINT: &str =
    "Please provide a response that directly addresses the scene's goal and aligns with the success metric.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Continue,
    Progress,
    Hint,
    ForceProgress,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ValidatorDecision {
    pub goal_achieved: bool,
    pub confidence_score: f32,
    #[serde(default)]
    pub reasoning: String,
    pub next_action: NextAction,
    #[serde(default)]
    pub hint_message: Option<String>,
    #[serde(default)]
    pub should_progress: bool,
}

impl ValidatorDecision {
    fn continue_fallback(reasoning: impl Into<String>) -> Self {
        Self {
            goal_achieved: false,
            confidence_score: 0.0,
            reasoning: reasoning.into(),
            next_action: NextAction::Continue,
            hint_message: None,
            should_progress: false,
        }
    }
}

/// The pre-check that skips the LLM entirely for trivially non-substantive
/// replies (spec §4.4). Returns `None` when the LLM must be consulted.
pub fn pre_check(user_text: &str) -> Option<ValidatorDecision> {
    let trimmed = user_text.trim();
    let is_generic = GENERIC_REPLIES
        .iter()
        .any(|candidate| trimmed.eq_ignore_ascii_case(candidate));
    if trimmed.chars().count() < SHORT_REPLY_THRESHOLD || is_generic {
        return Some(ValidatorDecision {
            hint_message: Some(FALLBACK_HINT.to_string()),
            ..ValidatorDecision::continue_fallback("reply too short or generic to evaluate")
        });
    }
    None
}

fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "record_goal_validation".to_string(),
        description: "Record whether the learner's last message achieved the scene's success metric.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "goal_achieved": {"type": "boolean"},
                "confidence_score": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                "reasoning": {"type": "string"},
                "next_action": {"type": "string", "enum": ["continue", "progress", "hint", "force_progress"]},
                "hint_message": {"type": "string"},
                "should_progress": {"type": "boolean"},
            },
            "required": ["goal_achieved", "confidence_score", "reasoning", "next_action", "should_progress"],
        }),
    }
}

fn system_prompt(scene: &Scene, scenario: &Scenario, attempts: u32) -> String {
    format!(
        "You are judging whether a learner's message in a business simulation achieves a scene's \
         success metric. Judge ONLY this success metric: \"{metric}\". The scene goal (\"{goal}\") is \
         a secondary signal; the scenario's learning objectives are explicitly out of scope for this \
         judgment. Be moderately lenient: an on-topic, good-faith attempt should pass. Only mark the \
         goal as not achieved when the reply is off-topic or generic. When you reject an attempt, your \
         reasoning must explain why it falls short, not quote the learner's text verbatim. The learner \
         has made {attempts} attempt(s) in this scene so far; this is context only, not a reason to \
         pass or fail on its own.",
        metric = scene.effective_success_metric(scenario),
        goal = scene.user_goal,
    )
}

fn clamp_confidence(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Judge the learner's last turn. Never fails: a pre-check match, an LLM
/// fault, or malformed structured output all resolve to a safe "continue"
/// decision (spec §4.4/§7).
pub async fn validate(
    provider: &dyn LlmProvider,
    opts: &ChatOptions,
    scene: &Scene,
    scenario: &Scenario,
    attempts: u32,
    recent_turns: &[ConversationLog],
    user_text: &str,
    progress_id: Uuid,
) -> ValidatorDecision {
    if let Some(decision) = pre_check(user_text) {
        return decision;
    }

    let mut messages = vec![Message::system(system_prompt(scene, scenario, attempts))];
    for turn in recent_turns {
        messages.push(Message::user(format!(
            "{}: {}",
            turn.sender_name, turn.message_content
        )));
    }
    messages.push(Message::user(user_text));

    let tool = tool_definition();
    match provider.chat_tool(&messages, &tool, opts).await {
        Ok(call) => match serde_json::from_value::<ValidatorDecision>(call.arguments) {
            Ok(mut decision) => {
                decision.confidence_score = clamp_confidence(decision.confidence_score);
                decision
            }
            Err(err) => {
                TraceEvent::ValidatorFallback {
                    progress_id,
                    reason: format!("malformed validator output: {err}"),
                }
                .emit();
                ValidatorDecision::continue_fallback(format!("malformed validator output: {err}"))
            }
        },
        Err(err) => {
            TraceEvent::ValidatorFallback {
                progress_id,
                reason: format!("validator call failed: {err}"),
            }
            .emit();
            ValidatorDecision::continue_fallback(format!("validator call failed: {err}"))
        }
    }
}
