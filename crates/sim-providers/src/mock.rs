//! Deterministic provider used by engine tests — never makes a network
//! call. Canned responses are configured per-instance so tests can drive
//! exact validator/grader decisions without a real model.

use parking_lot::Mutex;
use sim_domain::tool::{Message, ToolCall, ToolDefinition};
use sim_domain::Result;

use crate::traits::{ChatCompletion, ChatOptions, LlmProvider, Usage};

pub struct MockProvider {
    id: String,
    chat_replies: Mutex<Vec<String>>,
    tool_replies: Mutex<Vec<serde_json::Value>>,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            chat_replies: Mutex::new(Vec::new()),
            tool_replies: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain-text reply to be returned by the next `chat()` call.
    pub fn push_chat_reply(&self, text: impl Into<String>) {
        self.chat_replies.lock().push(text.into());
    }

    /// Queue a structured tool-call argument object to be returned by the
    /// next `chat_tool()` call.
    pub fn push_tool_reply(&self, arguments: serde_json::Value) {
        self.tool_replies.lock().push(arguments);
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    async fn chat(&self, _messages: &[Message], _opts: &ChatOptions) -> Result<ChatCompletion> {
        let mut replies = self.chat_replies.lock();
        let content = if replies.is_empty() {
            "Thanks for reaching out — let's continue.".to_string()
        } else {
            replies.remove(0)
        };
        Ok(ChatCompletion {
            content,
            usage: Usage::default(),
        })
    }

    async fn chat_tool(
        &self,
        _messages: &[Message],
        tool: &ToolDefinition,
        _opts: &ChatOptions,
    ) -> Result<ToolCall> {
        let mut replies = self.tool_replies.lock();
        let arguments = if replies.is_empty() {
            serde_json::json!({
                "goal_achieved": false,
                "confidence_score": 0.0,
                "reasoning": "no mock response queued",
                "next_action": "continue",
                "should_progress": false,
            })
        } else {
            replies.remove(0)
        };
        Ok(ToolCall {
            call_id: "mock-call".into(),
            tool_name: tool.name.clone(),
            arguments,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
