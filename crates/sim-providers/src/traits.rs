use sim_domain::tool::{Message, ToolCall, ToolDefinition};
use sim_domain::Result;

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Usage,
}

/// The one operation the core needs from an LLM: "chat completion with
/// optional structured tool call", provider-agnostic (spec §6).
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Plain chat completion — used for in-character persona replies and
    /// for grading prose.
    async fn chat(&self, messages: &[Message], opts: &ChatOptions) -> Result<ChatCompletion>;

    /// Chat completion forced to call `tool` — used by the goal validator
    /// for its fixed structured decision schema.
    async fn chat_tool(
        &self,
        messages: &[Message],
        tool: &ToolDefinition,
        opts: &ChatOptions,
    ) -> Result<ToolCall>;

    fn provider_id(&self) -> &str;
}
