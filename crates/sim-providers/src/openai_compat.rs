//! OpenAI-compatible adapter. Works with OpenAI, Azure-compatible proxies,
//! Ollama, vLLM, and anything else that follows the OpenAI chat-completions
//! wire format.

use sim_domain::tool::{Message, MessageContent, Role, ToolCall, ToolDefinition};
use sim_domain::{Error, Result};

use crate::traits::{ChatCompletion, ChatOptions, LlmProvider, Usage};

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("reqwest client builds with a static config");
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(url).header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        req
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn messages_to_openai(messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                let MessageContent::Text(text) = &m.content;
                serde_json::json!({ "role": role, "content": text })
            })
            .collect()
    }

    async fn send(&self, body: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .authed_post(&self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("request to {} failed: {e}", self.id)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Llm(format!(
                "{} returned {status}: {text}",
                self.id
            )));
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| Error::Llm(format!("malformed response from {}: {e}", self.id)))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, messages: &[Message], opts: &ChatOptions) -> Result<ChatCompletion> {
        let mut body = serde_json::json!({
            "model": opts.model,
            "messages": Self::messages_to_openai(messages),
        });
        if let Some(t) = opts.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = opts.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }

        let value = self.send(body).await?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Llm(format!("{}: no content in response", self.id)))?
            .to_string();
        let usage = Usage {
            prompt_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };
        Ok(ChatCompletion { content, usage })
    }

    async fn chat_tool(
        &self,
        messages: &[Message],
        tool: &ToolDefinition,
        opts: &ChatOptions,
    ) -> Result<ToolCall> {
        let body = serde_json::json!({
            "model": opts.model,
            "messages": Self::messages_to_openai(messages),
            "tools": [{
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            }],
            "tool_choice": { "type": "function", "function": { "name": tool.name } },
        });

        let value = self.send(body).await?;
        let call = &value["choices"][0]["message"]["tool_calls"][0];
        let call_id = call["id"].as_str().unwrap_or_default().to_string();
        let arguments_raw = call["function"]["arguments"].as_str().unwrap_or("{}");
        let arguments: serde_json::Value = serde_json::from_str(arguments_raw)
            .map_err(|e| Error::Llm(format!("{}: malformed tool arguments: {e}", self.id)))?;

        Ok(ToolCall {
            call_id,
            tool_name: tool.name.clone(),
            arguments,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
