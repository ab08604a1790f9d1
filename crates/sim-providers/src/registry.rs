//! Resolves a provider + model for one of this system's three fixed LLM
//! roles, narrower than the teacher's open-ended role map because spec §6
//! only ever names two models (persona/grading, validator).

use std::collections::HashMap;
use std::sync::Arc;

use sim_domain::config::LlmConfig;
use sim_domain::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::{ChatOptions, LlmProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// In-character persona replies and post-hoc grading.
    Persona,
    /// The goal validator's structured tool call.
    Validator,
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    persona_model: String,
    validator_model: String,
    default_timeout_ms: u64,
}

impl ProviderRegistry {
    /// Build a registry from config, constructing one `OpenAiCompatProvider`
    /// per configured provider entry. `api_key_env` (if set) is read once at
    /// startup — this never happens again per-request.
    pub fn from_config(cfg: &LlmConfig) -> Self {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        for p in &cfg.providers {
            let api_key = p
                .api_key_env
                .as_ref()
                .and_then(|env| std::env::var(env).ok());
            let provider = OpenAiCompatProvider::new(p.id.clone(), p.base_url.clone(), api_key);
            providers.insert(p.id.clone(), Arc::new(provider));
        }
        Self {
            providers,
            persona_model: cfg.persona_model.clone(),
            validator_model: cfg.validator_model.clone(),
            default_timeout_ms: cfg.default_timeout_ms,
        }
    }

    /// Register a provider directly — used by tests to install a
    /// `MockProvider` without going through config.
    pub fn with_provider(mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(id.into(), provider);
        self
    }

    /// Resolve the provider and model name configured for `role`, in the
    /// "provider_id/model" shape.
    pub fn resolve(&self, role: Role) -> Result<(Arc<dyn LlmProvider>, ChatOptions)> {
        let spec = match role {
            Role::Persona => &self.persona_model,
            Role::Validator => &self.validator_model,
        };
        let (provider_id, model) = spec
            .split_once('/')
            .ok_or_else(|| Error::Other(format!("malformed model spec: {spec}")))?;
        let provider = self
            .providers
            .get(provider_id)
            .cloned()
            .ok_or_else(|| Error::Llm(format!("no provider registered for id {provider_id}")))?;
        let opts = ChatOptions {
            model: model.to_string(),
            temperature: None,
            max_tokens: None,
            timeout_ms: Some(self.default_timeout_ms),
        };
        Ok((provider, opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[test]
    fn resolve_unknown_provider_errors() {
        let cfg = LlmConfig {
            persona_model: "missing/gpt".into(),
            validator_model: "missing/gpt".into(),
            default_timeout_ms: 1000,
            max_retries: 0,
            providers: vec![],
        };
        let registry = ProviderRegistry::from_config(&cfg);
        assert!(registry.resolve(Role::Persona).is_err());
    }

    #[test]
    fn resolve_returns_registered_mock() {
        let cfg = LlmConfig {
            persona_model: "mock/gpt-test".into(),
            validator_model: "mock/gpt-test".into(),
            default_timeout_ms: 1000,
            max_retries: 0,
            providers: vec![],
        };
        let registry = ProviderRegistry::from_config(&cfg)
            .with_provider("mock", std::sync::Arc::new(MockProvider::new("mock")));
        let (provider, opts) = registry.resolve(Role::Validator).unwrap();
        assert_eq!(provider.provider_id(), "mock");
        assert_eq!(opts.model, "gpt-test");
    }
}
