use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Load config from a TOML file if given, or the `SIM_CONFIG` env var if
/// set, falling back to defaults. Mirrors the teacher's "config is optional,
/// the service still boots" posture.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let resolved = path
        .map(PathBuf::from)
        .or_else(|| std::env::var("SIM_CONFIG").ok().map(PathBuf::from));

    match resolved {
        Some(p) => {
            let raw = std::fs::read_to_string(&p)?;
            toml::from_str(&raw).map_err(|e| Error::Validation(format!("invalid config at {}: {e}", p.display())))
        }
        None => Ok(Config::default()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (not recommended).
    /// Entries ending `:*` allow any numeric port on that origin prefix.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the JSON-backed domain store's persisted files.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "provider_id/model" used for in-character persona replies and
    /// post-hoc grading (spec: "one chat model for personas and grading").
    #[serde(default = "d_persona_model")]
    pub persona_model: String,
    /// "provider_id/model" used for the goal validator's structured tool
    /// call (spec: "a cheaper chat-tool-capable model is acceptable").
    #[serde(default = "d_validator_model")]
    pub validator_model: String,
    #[serde(default = "d_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "d_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            persona_model: d_persona_model(),
            validator_model: d_validator_model(),
            default_timeout_ms: d_timeout_ms(),
            max_retries: d_retries(),
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Simulation tunables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "d_timeout_turns")]
    pub default_timeout_turns: u32,
    #[serde(default = "d_max_attempts")]
    pub default_max_attempts: u32,
    /// Number of recent turns included in the persona's context window
    /// (spec: "N ≈ 6-10").
    #[serde(default = "d_context_window")]
    pub context_window_turns: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_timeout_turns: d_timeout_turns(),
            default_max_attempts: d_max_attempts(),
            context_window_turns: d_context_window(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Default value helpers (serde)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn d_port() -> u16 {
    8080
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
fn d_persona_model() -> String {
    "openai/gpt-4o".into()
}
fn d_validator_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn d_timeout_ms() -> u64 {
    20_000
}
fn d_retries() -> u32 {
    2
}
fn d_timeout_turns() -> u32 {
    crate::entities::DEFAULT_TIMEOUT_TURNS
}
fn d_max_attempts() -> u32 {
    crate::entities::DEFAULT_MAX_ATTEMPTS
}
fn d_context_window() -> usize {
    8
}
