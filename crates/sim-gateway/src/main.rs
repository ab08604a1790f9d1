mod api;
mod cli;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use sim_domain::config::{self, Config, CorsConfig};
use sim_providers::registry::ProviderRegistry;
use sim_store::{DomainStore, ProgressLockMap};

use cli::{Cli, Command, ConfigCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve { config: None }) => {
            init_tracing();
            let cfg = config::load(None).context("loading config")?;
            run_server(Arc::new(cfg)).await
        }
        Some(Command::Serve { config: Some(path) }) => {
            init_tracing();
            let cfg = config::load(Some(&path)).context("loading config")?;
            run_server(Arc::new(cfg)).await
        }
        Some(Command::Seed { input }) => {
            init_tracing();
            let cfg = config::load(None).context("loading config")?;
            seed(&cfg, &input)
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let cfg = config::load(None).context("loading config")?;
            println!("{}", toml::to_string_pretty(&cfg).context("serializing config")?);
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sim_gateway=debug")),
        )
        .json()
        .init();
}

/// A minimal authoring-boundary crossing: load a scenario JSON file (with
/// its scenes and personas) into the store so there is something to run
/// the simulation against. Scenario authoring itself lives upstream.
fn seed(config: &Config, input: &std::path::Path) -> anyhow::Result<()> {
    #[derive(serde::Deserialize)]
    struct SeedFile {
        scenario: sim_domain::entities::Scenario,
        scenes: Vec<sim_domain::entities::Scene>,
        personas: Vec<sim_domain::entities::Persona>,
    }

    let raw = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let seed: SeedFile = serde_json::from_str(&raw).context("parsing seed file")?;
    let store = DomainStore::load(&config.store.state_path).context("opening store")?;
    store
        .create_scenario(seed.scenario, seed.scenes, seed.personas)
        .context("loading scenario into store")?;
    tracing::info!(path = %input.display(), "scenario seeded");
    Ok(())
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("simulation gateway starting");

    // ── Store ──────────────────────────────────────────────────────
    let store = Arc::new(DomainStore::load(&config.store.state_path).context("opening store")?);
    tracing::info!(path = %config.store.state_path.display(), "store ready");

    // ── LLM providers ──────────────────────────────────────────────
    let providers = Arc::new(ProviderRegistry::from_config(&config.llm));
    tracing::info!(persona_model = %config.llm.persona_model, validator_model = %config.llm.validator_model, "provider registry ready");

    // ── Per-progress turn locks ─────────────────────────────────────
    let progress_locks = Arc::new(ProgressLockMap::new());

    let state = AppState {
        config: config.clone(),
        store,
        providers,
        progress_locks: progress_locks.clone(),
        context_window_turns: config.simulation.context_window_turns,
    };

    // ── Periodic idle-lock pruning ───────────────────────────────────
    {
        let progress_locks = progress_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                progress_locks.prune_idle();
            }
        });
    }

    // ── CORS ──────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Router ────────────────────────────────────────────────────
    let app = api::router(state).layer(cors_layer);

    // ── Bind ──────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "simulation gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`). These are expanded into a predicate that
/// matches any port on that host. A literal `"*"` allows all origins.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
