use std::sync::Arc;

use sim_domain::config::Config;
use sim_providers::registry::ProviderRegistry;
use sim_store::{DomainStore, ProgressLockMap};

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<DomainStore>,
    pub providers: Arc<ProviderRegistry>,
    pub progress_locks: Arc<ProgressLockMap>,
    pub context_window_turns: usize,
}
