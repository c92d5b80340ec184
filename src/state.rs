//! Shared application state for all routes. The client owns the session; caches are process-wide.

use crate::cache::ModelNameCache;
use crate::config::{Environment, ModelNames};
use crate::edf::EdfClient;
use crate::lists::LookupLists;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<EdfClient>,
    pub model_names: ModelNameCache,
    /// Loaded once at startup; immutable afterwards.
    pub lists: Arc<LookupLists>,
    pub models: Arc<ModelNames>,
    pub env: Environment,
}

impl AppState {
    pub fn new(client: EdfClient, lists: LookupLists, models: ModelNames) -> Self {
        AppState {
            client: Arc::new(client),
            model_names: ModelNameCache::new(),
            lists: Arc::new(lists),
            models: Arc::new(models),
            env: Environment::Development,
        }
    }

    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }
}
