//! Module override lookup.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::HandlerError;
use crate::interceptor::handlers::HandlerSet;

/// Produces the handler set behind a module override file.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// `file` is the resolved override file; `route` is its path relative
    /// to the override root, without extension (e.g. `api/users`).
    async fn load(&self, file: &Path, route: &str) -> Result<Arc<HandlerSet>, HandlerError>;
}

/// In-process registry of handler sets keyed by route.
///
/// The file on disk marks the route as overridden; the handlers come from
/// whatever registered them at startup.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: DashMap<String, Arc<HandlerSet>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register handlers for a route (`"/api/users"` and `"api/users"` are
    /// the same route).
    pub fn register(&self, route: &str, handlers: HandlerSet) {
        self.modules
            .insert(normalize_route(route), Arc::new(handlers));
    }

    /// Number of registered routes.
    pub(crate) fn len(&self) -> usize {
        self.modules.len()
    }
}

#[async_trait]
impl ModuleLoader for ModuleRegistry {
    async fn load(&self, _file: &Path, route: &str) -> Result<Arc<HandlerSet>, HandlerError> {
        let route = normalize_route(route);
        self.modules
            .get(&route)
            .map(|entry| entry.value().clone())
            .ok_or(HandlerError::NotRegistered(route))
    }
}

fn normalize_route(route: &str) -> String {
    route.trim_matches('/').to_string()
}
