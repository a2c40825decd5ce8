//! Override handler sets.
//!
//! A module override is a [`HandlerSet`]: handlers keyed by lower-case
//! method name, plus an optional `all` handler used when no method key
//! matches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;

use crate::error::{GatewayError, HandlerError};
use crate::pipeline::{Exchange, Next};

/// Key of the catch-all handler.
pub const ALL: &str = "all";

/// A local override for one route.
///
/// Handlers may answer the request, or call `next` to continue down the
/// chain (for example to let the upstream answer after adjusting the path).
#[async_trait]
pub trait OverrideHandler: Send + Sync {
    async fn call(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), GatewayError>;
}

/// Adapts a synchronous closure that always answers.
pub struct FnHandler<F>(F);

/// Wrap a closure as an [`OverrideHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&mut Exchange) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F> OverrideHandler for FnHandler<F>
where
    F: Fn(&mut Exchange) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn call(&self, exchange: &mut Exchange, _next: Next<'_>) -> Result<(), GatewayError> {
        (self.0)(exchange).map_err(GatewayError::from)
    }
}

/// Handlers exported by one module override.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<String, Arc<dyn OverrideHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one method.
    pub fn on<H: OverrideHandler + 'static>(mut self, method: Method, handler: H) -> Self {
        self.handlers
            .insert(method.as_str().to_ascii_lowercase(), Arc::new(handler));
        self
    }

    /// Handle every method without its own handler.
    pub fn all<H: OverrideHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.insert(ALL.to_string(), Arc::new(handler));
        self
    }

    /// Pick the handler for `method`, falling back to `all`.
    pub fn resolve(&self, method: &Method) -> Option<(String, Arc<dyn OverrideHandler>)> {
        let key = method.as_str().to_ascii_lowercase();
        if let Some(handler) = self.handlers.get(&key) {
            return Some((key, handler.clone()));
        }
        self.handlers
            .get(ALL)
            .map(|handler| (ALL.to_string(), handler.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("HandlerSet").field("keys", &keys).finish()
    }
}
