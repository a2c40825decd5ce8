//! Gateway assembly.
//!
//! # Data Flow
//! ```text
//! GatewayConfig + programmatic hooks (modules, stages, filter, rewrite)
//!     → GatewayBuilder::build
//!     → Pipeline: [before stages] → Interceptor → StaticFallback → ProxyRelay
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigError, GatewayConfig};
use crate::interceptor::{HandlerSet, Interceptor, ModuleLoader, ModuleRegistry};
use crate::lifecycle::Shutdown;
use crate::observability::{ConsoleHistory, ErrorReporter, HistoryLogger, TracingErrorReporter};
use crate::pipeline::{Exchange, Pipeline, Stage};
use crate::proxy::{PathRewrite, ProxyEngine, ProxyFilter, ProxyRelay};
use crate::statics::{FileSender, StaticFallback};

/// Builds the request pipeline from configuration plus code-level hooks.
pub struct GatewayBuilder {
    config: GatewayConfig,
    registry: Arc<ModuleRegistry>,
    module_loader: Option<Arc<dyn ModuleLoader>>,
    history: Arc<dyn HistoryLogger>,
    reporter: Arc<dyn ErrorReporter>,
    file_sender: Option<Arc<dyn FileSender>>,
    before: Vec<Arc<dyn Stage>>,
    proxy_filter: Option<ProxyFilter>,
    proxy_rewrite: Option<PathRewrite>,
    shutdown: Option<Arc<Shutdown>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ModuleRegistry::new()),
            module_loader: None,
            history: Arc::new(ConsoleHistory::new()),
            reporter: Arc::new(TracingErrorReporter),
            file_sender: None,
            before: Vec::new(),
            proxy_filter: None,
            proxy_rewrite: None,
            shutdown: None,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register handlers for a module override route (e.g. `/api/users`
    /// for `<root>/api/users.js`).
    pub fn module(self, route: &str, handlers: HandlerSet) -> Self {
        self.registry.register(route, handlers);
        self
    }

    /// Replace the built-in registry with a custom loader.
    pub fn module_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.module_loader = Some(loader);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryLogger>) -> Self {
        self.history = history;
        self
    }

    pub fn error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn file_sender(mut self, sender: Arc<dyn FileSender>) -> Self {
        self.file_sender = Some(sender);
        self
    }

    /// Insert a stage ahead of the interceptor. Stages run in the order
    /// they were added.
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.before.push(Arc::new(stage));
        self
    }

    /// Only relay requests the predicate accepts; others fall through.
    pub fn proxy_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Exchange) -> bool + Send + Sync + 'static,
    {
        self.proxy_filter = Some(Arc::new(filter));
        self
    }

    /// Transform the path-and-query sent upstream.
    pub fn proxy_rewrite<F>(mut self, rewrite: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.proxy_rewrite = Some(Arc::new(rewrite));
        self
    }

    /// Close relayed WebSocket sessions when `shutdown` triggers.
    pub fn shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Result<Pipeline, ConfigError> {
        let config = &self.config;

        let registered = self.registry.len();
        let loader: Arc<dyn ModuleLoader> = match self.module_loader {
            Some(loader) => loader,
            None => self.registry.clone(),
        };
        let interceptor = Interceptor::new(&config.interceptor)
            .with_loader(loader)
            .with_reporter(self.reporter.clone());
        let root = interceptor.root().to_path_buf();

        let mut engine = ProxyEngine::new(
            Duration::from_secs(config.proxy.connect_timeout_secs),
            self.history.clone(),
        );
        if let Some(shutdown) = self.shutdown {
            engine = engine.with_shutdown(shutdown);
        }
        let engine = Arc::new(engine);
        let mut relay = ProxyRelay::new(&config.proxy, engine)
            .map_err(|e| ConfigError::Validation(vec![e]))?;
        if let Some(filter) = self.proxy_filter {
            relay = relay.with_filter(filter);
        }
        if let Some(rewrite) = self.proxy_rewrite {
            relay = relay.with_rewrite(rewrite);
        }

        let mut builder = Pipeline::builder().history(self.history.clone());
        for stage in self.before {
            builder = builder.shared_stage(stage);
        }
        builder = builder.stage(interceptor);

        if config.static_files.enabled {
            let mut statics = StaticFallback::new(&config.static_files, &root);
            if let Some(sender) = self.file_sender {
                statics = statics.with_sender(sender);
            }
            builder = builder.stage(statics);
        }

        tracing::debug!(
            root = %root.display(),
            target = %relay.target(),
            static_files = config.static_files.enabled,
            modules = registered,
            "Pipeline assembled"
        );
        Ok(builder.stage(relay).build())
    }
}
