//! Local override dispatch.
//!
//! # Data Flow
//! ```text
//! Exchange path (extensionless, e.g. /api/users)
//!     → ignore check (no probes under an ignored prefix)
//!     → probe root/api/users.<ext> per extension, first hit wins
//!     → module ext  → HandlerSet (cached per file) → method key or `all`
//!     → data ext    → JSON payload, wrapped unless it carries `state`
//!     → other ext   → path rewritten to /api/users.<ext>, next stage
//! ```
//!
//! Anything not resolved falls through unchanged.

pub mod handlers;
pub mod probe;
pub mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

pub use handlers::{handler_fn, FnHandler, HandlerSet, OverrideHandler};
pub use probe::{FileProbe, FsProbe};
pub use registry::{ModuleLoader, ModuleRegistry};

use crate::config::InterceptorConfig;
use crate::error::{GatewayError, HandlerError};
use crate::http::response::{error_body, success_envelope};
use crate::observability::tracker::display_path;
use crate::observability::{ErrorReporter, Target, TracingErrorReporter};
use crate::pipeline::{Exchange, Next, Stage};

/// How a resolved override file is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverrideKind {
    Module,
    Data,
    Other,
}

/// An override file found for a request path.
#[derive(Debug, Clone)]
struct Resolved {
    file: PathBuf,
    /// Request path without trailing slash (`/api/users`).
    route: String,
    ext: String,
}

impl Resolved {
    /// Route relative to the root, used as the module key.
    fn module_key(&self) -> &str {
        self.route.trim_start_matches('/')
    }
}

/// Stage resolving extensionless paths to local override files.
pub struct Interceptor {
    root: PathBuf,
    extensions: Vec<String>,
    ignores: Vec<PathBuf>,
    module_extensions: Vec<String>,
    data_extensions: Vec<String>,
    probe: Arc<dyn FileProbe>,
    loader: Arc<dyn ModuleLoader>,
    reporter: Arc<dyn ErrorReporter>,
    modules: DashMap<PathBuf, Arc<HandlerSet>>,
}

impl Interceptor {
    pub fn new(config: &InterceptorConfig) -> Self {
        let root = absolute(&config.root);
        let ignores = config
            .ignores
            .iter()
            .map(|prefix| root.join(prefix.trim_start_matches('/')))
            .collect();

        Self {
            extensions: config.extensions.clone(),
            ignores,
            module_extensions: config.module_extensions.clone(),
            data_extensions: config.data_extensions.clone(),
            probe: Arc::new(FsProbe),
            loader: Arc::new(ModuleRegistry::new()),
            reporter: Arc::new(TracingErrorReporter),
            modules: DashMap::new(),
            root,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn FileProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_of(&self, ext: &str) -> OverrideKind {
        if self.module_extensions.iter().any(|e| e == ext) {
            OverrideKind::Module
        } else if self.data_extensions.iter().any(|e| e == ext) {
            OverrideKind::Data
        } else {
            OverrideKind::Other
        }
    }

    /// Find the highest-priority override file for `path`.
    async fn resolve(&self, path: &str) -> Option<Resolved> {
        if Path::new(path).extension().is_some() {
            return None;
        }

        let route = path.strip_suffix('/').unwrap_or(path);
        let relative = route.trim_start_matches('/');
        if relative.is_empty() || relative.split('/').any(|segment| segment == "..") {
            return None;
        }

        let base = self.root.join(relative);
        if self.ignores.iter().any(|prefix| base.starts_with(prefix)) {
            tracing::trace!(path = %path, "Override lookup skipped by ignore prefix");
            return None;
        }

        for ext in &self.extensions {
            let mut name = base.clone().into_os_string();
            name.push(".");
            name.push(ext);
            let file = PathBuf::from(name);

            if self.probe.is_file(&file).await {
                tracing::debug!(path = %path, file = %file.display(), "Override resolved");
                return Some(Resolved {
                    file,
                    route: format!("/{}", relative),
                    ext: ext.clone(),
                });
            }
        }
        None
    }

    async fn handlers_for(&self, resolved: &Resolved) -> Result<Arc<HandlerSet>, HandlerError> {
        if let Some(set) = self.modules.get(&resolved.file).map(|e| e.value().clone()) {
            return Ok(set);
        }

        let set = self
            .loader
            .load(&resolved.file, resolved.module_key())
            .await?;
        self.modules.insert(resolved.file.clone(), set.clone());
        Ok(set)
    }

    async fn run_module(
        &self,
        exchange: &mut Exchange,
        next: Next<'_>,
        resolved: Resolved,
    ) -> Result<(), GatewayError> {
        let handlers = match self.handlers_for(&resolved).await {
            Ok(handlers) => handlers,
            Err(err) => {
                let log = format!("{} -> {}", exchange.original_url(), display_path(&resolved.file));
                exchange.tracker.mark(Target::Local, log);
                self.fail(exchange, err);
                return Ok(());
            }
        };

        let Some((key, handler)) = handlers.resolve(exchange.method()) else {
            return next.run(exchange).await;
        };

        let log = format!(
            "{} -> {}[{}]",
            exchange.original_url(),
            display_path(&resolved.file),
            key
        );
        exchange.tracker.mark(Target::Local, log);

        match handler.call(exchange, next).await {
            Err(GatewayError::Handler(err)) => {
                self.fail(exchange, err);
                Ok(())
            }
            other => other,
        }
    }

    async fn send_data(&self, exchange: &mut Exchange, resolved: Resolved) {
        let log = format!("{} -> {}", exchange.original_url(), display_path(&resolved.file));
        exchange.tracker.mark(Target::Local, log);

        match read_json(&resolved.file).await {
            Ok(value) => exchange.set_json(&success_envelope(value)),
            Err(err) => self.fail(exchange, err),
        }
    }

    fn fail(&self, exchange: &mut Exchange, err: HandlerError) {
        let body = error_body(&err.to_string(), Some(err.diagnostic()));
        exchange.set_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        exchange.set_json(&body);
        self.reporter.report(&err, exchange.original_url());
    }
}

#[async_trait]
impl Stage for Interceptor {
    async fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), GatewayError> {
        let Some(resolved) = self.resolve(exchange.path()).await else {
            return next.run(exchange).await;
        };

        match self.kind_of(&resolved.ext) {
            OverrideKind::Module => self.run_module(exchange, next, resolved).await,
            OverrideKind::Data => {
                self.send_data(exchange, resolved).await;
                Ok(())
            }
            OverrideKind::Other => {
                exchange.set_path(format!("{}.{}", resolved.route, resolved.ext));
                next.run(exchange).await
            }
        }
    }
}

/// Data overrides are read on every request so edits show up immediately.
async fn read_json(file: &Path) -> Result<Value, HandlerError> {
    let raw = tokio::fs::read(file)
        .await
        .map_err(|source| HandlerError::Load {
            path: file.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&raw).map_err(|source| HandlerError::Data {
        path: file.to_path_buf(),
        source,
    })
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
