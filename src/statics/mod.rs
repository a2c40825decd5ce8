//! Static file fallback.
//!
//! Immediate mode tries the file before the rest of the chain; deferred
//! mode runs the chain first and only fills in a response nobody wrote.
//! Only GET and HEAD are ever served.

pub mod sender;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};

pub use sender::{DiskFileSender, FileSender, SendOptions};

use crate::config::StaticConfig;
use crate::error::{GatewayError, SendError};
use crate::observability::tracker::display_path;
use crate::observability::Target;
use crate::pipeline::{Exchange, Next, Stage};

pub struct StaticFallback {
    sender: Arc<dyn FileSender>,
    options: SendOptions,
    defer: bool,
}

impl StaticFallback {
    /// `default_root` is used when the config names no root of its own.
    pub fn new(config: &StaticConfig, default_root: &Path) -> Self {
        Self {
            sender: Arc::new(DiskFileSender),
            options: SendOptions {
                root: config
                    .root
                    .clone()
                    .unwrap_or_else(|| default_root.to_path_buf()),
                index: config.index_document(),
                hidden: config.hidden,
            },
            defer: config.defer,
        }
    }

    pub fn with_sender(mut self, sender: Arc<dyn FileSender>) -> Self {
        self.sender = sender;
        self
    }

    /// `Ok(true)` when a file was sent, `Ok(false)` when there was none.
    async fn try_send(&self, exchange: &mut Exchange) -> Result<bool, GatewayError> {
        let path = exchange.path().to_string();
        match self.sender.send(exchange, &path, &self.options).await {
            Ok(file) => {
                let log = format!("{} -> {}", exchange.original_url(), display_path(&file));
                exchange.tracker.mark(Target::Static, log);
                Ok(true)
            }
            Err(SendError::NotFound) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

fn is_readable(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

#[async_trait]
impl Stage for StaticFallback {
    async fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), GatewayError> {
        if self.defer {
            next.run(exchange).await?;
            if is_readable(exchange.method())
                && !exchange.has_body()
                && exchange.status() == StatusCode::NOT_FOUND
            {
                self.try_send(exchange).await?;
            }
            return Ok(());
        }

        if is_readable(exchange.method()) && self.try_send(exchange).await? {
            return Ok(());
        }
        next.run(exchange).await
    }
}
