//! File sending.
//!
//! [`DiskFileSender`] maps a request path onto the static root and streams
//! the file through `tower_http::services::ServeFile`, which takes care of
//! content types, conditional requests and ranges.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::SendError;
use crate::pipeline::Exchange;

/// Where and how files are looked up.
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub root: PathBuf,
    /// Document served for directory paths. `None` disables it.
    pub index: Option<String>,
    /// Serve path segments starting with a dot.
    pub hidden: bool,
}

/// Writes a file for `path` into the exchange response.
#[async_trait]
pub trait FileSender: Send + Sync {
    /// Returns the file that was sent. `SendError::NotFound` means the
    /// caller may fall through.
    async fn send(
        &self,
        exchange: &mut Exchange,
        path: &str,
        options: &SendOptions,
    ) -> Result<PathBuf, SendError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFileSender;

#[async_trait]
impl FileSender for DiskFileSender {
    async fn send(
        &self,
        exchange: &mut Exchange,
        path: &str,
        options: &SendOptions,
    ) -> Result<PathBuf, SendError> {
        let file = resolve_file(path, options).await?;

        let mut request = Request::new(Body::empty());
        *request.method_mut() = exchange.method().clone();
        *request.uri_mut() = exchange.original_uri().clone();
        *request.headers_mut() = exchange.headers().clone();

        let response = match ServeFile::new(&file).oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SendError::NotFound);
        }

        exchange.set_response(response.map(Body::new));
        Ok(file)
    }
}

/// Map a request path to a file under `options.root`.
pub async fn resolve_file(path: &str, options: &SendOptions) -> Result<PathBuf, SendError> {
    let decoded = urlencoding::decode(path).map_err(|_| SendError::NotFound)?;

    let mut relative = PathBuf::new();
    for segment in decoded.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if segment == ".." || segment.contains('\\') || segment.contains('\0') {
            return Err(SendError::NotFound);
        }
        if segment.starts_with('.') && !options.hidden {
            return Err(SendError::NotFound);
        }
        relative.push(segment);
    }

    let mut file = options.root.join(relative);
    let mut indexed = false;
    if decoded.ends_with('/') {
        push_index(&mut file, options)?;
        indexed = true;
    }

    let meta = metadata(&file).await?;
    if meta.is_dir() {
        if indexed {
            return Err(SendError::NotFound);
        }
        push_index(&mut file, options)?;
        if !metadata(&file).await?.is_file() {
            return Err(SendError::NotFound);
        }
    }
    Ok(file)
}

fn push_index(file: &mut PathBuf, options: &SendOptions) -> Result<(), SendError> {
    match &options.index {
        Some(index) => {
            file.push(index);
            Ok(())
        }
        None => Err(SendError::NotFound),
    }
}

async fn metadata(file: &Path) -> Result<std::fs::Metadata, SendError> {
    tokio::fs::metadata(file)
        .await
        .map_err(|e| SendError::from_io(file.to_path_buf(), e))
}
