//! Ordered request pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → Exchange::new (tracker start)
//!     → [before stages] → Interceptor → StaticFallback → ProxyRelay
//!     → tracker finish (status from the final response, 500 on fatal error)
//!       or, for relayed bodies, when the body ends or is dropped
//!     → metrics + HistoryLogger
//!     → Response
//! ```
//!
//! # Design Decisions
//! - A stage that handles a request does not call `next`
//! - A stage that declines calls `next` with the exchange unchanged, except
//!   for explicit path rewrites
//! - Running off the end of the chain leaves the default 404

mod completion;
mod exchange;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;

pub use completion::{client_closed, Completion};
pub use exchange::Exchange;

use crate::error::GatewayError;
use crate::observability::{ConsoleHistory, HistoryLogger};
use crate::proxy::RelayBody;

/// One link in the chain.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), GatewayError>;
}

/// Continuation over the stages after the current one.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
}

impl<'a> Next<'a> {
    pub fn new(stages: &'a [Arc<dyn Stage>]) -> Self {
        Self { stages }
    }

    /// Run the remaining stages.
    pub async fn run(self, exchange: &mut Exchange) -> Result<(), GatewayError> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(exchange, Next { stages: rest }).await,
            None => Ok(()),
        }
    }
}

/// The assembled chain plus its history sink.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    history: Arc<dyn HistoryLogger>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run one request through every stage and produce its response.
    pub async fn dispatch(&self, request: Request<Body>) -> Response<Body> {
        let mut exchange = Exchange::new(request);
        let outcome = Next::new(&self.stages).run(&mut exchange).await;

        let deferred = outcome.is_ok() && exchange.completion_deferred();
        let path = exchange.original_url().to_string();
        let (tracker, response) = match outcome {
            Ok(()) => exchange.into_outcome(),
            Err(err) => {
                tracing::error!(path = %path, error = %err, "Request failed");
                let (tracker, _) = exchange.into_outcome();
                (tracker, err.into_response())
            }
        };

        let completion = Completion::new(tracker, self.history.clone());
        if deferred {
            let status = response.status();
            return response.map(|body| Body::new(RelayBody::new(body, path, status, completion)));
        }
        completion.finish(response.status());
        response
    }
}

/// Collects stages in order.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    history: Option<Arc<dyn HistoryLogger>>,
}

impl PipelineBuilder {
    /// Append a stage.
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn shared_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryLogger>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
            history: self
                .history
                .unwrap_or_else(|| Arc::new(ConsoleHistory::new())),
        }
    }
}
