//! Helpers shared by unit tests.

use std::sync::Mutex;

use axum::body::Body;
use axum::http::{Request, Response};
use serde_json::Value;

use crate::observability::{HistoryLogger, RequestTracker};

/// Keeps every tracker it is handed.
#[derive(Default)]
pub struct CollectHistory {
    pub logged: Mutex<Vec<RequestTracker>>,
}

impl CollectHistory {
    pub fn last(&self) -> RequestTracker {
        self.logged
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("nothing logged")
    }
}

impl HistoryLogger for CollectHistory {
    fn log(&self, tracker: &RequestTracker) {
        self.logged.lock().unwrap().push(tracker.clone());
    }
}

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "gateway.test")
        .body(Body::empty())
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
