//! Per-request state threaded through the pipeline.

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use serde_json::Value;

use crate::observability::RequestTracker;

/// Response under construction. Starts as an implicit 404 with no body.
#[derive(Debug)]
struct ResponseState {
    status: StatusCode,
    explicit_status: bool,
    headers: HeaderMap,
    body: Option<Body>,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            explicit_status: false,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// Request parts, the current (rewritable) path, the response being built
/// and the tracker, owned together for the life of one request.
#[derive(Debug)]
pub struct Exchange {
    parts: Parts,
    body: Option<Body>,
    original_uri: Uri,
    path: String,
    response: ResponseState,
    deferred: bool,
    pub tracker: RequestTracker,
}

impl Exchange {
    pub fn new(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        let tracker = RequestTracker::begin(parts.method.clone());
        Self {
            original_uri: parts.uri.clone(),
            path: parts.uri.path().to_string(),
            parts,
            body: Some(body),
            response: ResponseState::default(),
            deferred: false,
            tracker,
        }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// URI as received, before any stage rewrote the path.
    pub fn original_uri(&self) -> &Uri {
        &self.original_uri
    }

    /// Original path and query, as shown in history lines.
    pub fn original_url(&self) -> &str {
        self.original_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    pub fn query(&self) -> Option<&str> {
        self.original_uri.query()
    }

    /// Current path. Stages may rewrite it before falling through.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Current path with the original query appended.
    pub fn path_and_query(&self) -> String {
        match self.query() {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Value of the `Host` header, if it is valid text.
    pub fn host(&self) -> Option<&str> {
        self.parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.original_uri.authority().map(|a| a.as_str()))
    }

    /// Raw request parts, needed by extractors such as `WebSocketUpgrade`.
    pub fn parts_mut(&mut self) -> &mut Parts {
        &mut self.parts
    }

    /// Take the request body. Returns `None` once consumed.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn status(&self) -> StatusCode {
        self.response.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.response.status = status;
        self.response.explicit_status = true;
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response.headers
    }

    pub fn has_body(&self) -> bool {
        self.response.body.is_some()
    }

    /// Set the response body. An implicit status becomes 200.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        if !self.response.explicit_status {
            self.response.status = StatusCode::OK;
            self.response.explicit_status = true;
        }
        self.response.body = Some(body.into());
    }

    /// Set a JSON body and content type.
    pub fn set_json(&mut self, value: &Value) {
        self.response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        self.set_body(value.to_string());
    }

    /// Replace the whole response with one produced elsewhere.
    pub fn set_response(&mut self, response: Response<Body>) {
        let (parts, body) = response.into_parts();
        self.response = ResponseState {
            status: parts.status,
            explicit_status: true,
            headers: parts.headers,
            body: Some(body),
        };
    }

    /// Leave the tracker open until the response body has been streamed.
    /// Only meaningful together with `set_response`.
    pub fn defer_completion(&mut self) {
        self.deferred = true;
    }

    pub fn completion_deferred(&self) -> bool {
        self.deferred && self.response.body.is_some()
    }

    /// Split into the tracker and the final response.
    pub fn into_outcome(self) -> (RequestTracker, Response<Body>) {
        let ResponseState {
            status,
            explicit_status,
            headers,
            body,
        } = self.response;

        let body = match body {
            Some(body) => body,
            None if status == StatusCode::NOT_FOUND && !explicit_status => Body::from("Not Found"),
            None => Body::empty(),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        (self.tracker, response)
    }
}
