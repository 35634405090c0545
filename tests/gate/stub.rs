//! Stub provider API answering canned responses per route.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request as seen by the stub.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Lower-cased header names with values.
    pub headers: HashMap<String, String>,
    /// Raw body.
    pub body: String,
}

impl RecordedRequest {
    /// Body decoded as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

type Routes = HashMap<(String, String), (u16, String)>;

#[derive(Default)]
struct Recorder {
    routes: Routes,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<Recorder>>;

/// Stub HTTP server bound to a random local port.
pub struct StubServer {
    url: String,
    state: Shared,
    task: JoinHandle<()>,
}

impl StubServer {
    /// Bind and start serving.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let state = Shared::default();

        let app = axum::Router::new()
            .fallback(record)
            .with_state(Arc::clone(&state));
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { url, state, task })
    }

    /// Base URL of the server.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Answer `method path` with `status` and `body`; unknown routes get 404.
    pub fn respond(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        self.state
            .lock()
            .routes
            .insert((method.to_string(), path.to_string()), (status, body.into()));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests received for `method path`.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Record every request, then answer with the route's canned response.
async fn record(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let (status, response_body) = {
        let mut state = state.lock();
        state.requests.push(RecordedRequest {
            method: method.to_string(),
            path: path.clone(),
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        state
            .routes
            .get(&(method.to_string(), path))
            .cloned()
            .unwrap_or((404, r#"{"error":"not found"}"#.to_string()))
    };

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [("content-type", "application/json")],
        response_body,
    )
        .into_response()
}
