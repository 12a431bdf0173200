// MockBackend -- scripted backend for unit and integration tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};

use festive_spark_types::{
    Backend, BackendPayload, BackendRequest, BackendResponse, BoxFuture, Error, FinishReason,
    Usage,
};

/// A response carrying raw text, as a plain-completion backend would return.
pub fn make_text_response(text: &str, backend: &str) -> BackendResponse {
    make_response(BackendPayload::Text(text.to_string()), backend)
}

/// A response carrying an already-structured mapping.
///
/// # Panics
/// If `fields` is not a JSON object.
pub fn make_structured_response(fields: Value, backend: &str) -> BackendResponse {
    let map: Map<String, Value> = match fields {
        Value::Object(map) => map,
        other => panic!("make_structured_response needs an object, got {other}"),
    };
    make_response(BackendPayload::Structured(map), backend)
}

fn make_response(payload: BackendPayload, backend: &str) -> BackendResponse {
    BackendResponse {
        id: "resp_test".into(),
        model: "test-model".into(),
        backend: backend.into(),
        payload,
        finish_reason: FinishReason::stop(),
        usage: Usage::new(12, 34),
        raw: None,
    }
}

/// Returns queued responses or errors in FIFO order and records every request.
pub struct MockBackend {
    name: String,
    actions: Mutex<Vec<Result<BackendResponse, Error>>>,
    recorded: Mutex<Vec<BackendRequest>>,
    call_count: AtomicUsize,
    delay: Option<Duration>,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Mutex::new(Vec::new()),
            recorded: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Queue a successful response.
    pub fn with_response(self, response: BackendResponse) -> Self {
        self.actions.lock().unwrap().push(Ok(response));
        self
    }

    /// Queue an error.
    pub fn with_error(self, error: Error) -> Self {
        self.actions.lock().unwrap().push(Err(error));
        self
    }

    /// Sleep this long before answering each call.
    /// Pair with `tokio::time::pause()` for deterministic timing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Clones of every request passed to `complete()`.
    pub fn recorded_requests(&self) -> Vec<BackendRequest> {
        self.recorded.lock().unwrap().clone()
    }

    /// The prompt of the most recent call.
    pub fn last_prompt(&self) -> Option<String> {
        self.recorded.lock().unwrap().last().map(|r| r.prompt.clone())
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse, Error>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.recorded.lock().unwrap().push(request);
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut actions = self.actions.lock().unwrap();
            if actions.is_empty() {
                return Err(Error::configuration("MockBackend: no actions configured"));
            }
            actions.remove(0)
        })
    }
}
