//! JSON-RPC mocks for wiremock.

use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

/// Answers JSON-RPC calls from a per-method table.
///
/// One-shot outcomes queued with [`then_result`](Self::then_result) and
/// [`then_error`](Self::then_error) are served first, in order; afterwards the
/// fixed result or error for the method is used.
#[derive(Default)]
pub struct JsonRpcResponder {
    results: HashMap<String, Value>,
    errors: HashMap<String, Value>,
    queued: Mutex<HashMap<String, VecDeque<Outcome>>>,
}

enum Outcome {
    Result(Value),
    Error(Value),
}

impl JsonRpcResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, method: &str, result: Value) -> Self {
        self.results.insert(method.to_string(), result);
        self
    }

    pub fn with_error(mut self, method: &str, code: i64, message: &str) -> Self {
        self.errors
            .insert(method.to_string(), json!({"code": code, "message": message}));
        self
    }

    pub fn then_result(self, method: &str, result: Value) -> Self {
        self.enqueue(method, Outcome::Result(result))
    }

    pub fn then_error(self, method: &str, code: i64, message: &str) -> Self {
        self.enqueue(
            method,
            Outcome::Error(json!({"code": code, "message": message})),
        )
    }

    fn enqueue(self, method: &str, outcome: Outcome) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Params of every call to `method` the server received, in order.
    pub async fn received_calls(server: &MockServer, method: &str) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
            .filter(|body| body["method"] == method)
            .map(|body| body["params"].clone())
            .collect()
    }
}

impl Respond for JsonRpcResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let id = body["id"].clone();
        let method = body["method"].as_str().unwrap_or_default();

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        let outcome = queued
            .or_else(|| self.results.get(method).cloned().map(Outcome::Result))
            .or_else(|| self.errors.get(method).cloned().map(Outcome::Error))
            .unwrap_or_else(|| {
                let message = format!("method {method} not mocked");
                Outcome::Error(json!({"code": -32601, "message": message}))
            });
        let payload = match outcome {
            Outcome::Result(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Outcome::Error(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
        };
        ResponseTemplate::new(200).set_body_json(payload)
    }
}
