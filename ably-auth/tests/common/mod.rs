// Shared test harness: a scriptable in-memory transport.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use ably_auth::error::{AblyError, AblyResult};
use ably_auth::http::{Response, Transport};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub skip_auth: bool,
}

/// Transport double that replays queued responses and records every
/// request. Each network call yields briefly so concurrent callers can
/// actually interleave.
pub struct MockTransport {
    pub requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<VecDeque<Response>>,
    server_time: i64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            server_time: 0,
        }
    }

    pub fn with_server_time(mut self, time_ms: i64) -> Self {
        self.server_time = time_ms;
        self
    }

    pub fn enqueue_json(&self, status: u16, body: &str) {
        self.responses.lock().push_back(Response {
            status,
            text: body.to_string(),
            parsed_body: serde_json::from_str(body).ok(),
        });
    }

    pub fn enqueue_token(&self, token: &str, expires: Option<i64>) {
        let body = match expires {
            Some(expires) => format!(r#"{{"token":"{}","expires":{}}}"#, token, expires),
            None => format!(r#"{{"token":"{}"}}"#, token),
        };
        self.enqueue_json(200, &body);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_response(&self) -> AblyResult<Response> {
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| AblyError::network("mock transport has no queued response"))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        params: &[(String, String)],
        skip_auth: bool,
    ) -> AblyResult<Response> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let query: Vec<(String, String)> = params.to_vec();
        self.requests.lock().push(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            headers: headers.to_vec(),
            body: Some(Value::Array(
                query
                    .into_iter()
                    .map(|(k, v)| Value::String(format!("{}={}", k, v)))
                    .collect(),
            )),
            skip_auth,
        });
        self.next_response()
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Option<Value>,
        skip_auth: bool,
    ) -> AblyResult<Response> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.requests.lock().push(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            headers: headers.to_vec(),
            body,
            skip_auth,
        });
        self.next_response()
    }

    async fn server_time(&self) -> AblyResult<i64> {
        Ok(self.server_time)
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
