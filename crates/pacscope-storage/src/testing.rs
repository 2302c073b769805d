//! Scripted transport for exercising the client and adapters without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Url;

use crate::{redact_url, HttpTransport, TransportError, TransportResponse};

#[derive(Debug, Clone)]
enum Scripted {
    Response(TransportResponse),
    Error { retryable: bool },
}

/// Replays queued responses in order and records every requested URL
/// (with the API key masked).
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push(Scripted::Response(TransportResponse {
            status,
            body: body.to_string().into_bytes(),
        }));
    }

    pub fn push_status(&self, status: u16) {
        self.push(Scripted::Response(TransportResponse {
            status,
            body: Vec::new(),
        }));
    }

    pub fn push_error(&self, retryable: bool) {
        self.push(Scripted::Error { retryable });
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or_default()
    }

    fn push(&self, item: Scripted) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(item);
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(redact_url(url));
        }
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Scripted::Response(resp)) => Ok(resp),
            Some(Scripted::Error { retryable }) => Err(TransportError {
                message: "scripted transport error".to_string(),
                retryable,
            }),
            None => Err(TransportError {
                message: format!("no scripted response for {}", redact_url(url)),
                retryable: false,
            }),
        }
    }
}
