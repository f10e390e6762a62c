use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::provider::{InferenceProvider, RawResponse, TransportFailure};

/// Provider that replays queued outcomes and counts calls
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<RawResponse, TransportFailure>>>,
    calls: AtomicUsize,
    last_credential: Mutex<Option<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_status(self, status: u16, body: &str) -> Self {
        self.push(Ok(RawResponse::new(status, body)))
    }

    pub fn then_throttled(self, retry_after: Option<Duration>) -> Self {
        let mut response = RawResponse::new(429, "rate limited");
        response.retry_after = retry_after;
        self.push(Ok(response))
    }

    pub fn then_failure(self, message: &str) -> Self {
        self.push(Err(TransportFailure(message.to_string())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_credential(&self) -> Option<String> {
        self.last_credential.lock().unwrap().clone()
    }

    fn push(self, outcome: Result<RawResponse, TransportFailure>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn send(&self, credential: &str, _text: &str) -> Result<RawResponse, TransportFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_credential.lock().unwrap() = Some(credential.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure("script exhausted".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
