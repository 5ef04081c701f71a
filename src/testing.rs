//! Fakes shared by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{error::HostingError, github::Hosting};

type Responder = Box<dyn Fn(&Value) -> Result<Value, HostingError> + Send + Sync>;

/// Hosting fake that answers each payload through a closure and records
/// every payload it saw.
pub struct FnHosting {
    responder: Responder,
    pub payloads: Mutex<Vec<Value>>,
}

impl FnHosting {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, HostingError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p["query"].as_str().is_some_and(|q| q.contains(needle)))
            .count()
    }
}

#[async_trait]
impl Hosting for FnHosting {
    async fn graphql(&self, payload: &Value) -> Result<Value, HostingError> {
        self.payloads.lock().unwrap().push(payload.clone());
        (self.responder)(payload)
    }
}

pub fn is_rate_limit_probe(payload: &Value) -> bool {
    payload["query"]
        .as_str()
        .is_some_and(|q| !q.contains("organization") && !q.contains("repository("))
}

pub fn plenty_of_quota() -> Value {
    json!({ "data": { "rateLimit": { "remaining": 5000, "resetAt": "2030-01-01T00:00:00Z" } } })
}
