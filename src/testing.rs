//! Canned-response fetcher for exercising sources without a network.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::PriceError;
use crate::fetch::{JsonFetcher, JsonRequest};

enum Reply {
    Json(Value),
    Timeout,
    Transport(String),
}

struct Rule {
    fragment: String,
    reply: Reply,
    remaining: Option<u32>,
}

/// Answers each request with the first rule whose fragment occurs in
/// `url?key=value&...`, and records every request it sees.
#[derive(Default)]
pub struct ScriptedFetcher {
    rules: Mutex<Vec<Rule>>,
    seen: Mutex<Vec<JsonRequest>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, fragment: &str, reply: Reply, remaining: Option<u32>) -> Self {
        self.rules.lock().push(Rule {
            fragment: fragment.to_owned(),
            reply,
            remaining,
        });
        self
    }

    pub fn respond(self, fragment: &str, body: Value) -> Self {
        self.push(fragment, Reply::Json(body), None)
    }

    /// Like [`respond`](Self::respond), but only for the first `times` matches.
    pub fn respond_times(self, fragment: &str, body: Value, times: u32) -> Self {
        self.push(fragment, Reply::Json(body), Some(times))
    }

    pub fn time_out(self, fragment: &str) -> Self {
        self.push(fragment, Reply::Timeout, None)
    }

    pub fn fail(self, fragment: &str, message: &str) -> Self {
        self.push(fragment, Reply::Transport(message.to_owned()), None)
    }

    pub fn requests(&self) -> Vec<JsonRequest> {
        self.seen.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.seen.lock().len()
    }

    fn describe(request: &JsonRequest) -> String {
        let query: Vec<String> = request
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}?{}", request.url, query.join("&"))
    }
}

#[async_trait]
impl JsonFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &JsonRequest, timeout: Duration) -> Result<Value, PriceError> {
        self.seen.lock().push(request.clone());
        let described = Self::describe(request);
        let mut rules = self.rules.lock();
        let rule = rules
            .iter_mut()
            .find(|r| r.remaining != Some(0) && described.contains(&r.fragment));
        match rule {
            None => Err(PriceError::transport(&request.url, "no scripted response")),
            Some(rule) => {
                if let Some(n) = rule.remaining.as_mut() {
                    *n -= 1;
                }
                match &rule.reply {
                    Reply::Json(body) => Ok(body.clone()),
                    Reply::Timeout => Err(PriceError::Timeout {
                        url: request.url.clone(),
                        after: timeout,
                    }),
                    Reply::Transport(message) => {
                        Err(PriceError::transport(&request.url, message.as_str()))
                    }
                }
            }
        }
    }
}
