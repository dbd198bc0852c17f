// Blocking HTTP client for the incentive API

use anyhow::{anyhow, Result};
use serde_json::Value;

/// Base path every endpoint lives under.
const API_PREFIX: &str = "/api/v1";

pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(server: &str) -> Self {
        Self {
            base_url: format!("{}{}", server.trim_end_matches('/'), API_PREFIX),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut request = self.agent.get(&self.url(path));
        for (key, value) in query {
            request = request.query(key, value);
        }
        read(request.call())
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<Value> {
        read(self.agent.post(&self.url(path)).send_json(body))
    }

    pub fn put(&self, path: &str, body: &Value) -> Result<Value> {
        read(self.agent.put(&self.url(path)).send_json(body))
    }
}

fn read(result: Result<ureq::Response, ureq::Error>) -> Result<Value> {
    match result {
        Ok(response) => response
            .into_json::<Value>()
            .map_err(|e| anyhow!("Failed to parse server response: {}", e)),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(anyhow!("{}", describe_failure(code, &body)))
        }
        Err(e) => Err(anyhow!("Request failed: {}", e)),
    }
}

/// Formats a non-2xx response. Rule violations carry a JSON
/// `{error, message}` body; everything else is plain text.
pub fn describe_failure(status: u16, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) if json["error"].is_string() => format!(
            "{} ({}): {}",
            json["error"].as_str().unwrap_or_default(),
            status,
            json["message"].as_str().unwrap_or_default()
        ),
        _ if body.trim().is_empty() => format!("Server returned {}", status),
        _ => format!("Server returned {}: {}", status, body.trim()),
    }
}
