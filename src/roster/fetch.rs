//! Blocking JSON GET with bounded timeout and fixed retries.

use serde_json::Value;
use std::thread;
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::{AttendanceError, Result};
use crate::logging::SharedSink;

/// Something that can GET a URL and hand back parsed JSON.
pub trait JsonSource {
    /// `context` names the request in log messages.
    fn get_json(&self, url: &str, context: &str) -> Result<Value>;
}

/// `reqwest` blocking client with a per-request timeout.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    retries: u32,
    delay: Duration,
    sink: SharedSink,
}

impl HttpFetcher {
    pub fn new(config: &NetworkConfig, sink: SharedSink) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("guild-attendance/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            retries: config.retries.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
            sink,
        })
    }

    fn attempt(&self, url: &str) -> std::result::Result<Value, String> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json, text/plain, */*")
            .send()
            .map_err(|e| format!("request failed: {}", e))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("HTTP {}", status.as_u16()));
        }
        response
            .json::<Value>()
            .map_err(|e| format!("invalid JSON: {}", e))
    }
}

impl JsonSource for HttpFetcher {
    fn get_json(&self, url: &str, context: &str) -> Result<Value> {
        for attempt in 1..=self.retries {
            match self.attempt(url) {
                Ok(value) => return Ok(value),
                Err(reason) => self.sink.error(&format!(
                    "{} while fetching {} (Attempt {}/{}).",
                    reason, context, attempt, self.retries
                )),
            }
            if attempt < self.retries {
                thread::sleep(self.delay);
            }
        }
        Err(AttendanceError::Network {
            context: context.to_string(),
            attempts: self.retries,
        })
    }
}
