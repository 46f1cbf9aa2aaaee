//! W3C WebDriver HTTP Client
//!
//! Talks to chromedriver (or any W3C compliant server) over its JSON wire API.
//! chromedriver listens on port 9515 by default.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use super::capabilities;
use super::traits::{BrowserSession, ElementRef};
use crate::utils::RunConfig;

/// W3C element identifier key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Delay between new-session attempts
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("WebDriver request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error '{error}': {message}")]
    Protocol { error: String, message: String },

    #[error("Unexpected WebDriver response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No active WebDriver session")]
    NoSession,
}

impl DriverError {
    pub fn is_no_such_element(&self) -> bool {
        matches!(self, DriverError::Protocol { error, .. } if error == "no such element")
    }
}

#[derive(Debug, Deserialize)]
struct NewSessionValue {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusValue {
    ready: bool,
}

/// WebDriver client holding at most one session
pub struct WebDriverClient {
    /// Base URL (e.g. "http://localhost:9515")
    base_url: String,
    client: reqwest::Client,
    session_id: Option<String>,
    /// New-session payload, reused on reload
    session_request: Value,
    retry_count: u32,
}

impl WebDriverClient {
    pub fn new(base_url: &str, config: &RunConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.connection_retry_timeout_ms))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            session_id: None,
            session_request: capabilities::session_request(config),
            retry_count: config.connection_retry_count.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the server accepts new sessions
    pub async fn is_ready(&self) -> bool {
        let url = format!("{}/status", self.base_url);
        match self.send::<StatusValue>(self.client.get(&url)).await {
            Ok(status) => status.ready,
            Err(_) => false,
        }
    }

    /// Create a session, retrying on failure
    pub async fn new_session(&mut self) -> Result<String, DriverError> {
        let mut last_error = DriverError::NoSession;

        for attempt in 1..=self.retry_count {
            let url = format!("{}/session", self.base_url);
            let request = self.client.post(&url).json(&self.session_request);

            match self.send::<NewSessionValue>(request).await {
                Ok(value) => {
                    log::debug!("Opened WebDriver session {}", value.session_id);
                    self.session_id = Some(value.session_id.clone());
                    return Ok(value.session_id);
                }
                Err(e) => {
                    log::warn!(
                        "New session attempt {}/{} failed: {}",
                        attempt,
                        self.retry_count,
                        e
                    );
                    last_error = e;
                    if attempt < self.retry_count {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    fn session_url(&self, path: &str) -> Result<String, DriverError> {
        let id = self.session_id.as_deref().ok_or(DriverError::NoSession)?;
        Ok(format!("{}/session/{}{}", self.base_url, id, path))
    }

    /// Send a request and unwrap the W3C `value` envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, DriverError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        let value = body.get("value").cloned().unwrap_or(Value::Null);

        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(DriverError::Protocol {
                error: error.to_string(),
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        if !status.is_success() {
            return Err(DriverError::Protocol {
                error: status.to_string(),
                message: body.to_string(),
            });
        }

        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl BrowserSession for WebDriverClient {
    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let endpoint = self.session_url("/url")?;
        self.send::<Value>(self.client.post(&endpoint).json(&json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn find_element(&self, css: &str) -> Result<Option<ElementRef>> {
        let endpoint = self.session_url("/element")?;
        let body = json!({ "using": "css selector", "value": css });

        match self.send::<Value>(self.client.post(&endpoint).json(&body)).await {
            Ok(value) => {
                let id = value
                    .get(ELEMENT_KEY)
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow::anyhow!("Element reference missing in {}", value))?;
                Ok(Some(ElementRef(id.to_string())))
            }
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn title(&self) -> Result<String> {
        let endpoint = self.session_url("/title")?;
        Ok(self.send::<String>(self.client.get(&endpoint)).await?)
    }

    async fn reload_session(&mut self) -> Result<()> {
        if self.session_id.is_some() {
            self.delete_session().await?;
        }
        self.new_session().await?;
        Ok(())
    }

    async fn maximize_window(&self) -> Result<()> {
        let endpoint = self.session_url("/window/maximize")?;
        self.send::<Value>(self.client.post(&endpoint).json(&json!({})))
            .await?;
        Ok(())
    }

    async fn take_screenshot(&self) -> Result<String> {
        let endpoint = self.session_url("/screenshot")?;
        Ok(self.send::<String>(self.client.get(&endpoint)).await?)
    }

    async fn close_window(&self) -> Result<()> {
        let endpoint = self.session_url("/window")?;
        self.send::<Value>(self.client.delete(&endpoint)).await?;
        Ok(())
    }

    async fn delete_session(&mut self) -> Result<()> {
        let endpoint = self.session_url("")?;
        self.send::<Value>(self.client.delete(&endpoint)).await?;
        log::debug!("Deleted WebDriver session {:?}", self.session_id);
        self.session_id = None;
        Ok(())
    }
}
