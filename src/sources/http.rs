use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::header::{COOKIE, USER_AGENT};
use std::time::Duration;
use tracing::debug;

use super::retry::{THROTTLE_BASE_DELAY, THROTTLE_MAX_RETRIES, is_throttled, retry_after, wait_with_backoff};

/// Shared HTTP client for every remote collaborator.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build HTTP client")?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    /// GET with throttling retries. Returns the final status and body.
    pub async fn get(&self, url: &str, cookie: Option<&str>) -> Result<(StatusCode, Vec<u8>)> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        let mut attempt = 0usize;
        let mut delay = THROTTLE_BASE_DELAY;
        loop {
            attempt += 1;
            let mut request = self
                .client
                .get(url)
                .header(USER_AGENT, &self.user_agent)
                .header("Accept", "*/*");
            if let Some(cookie) = cookie.filter(|value| !value.is_empty()) {
                request = request.header(COOKIE, cookie);
            }
            let response = request
                .send()
                .await
                .with_context(|| format!("request to {} failed", url))?;
            let status = response.status();
            let wait_hint = retry_after(response.headers());
            debug!("GET {} -> {}", url, status);
            if is_throttled(status) && attempt < THROTTLE_MAX_RETRIES {
                delay = wait_with_backoff(&host, attempt, delay, wait_hint).await;
                continue;
            }
            let body = response
                .bytes()
                .await
                .with_context(|| format!("failed to read body from {}", url))?;
            return Ok((status, body.to_vec()));
        }
    }

    /// Body text of a successful response, `None` for any other status.
    pub async fn text(&self, url: &str, cookie: Option<&str>) -> Result<Option<String>> {
        let (status, body) = self.get(url, cookie).await?;
        if !status.is_success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&body).into_owned()))
    }

    /// Body bytes; a non-success status is an error.
    pub async fn bytes(&self, url: &str) -> Result<Vec<u8>> {
        let (status, body) = self.get(url, None).await?;
        if !status.is_success() {
            return Err(anyhow!("GET {} returned {}", url, status));
        }
        Ok(body)
    }
}
