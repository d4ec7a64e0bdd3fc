use super::LookupError;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_ms: u64,
}

pub struct HttpClient {
    inner: reqwest::Client,
    settings: HttpSettings,
}

impl HttpClient {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.timeout)
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner, settings })
    }

    /// Fetch a URL as text, retrying transient failures with jittered backoff.
    /// The whole call, retries included, is bounded by the configured timeout.
    pub async fn get_text(&self, url: &str) -> Result<String, LookupError> {
        let budget = self.settings.timeout;
        match tokio::time::timeout(budget, self.get_with_retries(url)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Giving up on {} after {:?}", url, budget);
                Err(LookupError::Deadline(budget))
            }
        }
    }

    async fn get_with_retries(&self, url: &str) -> Result<String, LookupError> {
        // tokio-retry multiplies by the base each step: 2^n * factor.
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.settings.retry_base_ms.max(2) / 2)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.settings.max_retries as usize);

        let mut attempt = 0u32;
        RetryIf::spawn(
            strategy,
            || {
                attempt += 1;
                self.attempt(url, attempt)
            },
            |e: &LookupError| {
                let retry = e.is_transient();
                if retry {
                    warn!("Transient failure for {}: {}", url, e);
                }
                retry
            },
        )
        .await
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Result<String, LookupError> {
        debug!("GET {} (attempt {})", url, attempt);

        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::Status(status));
        }
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    #[tokio::test]
    async fn retries_stay_within_the_timeout() {
        // Accepts connections but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());

        let client = HttpClient::new(HttpSettings {
            user_agent: "test".into(),
            timeout: Duration::from_millis(300),
            max_retries: 5,
            retry_base_ms: 2,
        })
        .unwrap();

        let started = Instant::now();
        let result = client.get_text(&url).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(900));
    }
}
