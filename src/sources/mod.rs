pub mod base_rate;
pub mod feed;
pub mod http_client;

use crate::config::{BaseRateConfig, BaseRatePage, KosisConfig};
use crate::models::RegionVacancyRow;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use self::http_client::{HttpClient, HttpSettings};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("KOSIS API key is not configured")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed feed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("KOSIS error {code}: {message}")]
    Api { code: String, message: String },

    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),

    #[error("background fetch failed: {0}")]
    Worker(String),

    #[error("no response within {0:?}, retries included")]
    Deadline(Duration),
}

impl LookupError {
    /// Timeouts, connection failures, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            LookupError::Http(e) => e.is_timeout() || e.is_connect(),
            LookupError::Status(s) => s.as_u16() == 429 || s.is_server_error(),
            _ => false,
        }
    }
}

// ── Source traits ─────────────────────────────────────────────────────────────

/// Swappable regional vacancy feed.
#[async_trait]
pub trait VacancySource: Send + Sync {
    async fn fetch_rows(&self) -> Result<Vec<RegionVacancyRow>, LookupError>;
}

/// Best-effort headline interest rate, display only.
#[async_trait]
pub trait BaseRateSource: Send + Sync {
    async fn fetch_rate(&self) -> Option<f64>;
}

// ── KOSIS ─────────────────────────────────────────────────────────────────────

pub struct KosisClient {
    client: HttpClient,
    config: KosisConfig,
}

impl KosisClient {
    pub fn new(config: &KosisConfig) -> Result<Self> {
        let client = HttpClient::new(HttpSettings {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            retry_base_ms: config.retry_base_ms,
        })
        .context("Failed to build KOSIS client")?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn request_url(&self) -> Result<Url, LookupError> {
        request_url(&self.config)
    }
}

/// Build the statistics query. Keys issued by KOSIS end in `=`, which is
/// often lost when pasted, so it is restored here.
pub fn request_url(config: &KosisConfig) -> Result<Url, LookupError> {
    let key = config.api_key.trim();
    if key.is_empty() {
        return Err(LookupError::MissingApiKey);
    }
    let key = if key.ends_with('=') {
        key.to_string()
    } else {
        format!("{}=", key)
    };

    // Space-joined fields serialize as `A+B+C` in the form-encoded query.
    let output_fields = config.output_fields.join(" ");
    let recent = config.recent_periods.to_string();

    let url = Url::parse_with_params(
        &config.endpoint,
        &[
            ("method", "getList"),
            ("apiKey", key.as_str()),
            ("itmId", config.itm_id.as_str()),
            ("objL1", config.obj_l1.as_str()),
            ("format", "json"),
            ("jsonVD", "Y"),
            ("prdSe", config.prd_se.as_str()),
            ("newEstPrdCnt", recent.as_str()),
            ("outputFields", output_fields.as_str()),
            ("orgId", config.org_id.as_str()),
            ("tblId", config.tbl_id.as_str()),
        ],
    )?;
    Ok(url)
}

#[async_trait]
impl VacancySource for KosisClient {
    async fn fetch_rows(&self) -> Result<Vec<RegionVacancyRow>, LookupError> {
        let url = self.request_url()?;
        info!("Fetching KOSIS vacancy feed");
        debug!("GET {}", url.as_str().replace(self.config.api_key.trim(), "***"));

        let body = self.client.get_text(url.as_str()).await?;
        let rows = feed::normalize_body(&body)?;

        info!("KOSIS feed: {} rows", rows.len());
        Ok(rows)
    }
}

// ── Bank of Korea ─────────────────────────────────────────────────────────────

pub struct BokScraper {
    client: HttpClient,
    pages: Vec<BaseRatePage>,
}

impl BokScraper {
    pub fn new(config: &BaseRateConfig) -> Result<Self> {
        let client = HttpClient::new(HttpSettings {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: 0,
            retry_base_ms: 0,
        })
        .context("Failed to build base-rate client")?;

        Ok(Self {
            client,
            pages: config.pages.clone(),
        })
    }
}

#[async_trait]
impl BaseRateSource for BokScraper {
    async fn fetch_rate(&self) -> Option<f64> {
        for page in &self.pages {
            let html = match self.client.get_text(&page.url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Base rate page {} unavailable: {}", page.url, e);
                    continue;
                }
            };
            if let Some(rate) = base_rate::extract_rate(&html, &page.marker) {
                info!("Base rate {}% from {}", rate, page.url);
                return Some(rate);
            }
            debug!("No '{}' marker on {}", page.marker, page.url);
        }
        None
    }
}
