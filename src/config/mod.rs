use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub kosis: KosisConfig,
    #[serde(default)]
    pub base_rate: BaseRateConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// KOSIS regional vacancy feed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KosisConfig {
    #[serde(default = "default_kosis_endpoint")]
    pub endpoint: String,

    /// Empty means "not configured"; lookups then degrade to N/A.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_org_id")]
    pub org_id: String,

    #[serde(default = "default_tbl_id")]
    pub tbl_id: String,

    #[serde(default = "default_itm_id")]
    pub itm_id: String,

    #[serde(default = "default_obj_l1")]
    pub obj_l1: String,

    #[serde(default = "default_prd_se")]
    pub prd_se: String,

    #[serde(default = "default_recent_periods")]
    pub recent_periods: u32,

    #[serde(default = "default_output_fields")]
    pub output_fields: Vec<String>,

    #[serde(default = "default_kosis_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Bank of Korea headline rate scrape
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BaseRateConfig {
    #[serde(default = "default_base_rate_pages")]
    pub pages: Vec<BaseRatePage>,

    #[serde(default = "default_base_rate_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BaseRatePage {
    pub url: String,
    /// Text that precedes the rate on the page, e.g. "BOK Base Rate".
    pub marker: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    /// Overrides the per-user application data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// PDF report export
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ReportConfig {
    /// TTF font embedded in the PDF. Tried before the system Korean fonts.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

/// Interactive session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_address_debounce_ms")]
    pub address_debounce_ms: u64,

    #[serde(default = "default_true")]
    pub fetch_base_rate_on_start: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_kosis_endpoint() -> String {
    "https://kosis.kr/openapi/Param/statisticsParameterData.do".to_string()
}
fn default_org_id() -> String {
    "408".to_string()
}
fn default_tbl_id() -> String {
    "DT_40801_N220201_06".to_string()
}
fn default_itm_id() -> String {
    // mid/large retail vacancy rate
    "T001".to_string()
}
fn default_obj_l1() -> String {
    "ALL".to_string()
}
fn default_prd_se() -> String {
    "Q".to_string()
}
fn default_recent_periods() -> u32 {
    4
}
fn default_output_fields() -> Vec<String> {
    ["TBL_NM", "PRD_DE", "DT", "UNIT_NM", "OBJ_NM", "C1_NM", "ITM_NM", "NM"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_kosis_timeout_secs() -> u64 {
    12
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_base_ms() -> u64 {
    300
}
fn default_cache_ttl_secs() -> u64 {
    600
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (cns-valuator/0.1)".to_string()
}
fn default_base_rate_pages() -> Vec<BaseRatePage> {
    vec![
        BaseRatePage {
            url: "https://www.bok.or.kr/eng/main/main.do".to_string(),
            marker: "BOK Base Rate".to_string(),
        },
        BaseRatePage {
            url: "https://www.bok.or.kr/portal/main/main.do".to_string(),
            marker: "기준금리".to_string(),
        },
    ]
}
fn default_base_rate_timeout_secs() -> u64 {
    8
}
fn default_address_debounce_ms() -> u64 {
    700
}
fn default_true() -> bool {
    true
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("CNS").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!("Config could not be deserialized ({}), using defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            kosis: KosisConfig::default(),
            base_rate: BaseRateConfig::default(),
            storage: StorageConfig::default(),
            session: SessionConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for KosisConfig {
    fn default() -> Self {
        Self {
            endpoint: default_kosis_endpoint(),
            api_key: String::new(),
            org_id: default_org_id(),
            tbl_id: default_tbl_id(),
            itm_id: default_itm_id(),
            obj_l1: default_obj_l1(),
            prd_se: default_prd_se(),
            recent_periods: default_recent_periods(),
            output_fields: default_output_fields(),
            timeout_secs: default_kosis_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for BaseRateConfig {
    fn default() -> Self {
        Self {
            pages: default_base_rate_pages(),
            timeout_secs: default_base_rate_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address_debounce_ms: default_address_debounce_ms(),
            fetch_base_rate_on_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_fall_back_to_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(cfg.kosis.cache_ttl_secs, 600);
        assert_eq!(cfg.kosis.timeout_secs, 12);
        assert_eq!(cfg.base_rate.timeout_secs, 8);
        assert_eq!(cfg.base_rate.pages.len(), 2);
        assert_eq!(cfg.session.address_debounce_ms, 700);
        assert!(cfg.storage.data_dir.is_none());
        assert!(cfg.report.font_path.is_none());
    }

    #[test]
    fn toml_overrides_single_fields() {
        let toml = r#"
            [kosis]
            api_key = "abc"
            cache_ttl_secs = 60

            [storage]
            data_dir = "/tmp/cns"

            [report]
            font_path = "/fonts/NanumGothic.ttf"
        "#;
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(cfg.kosis.api_key, "abc");
        assert_eq!(cfg.kosis.cache_ttl_secs, 60);
        assert_eq!(cfg.kosis.org_id, "408");
        assert_eq!(cfg.storage.data_dir, Some(PathBuf::from("/tmp/cns")));
        assert_eq!(cfg.report.font_path, Some(PathBuf::from("/fonts/NanumGothic.ttf")));
    }
}
