use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
}

/// Valuation API endpoint and credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Delivery loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Pause between two deliveries.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    #[serde(default)]
    pub pacing_jitter_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Double the delay after each failed attempt instead of a fixed pause.
    #[serde(default)]
    pub exponential_backoff: bool,

    /// Retry 4xx answers too (other than 408/429, which are always retried).
    #[serde(default = "default_true")]
    pub retry_client_errors: bool,

    /// Map bedroom counts above five to five instead of dropping them.
    #[serde(default)]
    pub bedroom_clamp: bool,

    /// Log advisory domain issues before each delivery.
    #[serde(default = "default_true")]
    pub precheck: bool,
}

/// Spreadsheet mirror configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SheetsConfig {
    #[serde(default)]
    pub spreadsheet_id: String,

    /// OAuth bearer token with the spreadsheets scope.
    #[serde(default)]
    pub access_token: String,

    #[serde(default = "default_sheets_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_endpoint() -> String {
    "https://app.propertylab.tech/api/properties/platinum-deals/calculate-market-value".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "listing-sync/0.1".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/listings.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_pacing_ms() -> u64 {
    400
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1
}
fn default_sheets_base_url() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            pacing_jitter_ms: 0,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: false,
            retry_client_errors: true,
            bedroom_clamp: false,
            precheck: true,
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            access_token: String::new(),
            base_url: default_sheets_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
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
            .add_source(config::Environment::with_prefix("LISTING").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        let mut app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;

        // The key historically lives in its own variable
        if app_cfg.api.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("PLATINUM_DEALS_API_KEY") {
                app_cfg.api.api_key = key.trim().to_string();
            }
        }

        Ok(app_cfg)
    }
}
