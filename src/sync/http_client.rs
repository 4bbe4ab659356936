use crate::config::ApiConfig;
use crate::models::CanonicalPayload;
use crate::sync::ValuationApi;
use crate::sync::error::{DeliveryError, parse_error_reasons};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Valuation API over HTTPS.
pub struct HttpValuationClient {
    inner: reqwest::Client,
    endpoint: url::Url,
    api_key: String,
}

impl HttpValuationClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let api_key = config.api_key.trim().to_string();
        if api_key.is_empty() {
            bail!("API key is not configured (set api.api_key or PLATINUM_DEALS_API_KEY)");
        }

        let endpoint = url::Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid API endpoint {:?}", config.endpoint))?;

        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner, endpoint, api_key })
    }
}

#[async_trait]
impl ValuationApi for HttpValuationClient {
    async fn submit(&self, payload: &CanonicalPayload) -> Result<u16, DeliveryError> {
        debug!("POST {}", self.endpoint);

        let resp = self
            .inner
            .post(self.endpoint.clone())
            .header("Api-Key", &self.api_key)
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        // A body that cannot be read still leaves the status to report
        let body = resp.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            reasons: parse_error_reasons(&body),
        })
    }
}
