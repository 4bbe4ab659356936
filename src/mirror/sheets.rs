//! Google Sheets v4 `values` endpoints used by the mirror.

use crate::config::SheetsConfig;
use crate::mirror::SheetSink;
use crate::sync::error::{SNAPSHOT_LEN, truncate};
use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("sheets request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sheets answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected sheets response: {0}")]
    Decode(String),

    #[error("invalid sheets url: {0}")]
    Url(String),
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    #[serde(default)]
    updates: AppendUpdates,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_rows: Option<usize>,
}

/// `0 → A`, `25 → Z`, `26 → AA`.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn a1(sheet: &str, cells: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), cells)
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub struct GoogleSheetsClient {
    inner: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: String,
}

impl GoogleSheetsClient {
    pub fn new(config: &SheetsConfig) -> anyhow::Result<Self> {
        if config.spreadsheet_id.trim().is_empty() {
            bail!("sheets.spreadsheet_id is not configured");
        }
        if config.access_token.trim().is_empty() {
            bail!("sheets.access_token is not configured");
        }

        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build sheets client")?;

        Ok(Self {
            inner,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.trim().to_string(),
            access_token: config.access_token.trim().to_string(),
        })
    }

    /// `{base}/spreadsheets/{id}/values/{range}{suffix}`
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, SheetsError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| SheetsError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Url(self.base_url.clone()))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }

    async fn read_values(&self, range: &str) -> Result<Vec<Vec<Value>>, SheetsError> {
        let url = self.values_url(range, "")?;
        debug!("GET {}", url);
        let resp = self.inner.get(url).bearer_auth(&self.access_token).send().await?;
        let body = checked_body(resp).await?;
        let parsed: ValueRange = serde_json::from_str(&body).map_err(|e| SheetsError::Decode(e.to_string()))?;
        Ok(parsed.values)
    }
}

async fn checked_body(resp: reqwest::Response) -> Result<String, SheetsError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(SheetsError::Status { status: status.as_u16(), body: truncate(&body, SNAPSHOT_LEN) })
    }
}

#[async_trait]
impl SheetSink for GoogleSheetsClient {
    async fn read_header(&self, sheet: &str) -> Result<Vec<String>, SheetsError> {
        let values = self.read_values(&a1(sheet, "1:1")).await?;
        Ok(values
            .into_iter()
            .next()
            .map(|row| row.iter().map(cell_text).collect())
            .unwrap_or_default())
    }

    async fn read_column(&self, sheet: &str, index: usize) -> Result<Vec<String>, SheetsError> {
        let col = column_letter(index);
        let values = self.read_values(&a1(sheet, &format!("{}:{}", col, col))).await?;
        Ok(values
            .iter()
            .map(|row| row.first().map(cell_text).unwrap_or_default())
            .collect())
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<Value>>) -> Result<usize, SheetsError> {
        let sent = rows.len();
        let mut url = self.values_url(&a1(sheet, "A1"), ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        debug!("POST {} ({} rows)", url, sent);
        let resp = self
            .inner
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "majorDimension": "ROWS", "values": rows }))
            .send()
            .await?;
        let body = checked_body(resp).await?;

        let parsed: AppendResponse = serde_json::from_str(&body).unwrap_or_default();
        Ok(parsed.updates.updated_rows.unwrap_or(sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleSheetsClient {
        GoogleSheetsClient::new(&SheetsConfig {
            spreadsheet_id: "abc123".into(),
            access_token: "token".into(),
            ..SheetsConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_values_url() {
        let url = client().values_url(&a1("iproperty-new-listing", "A1"), ":append").unwrap();
        assert!(
            url.as_str()
                .starts_with("https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'iproperty-new-listing'!A1:append"),
            "{}",
            url
        );
    }

    #[test]
    fn test_missing_credentials() {
        assert!(GoogleSheetsClient::new(&SheetsConfig::default()).is_err());
    }

    #[test]
    fn test_value_range_decoding() {
        let parsed: ValueRange =
            serde_json::from_str(r#"{"range":"'x'!A1:A3","majorDimension":"ROWS","values":[["list_id"],[],[123]]}"#).unwrap();
        let cells: Vec<String> = parsed
            .values
            .iter()
            .map(|row| row.first().map(cell_text).unwrap_or_default())
            .collect();
        assert_eq!(cells, vec!["list_id", "", "123"]);

        let empty: ValueRange = serde_json::from_str(r#"{"range":"'x'!1:1"}"#).unwrap();
        assert!(empty.values.is_empty());
    }
}
