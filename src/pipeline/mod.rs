//! Run controller: ties storage → synchronizer / mirror together.
//!
//! ## Run modes
//!
//! `push()` — deliver pending rows of every selected table to the valuation
//!   API, one table after another in `list_id` order. Counters are logged
//!   live and the run is recorded in `sync_runs`. Re-running only picks up
//!   rows that are still pending.
//!
//! `mirror()` — append rows scraped on one day to the matching spreadsheet
//!   tabs, skipping identifiers already present.

use crate::config::AppConfig;
use crate::mirror::sheets::GoogleSheetsClient;
use crate::mirror::{MirrorReport, MirrorSync, SheetSink};
use crate::models::RunCounters;
use crate::normalizer::NormalizeContext;
use crate::payload::{SourceSchema, select_sources};
use crate::storage::Repository;
use crate::sync::http_client::HttpValuationClient;
use crate::sync::{Synchronizer, ValuationApi};
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tracing::{error, info, warn};

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    fn open_store(&self) -> Result<Repository> {
        let repo = Repository::open(&self.config.storage.db_path).context("Failed to open DuckDB")?;
        if self.config.storage.run_migrations {
            repo.run_migrations()?;
        }
        Ok(repo)
    }

    pub async fn push(&self, table: Option<&str>, scraped_on: Option<NaiveDate>, today: NaiveDate) -> Result<RunCounters> {
        let schemas = select_sources(table)?;
        let client = HttpValuationClient::new(&self.config.api).context("Cannot push")?;
        let store = self.open_store()?;

        let ctx = NormalizeContext::new(today, self.config.sync.bedroom_clamp);
        let mut sync = Synchronizer::from_config(client, &self.config.sync, ctx);
        run_push(&store, &mut sync, &schemas, scraped_on).await
    }

    pub async fn mirror(&self, table: Option<&str>, date: NaiveDate) -> Result<Vec<(&'static str, MirrorReport)>> {
        let schemas = select_sources(table)?;
        let sink = GoogleSheetsClient::new(&self.config.sheets).context("Cannot mirror")?;
        let store = self.open_store()?;

        run_mirror(&store, &MirrorSync::new(sink), &schemas, date).await
    }
}

/// Push loop over tables with run bookkeeping. A store error aborts the run
/// and marks it `error`; delivery failures only show up in the counters.
pub async fn run_push<A: ValuationApi>(
    store: &Repository,
    sync: &mut Synchronizer<A>,
    schemas: &[&'static SourceSchema],
    scraped_on: Option<NaiveDate>,
) -> Result<RunCounters> {
    let run_id = store.begin_run("push")?;
    match scraped_on {
        Some(d) => info!("=== Push run {} (scraped on {}) ===", run_id, d),
        None => info!("=== Push run {} (all pending) ===", run_id),
    }

    for schema in schemas {
        info!("=== {} ({}, {}) ===", schema.label, schema.table, schema.kind);
        match sync.sync_table(store, schema, scraped_on).await {
            Ok(c) => info!("[{}] done | {}", schema.label, c),
            Err(e) => {
                error!("[{}] run aborted: {:#}", schema.label, e);
                if let Err(log_err) = store.finish_run(run_id, &sync.counters(), Some(&format!("{:#}", e))) {
                    warn!("Could not record run {}: {:#}", run_id, log_err);
                }
                return Err(e.context(format!("push aborted on {}", schema.table)));
            }
        }
    }

    let total = sync.counters();
    store.finish_run(run_id, &total, None)?;
    info!("=== Done: {} ===", total);
    Ok(total)
}

/// Mirror every table; a failing sheet does not stop the others but fails
/// the command at the end.
pub async fn run_mirror<S: SheetSink>(
    store: &Repository,
    mirror: &MirrorSync<S>,
    schemas: &[&'static SourceSchema],
    date: NaiveDate,
) -> Result<Vec<(&'static str, MirrorReport)>> {
    info!("=== Mirror rows scraped on {} ===", date);
    let mut reports = Vec::new();
    let mut failed = Vec::new();

    for schema in schemas {
        match mirror.mirror_table(store, schema, date).await {
            Ok(report) => reports.push((schema.label, report)),
            Err(e) => {
                error!("[{}] mirror failed: {:#}", schema.label, e);
                failed.push(schema.label);
            }
        }
    }

    let appended: usize = reports.iter().map(|(_, r)| r.appended).sum();
    info!("=== Done: {} rows appended | {} sheets failed ===", appended, failed.len());

    if !failed.is_empty() {
        bail!("mirror failed for {}", failed.join(", "));
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::sheets::SheetsError;
    use crate::models::{CanonicalPayload, RawRow};
    use crate::payload::{SOURCES, schema_for};
    use crate::sync::error::DeliveryError;
    use crate::sync::retry::RetryPolicy;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    struct AlwaysOk;

    #[async_trait]
    impl ValuationApi for AlwaysOk {
        async fn submit(&self, _payload: &CanonicalPayload) -> Result<u16, DeliveryError> {
            Ok(200)
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 19).unwrap()
    }

    fn listing(id: &str, complete: bool) -> RawRow {
        let mut fields = vec![
            ("list_id", id),
            ("name", "Residensi Sentral"),
            ("url", "https://www.iproperty.com.my/property/setapak/sale-108123456/"),
            ("area", "Setapak"),
            ("state", "Kuala Lumpur"),
            ("price", "450000"),
            ("built_up_size", "950 sq. ft."),
            ("data_scraping_date", "2025-10-19"),
        ];
        if complete {
            fields.push(("lat", "3.19"));
            fields.push(("lng", "101.72"));
        }
        fields.into_iter().collect()
    }

    fn seeded() -> Repository {
        let store = Repository::open_in_memory().unwrap();
        store.run_migrations().unwrap();
        store.insert_rows(&SOURCES[0], &[listing("1", true), listing("2", false)]).unwrap();
        store.insert_rows(&SOURCES[2], &[listing("9", true)]).unwrap();
        store
    }

    #[tokio::test]
    async fn test_push_runs_every_table_and_logs_run() {
        let store = seeded();
        let ctx = NormalizeContext::new(day(), false);
        let mut sync = Synchronizer::new(AlwaysOk, RetryPolicy::fixed(1, Duration::ZERO), ctx);
        let schemas = select_sources(None).unwrap();

        let total = run_push(&store, &mut sync, &schemas, None).await.unwrap();
        assert_eq!(total, RunCounters { to_send: 2, success: 2, fail: 0, skipped: 1 });

        let run = store.last_run().unwrap().unwrap();
        assert_eq!(run.command, "push");
        assert_eq!(run.status, "success");
        assert_eq!(run.counters, total);

        // second run: only the invalid row remains, and it is skipped again
        let mut again = Synchronizer::new(AlwaysOk, RetryPolicy::fixed(1, Duration::ZERO), ctx);
        let total = run_push(&store, &mut again, &schemas, None).await.unwrap();
        assert_eq!(total, RunCounters { to_send: 0, success: 0, fail: 0, skipped: 1 });
    }

    struct BrokenSheet;

    #[async_trait]
    impl SheetSink for BrokenSheet {
        async fn read_header(&self, sheet: &str) -> Result<Vec<String>, SheetsError> {
            if sheet == "iproperty-new-listing" {
                Err(SheetsError::Status { status: 403, body: "forbidden".into() })
            } else {
                Ok(vec!["list_id".into()])
            }
        }

        async fn read_column(&self, _sheet: &str, _index: usize) -> Result<Vec<String>, SheetsError> {
            Ok(vec!["list_id".into()])
        }

        async fn append_rows(&self, _sheet: &str, rows: Vec<Vec<Value>>) -> Result<usize, SheetsError> {
            Ok(rows.len())
        }
    }

    #[tokio::test]
    async fn test_mirror_failure_is_reported_after_other_tables() {
        let store = seeded();
        let schemas = vec![schema_for("iproperty").unwrap(), schema_for("iproperty-auction").unwrap()];

        let err = run_mirror(&store, &MirrorSync::new(BrokenSheet), &schemas, day())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("iproperty"));

        let ok = run_mirror(&store, &MirrorSync::new(BrokenSheet), &schemas[1..], day())
            .await
            .unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].1.appended, 1);
    }
}
