//! Mirror sync: append the day's newly scraped rows to a spreadsheet tab,
//! skipping identifiers the sheet already holds.

pub mod sheets;

use crate::models::RawRow;
use crate::payload::SourceSchema;
use crate::storage::Repository;
use crate::utils::column_key;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use self::sheets::SheetsError;

/// Spreadsheet tab reachable by name.
#[async_trait]
pub trait SheetSink: Send + Sync {
    /// First row of the tab; empty when the tab is blank.
    async fn read_header(&self, sheet: &str) -> Result<Vec<String>, SheetsError>;
    /// Every cell of one column, header row included.
    async fn read_column(&self, sheet: &str, index: usize) -> Result<Vec<String>, SheetsError>;
    /// Append rows in a single call. Returns the number of rows written.
    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<Value>>) -> Result<usize, SheetsError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub scanned: usize,
    pub appended: usize,
    pub already_present: usize,
    pub missing_id: usize,
    pub wrote_header: bool,
}

/// Index of the identifier column, first column when none matches.
pub fn locate_id_column(header: &[String]) -> usize {
    header
        .iter()
        .position(|h| column_key(h) == "listid")
        .unwrap_or(0)
}

/// Rows to append, each laid out in header order. Updates `known` with the
/// identifiers it accepts so a batch never carries the same id twice.
pub fn plan_append(header: &[String], known: &mut HashSet<String>, rows: &[RawRow]) -> (Vec<Vec<Value>>, MirrorReport) {
    let mut report = MirrorReport { scanned: rows.len(), ..MirrorReport::default() };
    let mut out = Vec::new();

    for row in rows {
        let Some(id) = row.list_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            report.missing_id += 1;
            continue;
        };
        if !known.insert(id.to_string()) {
            report.already_present += 1;
            continue;
        }

        let by_key: HashMap<String, &str> = row.fields.keys().map(|k| (column_key(k), k.as_str())).collect();
        let values = header
            .iter()
            .map(|h| match by_key.get(&column_key(h)) {
                Some(col) => row.get(col).to_json(),
                None => Value::Null,
            })
            .collect();
        out.push(values);
    }

    report.appended = out.len();
    (out, report)
}

pub struct MirrorSync<S: SheetSink> {
    sink: S,
}

impl<S: SheetSink> MirrorSync<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn mirror_table(&self, store: &Repository, schema: &SourceSchema, date: NaiveDate) -> Result<MirrorReport> {
        let sheet = schema.sheet;

        let mut header = self
            .sink
            .read_header(sheet)
            .await
            .with_context(|| format!("read header of '{}'", sheet))?;
        let blank = header.iter().all(|h| h.is_empty());
        if blank {
            header = schema.columns.iter().map(|c| c.to_string()).collect();
        }

        let id_col = locate_id_column(&header);
        let mut known: HashSet<String> = if blank {
            HashSet::new()
        } else {
            self.sink
                .read_column(sheet, id_col)
                .await
                .with_context(|| format!("read id column of '{}'", sheet))?
                .into_iter()
                .skip(1)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        info!("[{}] sheet '{}' holds {} ids", schema.label, sheet, known.len());

        let rows = store.rows_scraped_on(schema, date)?;
        let (mut batch, mut report) = plan_append(&header, &mut known, &rows);
        if report.missing_id > 0 {
            warn!("[{}] {} rows without list_id skipped", schema.label, report.missing_id);
        }

        if batch.is_empty() {
            info!("[{}] nothing new for {} ({} scanned)", schema.label, date, report.scanned);
            return Ok(report);
        }

        if blank {
            batch.insert(0, header.iter().map(|h| Value::String(h.clone())).collect());
            report.wrote_header = true;
        }

        self.sink
            .append_rows(sheet, batch)
            .await
            .with_context(|| format!("append to '{}'", sheet))?;

        info!(
            "[{}] appended {} rows to '{}' ({} already present, {} without id)",
            schema.label, report.appended, sheet, report.already_present, report.missing_id
        );
        Ok(report)
    }
}
