use crate::models::{DeliveryStatus, RawRow, RawValue, RunCounters, RunRecord};
use crate::normalizer::to_f64;
use crate::payload::{SOURCES, SourceSchema};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use duckdb::types::{TimeUnit, Value};
use duckdb::{Connection, params, params_from_iter};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS sync_runs_id_seq START 1;

CREATE TABLE IF NOT EXISTS sync_runs (
    id              INTEGER PRIMARY KEY DEFAULT nextval('sync_runs_id_seq'),
    command         VARCHAR NOT NULL,
    started_at      TIMESTAMP NOT NULL,
    finished_at     TIMESTAMP,
    status          VARCHAR NOT NULL DEFAULT 'running',
    to_send         INTEGER DEFAULT 0,
    success         INTEGER DEFAULT 0,
    fail            INTEGER DEFAULT 0,
    skipped         INTEGER DEFAULT 0,
    error_msg       VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

/// Storage type of a source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Text,
    Decimal,
    Flag,
    Date,
}

fn column_kind(column: &str) -> ColumnKind {
    match column {
        "price" | "built_up_price" => ColumnKind::Decimal,
        "new_project" | "auction" | "below_market_value" | "urgent" => ColumnKind::Flag,
        "data_scraping_date" => ColumnKind::Date,
        _ => ColumnKind::Text,
    }
}

fn create_table_sql(schema: &SourceSchema) -> String {
    let mut cols: Vec<String> = schema
        .columns
        .iter()
        .map(|&c| match (c, column_kind(c)) {
            ("list_id", _) => "    list_id VARCHAR PRIMARY KEY".to_string(),
            (c, ColumnKind::Decimal) => format!("    {} DECIMAL(18,2)", c),
            (c, ColumnKind::Flag) => format!("    {} BOOLEAN", c),
            (c, ColumnKind::Date) => format!("    {} DATE", c),
            (c, ColumnKind::Text) => format!("    {} VARCHAR", c),
        })
        .collect();
    cols.push("    api_update_status INTEGER".to_string());

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\nCREATE INDEX IF NOT EXISTS idx_{}_scraped ON {} (data_scraping_date);\n",
        schema.table,
        cols.join(",\n"),
        schema.table,
        schema.table,
    )
}

// ── Value conversion ──────────────────────────────────────────────────────────

fn epoch() -> NaiveDate {
    DateTime::UNIX_EPOCH.date_naive()
}

/// Store cell → raw value. Decimals become floats here and nowhere else.
fn from_db_value(v: Value) -> RawValue {
    match v {
        Value::Text(s) => RawValue::Text(s),
        Value::Boolean(b) => RawValue::Text(b.to_string()),
        Value::TinyInt(n) => RawValue::Number(n as f64),
        Value::SmallInt(n) => RawValue::Number(n as f64),
        Value::Int(n) => RawValue::Number(n as f64),
        Value::BigInt(n) => RawValue::Number(n as f64),
        Value::HugeInt(n) => RawValue::Number(n as f64),
        Value::UTinyInt(n) => RawValue::Number(n as f64),
        Value::USmallInt(n) => RawValue::Number(n as f64),
        Value::UInt(n) => RawValue::Number(n as f64),
        Value::UBigInt(n) => RawValue::Number(n as f64),
        Value::Float(n) => RawValue::Number(n as f64),
        Value::Double(n) => RawValue::Number(n),
        Value::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(RawValue::Number)
            .unwrap_or(RawValue::Null),
        Value::Date32(days) => epoch()
            .checked_add_signed(TimeDelta::days(days as i64))
            .map(RawValue::Date)
            .unwrap_or(RawValue::Null),
        Value::Timestamp(unit, v) => {
            let micros = match unit {
                TimeUnit::Second => v.saturating_mul(1_000_000),
                TimeUnit::Millisecond => v.saturating_mul(1_000),
                TimeUnit::Microsecond => v,
                TimeUnit::Nanosecond => v / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|t| RawValue::DateTime(t.naive_utc()))
                .unwrap_or(RawValue::Null)
        }
        _ => RawValue::Null,
    }
}

fn date_param(d: NaiveDate) -> Value {
    Value::Date32((d - epoch()).num_days() as i32)
}

fn truthy(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Raw value → store cell for a column of the given kind.
fn to_db_value(kind: ColumnKind, v: &RawValue) -> Value {
    match kind {
        ColumnKind::Text => v.as_text().map(Value::Text).unwrap_or(Value::Null),
        ColumnKind::Decimal => to_f64(v).map(Value::Double).unwrap_or(Value::Null),
        ColumnKind::Flag => match v {
            RawValue::Number(n) => Value::Boolean(*n != 0.0),
            other => other
                .as_text()
                .and_then(|s| truthy(&s))
                .map(Value::Boolean)
                .unwrap_or(Value::Null),
        },
        ColumnKind::Date => match v {
            RawValue::Date(d) => date_param(*d),
            RawValue::DateTime(dt) => date_param(dt.date()),
            other => other
                .as_text()
                .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(&s), "%Y-%m-%d").ok())
                .map(date_param)
                .unwrap_or(Value::Null),
        },
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        for schema in SOURCES.iter() {
            self.conn
                .execute_batch(&create_table_sql(schema))
                .with_context(|| format!("DDL failed for {}", schema.table))?;
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Source rows ───────────────────────────────────────────────────────────

    fn select_rows(&self, schema: &SourceSchema, filter: &str, args: Vec<Value>) -> Result<Vec<RawRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY list_id ASC",
            schema.columns.join(", "),
            schema.table,
            filter,
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("prepare select on {}", schema.table))?;
        let mut rows = stmt.query(params_from_iter(args))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fields = BTreeMap::new();
            for (i, col) in schema.columns.iter().enumerate() {
                let v: Value = row.get(i)?;
                fields.insert(col.to_string(), from_db_value(v));
            }
            out.push(RawRow::new(fields));
        }
        Ok(out)
    }

    /// Rows not yet delivered, optionally limited to one scrape date, in
    /// ascending `list_id` order.
    pub fn fetch_pending(&self, schema: &SourceSchema, scraped_on: Option<NaiveDate>) -> Result<Vec<RawRow>> {
        let pending = "(api_update_status IS NULL OR api_update_status = 0)";
        let rows = match scraped_on {
            Some(d) => self.select_rows(
                schema,
                &format!("{} AND data_scraping_date = ?", pending),
                vec![date_param(d)],
            )?,
            None => self.select_rows(schema, pending, vec![])?,
        };
        debug!("{}: {} pending rows", schema.label, rows.len());
        Ok(rows)
    }

    /// Every row scraped on `date`, whatever its delivery status.
    pub fn rows_scraped_on(&self, schema: &SourceSchema, date: NaiveDate) -> Result<Vec<RawRow>> {
        self.select_rows(schema, "data_scraping_date = ?", vec![date_param(date)])
    }

    /// Flag one row as delivered and commit before returning.
    pub fn mark_delivered(&self, schema: &SourceSchema, list_id: &str) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let n = tx
            .execute(
                &format!("UPDATE {} SET api_update_status = ? WHERE list_id = ?", schema.table),
                params![DeliveryStatus::Delivered.flag(), list_id],
            )
            .with_context(|| format!("mark {} delivered in {}", list_id, schema.table))?;
        tx.commit()?;
        Ok(n)
    }

    pub fn status_of(&self, schema: &SourceSchema, list_id: &str) -> Result<Option<DeliveryStatus>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT api_update_status FROM {} WHERE list_id = ?", schema.table))?;
        let mut rows = stmt.query(params![list_id])?;
        match rows.next()? {
            Some(row) => {
                let flag: Option<i64> = row.get(0)?;
                Ok(Some(DeliveryStatus::from_flag(flag)))
            }
            None => Ok(None),
        }
    }

    /// `(pending, delivered)` row counts.
    pub fn status_counts(&self, schema: &SourceSchema) -> Result<(i64, i64)> {
        let sql = format!(
            r#"SELECT
                   COUNT(*) FILTER (WHERE api_update_status IS NULL OR api_update_status = 0),
                   COUNT(*) FILTER (WHERE api_update_status = 1)
               FROM {}"#,
            schema.table
        );
        let mut s = self.conn.prepare(&sql)?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    pub fn scrape_date_range(&self, schema: &SourceSchema) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let mut s = self.conn.prepare(&format!(
            "SELECT MIN(data_scraping_date), MAX(data_scraping_date) FROM {}",
            schema.table
        ))?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    /// Insert rows, ignoring identifiers that already exist. Returns the
    /// number of rows actually inserted.
    pub fn insert_rows(&self, schema: &SourceSchema, rows: &[RawRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; schema.columns.len()].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            schema.table,
            schema.columns.join(", "),
            placeholders,
        );

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0usize;
        for row in rows {
            let values: Vec<Value> = schema
                .columns
                .iter()
                .map(|&c| to_db_value(column_kind(c), row.get(c)))
                .collect();
            inserted += tx
                .execute(&sql, params_from_iter(values))
                .with_context(|| format!("insert {:?} into {}", row.list_id, schema.table))?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    // ── Run log ───────────────────────────────────────────────────────────────

    pub fn begin_run(&self, command: &str) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO sync_runs (command, started_at, status) VALUES (?, ?, 'running') RETURNING id",
            params![command, Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_run(&self, run_id: i64, counters: &RunCounters, error: Option<&str>) -> Result<()> {
        self.conn.execute(
            r#"UPDATE sync_runs SET
               finished_at = ?, status = ?,
               to_send = ?, success = ?, fail = ?, skipped = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                counters.to_send as i64,
                counters.success as i64,
                counters.fail as i64,
                counters.skipped as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_run(&self) -> Result<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, command, started_at, finished_at, status,
                      to_send, success, fail, skipped, error_msg
               FROM sync_runs ORDER BY id DESC LIMIT 1"#,
        )?;
        let mut rows = stmt.query([])?;
        let Some(r) = rows.next()? else {
            return Ok(None);
        };

        let count = |i: usize| -> Result<usize> {
            let n: Option<i64> = r.get(i)?;
            Ok(n.unwrap_or(0).max(0) as usize)
        };
        let started_at: NaiveDateTime = r.get(2)?;
        Ok(Some(RunRecord {
            id: r.get(0)?,
            command: r.get(1)?,
            started_at,
            finished_at: r.get(3)?,
            status: r.get(4)?,
            counters: RunCounters {
                to_send: count(5)?,
                success: count(6)?,
                fail: count(7)?,
                skipped: count(8)?,
            },
            error_msg: r.get(9)?,
        }))
    }
}
