//! CSV loader for importing crawler output into a source table.

use crate::models::{RawRow, RawValue};
use crate::normalizer::{analyze_description, extract_list_id, to_f64};
use crate::payload::SourceSchema;
use crate::utils::column_key;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub read: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub missing_id: usize,
    pub malformed: usize,
}

/// Map CSV header positions to schema columns by normalized name.
fn column_positions(headers: &csv::StringRecord, schema: &SourceSchema) -> Vec<(usize, &'static str)> {
    let by_key: HashMap<String, &'static str> = schema.columns.iter().map(|&c| (column_key(c), c)).collect();
    let mut positions = Vec::new();
    for (i, h) in headers.iter().enumerate() {
        match by_key.get(&column_key(h)) {
            Some(&col) => positions.push((i, col)),
            None => debug!("ignoring CSV column {:?}", h),
        }
    }
    positions
}

/// Fill the derived columns of one crawled row: identifier from the URL,
/// keyword flags from the description, numeric prices and the scrape date.
pub fn prepare_row(mut fields: BTreeMap<String, RawValue>, today: NaiveDate) -> RawRow {
    let blank = |fields: &BTreeMap<String, RawValue>, key: &str| fields.get(key).is_none_or(|v| v.as_text().is_none());

    if blank(&fields, "list_id") {
        if let Some(id) = fields.get("url").and_then(RawValue::as_text).and_then(|u| extract_list_id(&u)) {
            fields.insert("list_id".into(), RawValue::Text(id));
        }
    }

    let description = fields.get("description").and_then(RawValue::as_text);
    let flags = analyze_description(description.as_deref());
    for (key, value) in [
        ("new_project", flags.new_project),
        ("auction", flags.auction),
        ("below_market_value", flags.below_market_value),
        ("urgent", flags.urgent),
    ] {
        if blank(&fields, key) {
            fields.insert(key.into(), RawValue::text(value.to_string()));
        }
    }

    for key in ["price", "built_up_price"] {
        if let Some(v) = fields.get_mut(key) {
            *v = to_f64(v).into();
        }
    }

    if blank(&fields, "data_scraping_date") {
        fields.insert("data_scraping_date".into(), RawValue::Date(today));
    }

    RawRow::new(fields)
}

/// Read crawler CSV rows for `schema`. Rows without an identifier are
/// dropped; for repeated identifiers the first row wins.
pub fn read_listings<R: Read>(reader: R, schema: &SourceSchema, today: NaiveDate) -> Result<(Vec<RawRow>, ImportStats)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers().context("CSV has no header row")?.clone();
    let positions = column_positions(&headers, schema);
    if !positions.iter().any(|&(_, c)| c == "list_id" || c == "url") {
        warn!("CSV has neither list_id nor url; every row will be dropped");
    }

    let mut stats = ImportStats::default();
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for (i, result) in reader.records().enumerate() {
        stats.read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {}: {}", i + 1, e);
                stats.malformed += 1;
                continue;
            }
        };

        let fields: BTreeMap<String, RawValue> = positions
            .iter()
            .filter_map(|&(pos, col)| record.get(pos).map(|v| (col.to_string(), RawValue::text(v))))
            .collect();
        let row = prepare_row(fields, today);

        let Some(id) = row.list_id.clone() else {
            debug!("Row {}: no list_id and no usable url", i + 1);
            stats.missing_id += 1;
            continue;
        };
        if !seen.insert(id) {
            stats.duplicates += 1;
            continue;
        }
        rows.push(row);
    }

    stats.accepted = rows.len();
    Ok((rows, stats))
}

pub fn load_csv(path: &Path, schema: &SourceSchema, today: NaiveDate) -> Result<(Vec<RawRow>, ImportStats)> {
    debug!("Loading {} from {:?}", schema.table, path);
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let (rows, stats) = read_listings(file, schema, today).with_context(|| format!("Failed to read {:?}", path))?;
    info!(
        "{}: {} rows read, {} accepted, {} duplicates, {} without id",
        schema.label, stats.read, stats.accepted, stats.duplicates, stats.missing_id
    );
    Ok((rows, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::schema_for;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 19).unwrap()
    }

    const CSV: &str = "\
Name,URL,Price,Bed Rooms,Description,List ID,Agent Phone
Residensi Sentral,https://www.iproperty.com.my/property/setapak/sale-108123456/,\"RM 450,000\",3,Urgent sale below market,,0123
Duplicate,https://www.iproperty.com.my/property/setapak/sale-108123456/,1,1,,,
No Id,https://www.iproperty.com.my/property/setapak/,1,1,,,
Villa Harmoni,https://www.propertyguru.com.my/property-listing/villa-harmoni-40011223,n/a,2,New launch with rebate,40011223,
";

    #[test]
    fn test_import_derives_columns() {
        let schema = schema_for("iproperty").unwrap();
        let (rows, stats) = read_listings(CSV.as_bytes(), schema, today()).unwrap();

        assert_eq!(stats, ImportStats { read: 4, accepted: 2, duplicates: 1, missing_id: 1, malformed: 0 });

        let first = &rows[0];
        assert_eq!(first.list_id.as_deref(), Some("108123456"));
        assert_eq!(first.get("price"), &RawValue::Number(450_000.0));
        assert_eq!(first.get("urgent"), &RawValue::text("true"));
        assert_eq!(first.get("below_market_value"), &RawValue::text("true"));
        assert_eq!(first.get("new_project"), &RawValue::text("false"));
        assert_eq!(first.get("data_scraping_date"), &RawValue::Date(today()));
        assert!(first.fields.get("agent_phone").is_none());

        let second = &rows[1];
        assert_eq!(second.list_id.as_deref(), Some("40011223"));
        assert_eq!(second.get("price"), &RawValue::Null);
        assert_eq!(second.get("new_project"), &RawValue::text("true"));
    }

    #[test]
    fn test_imported_rows_land_in_store() {
        let store = crate::storage::Repository::open_in_memory().unwrap();
        store.run_migrations().unwrap();
        let schema = schema_for("iproperty").unwrap();

        let (rows, _) = read_listings(CSV.as_bytes(), schema, today()).unwrap();
        assert_eq!(store.insert_rows(schema, &rows).unwrap(), 2);
        // re-import keeps the stored rows
        assert_eq!(store.insert_rows(schema, &rows).unwrap(), 0);
        assert_eq!(store.fetch_pending(schema, Some(today())).unwrap().len(), 2);
    }
}
