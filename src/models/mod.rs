use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Raw values ────────────────────────────────────────────────────────────────

/// One raw cell as handed over by the store or the crawler output.
///
/// Decimal-like store values are already converted to `Number` at the store
/// boundary, so nothing downstream ever sees a fixed-point type.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    #[default]
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        RawValue::Text(s.into())
    }

    /// Trimmed text view; `None` for null and blank strings.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Text(s) => {
                let s = s.trim();
                if s.is_empty() { None } else { Some(s.to_string()) }
            }
            RawValue::Number(n) => Some(fmt_plain_number(*n)),
            RawValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            RawValue::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// JSON-safe scalar used by the spreadsheet mirror.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RawValue::Null => serde_json::Value::Null,
            RawValue::Text(s) => serde_json::Value::String(s.clone()),
            RawValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            RawValue::Date(_) | RawValue::DateTime(_) => self
                .as_text()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// "1800000" rather than "1800000.0" for whole numbers.
fn fmt_plain_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ── Source rows ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    NewListing,
    AuctionListing,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::NewListing => f.write_str("new-listing"),
            SourceKind::AuctionListing => f.write_str("auction-listing"),
        }
    }
}

/// One unnormalized listing as read from a source table.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub list_id: Option<String>,
    pub fields: BTreeMap<String, RawValue>,
}

impl RawRow {
    pub fn new(fields: BTreeMap<String, RawValue>) -> Self {
        let list_id = fields.get("list_id").and_then(RawValue::as_text);
        Self { list_id, fields }
    }

    pub fn get(&self, key: &str) -> &RawValue {
        static NULL: RawValue = RawValue::Null;
        self.fields.get(key).unwrap_or(&NULL)
    }

    /// Display name for log lines.
    pub fn display_name(&self) -> String {
        self.get("name").as_text().unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RawRow::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ── Canonical payload ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Subsale,
    Auction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tenure {
    Freehold,
    Leasehold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    #[default]
    Condo,
    Apartment,
    ServicedResidence,
    Flat,
    Landed,
}

impl PropertyType {
    pub const ALL: [PropertyType; 5] = [
        PropertyType::Condo,
        PropertyType::Apartment,
        PropertyType::ServicedResidence,
        PropertyType::Flat,
        PropertyType::Landed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyType::Condo => "condo",
            PropertyType::Apartment => "apartment",
            PropertyType::ServicedResidence => "serviced_residence",
            PropertyType::Flat => "flat",
            PropertyType::Landed => "landed",
        }
    }
}

/// The normalized record accepted by the valuation API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalPayload {
    pub property_name: Option<String>,
    pub listing_url: Option<String>,
    pub area: Option<String>,
    pub state: Option<String>,
    pub price: f64,
    pub no_of_bedroom: Option<u32>,
    pub no_of_bathroom: Option<f64>,
    pub no_of_carpark: Option<f64>,
    pub size: Option<f64>,
    pub built_up_price: Option<f64>,
    pub property_tenure: Option<Tenure>,
    pub property_type: PropertyType,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub listing_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_date: Option<String>,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
}

impl CanonicalPayload {
    pub fn empty(listing_type: ListingType) -> Self {
        Self {
            property_name: None,
            listing_url: None,
            area: None,
            state: None,
            price: 0.0,
            no_of_bedroom: None,
            no_of_bathroom: None,
            no_of_carpark: None,
            size: None,
            built_up_price: None,
            property_tenure: None,
            property_type: PropertyType::default(),
            longitude: None,
            latitude: None,
            listing_date: None,
            auction_date: None,
            listing_type,
        }
    }
}

// ── Delivery status ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Delivered,
}

impl DeliveryStatus {
    /// Reads the store's `api_update_status` flag: null or 0 is pending.
    pub fn from_flag(flag: Option<i64>) -> Self {
        match flag {
            Some(1) => DeliveryStatus::Delivered,
            _ => DeliveryStatus::Pending,
        }
    }

    pub fn flag(self) -> i64 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Delivered => 1,
        }
    }
}

// ── Run bookkeeping ───────────────────────────────────────────────────────────

/// Live counters of one push run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub to_send: usize,
    pub success: usize,
    pub fail: usize,
    pub skipped: usize,
}

impl RunCounters {
    pub fn absorb(&mut self, other: RunCounters) {
        self.to_send += other.to_send;
        self.success += other.success;
        self.fail += other.fail;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for RunCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "to_send:{} success:{} fail:{} skipped:{}",
            self.to_send, self.success, self.fail, self.skipped
        )
    }
}

/// One row of the `sync_runs` log.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub command: String,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub status: String,
    pub counters: RunCounters,
    pub error_msg: Option<String>,
}

// ── Keyword flags ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DescriptionFlags {
    pub new_project: bool,
    pub auction: bool,
    pub below_market_value: bool,
    pub urgent: bool,
}
