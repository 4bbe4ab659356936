use crate::models::RawValue;
use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

static ISO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b").expect("valid regex")
});
static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid regex"));
static SEPT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bsept\b").expect("valid regex"));
static PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(auction|posted|listed|updated)(\s+date)?(\s+on)?\s*:?\s*")
        .expect("valid regex")
});
static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\s+([A-Za-z]{3,9})\.?\s+(\d{4})\b").expect("valid regex")
});
static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z]{3,9})\.?\s+(\d{1,2})\s+(\d{4})\b").expect("valid regex")
});
static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4}|\d{2})\b").expect("valid regex")
});

const NULL_DATES: &[&str] = &["0000-00-00", "0000/00/00", "0000.00.00"];

// ── Free-text date grammar ────────────────────────────────────────────────────

/// Parse a human-written date. Returns `None` when nothing date-like is found.
///
/// Tried in order: ISO (`2025-10-27`, `2025/10/27`), day-first named month
/// (`23rd Oct 2025`), month-first named month (`Oct 23, 2025`), numeric
/// day-first (`01/11/2025`, `01-11-25`) falling back to month-first.
pub fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let s = s.replace('\u{a0}', " ");
    let s = s.trim();
    if s.is_empty() || NULL_DATES.contains(&s) {
        return None;
    }

    let s = PREFIX.replace(s, "");

    if let Some(d) = ISO.captures(&s).and_then(|c| {
        ymd(
            c[1].parse().ok()?,
            c[2].parse().ok()?,
            c[3].parse().ok()?,
        )
    }) {
        return Some(d);
    }

    let t = ORDINAL.replace_all(&s, "$1");
    let t = t.replace(',', " ");
    let t = t.split_whitespace().collect::<Vec<_>>().join(" ");
    let t = SEPT.replace_all(&t, "Sep");

    if let Some(c) = DAY_MONTH_YEAR.captures(&t) {
        if let Some(d) = named_month(&c[1], &c[2], &c[3]) {
            return Some(d);
        }
    }
    if let Some(c) = MONTH_DAY_YEAR.captures(&t) {
        if let Some(d) = named_month(&c[2], &c[1], &c[3]) {
            return Some(d);
        }
    }

    let c = NUMERIC.captures(&t)?;
    let first: u32 = c[1].parse().ok()?;
    let second: u32 = c[2].parse().ok()?;
    let year = expand_year(&c[3])?;
    ymd(year, second, first).or_else(|| ymd(year, first, second))
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn named_month(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    // %B takes both the short and the long month name, in any case
    let cand = format!("{} {} {}", day, month, year);
    NaiveDate::parse_from_str(&cand, "%d %B %Y").ok()
}

/// Two-digit years: 00–49 → 2000s, 50–99 → 1900s.
fn expand_year(y: &str) -> Option<i32> {
    let n: i32 = y.parse().ok()?;
    match y.len() {
        2 if n < 50 => Some(2000 + n),
        2 => Some(1900 + n),
        4 => Some(n),
        _ => None,
    }
}

fn iso(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

// ── Field policies ────────────────────────────────────────────────────────────

/// Auction dates may legitimately be absent: unparseable input is `None`.
pub fn auction_date(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Date(d) => Some(iso(*d)),
        RawValue::DateTime(dt) => Some(iso(dt.date())),
        RawValue::Text(s) => parse_date_text(s).map(iso),
        _ => None,
    }
}

/// Listing dates must always exist: unparseable input falls back to `today`.
/// "Posted today" and "yesterday" are resolved against `today` as well.
pub fn listing_date(value: &RawValue, today: NaiveDate) -> String {
    let parsed = match value {
        RawValue::Date(d) => Some(*d),
        RawValue::DateTime(dt) => Some(dt.date()),
        RawValue::Text(s) => {
            let low = s.to_lowercase();
            if low.contains("yesterday") {
                Some(today - Duration::days(1))
            } else if low.contains("today") {
                Some(today)
            } else {
                parse_date_text(s)
            }
        }
        _ => None,
    };
    iso(parsed.unwrap_or(today))
}
