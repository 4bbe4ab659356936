use crate::models::RawValue;
use regex::Regex;
use std::sync::LazyLock;

/// Square metres → square feet.
pub const SQM_TO_SQFT: f64 = 10.7639;

/// Bedroom count reserved for studio units.
pub const STUDIO_SENTINEL: u32 = 100;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d*\.?\d+").expect("valid regex"));
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

const NULL_STRINGS: &[&str] = &["na", "n/a", "none", "null", "nil", "nan", "-", "—"];

// Unit markers must not sit inside a word ("transferable" is not "sf").
static SQM_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z])(?:sq\.?\s*m(?:et(?:er|re)s?)?|psm|m²|m2|square\s+met(?:er|re)s?)(?:[^a-z]|$)")
        .expect("valid regex")
});
static SQFT_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z])(?:sq\.?\s*f(?:t|eet)|sf|psf|square\s+f(?:ee|oo)t)(?:[^a-z]|$)")
        .expect("valid regex")
});

// ── Generic numbers ───────────────────────────────────────────────────────────

/// First numeric token in free text, thousands separators removed.
/// "RM 1,800,000" → 1800000.0 | "n/a" → None
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.replace('\u{a0}', " ");
    let s = s.trim();
    if s.is_empty() || NULL_STRINGS.contains(&s.to_lowercase().as_str()) {
        return None;
    }
    let cleaned = s.replace(',', "");
    NUMBER
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Float or null. Blank and unparseable values become `None`.
pub fn to_f64(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) if n.is_finite() => Some(*n),
        RawValue::Text(s) => parse_number(s),
        _ => None,
    }
}

/// Price coercion: missing or blank means "unknown", sent as 0.0.
pub fn to_price(value: &RawValue) -> f64 {
    to_f64(value).map(|p| p.max(0.0)).unwrap_or(0.0)
}

// ── Bedrooms ──────────────────────────────────────────────────────────────────

/// Bedroom grammar: "Studio" → 100, "3+1" → 4, "2 Bedrooms" → 2, 3.7 → 3.
pub fn parse_bedrooms(value: &RawValue) -> Option<u32> {
    match value {
        RawValue::Number(n) if n.is_finite() && *n >= 0.0 => Some(n.trunc() as u32),
        RawValue::Text(s) => parse_bedroom_text(s),
        _ => None,
    }
}

fn parse_bedroom_text(s: &str) -> Option<u32> {
    let first = s.split(',').next()?.trim().to_lowercase();
    if first.is_empty() {
        return None;
    }
    if first.starts_with("studio") {
        return Some(STUDIO_SENTINEL);
    }

    if first.contains('+') {
        let groups: Vec<u32> = DIGITS
            .find_iter(&first)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        if !groups.is_empty() {
            return groups.iter().try_fold(0u32, |acc, &n| acc.checked_add(n));
        }
    }

    DIGITS.find(&first).and_then(|m| m.as_str().parse().ok())
}

/// Restrict a bedroom count to the API's `[1, 5]` domain.
///
/// With `clamp` off, out-of-range counts become `None`; with it on, counts
/// above five become five. The studio sentinel is kept as is.
pub fn bound_bedrooms(n: Option<u32>, clamp: bool) -> Option<u32> {
    let n = n?;
    match n {
        STUDIO_SENTINEL => Some(n),
        0 => None,
        1..=5 => Some(n),
        _ if clamp => Some(5),
        _ => None,
    }
}

// ── Areas ─────────────────────────────────────────────────────────────────────

fn is_square_metres(text: &str) -> bool {
    SQM_UNIT.is_match(text) && !SQFT_UNIT.is_match(text)
}

/// Built-up size in square feet.
/// "Built-up : 1,098 sq. ft." → 1098.0 | "92 sqm" → 990.0
pub fn parse_area_sqft(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Text(s) => {
            let n = parse_number(s)?;
            if is_square_metres(s) {
                Some((n * SQM_TO_SQFT).round())
            } else {
                Some(n)
            }
        }
        other => to_f64(other),
    }
}

/// Price per square foot. A per-square-metre figure is divided by the factor.
/// "RM 500 psf" → 500.0 | "RM 5,381.95 psm" → 500.0
pub fn parse_price_per_sqft(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Text(s) => {
            let n = parse_number(s)?;
            if is_square_metres(s) {
                Some(((n / SQM_TO_SQFT) * 100.0).round() / 100.0)
            } else {
                Some(n)
            }
        }
        other => to_f64(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_defaults_to_zero() {
        assert_eq!(to_price(&RawValue::Null), 0.0);
        assert_eq!(to_price(&RawValue::text("")), 0.0);
        assert_eq!(to_price(&RawValue::text("   ")), 0.0);
        assert_eq!(to_price(&RawValue::text("1,800,000")), 1_800_000.0);
        assert_eq!(to_price(&RawValue::text("RM 650,000")), 650_000.0);
        assert_eq!(to_price(&RawValue::Number(-3.0)), 0.0);
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(to_f64(&RawValue::text("3.1")), Some(3.1));
        assert_eq!(to_f64(&RawValue::text(" ")), None);
        assert_eq!(to_f64(&RawValue::text("N/A")), None);
        assert_eq!(to_f64(&RawValue::text("abc")), None);
        assert_eq!(to_f64(&RawValue::Number(2.0)), Some(2.0));
        assert_eq!(to_f64(&RawValue::Null), None);
    }

    #[test]
    fn test_bedroom_grammar() {
        assert_eq!(parse_bedrooms(&RawValue::text("Studio")), Some(STUDIO_SENTINEL));
        assert_eq!(parse_bedrooms(&RawValue::text("3+1")), Some(4));
        assert_eq!(parse_bedrooms(&RawValue::text("3 + 1 Bedrooms")), Some(4));
        assert_eq!(parse_bedrooms(&RawValue::text("2 Bedrooms")), Some(2));
        assert_eq!(parse_bedrooms(&RawValue::Number(3.9)), Some(3));
        assert_eq!(parse_bedrooms(&RawValue::text("")), None);
        assert_eq!(parse_bedrooms(&RawValue::text("many")), None);
    }

    #[test]
    fn test_bedroom_sum_overflow_is_none() {
        assert_eq!(parse_bedrooms(&RawValue::text("4000000000+4000000000")), None);
        assert_eq!(parse_bedrooms(&RawValue::text("99999999999")), None);
        assert_eq!(parse_bedrooms(&RawValue::Number(1e12)), Some(u32::MAX));
    }

    #[test]
    fn test_bedroom_bounds() {
        assert_eq!(bound_bedrooms(Some(9), false), None);
        assert_eq!(bound_bedrooms(Some(9), true), Some(5));
        assert_eq!(bound_bedrooms(Some(0), true), None);
        assert_eq!(bound_bedrooms(Some(3), false), Some(3));
        assert_eq!(bound_bedrooms(Some(STUDIO_SENTINEL), false), Some(STUDIO_SENTINEL));
    }

    #[test]
    fn test_area_units() {
        assert_eq!(parse_area_sqft(&RawValue::text("Built-up : 1,098 sq. ft.")), Some(1098.0));
        assert_eq!(parse_area_sqft(&RawValue::text("92 sqm")), Some(990.0));
        assert_eq!(parse_area_sqft(&RawValue::text("1200")), Some(1200.0));
        assert_eq!(parse_area_sqft(&RawValue::Number(850.0)), Some(850.0));
        assert_eq!(parse_price_per_sqft(&RawValue::text("RM 5,381.95 psm")), Some(500.0));
        assert_eq!(parse_price_per_sqft(&RawValue::text("RM 612.50 psf")), Some(612.5));
    }

    #[test]
    fn test_unit_markers_need_word_edges() {
        assert_eq!(parse_area_sqft(&RawValue::text("92 sqm (transferable)")), Some(990.0));
        assert_eq!(parse_area_sqft(&RawValue::text("92m2")), Some(990.0));
        assert_eq!(parse_area_sqft(&RawValue::text("1,098sf")), Some(1098.0));
        assert_eq!(parse_area_sqft(&RawValue::text("1,098 sq ft (92 sqm)")), Some(1098.0));
        assert_eq!(parse_price_per_sqft(&RawValue::text("RM 5,381.95 per square metre")), Some(500.0));
    }
}
