//! Payload acceptance rules.
//!
//! [`validate`] is the blocking structural tier: a payload that fails it is
//! never sent. [`precheck`] is the stricter advisory tier used for diagnostics
//! before a delivery attempt; the remote API stays the final arbiter.

use crate::models::{CanonicalPayload, PropertyType};
use chrono::NaiveDate;
use std::fmt;

/// Fields that must be present for the remote API to accept a payload.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "property_name",
    "listing_url",
    "area",
    "state",
    "price",
    "size",
    "property_type",
    "longitude",
    "latitude",
    "type",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub missing: Vec<&'static str>,
    pub invalid: Vec<&'static str>,
}

impl Validation {
    pub fn is_sendable(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing={:?} invalid={:?}", self.missing, self.invalid)
    }
}

fn is_blank(s: &Option<String>) -> bool {
    s.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true)
}

fn is_present(p: &CanonicalPayload, field: &str) -> bool {
    match field {
        "property_name" => !is_blank(&p.property_name),
        "listing_url" => !is_blank(&p.listing_url),
        "area" => !is_blank(&p.area),
        "state" => !is_blank(&p.state),
        "size" => p.size.is_some(),
        "longitude" => p.longitude.is_some(),
        "latitude" => p.latitude.is_some(),
        // price defaults to 0.0, type and property_type are always set
        _ => true,
    }
}

/// Structural validation. 0.0 counts as present.
pub fn validate(p: &CanonicalPayload) -> Validation {
    let missing = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| !is_present(p, f))
        .collect();

    let mut invalid = Vec::new();
    if let Some(url) = p.listing_url.as_deref().filter(|u| !u.trim().is_empty()) {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            invalid.push("listing_url_format");
        }
    }
    if p.latitude.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
        invalid.push("latitude_range");
    }
    if p.longitude.is_some_and(|lng| !(-180.0..=180.0).contains(&lng)) {
        invalid.push("longitude_range");
    }

    Validation { missing, invalid }
}

/// Domain precheck: the stricter rules the API is known to enforce.
/// Returns human-readable issues; an empty list means no known problem.
pub fn precheck(p: &CanonicalPayload) -> Vec<String> {
    let mut issues = Vec::new();

    match p.no_of_bedroom {
        Some(n) if (1..=5).contains(&n) => {}
        Some(n) => issues.push(format!("no_of_bedroom {} is outside 1..=5", n)),
        None => issues.push("no_of_bedroom is missing".to_string()),
    }

    match p.size {
        Some(s) if s > 0.0 => {}
        Some(s) => issues.push(format!("size {} must be positive", s)),
        None => issues.push("size is missing".to_string()),
    }

    if p.price <= 0.0 {
        issues.push(format!("price {} must be positive", p.price));
    }

    match (p.latitude, p.longitude) {
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) {
                issues.push(format!("latitude {} out of range", lat));
            }
            if !(-180.0..=180.0).contains(&lng) {
                issues.push(format!("longitude {} out of range", lng));
            }
        }
        _ => issues.push("latitude and longitude are both required".to_string()),
    }

    if !PropertyType::ALL.contains(&p.property_type) {
        issues.push(format!("property_type {:?} is not allowed", p.property_type));
    }

    match p.listing_date.as_deref() {
        Some(d) if NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok() => {}
        Some(d) => issues.push(format!("listing_date '{}' is not an ISO date", d)),
        None => issues.push("listing_date is missing".to_string()),
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingType;

    fn complete() -> CanonicalPayload {
        let mut p = CanonicalPayload::empty(ListingType::Subsale);
        p.property_name = Some("Residensi Sentral".into());
        p.listing_url = Some("https://www.iproperty.com.my/property/sale-108123456/".into());
        p.area = Some("Setapak".into());
        p.state = Some("Kuala Lumpur".into());
        p.price = 450_000.0;
        p.size = Some(950.0);
        p.no_of_bedroom = Some(3);
        p.latitude = Some(3.19);
        p.longitude = Some(101.72);
        p.listing_date = Some("2025-10-19".into());
        p
    }

    #[test]
    fn test_complete_payload_is_sendable() {
        let v = validate(&complete());
        assert!(v.is_sendable(), "{}", v);
        assert!(precheck(&complete()).is_empty());
    }

    #[test]
    fn test_missing_listing_url() {
        let mut p = complete();
        p.listing_url = None;
        let v = validate(&p);
        assert!(!v.is_sendable());
        assert!(v.missing.contains(&"listing_url"));
    }

    #[test]
    fn test_zero_price_is_present() {
        let mut p = complete();
        p.price = 0.0;
        assert!(validate(&p).is_sendable());
        assert!(precheck(&p).iter().any(|i| i.contains("price")));
    }

    #[test]
    fn test_latitude_out_of_range() {
        let mut p = complete();
        p.latitude = Some(95.0);
        let v = validate(&p);
        assert!(!v.is_sendable());
        assert_eq!(v.invalid, vec!["latitude_range"]);
    }

    #[test]
    fn test_url_scheme() {
        let mut p = complete();
        p.listing_url = Some("www.iproperty.com.my/x".into());
        assert_eq!(validate(&p).invalid, vec!["listing_url_format"]);
    }

    #[test]
    fn test_precheck_is_advisory_and_itemized() {
        let mut p = complete();
        p.no_of_bedroom = Some(100);
        p.size = None;
        p.longitude = None;
        let issues = precheck(&p);
        assert_eq!(issues.len(), 3);
        // still structurally rejected only for the missing coordinate and size
        assert_eq!(validate(&p).missing, vec!["size", "longitude"]);
    }
}
