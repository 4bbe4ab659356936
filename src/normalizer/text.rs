use crate::models::{PropertyType, RawValue, Tenure};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static TENURE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btenure\b\s*:?").expect("valid regex"));
static FREEHOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfree\s*hold\b|freehold").expect("valid regex"));
static LEASEHOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blease\s*hold\b|leasehold").expect("valid regex"));
static MARKETING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfor\s*sale\b|\btitle\b").expect("valid regex"));
static FEDERAL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|\s)(w\.?\s?p\.?|wilayah\s+persekutuan)(\s|$|[-_/.,])").expect("valid regex")
});
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_/.,]+").expect("valid regex"));
static SALE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sale[-_/](\d{6,})").expect("valid regex"));
static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{6,})$").expect("valid regex"));

const NULL_STRINGS: &[&str] = &["none", "null", "n/a", "na", "-"];

/// Canonical Malaysian state names keyed by compact lowercase spelling.
const STATE_ALIASES: &[(&str, &str)] = &[
    ("kualalumpur", "Kuala Lumpur"),
    ("kl", "Kuala Lumpur"),
    ("wpkl", "Kuala Lumpur"),
    ("putrajaya", "Putrajaya"),
    ("labuan", "Labuan"),
    ("johor", "Johor"),
    ("johorbahru", "Johor"),
    ("kedah", "Kedah"),
    ("kelantan", "Kelantan"),
    ("melaka", "Melaka"),
    ("malacca", "Melaka"),
    ("negerisembilan", "Negeri Sembilan"),
    ("nsembilan", "Negeri Sembilan"),
    ("pahang", "Pahang"),
    ("pulaupinang", "Pulau Pinang"),
    ("penang", "Pulau Pinang"),
    ("perak", "Perak"),
    ("perlis", "Perlis"),
    ("selangor", "Selangor"),
    ("terengganu", "Terengganu"),
    ("sabah", "Sabah"),
    ("sarawak", "Sarawak"),
];

const LANDED_WORDS: &[&str] = &[
    "landed", "terrace", "bungalow", "semi-d", "semi d", "semi detached", "link house",
    "townhouse", "cluster", "detached",
];

/// Trimmed, whitespace-collapsed text; `None` when blank.
pub fn clean_text(value: &RawValue) -> Option<String> {
    let s = value.as_text()?.replace('\u{a0}', " ");
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() { None } else { Some(s) }
}

/// "Tenure: Freehold" → Freehold | "Leasehold (99 years)" → Leasehold | "N/A" → None
pub fn clean_tenure(value: &RawValue) -> Option<Tenure> {
    let s = clean_text(value)?;
    if NULL_STRINGS.contains(&s.to_lowercase().as_str()) {
        return None;
    }
    let s = TENURE_WORD.replace_all(&s, "");
    if FREEHOLD.is_match(&s) {
        Some(Tenure::Freehold)
    } else if LEASEHOLD.is_match(&s) {
        Some(Tenure::Leasehold)
    } else {
        None
    }
}

/// Map a free-text property type onto the API's closed set; `Condo` otherwise.
/// "Serviced Residence for sale" → ServicedResidence | "2-sty Terrace" → Landed
pub fn clean_property_type(value: &RawValue) -> PropertyType {
    let Some(s) = clean_text(value) else {
        return PropertyType::default();
    };
    let s = MARKETING.replace_all(&s, " ").to_lowercase();
    let key = s.split_whitespace().collect::<Vec<_>>().join("_").replace('-', "_");

    if let Some(exact) = PropertyType::ALL.iter().find(|t| t.as_str() == key) {
        return *exact;
    }
    if s.contains("serviced") || s.contains("service residence") {
        PropertyType::ServicedResidence
    } else if s.contains("condo") {
        PropertyType::Condo
    } else if s.contains("apartment") {
        PropertyType::Apartment
    } else if s.contains("flat") {
        PropertyType::Flat
    } else if LANDED_WORDS.iter().any(|w| s.contains(w)) {
        PropertyType::Landed
    } else {
        PropertyType::default()
    }
}

/// "WP Kuala_Lumpur" → "Kuala Lumpur" | "penang" → "Pulau Pinang" | "negeri-sembilan" → "Negeri Sembilan"
pub fn clean_state(value: &RawValue) -> Option<String> {
    let s = clean_text(value)?;

    let compact_raw: String = s.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
    if let Some((_, name)) = STATE_ALIASES.iter().find(|(k, _)| *k == compact_raw) {
        return Some((*name).to_string());
    }

    let s = FEDERAL_PREFIX.replace_all(&s, " ");
    let s = SEPARATORS.replace_all(&s, " ");
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() {
        return None;
    }

    let key = s.replace(' ', "").to_lowercase();
    if let Some((_, name)) = STATE_ALIASES.iter().find(|(k, _)| *k == key) {
        return Some((*name).to_string());
    }
    Some(title_case(&s))
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable listing identifier from its URL. A `sale-<digits>` segment wins over
/// trailing digits of the last path segment.
pub fn extract_list_id(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    if let Some(c) = SALE_ID.captures(url) {
        return Some(c[1].to_string());
    }

    let path = match Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let last = path.split('/').filter(|p| !p.is_empty()).last()?;
    TRAILING_ID.captures(last).map(|c| c[1].to_string())
}
