use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

const NUM: &str = r"([-+]?\d+(?:\.\d+)?)";
const SEP: &str = r"\s*(?:,|%2C|%2c)\s*";

static MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"markers=[^&]*?{NUM}{SEP}{NUM}")).expect("valid regex"));
static CENTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"center={NUM}{SEP}{NUM}")).expect("valid regex"));
static QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"[?&]q={NUM}{SEP}{NUM}")).expect("valid regex"));
static SCRIPT_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"(?s)"lat"\s*:\s*{NUM}\s*,\s*"lng"\s*:\s*{NUM}"#)).expect("valid regex")
});
static CENTER_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?s)"center"\s*:\s*\{{\s*"lat"\s*:\s*{NUM}\s*,\s*"lng"\s*:\s*{NUM}"#
    ))
    .expect("valid regex")
});

/// Latitude/longitude from a map link, inline script JSON, or a page fragment.
/// Returns `(None, None)` when no pair is found.
pub fn extract_coordinates(text: &str) -> (Option<f64>, Option<f64>) {
    let text = text.trim();
    if text.is_empty() {
        return (None, None);
    }

    let haystack = if text.contains('<') {
        markup_haystack(text)
    } else {
        text.to_string()
    };

    [&*CENTER_JSON, &*SCRIPT_JSON, &*MARKERS, &*CENTER, &*QUERY]
        .iter()
        .find_map(|re| {
            let c = re.captures(&haystack)?;
            Some((c[1].parse::<f64>().ok()?, c[2].parse::<f64>().ok()?))
        })
        .map(|(lat, lng)| (Some(lat), Some(lng)))
        .unwrap_or((None, None))
}

/// Reduce a page fragment to its script bodies and link targets.
fn markup_haystack(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let mut parts = Vec::new();

    if let Ok(sel) = Selector::parse("script") {
        parts.extend(doc.select(&sel).map(|el| el.text().collect::<String>()));
    }
    if let Ok(sel) = Selector::parse("a[href], iframe[src], img[src]") {
        for el in doc.select(&sel) {
            let v = el.value();
            if let Some(link) = v.attr("href").or_else(|| v.attr("src")) {
                parts.push(link.to_string());
            }
        }
    }

    parts.join("\n")
}
