use serde_json::Value;
use thiserror::Error;

/// Longest body or payload excerpt carried into a log line.
pub const SNAPSHOT_LEN: usize = 500;

/// Why one delivery attempt failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeliveryError {
    /// Network error or timeout; no HTTP status was received.
    #[error("transport error ({kind}): {message}")]
    Transport { kind: &'static str, message: String },

    /// The API answered outside the 2xx range.
    #[error("HTTP {status}: {}", .reasons.join("; "))]
    Rejected { status: u16, reasons: Vec<String> },
}

impl DeliveryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Transport { .. } => None,
            DeliveryError::Rejected { status, .. } => Some(*status),
        }
    }

    pub fn reasons(&self) -> Vec<String> {
        match self {
            DeliveryError::Transport { message, .. } => vec![message.clone()],
            DeliveryError::Rejected { reasons, .. } => reasons.clone(),
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connect"
        } else if e.is_body() || e.is_decode() {
            "body"
        } else {
            "request"
        };
        DeliveryError::Transport { kind, message: e.to_string() }
    }
}

/// Cut `s` to at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Flatten an error response body into readable reasons.
///
/// Understands `{"message": .., "errors": {field: [msgs]}}` and
/// `{"error": {..}}`; anything else falls back to the truncated raw text.
pub fn parse_error_reasons(body: &str) -> Vec<String> {
    let body = body.trim();
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return raw_reason(body);
    };

    let mut reasons = Vec::new();
    if let Some(msg) = json.get("message").and_then(Value::as_str) {
        reasons.push(msg.to_string());
    }
    if let Some(errors) = json.get("errors") {
        flatten_into(errors, None, &mut reasons);
    }
    if let Some(error) = json.get("error") {
        flatten_into(error, None, &mut reasons);
    }
    if let Some(detail) = json.get("detail").and_then(Value::as_str) {
        reasons.push(detail.to_string());
    }

    if reasons.is_empty() { raw_reason(body) } else { reasons }
}

fn raw_reason(body: &str) -> Vec<String> {
    if body.is_empty() {
        Vec::new()
    } else {
        vec![truncate(body, SNAPSHOT_LEN)]
    }
}

fn flatten_into(v: &Value, field: Option<&str>, out: &mut Vec<String>) {
    let prefixed = |s: &str| match field {
        Some(f) => format!("{}: {}", f, s),
        None => s.to_string(),
    };
    match v {
        Value::Null => {}
        Value::String(s) => out.push(prefixed(s)),
        Value::Array(items) => {
            for item in items {
                flatten_into(item, field, out);
            }
        }
        Value::Object(map) => {
            for (k, item) in map {
                let key = match field {
                    Some(f) => format!("{}.{}", f, k),
                    None => k.clone(),
                };
                flatten_into(item, Some(&key), out);
            }
        }
        other => out.push(prefixed(&other.to_string())),
    }
}
