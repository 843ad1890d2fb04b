use serde_json::Value;

/// Lowercase, trim, and collapse internal whitespace runs to single spaces.
/// Both the rule matcher and the remote classifier run on this form, so
/// keyword lists and the model always see identical text.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Message documents may carry a missing or non-string `text` field;
/// anything that is not a string normalizes to the empty string.
pub fn normalize_field(raw: Option<&Value>) -> String {
    match raw.and_then(Value::as_str) {
        Some(text) => normalize(text),
        None => String::new(),
    }
}
