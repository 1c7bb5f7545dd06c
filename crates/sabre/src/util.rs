//! Helpers for view data and HTML output.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ViewError;

/// View variables: a JSON object keyed by variable name.
pub type Vars = Map<String, Value>;

/// Serializes view data into a variable map.
///
/// `null` (and `()`) becomes an empty map. Anything else that is not an
/// object is rejected.
///
/// # Example
///
/// ```rust
/// use sabre::to_vars;
/// use serde_json::json;
///
/// let vars = to_vars(&json!({"title": "Home"})).unwrap();
/// assert_eq!(vars["title"], "Home");
/// assert!(to_vars(&()).unwrap().is_empty());
/// assert!(to_vars(&[1, 2, 3]).is_err());
/// ```
pub fn to_vars<T: Serialize + ?Sized>(data: &T) -> Result<Vars, ViewError> {
    match serde_json::to_value(data).map_err(|e| ViewError::invalid_data(e.to_string()))? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(ViewError::invalid_data(format!(
            "expected a map, got {}",
            kind_name(&other)
        ))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a map",
    }
}

/// Layers `overlay` on top of `base`; keys in `overlay` win.
pub fn merge_vars(mut base: Vars, overlay: Vars) -> Vars {
    base.extend(overlay);
    base
}

/// Encodes the five HTML special characters.
///
/// ```rust
/// use sabre::html_escape;
///
/// assert_eq!(
///     html_escape(r#"<a href="x">Tom & Jerry's</a>"#),
///     "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#039;s&lt;/a&gt;"
/// );
/// ```
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}
