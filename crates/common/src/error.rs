//! Turning arbitrary failures into a single human-readable line.
//!
//! Connector tasks, mapping engines and HTTP handlers all fail with errors the
//! gateway does not control. Every such failure ends up either in a
//! connector's `lastError` or in a 500 response body, so the rendering has to
//! be total: it never yields an empty string.

use std::{any::Any, fmt};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// A failure reported by an external collaborator.
///
/// Collaborators that only know a status and/or a code (HTTP APIs, bridge
/// daemons) can return this inside an `anyhow::Error` and still get a useful
/// `lastError`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalError {
    pub message: Option<String>,
    pub status: Option<String>,
    pub code: Option<String>,
    pub details: Option<Value>,
}

impl ExternalError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn status(status: impl Into<String>, code: Option<String>) -> Self {
        Self {
            status: Some(status.into()),
            code,
            ..Default::default()
        }
    }

    fn render(&self) -> String {
        if let Some(message) = non_empty(self.message.as_deref()) {
            return message.to_string();
        }
        let status_code = join_status_code(
            non_empty(self.status.as_deref()),
            non_empty(self.code.as_deref()),
        );
        if !status_code.is_empty() {
            return status_code;
        }
        if let Some(details) = &self.details
            && !details.is_null()
            && let Ok(dump) = serde_json::to_string(details)
        {
            return dump;
        }
        format!("{self:?}")
    }
}

impl fmt::Display for ExternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for ExternalError {}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn join_status_code(status: Option<&str>, code: Option<&str>) -> String {
    [status, code].into_iter().flatten().collect::<Vec<_>>().join(" ")
}

/// Format an error for `lastError` fields and 500 bodies.
pub fn format_error(err: &anyhow::Error) -> String {
    if let Some(external) = err.downcast_ref::<ExternalError>() {
        return external.render();
    }
    let text = format!("{err:#}");
    if !text.trim().is_empty() {
        return text;
    }
    let debug = format!("{err:?}");
    if !debug.trim().is_empty() {
        return debug;
    }
    "unknown error".into()
}

/// Format a JSON-shaped failure (as reported over a bridge or RPC boundary).
pub fn format_error_value(value: &Value) -> String {
    match value {
        Value::String(text) if !text.trim().is_empty() => text.clone(),
        Value::Object(map) => {
            if let Some(message) = non_empty(map.get("message").and_then(Value::as_str)) {
                return message.to_string();
            }
            let status = map.get("status").and_then(scalar_text);
            let code = map.get("code").and_then(scalar_text);
            let status_code =
                join_status_code(non_empty(status.as_deref()), non_empty(code.as_deref()));
            if !status_code.is_empty() {
                return status_code;
            }
            serde_json::to_string(value).unwrap_or_else(|_| "unknown error".into())
        },
        Value::String(_) => "unknown error".into(),
        other => other.to_string(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Format the payload of a caught panic.
pub fn format_panic(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return format!("panic: {s}");
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return format!("panic: {s}");
    }
    "panic with non-string payload".into()
}
