//! WebSocket frame types.
//!
//! Clients send `{"type":"req","id","method","params"}`; the gateway answers
//! with `{"type":"res","id","ok","payload"|"error"}` and pushes
//! `{"type":"event","event","payload","seq"}` to every connected client.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

pub const PROTOCOL_VERSION: u32 = 1;

pub mod error_codes {
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_REQUEST, message)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RequestFrame {
    pub fn parse(text: &str) -> Result<Self, ErrorShape> {
        let frame: Self = serde_json::from_str(text)
            .map_err(|e| ErrorShape::invalid(format!("invalid frame: {e}")))?;
        if frame.kind != "req" {
            return Err(ErrorShape::invalid(format!(
                "unexpected frame type: {}",
                frame.kind
            )));
        }
        Ok(frame)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: &str, payload: Value) -> Self {
        Self {
            kind: "res",
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: &str, error: ErrorShape) -> Self {
        Self {
            kind: "res",
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub event: String,
    pub payload: Value,
    pub seq: u64,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Value, seq: u64) -> Self {
        Self {
            kind: "event",
            event: event.into(),
            payload,
            seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn parses_request() {
        let frame =
            RequestFrame::parse(r#"{"type":"req","id":"1","method":"health"}"#).unwrap();
        assert_eq!(frame.method, "health");
        assert!(frame.params.is_null());
    }

    #[test]
    fn rejects_other_frames() {
        let err = RequestFrame::parse(r#"{"type":"event","id":"1","method":"x"}"#).unwrap_err();
        assert_eq!(err.code, error_codes::INVALID_REQUEST);
        assert!(RequestFrame::parse("nope").is_err());
    }

    #[test]
    fn response_shapes() {
        let ok = serde_json::to_value(ResponseFrame::ok("7", json!({"a": 1}))).unwrap();
        assert_eq!(ok, json!({"type": "res", "id": "7", "ok": true, "payload": {"a": 1}}));

        let err = serde_json::to_value(ResponseFrame::err("8", ErrorShape::invalid("bad"))).unwrap();
        assert_eq!(
            err,
            json!({
                "type": "res",
                "id": "8",
                "ok": false,
                "error": {"code": "INVALID_REQUEST", "message": "bad"},
            })
        );
    }
}
