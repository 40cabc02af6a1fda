//! Validation of untrusted hook payloads into canonical actions.
//!
//! Every failure is a [`PayloadError`] value that becomes a `400`; nothing in
//! here panics on malformed input.

use std::{collections::HashSet, fmt, str::FromStr};

use {
    serde::Serialize,
    serde_json::{Map, Value},
};

use portico_config::DEFAULT_VOICE_WAKE_TRIGGERS;

pub const MAX_TRIGGERS: usize = 32;
pub const MAX_TRIGGER_CHARS: usize = 64;
const DEFAULT_AGENT_NAME: &str = "Hook";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("text required")]
    TextRequired,
    #[error("message required")]
    MessageRequired,
    #[error("channel must be last|whatsapp|telegram|discord|signal|imessage")]
    InvalidChannel,
}

// ── Canonical actions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WakeMode {
    #[default]
    Now,
    NextHeartbeat,
}

impl WakeMode {
    /// `next-heartbeat` only on an exact match, `now` otherwise.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("next-heartbeat") => Self::NextHeartbeat,
            _ => Self::Now,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Now => "now",
            Self::NextHeartbeat => "next-heartbeat",
        }
    }
}

impl fmt::Display for WakeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery target for an agent reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookChannel {
    /// Whatever channel the session last talked on.
    #[default]
    Last,
    WhatsApp,
    Telegram,
    Discord,
    Signal,
    IMessage,
}

impl HookChannel {
    pub const ALL: [HookChannel; 6] = [
        HookChannel::Last,
        HookChannel::WhatsApp,
        HookChannel::Telegram,
        HookChannel::Discord,
        HookChannel::Signal,
        HookChannel::IMessage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Last => "last",
            Self::WhatsApp => "whatsapp",
            Self::Telegram => "telegram",
            Self::Discord => "discord",
            Self::Signal => "signal",
            Self::IMessage => "imessage",
        }
    }
}

impl FromStr for HookChannel {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or(PayloadError::InvalidChannel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WakeAction {
    pub text: String,
    pub mode: WakeMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAction {
    pub message: String,
    pub name: String,
    pub wake_mode: WakeMode,
    pub session_key: String,
    pub deliver: bool,
    pub channel: HookChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    Wake(WakeAction),
    Agent(AgentAction),
}

// ── Raw requests ─────────────────────────────────────────────────────────────

/// Wake fields as received, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WakeRequest {
    pub text: Option<String>,
    pub mode: Option<String>,
}

impl WakeRequest {
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        Self {
            text: string_field(payload, "text"),
            mode: string_field(payload, "mode"),
        }
    }
}

/// Agent fields as received, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentRequest {
    pub message: Option<String>,
    pub name: Option<String>,
    pub wake_mode: Option<String>,
    pub session_key: Option<String>,
    pub deliver: Option<bool>,
    /// Non-string JSON values are kept in their JSON text form so they fail
    /// channel validation instead of silently defaulting.
    pub channel: Option<String>,
    pub to: Option<String>,
    pub thinking: Option<String>,
    pub timeout_seconds: Option<f64>,
}

impl AgentRequest {
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let channel = match payload.get("channel") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        Self {
            message: string_field(payload, "message"),
            name: string_field(payload, "name"),
            wake_mode: string_field(payload, "wakeMode"),
            session_key: string_field(payload, "sessionKey"),
            deliver: payload.get("deliver").and_then(Value::as_bool),
            channel,
            to: string_field(payload, "to"),
            thinking: string_field(payload, "thinking"),
            timeout_seconds: payload.get("timeoutSeconds").and_then(Value::as_f64),
        }
    }
}

fn string_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ── Normalization ────────────────────────────────────────────────────────────

pub fn normalize_wake(req: &WakeRequest) -> Result<WakeAction, PayloadError> {
    let text = trimmed(req.text.as_deref()).ok_or(PayloadError::TextRequired)?;
    Ok(WakeAction {
        text,
        mode: WakeMode::parse(req.mode.as_deref()),
    })
}

pub fn normalize_agent(req: &AgentRequest) -> Result<AgentAction, PayloadError> {
    let message = trimmed(req.message.as_deref()).ok_or(PayloadError::MessageRequired)?;
    let channel = match trimmed(req.channel.as_deref()) {
        Some(raw) => raw.parse()?,
        None => HookChannel::Last,
    };
    let timeout_seconds = req
        .timeout_seconds
        .filter(|t| t.is_finite() && *t > 0.0)
        .map(|t| t.floor() as u64);

    Ok(AgentAction {
        message,
        name: trimmed(req.name.as_deref()).unwrap_or_else(|| DEFAULT_AGENT_NAME.into()),
        wake_mode: WakeMode::parse(req.wake_mode.as_deref()),
        session_key: trimmed(req.session_key.as_deref())
            .unwrap_or_else(|| format!("hook:{}", uuid::Uuid::new_v4())),
        deliver: req.deliver != Some(false),
        channel,
        to: trimmed(req.to.as_deref()),
        thinking: trimmed(req.thinking.as_deref()),
        timeout_seconds,
    })
}

/// Clean a voice-wake trigger list: trim, drop blanks, cap each entry at
/// [`MAX_TRIGGER_CHARS`], dedupe (first occurrence wins) and keep at most
/// [`MAX_TRIGGERS`]. An empty result falls back to the defaults.
pub fn normalize_voice_wake_triggers<I, S>(input: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let triggers: Vec<String> = input
        .into_iter()
        .filter_map(|raw| {
            let capped: String = raw.as_ref().trim().chars().take(MAX_TRIGGER_CHARS).collect();
            let capped = capped.trim_end();
            (!capped.is_empty()).then(|| capped.to_string())
        })
        .filter(|t| seen.insert(t.clone()))
        .take(MAX_TRIGGERS)
        .collect();

    if triggers.is_empty() {
        DEFAULT_VOICE_WAKE_TRIGGERS
            .iter()
            .map(|t| t.to_string())
            .collect()
    } else {
        triggers
    }
}

/// Trigger list from an RPC parameter. Non-string entries are ignored.
pub fn voice_wake_triggers_from_value(value: Option<&Value>) -> Vec<String> {
    let items = value
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();
    normalize_voice_wake_triggers(items)
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn wake_requires_text() {
        let req = WakeRequest::from_payload(&obj(json!({"text": "   "})));
        assert_eq!(normalize_wake(&req), Err(PayloadError::TextRequired));
        let req = WakeRequest::from_payload(&obj(json!({"text": 5})));
        assert_eq!(normalize_wake(&req), Err(PayloadError::TextRequired));
    }

    #[test]
    fn wake_mode_parsing() {
        let payload = obj(json!({"text": " hi ", "mode": "next-heartbeat"}));
        let req = WakeRequest::from_payload(&payload);
        assert_eq!(normalize_wake(&req).unwrap(), WakeAction {
            text: "hi".into(),
            mode: WakeMode::NextHeartbeat,
        });
        let req = WakeRequest::from_payload(&obj(json!({"text": "hi", "mode": "Next-Heartbeat"})));
        assert_eq!(normalize_wake(&req).unwrap().mode, WakeMode::Now);
    }

    #[test]
    fn agent_defaults() {
        let req = AgentRequest::from_payload(&obj(json!({"message": " ping "})));
        let action = normalize_agent(&req).unwrap();
        assert_eq!(action.message, "ping");
        assert_eq!(action.name, "Hook");
        assert_eq!(action.wake_mode, WakeMode::Now);
        assert!(action.session_key.starts_with("hook:"));
        assert!(action.session_key.len() > "hook:".len());
        assert!(action.deliver);
        assert_eq!(action.channel, HookChannel::Last);
        assert!(action.to.is_none());
        assert!(action.thinking.is_none());
        assert!(action.timeout_seconds.is_none());
    }

    #[test]
    fn agent_requires_message() {
        let req = AgentRequest::from_payload(&obj(json!({"name": "x"})));
        assert_eq!(normalize_agent(&req), Err(PayloadError::MessageRequired));
    }

    #[test]
    fn agent_fields() {
        let req = AgentRequest::from_payload(&obj(json!({
            "message": "m",
            "name": " CI ",
            "wakeMode": "next-heartbeat",
            "sessionKey": " hook:ci ",
            "deliver": false,
            "channel": " Telegram ",
            "to": " +1555 ",
            "thinking": " low ",
            "timeoutSeconds": 12.9,
        })));
        let action = normalize_agent(&req).unwrap();
        assert_eq!(action.name, "CI");
        assert_eq!(action.wake_mode, WakeMode::NextHeartbeat);
        assert_eq!(action.session_key, "hook:ci");
        assert!(!action.deliver);
        assert_eq!(action.channel, HookChannel::Telegram);
        assert_eq!(action.to.as_deref(), Some("+1555"));
        assert_eq!(action.thinking.as_deref(), Some("low"));
        assert_eq!(action.timeout_seconds, Some(12));
    }

    #[test]
    fn deliver_only_false_disables() {
        let req = AgentRequest::from_payload(&obj(json!({"message": "m", "deliver": "no"})));
        assert!(normalize_agent(&req).unwrap().deliver);
    }

    #[test]
    fn invalid_channel() {
        for channel in [json!("irc"), json!(3)] {
            let req = AgentRequest::from_payload(&obj(json!({"message": "m", "channel": channel})));
            let err = normalize_agent(&req).unwrap_err();
            assert_eq!(
                err.to_string(),
                "channel must be last|whatsapp|telegram|discord|signal|imessage"
            );
        }
    }

    #[test]
    fn timeout_must_be_positive_and_finite() {
        for t in [json!(0), json!(-3), json!("10")] {
            let payload = obj(json!({"message": "m", "timeoutSeconds": t}));
            let req = AgentRequest::from_payload(&payload);
            assert!(normalize_agent(&req).unwrap().timeout_seconds.is_none());
        }
        let req = AgentRequest {
            message: Some("m".into()),
            timeout_seconds: Some(f64::INFINITY),
            ..Default::default()
        };
        assert!(normalize_agent(&req).unwrap().timeout_seconds.is_none());
    }

    #[test]
    fn triggers_cleaned() {
        let long = "x".repeat(100);
        let out = normalize_voice_wake_triggers([" hey ", "", "hey", "  ", long.as_str(), "Hey"]);
        assert_eq!(out, vec!["hey".to_string(), "x".repeat(64), "Hey".to_string()]);
    }

    #[test]
    fn triggers_capped_at_32() {
        let many: Vec<String> = (0..50).map(|i| format!("t{i}")).collect();
        let out = normalize_voice_wake_triggers(&many);
        assert_eq!(out.len(), MAX_TRIGGERS);
        assert_eq!(out[0], "t0");
        assert_eq!(out[31], "t31");
    }

    #[test]
    fn empty_triggers_fall_back() {
        let out = normalize_voice_wake_triggers(Vec::<String>::new());
        assert_eq!(out, vec!["portico".to_string(), "computer".to_string()]);
        assert_eq!(voice_wake_triggers_from_value(Some(&json!([" ", 4]))), out);
        assert_eq!(voice_wake_triggers_from_value(None), out);
    }
}
