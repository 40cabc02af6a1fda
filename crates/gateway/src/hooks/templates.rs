//! Built-in mapping engine: rules matched by sub-path and `payload.source`,
//! fields rendered from `{{...}}` templates.
//!
//! Supported expressions: `payload.a.b[0]` (or the bare `a.b[0]` form),
//! `headers.<name>`, `query.<name>`, `path` and `now`. Anything that does not
//! resolve renders as an empty string.

use {async_trait::async_trait, portico_config::HookMappingAction, serde_json::Value};

use super::{
    mapping::{MappedAction, MappingEngine, MappingOutcome, MappingRequest, MappingRule},
    normalize::{AgentRequest, WakeRequest},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateMappingEngine;

#[async_trait]
impl MappingEngine for TemplateMappingEngine {
    async fn apply(
        &self,
        rules: &[MappingRule],
        request: &MappingRequest,
    ) -> anyhow::Result<Option<MappingOutcome>> {
        let Some(rule) = rules.iter().find(|r| rule_matches(r, request)) else {
            return Ok(None);
        };
        Ok(Some(MappingOutcome::Action(render_rule(rule, request))))
    }
}

fn rule_matches(rule: &MappingRule, request: &MappingRequest) -> bool {
    if let Some(path) = &rule.match_path
        && path != &request.path
    {
        return false;
    }
    if let Some(source) = &rule.match_source {
        return request.payload.get("source").and_then(Value::as_str) == Some(source.as_str());
    }
    true
}

fn render_rule(rule: &MappingRule, request: &MappingRequest) -> MappedAction {
    let render_opt = |t: &Option<String>| t.as_deref().map(|t| render(t, request));
    match rule.action {
        HookMappingAction::Wake => MappedAction::Wake(WakeRequest {
            text: render_opt(&rule.text_template).or_else(|| render_opt(&rule.message_template)),
            mode: rule.wake_mode.clone(),
        }),
        HookMappingAction::Agent => MappedAction::Agent(AgentRequest {
            message: render_opt(&rule.message_template).or_else(|| render_opt(&rule.text_template)),
            name: render_opt(&rule.name),
            wake_mode: rule.wake_mode.clone(),
            session_key: render_opt(&rule.session_key),
            deliver: rule.deliver,
            channel: render_opt(&rule.channel),
            to: render_opt(&rule.to),
            thinking: rule.thinking.clone(),
            timeout_seconds: rule.timeout_seconds,
        }),
    }
}

/// Expand `{{expr}}` placeholders. An unterminated `{{` is kept verbatim.
pub fn render(template: &str, request: &MappingRequest) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&resolve(after[..end].trim(), request));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn resolve(expr: &str, request: &MappingRequest) -> String {
    match expr {
        "path" => return request.path.clone(),
        "now" => return request.now.clone(),
        "payload" => return value_text(&request.payload),
        _ => {},
    }
    if let Some(name) = expr.strip_prefix("headers.") {
        return request
            .headers
            .get(&name.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default();
    }
    if let Some(name) = expr.strip_prefix("query.") {
        return request.query.get(name).cloned().unwrap_or_default();
    }
    let path = expr.strip_prefix("payload.").unwrap_or(expr);
    lookup(&request.payload, path)
        .map(value_text)
        .unwrap_or_default()
}

/// Walk `a.b[0].c` through a JSON value.
fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        let (key, mut rest) = match segment.find('[') {
            Some(i) => segment.split_at(i),
            None => (segment, ""),
        };
        if !key.is_empty() {
            current = current.get(key)?;
        }
        while let Some(open) = rest.strip_prefix('[') {
            let close = open.find(']')?;
            let index: usize = open[..close].trim().parse().ok()?;
            current = current.get(index)?;
            rest = &open[close + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(current)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Presets ──────────────────────────────────────────────────────────────────

/// Rules for a named preset, `None` for an unknown name.
pub fn preset(name: &str) -> Option<Vec<MappingRule>> {
    match name {
        "gmail" => Some(vec![gmail()]),
        _ => None,
    }
}

/// Gmail push notifications relayed as `{messages: [{id, from, subject, snippet, body}]}`.
fn gmail() -> MappingRule {
    MappingRule {
        id: "gmail".into(),
        match_path: Some("gmail".into()),
        match_source: None,
        action: HookMappingAction::Agent,
        wake_mode: Some("now".into()),
        name: Some("Gmail".into()),
        session_key: Some("hook:gmail:{{payload.messages[0].id}}".into()),
        message_template: Some(
            "New email from {{payload.messages[0].from}}\n\
             Subject: {{payload.messages[0].subject}}\n\
             {{payload.messages[0].snippet}}\n\
             {{payload.messages[0].body}}"
                .into(),
        ),
        text_template: None,
        deliver: None,
        channel: None,
        to: None,
        thinking: None,
        timeout_seconds: None,
    }
}
