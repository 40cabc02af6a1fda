//! Delegation of non-built-in hook paths to a mapping engine.

use std::{collections::BTreeMap, panic::AssertUnwindSafe, sync::Arc};

use {
    async_trait::async_trait,
    futures::FutureExt,
    serde_json::Value,
    tracing::{debug, error},
};

use {
    portico_common::{format_error, format_panic},
    portico_config::{HookMappingAction, HookMappingConfig},
};

use super::normalize::{
    AgentRequest, HookAction, WakeRequest, normalize_agent, normalize_wake,
};

/// One resolved mapping rule.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRule {
    pub id: String,
    /// Sub-path to match, without slashes. `None` matches any sub-path.
    pub match_path: Option<String>,
    /// Required `payload.source`. `None` matches any payload.
    pub match_source: Option<String>,
    pub action: HookMappingAction,
    pub wake_mode: Option<String>,
    pub name: Option<String>,
    pub session_key: Option<String>,
    pub message_template: Option<String>,
    pub text_template: Option<String>,
    pub deliver: Option<bool>,
    pub channel: Option<String>,
    pub to: Option<String>,
    pub thinking: Option<String>,
    pub timeout_seconds: Option<f64>,
}

impl MappingRule {
    pub fn from_config(index: usize, cfg: &HookMappingConfig) -> Self {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            id: clean(&cfg.id).unwrap_or_else(|| format!("mapping-{}", index + 1)),
            match_path: cfg
                .matcher
                .path
                .as_deref()
                .map(|p| p.trim().trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            match_source: clean(&cfg.matcher.source),
            action: cfg.action,
            wake_mode: clean(&cfg.wake_mode),
            name: cfg.name.clone(),
            session_key: cfg.session_key.clone(),
            message_template: cfg.message_template.clone(),
            text_template: cfg.text_template.clone(),
            deliver: cfg.deliver,
            channel: cfg.channel.clone(),
            to: cfg.to.clone(),
            thinking: cfg.thinking.clone(),
            timeout_seconds: cfg.timeout_seconds,
        }
    }
}

/// Everything a mapping engine may look at.
#[derive(Debug, Clone, Default)]
pub struct MappingRequest {
    /// Sub-path below the hook base path.
    pub path: String,
    /// Header names lowercased. Non-UTF-8 values are dropped.
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Parsed body; always a JSON object.
    pub payload: Value,
    /// RFC 3339 receive time.
    pub now: String,
}

/// Raw action produced by a mapping, normalized like a direct request.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedAction {
    Wake(WakeRequest),
    Agent(AgentRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MappingOutcome {
    Action(MappedAction),
    /// The rule matched but chose to drop the request.
    Skipped,
    Invalid(String),
}

/// Applies mapping rules to a hook request. `Ok(None)` means no rule matched.
#[async_trait]
pub trait MappingEngine: Send + Sync {
    async fn apply(
        &self,
        rules: &[MappingRule],
        request: &MappingRequest,
    ) -> anyhow::Result<Option<MappingOutcome>>;
}

/// What the hook gateway should answer for a mapped request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingResult {
    NoMatch,
    Invalid(String),
    Skipped,
    Action(HookAction),
    /// The engine errored or panicked.
    Failed(String),
}

pub struct MappingDispatcher {
    engine: Arc<dyn MappingEngine>,
    rules: Arc<[MappingRule]>,
}

impl MappingDispatcher {
    pub fn new(engine: Arc<dyn MappingEngine>, rules: impl Into<Arc<[MappingRule]>>) -> Self {
        Self {
            engine,
            rules: rules.into(),
        }
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Run the engine exactly once for `request`.
    pub async fn dispatch(&self, request: &MappingRequest) -> MappingResult {
        let applied = AssertUnwindSafe(self.engine.apply(&self.rules, request))
            .catch_unwind()
            .await;
        let outcome = match applied {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let message = format_error(&e);
                error!(path = %request.path, error = %message, "hook mapping failed");
                return MappingResult::Failed(message);
            },
            Err(panic) => {
                let message = format_panic(panic);
                error!(path = %request.path, error = %message, "hook mapping panicked");
                return MappingResult::Failed(message);
            },
        };

        match outcome {
            None => {
                debug!(path = %request.path, "no hook mapping matched");
                MappingResult::NoMatch
            },
            Some(MappingOutcome::Skipped) => MappingResult::Skipped,
            Some(MappingOutcome::Invalid(message)) => MappingResult::Invalid(message),
            Some(MappingOutcome::Action(MappedAction::Wake(req))) => match normalize_wake(&req) {
                Ok(action) => MappingResult::Action(HookAction::Wake(action)),
                Err(e) => MappingResult::Invalid(e.to_string()),
            },
            Some(MappingOutcome::Action(MappedAction::Agent(req))) => match normalize_agent(&req) {
                Ok(action) => MappingResult::Action(HookAction::Agent(action)),
                Err(e) => MappingResult::Invalid(e.to_string()),
            },
        }
    }
}
