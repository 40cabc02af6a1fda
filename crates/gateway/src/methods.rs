use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use {
    serde_json::{Value, json},
    tracing::{debug, info, warn},
};

use portico_channels::{ConnectorKind, StartOutcome};

use crate::{
    broadcast::broadcast,
    hooks::normalize::voice_wake_triggers_from_value,
    protocol::{ErrorShape, PROTOCOL_VERSION, ResponseFrame, error_codes},
    state::GatewayState,
};

// ── Types ────────────────────────────────────────────────────────────────────

/// Context passed to every method handler.
pub struct MethodContext {
    pub request_id: String,
    pub method: String,
    pub params: Value,
    pub client_conn_id: String,
    pub state: Arc<GatewayState>,
}

/// The result a method handler produces.
pub type MethodResult = Result<Value, ErrorShape>;

/// A boxed async method handler.
pub type HandlerFn =
    Box<dyn Fn(MethodContext) -> Pin<Box<dyn Future<Output = MethodResult> + Send>> + Send + Sync>;

// ── Method registry ──────────────────────────────────────────────────────────

pub struct MethodRegistry {
    handlers: HashMap<String, HandlerFn>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };
        reg.register_defaults();
        reg
    }

    pub fn register(&mut self, method: impl Into<String>, handler: HandlerFn) {
        self.handlers.insert(method.into(), handler);
    }

    pub async fn dispatch(&self, ctx: MethodContext) -> ResponseFrame {
        let method = ctx.method.clone();
        let request_id = ctx.request_id.clone();
        let conn_id = ctx.client_conn_id.clone();

        let Some(handler) = self.handlers.get(&method) else {
            warn!(method, conn_id = %conn_id, "unknown method");
            return ResponseFrame::err(
                &request_id,
                ErrorShape::invalid(format!("unknown method: {method}")),
            );
        };

        debug!(method, request_id = %request_id, conn_id = %conn_id, "dispatching method");
        match handler(ctx).await {
            Ok(payload) => {
                debug!(method, request_id = %request_id, "method ok");
                ResponseFrame::ok(&request_id, payload)
            },
            Err(err) => {
                warn!(
                    method,
                    request_id = %request_id,
                    code = %err.code,
                    msg = %err.message,
                    "method error"
                );
                ResponseFrame::err(&request_id, err)
            },
        }
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    fn register_defaults(&mut self) {
        self.register_gateway_methods();
        self.register_channel_methods();
        self.register_voicewake_methods();
    }

    // ── Gateway-internal methods ─────────────────────────────────────────

    fn register_gateway_methods(&mut self) {
        self.register(
            "health",
            Box::new(|ctx| {
                Box::pin(async move {
                    Ok(json!({
                        "status": "ok",
                        "version": ctx.state.version,
                        "protocol": PROTOCOL_VERSION,
                        "connections": ctx.state.client_count().await,
                    }))
                })
            }),
        );

        self.register(
            "status",
            Box::new(|ctx| {
                Box::pin(async move {
                    Ok(json!({
                        "version": ctx.state.version,
                        "hostname": ctx.state.hostname,
                        "uptimeMs": ctx.state.uptime_ms(),
                        "connections": ctx.state.client_count().await,
                        "channels": ctx.state.supervisor.snapshot(),
                        "hooks": ctx.state.hooks,
                    }))
                })
            }),
        );
    }

    // ── Connector methods ────────────────────────────────────────────────

    fn register_channel_methods(&mut self) {
        self.register(
            "channels.status",
            Box::new(|ctx| {
                Box::pin(async move {
                    let supervisor = &ctx.state.supervisor;
                    match optional_channel(&ctx.params)? {
                        Some(kind) => Ok(json!({
                            "channel": kind,
                            "status": supervisor.status(kind),
                        })),
                        None => Ok(json!({ "channels": supervisor.snapshot() })),
                    }
                })
            }),
        );

        self.register(
            "channels.start",
            Box::new(|ctx| {
                Box::pin(async move {
                    let kind = required_channel(&ctx.params)?;
                    let supervisor = &ctx.state.supervisor;
                    let outcome = supervisor.start(kind).await;
                    info!(connector = %kind, outcome = outcome.as_str(), "channel start requested");
                    let reason = match outcome {
                        StartOutcome::Skipped(reason) => Some(reason.as_str()),
                        _ => None,
                    };
                    Ok(json!({
                        "channel": kind,
                        "outcome": outcome.as_str(),
                        "reason": reason,
                        "status": supervisor.status(kind),
                    }))
                })
            }),
        );

        self.register(
            "channels.stop",
            Box::new(|ctx| {
                Box::pin(async move {
                    let kind = required_channel(&ctx.params)?;
                    let supervisor = &ctx.state.supervisor;
                    let outcome = supervisor.stop(kind).await;
                    info!(connector = %kind, outcome = outcome.as_str(), "channel stop requested");
                    Ok(json!({
                        "channel": kind,
                        "outcome": outcome.as_str(),
                        "status": supervisor.status(kind),
                    }))
                })
            }),
        );
    }

    // ── Voice wake ───────────────────────────────────────────────────────

    fn register_voicewake_methods(&mut self) {
        self.register(
            "voicewake.get",
            Box::new(|ctx| {
                Box::pin(async move {
                    Ok(json!({ "triggers": ctx.state.voicewake_triggers().await }))
                })
            }),
        );

        self.register(
            "voicewake.set",
            Box::new(|ctx| {
                Box::pin(async move {
                    let raw = ctx.params.get("triggers");
                    if !raw.is_some_and(Value::is_array) {
                        return Err(ErrorShape::invalid("triggers must be an array"));
                    }
                    let triggers = voice_wake_triggers_from_value(raw);
                    ctx.state.set_voicewake_triggers(triggers.clone()).await;
                    broadcast(
                        &ctx.state,
                        "voicewake.changed",
                        json!({ "triggers": triggers }),
                    )
                    .await;
                    Ok(json!({ "triggers": triggers }))
                })
            }),
        );
    }
}

// ── Param helpers ────────────────────────────────────────────────────────────

fn optional_channel(params: &Value) -> Result<Option<ConnectorKind>, ErrorShape> {
    match params.get("channel") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => name
            .parse::<ConnectorKind>()
            .map(Some)
            .map_err(|e| ErrorShape::invalid(e.to_string())),
        Some(_) => Err(ErrorShape::invalid("channel must be a string")),
    }
}

fn required_channel(params: &Value) -> Result<ConnectorKind, ErrorShape> {
    optional_channel(params)?.ok_or_else(|| {
        ErrorShape::new(error_codes::INVALID_REQUEST, "missing parameter: channel")
    })
}
