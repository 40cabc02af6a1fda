use std::{future::Future, net::SocketAddr, sync::Arc};

use {
    async_trait::async_trait,
    axum::Router,
    secrecy::ExposeSecret,
    serde_json::json,
    tokio::net::TcpListener,
    tracing::{info, warn},
};

use portico_channels::{ConnectorSupervisor, StartOutcome, StopOutcome};

use crate::{
    auth,
    broadcast::broadcast,
    control::ControlPanel,
    hooks::{
        AgentAction, HookDispatcher, HookGateway, HooksConfig, WakeAction,
        normalize_voice_wake_triggers, resolve_hooks_config,
    },
    methods::MethodRegistry,
    protocol::PROTOCOL_VERSION,
    router::RequestRouter,
    state::{GatewayState, HooksSummary},
    ws::WsAcceptor,
};

// ── Hook dispatch ────────────────────────────────────────────────────────────

/// Forwards hook actions to every connected WebSocket client.
pub struct BroadcastDispatcher {
    state: Arc<GatewayState>,
}

impl BroadcastDispatcher {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl HookDispatcher for BroadcastDispatcher {
    async fn wake(&self, action: WakeAction) -> anyhow::Result<()> {
        let payload = serde_json::to_value(&action)?;
        broadcast(&self.state, "hook.wake", payload).await;
        Ok(())
    }

    async fn agent(&self, action: AgentAction) -> anyhow::Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let payload = json!({ "runId": run_id, "action": action });
        broadcast(&self.state, "hook.agent", payload).await;
        Ok(run_id)
    }
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway app (shared between production startup and tests).
pub fn build_gateway_app(
    state: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
    hooks: Option<HooksConfig>,
    control_ui: bool,
) -> Router {
    let dispatcher = Arc::new(BroadcastDispatcher::new(Arc::clone(&state)));
    let mut router = RequestRouter::new()
        .with_websocket(Arc::new(WsAcceptor::new(Arc::clone(&state), methods)));
    if hooks.is_some() {
        router = router.with_hooks(Arc::new(HookGateway::new(hooks, dispatcher)));
    }
    if control_ui {
        router = router.with_control(Arc::new(ControlPanel::new(state)));
    }
    router.into_app()
}

/// Serve `app` on `listener` until `shutdown` resolves. Connectors are started
/// in the background once the listener is up and stopped after it drains.
pub async fn run_gateway(
    listener: TcpListener,
    state: Arc<GatewayState>,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let supervisor = Arc::clone(&state.supervisor);
    let starter = tokio::spawn(start_connectors(Arc::clone(&supervisor)));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    starter.abort();
    for (kind, outcome) in supervisor.stop_all().await {
        if outcome == StopOutcome::TimedOut {
            warn!(connector = %kind, "connector did not stop in time");
        }
    }
    info!("gateway stopped");
    Ok(())
}

async fn start_connectors(supervisor: Arc<ConnectorSupervisor>) {
    for (kind, outcome) in supervisor.start_all().await {
        match outcome {
            StartOutcome::Started => info!(connector = %kind, "connector started"),
            StartOutcome::AlreadyRunning => {},
            StartOutcome::Skipped(reason) => {
                info!(connector = %kind, reason = %reason, "connector skipped")
            },
        }
    }
}

/// Start the gateway HTTP + WebSocket server.
pub async fn start_gateway(bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = portico_config::discover_and_load();

    // Environment overrides config (PORTICO_TOKEN / PORTICO_PASSWORD).
    let token = std::env::var("PORTICO_TOKEN").ok().or_else(|| {
        config
            .gateway
            .token
            .as_ref()
            .map(|t| t.expose_secret().clone())
    });
    let password = std::env::var("PORTICO_PASSWORD").ok().or_else(|| {
        config
            .gateway
            .password
            .as_ref()
            .map(|p| p.expose_secret().clone())
    });
    let resolved_auth = auth::resolve_auth(token, password);

    let hooks = resolve_hooks_config(&config.hooks)?;
    let triggers = normalize_voice_wake_triggers(config.voicewake.triggers.iter());

    let supervisor = Arc::new(ConnectorSupervisor::new(|| {
        portico_config::discover_and_load().channels
    }));
    let state = GatewayState::new(
        resolved_auth,
        supervisor,
        hooks.as_ref().map(HooksSummary::from),
        triggers,
    );
    let methods = Arc::new(MethodRegistry::new());
    let method_count = methods.method_names().len();
    let hooks_line = match &hooks {
        Some(h) => format!("hooks: {} ({} mappings)", h.base_path, h.mappings.len()),
        None => "hooks: disabled".to_string(),
    };

    let app = build_gateway_app(
        Arc::clone(&state),
        methods,
        hooks,
        config.control_ui.enabled,
    );

    let bind = bind.unwrap_or(config.gateway.bind);
    let port = port.unwrap_or(config.gateway.port);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("portico gateway v{}", state.version),
        format!("protocol v{PROTOCOL_VERSION}, listening on {addr}"),
        format!("{method_count} methods registered"),
        hooks_line,
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    run_gateway(listener, state, app, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    })
    .await
}
