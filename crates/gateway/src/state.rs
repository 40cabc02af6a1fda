use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use {
    serde::Serialize,
    tokio::sync::{RwLock, mpsc},
};

use portico_channels::ConnectorSupervisor;

use crate::{auth::ResolvedAuth, hooks::HooksConfig};

// ── Connected client ─────────────────────────────────────────────────────────

/// A WebSocket client currently connected to the gateway.
#[derive(Debug)]
pub struct ConnectedClient {
    pub conn_id: String,
    pub remote: Option<SocketAddr>,
    /// Channel for sending serialized frames to this client's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

impl ConnectedClient {
    /// Send a serialized JSON frame to this client.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Hook summary ─────────────────────────────────────────────────────────────

/// Non-secret view of the hook configuration for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksSummary {
    pub base_path: String,
    pub max_body_bytes: usize,
    pub mappings: Vec<String>,
}

impl From<&HooksConfig> for HooksSummary {
    fn from(config: &HooksConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            max_body_bytes: config.max_body_bytes,
            mappings: config.mappings.iter().map(|m| m.id.clone()).collect(),
        }
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    /// All connected WebSocket clients, keyed by conn_id.
    pub clients: RwLock<HashMap<String, ConnectedClient>>,
    /// Monotonically increasing sequence counter for broadcast events.
    pub seq: AtomicU64,
    pub version: String,
    pub hostname: String,
    pub started_at: Instant,
    pub auth: ResolvedAuth,
    pub supervisor: Arc<ConnectorSupervisor>,
    /// `None` when hooks are disabled.
    pub hooks: Option<HooksSummary>,
    voicewake: RwLock<Vec<String>>,
}

impl GatewayState {
    pub fn new(
        auth: ResolvedAuth,
        supervisor: Arc<ConnectorSupervisor>,
        hooks: Option<HooksSummary>,
        voicewake_triggers: Vec<String>,
    ) -> Arc<Self> {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".into());

        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname,
            started_at: Instant::now(),
            auth,
            supervisor,
            hooks,
            voicewake: RwLock::new(voicewake_triggers),
        })
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a new client connection.
    pub async fn register_client(&self, client: ConnectedClient) {
        let conn_id = client.conn_id.clone();
        self.clients.write().await.insert(conn_id, client);
    }

    /// Remove a client by conn_id. Returns the removed client if found.
    pub async fn remove_client(&self, conn_id: &str) -> Option<ConnectedClient> {
        self.clients.write().await.remove(conn_id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn voicewake_triggers(&self) -> Vec<String> {
        self.voicewake.read().await.clone()
    }

    pub async fn set_voicewake_triggers(&self, triggers: Vec<String>) {
        *self.voicewake.write().await = triggers;
    }

    pub fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
