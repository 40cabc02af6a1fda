use std::{fmt, str::FromStr, time::Duration};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio_util::sync::CancellationToken,
};

use portico_config::ChannelsConfig;

use crate::supervisor::StatusSink;

/// The chat platforms the gateway knows how to supervise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    WhatsApp,
    Discord,
    Telegram,
    Signal,
    IMessage,
}

impl ConnectorKind {
    /// Every kind, in the order `start_all` walks them.
    pub const ALL: [ConnectorKind; 5] = [
        ConnectorKind::WhatsApp,
        ConnectorKind::Discord,
        ConnectorKind::Telegram,
        ConnectorKind::Signal,
        ConnectorKind::IMessage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Discord => "discord",
            Self::Telegram => "telegram",
            Self::Signal => "signal",
            Self::IMessage => "imessage",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown connector: {0}")]
pub struct UnknownConnector(pub String);

impl FromStr for ConnectorKind {
    type Err = UnknownConnector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| UnknownConnector(s.to_string()))
    }
}

/// Everything a connector's `run` receives from the supervisor.
pub struct ConnectorContext {
    /// Channel config as read at start time.
    pub config: ChannelsConfig,
    /// Resolved credential for token-based connectors.
    pub token: Option<String>,
    /// Cancelled by `stop`. Connectors are expected to return promptly once
    /// this fires; the supervisor does not force them.
    pub cancel: CancellationToken,
    /// Push live sub-status (connected, last message, ...).
    pub status: StatusSink,
}

/// Outcome of a credential probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    pub ok: bool,
    /// Bot username or account id, when the platform reports one.
    pub identity: Option<String>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn identity(identity: impl Into<String>) -> Self {
        Self {
            ok: true,
            identity: Some(identity.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            identity: None,
            error: Some(error.into()),
        }
    }
}

/// A chat platform connector. Implementations own the wire protocol; the
/// supervisor owns their lifecycle.
#[async_trait]
pub trait Connector: Send + Sync {
    fn kind(&self) -> ConnectorKind;

    /// Look up the identity behind `token`. Called before `run` for
    /// token-based connectors.
    async fn probe(&self, _token: &str, _timeout: Duration) -> ProbeResult {
        ProbeResult::default()
    }

    /// Run until cancelled or failed.
    async fn run(&self, ctx: ConnectorContext) -> anyhow::Result<()>;
}
