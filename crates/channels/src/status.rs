//! Per-connector runtime status records.
//!
//! Records are plain data. Only the supervisor mutates them; everyone else
//! reads a [`StatusSnapshot`].

use std::collections::{BTreeMap, btree_map};

use serde::Serialize;

use crate::connector::ConnectorKind;

/// Aggregated runtime status of one connector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatus {
    pub running: bool,
    pub last_start_at: Option<i64>,
    pub last_stop_at: Option<i64>,
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_disconnect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

/// Fields a connector (or readiness check) may report. `None` means "not
/// reported" and leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPatch {
    pub last_error: Option<String>,
    pub connected: Option<bool>,
    pub reconnect_attempts: Option<u32>,
    pub last_connected_at: Option<i64>,
    pub last_disconnect: Option<String>,
    pub last_message_at: Option<i64>,
    pub last_event_at: Option<i64>,
    pub mode: Option<String>,
    pub base_url: Option<String>,
    pub cli_path: Option<String>,
    pub db_path: Option<String>,
    pub identity: Option<String>,
}

macro_rules! merge_fields {
    ($patch:ident, $status:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $patch.$field {
                $status.$field = Some(value);
            }
        )+
    };
}

impl StatusPatch {
    pub fn apply(self, status: &mut ConnectorStatus) {
        let patch = self;
        merge_fields!(
            patch,
            status,
            last_error,
            connected,
            reconnect_attempts,
            last_connected_at,
            last_disconnect,
            last_message_at,
            last_event_at,
            mode,
            base_url,
            cli_path,
            db_path,
            identity,
        );
    }
}

/// Out-of-band signals about a connector that don't come from its task
/// (e.g. the linked session was revoked from the phone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    Connected,
    Disconnected { reason: Option<String> },
    LoggedOut,
    Error(String),
}

impl ConnectorEvent {
    /// Apply to `status`. Never touches `running` or the start/stop stamps.
    pub(crate) fn apply(self, status: &mut ConnectorStatus, now: i64) {
        status.last_event_at = Some(now);
        match self {
            Self::Connected => {
                status.connected = Some(true);
                status.last_connected_at = Some(now);
                status.last_error = None;
            },
            Self::Disconnected { reason } => {
                status.connected = Some(false);
                if reason.is_some() {
                    status.last_error.clone_from(&reason);
                }
                status.last_disconnect = reason;
            },
            Self::LoggedOut => {
                status.connected = Some(false);
                status.last_error = Some("logged out".into());
            },
            Self::Error(message) => {
                status.last_error = Some(message);
            },
        }
    }
}

/// Point-in-time copy of every connector's status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusSnapshot(BTreeMap<ConnectorKind, ConnectorStatus>);

impl StatusSnapshot {
    pub(crate) fn new(entries: BTreeMap<ConnectorKind, ConnectorStatus>) -> Self {
        Self(entries)
    }

    pub fn get(&self, kind: ConnectorKind) -> Option<&ConnectorStatus> {
        self.0.get(&kind)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ConnectorKind, ConnectorStatus> {
        self.0.iter()
    }

    pub fn running(&self) -> impl Iterator<Item = ConnectorKind> + '_ {
        self.0.iter().filter(|(_, s)| s.running).map(|(k, _)| *k)
    }
}
