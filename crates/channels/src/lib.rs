//! Chat connectors and their supervisor.
//!
//! Each platform (WhatsApp, Discord, Telegram, Signal, iMessage) plugs in as a
//! [`Connector`]. The [`ConnectorSupervisor`] owns their background tasks,
//! gates them on configuration readiness and aggregates their status.

pub mod connector;
pub mod readiness;
pub mod status;
pub mod supervisor;

pub use {
    connector::{Connector, ConnectorContext, ConnectorKind, ProbeResult, UnknownConnector},
    readiness::{LaunchPlan, Readiness, SkipReason},
    status::{ConnectorEvent, ConnectorStatus, StatusPatch, StatusSnapshot},
    supervisor::{ConfigSource, ConnectorSupervisor, StartOutcome, StatusSink, StopOutcome},
};
