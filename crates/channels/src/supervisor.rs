//! Connector lifecycle: one cancellable background task per connector kind.
//!
//! All status records and task handles live behind a single mutex that is
//! only held across non-suspending check-and-set sequences. Start and stop
//! for the same kind are additionally serialized by a per-kind async lock, so
//! two tasks for one kind never overlap.

use std::{
    collections::BTreeMap,
    fmt,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use {
    futures::FutureExt,
    tokio::{sync::watch, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    portico_common::{format_error, format_panic, time::now_ms},
    portico_config::ChannelsConfig,
};

use crate::{
    connector::{Connector, ConnectorContext, ConnectorKind, ProbeResult},
    readiness::{self, LaunchPlan, Readiness, SkipReason},
    status::{ConnectorEvent, ConnectorStatus, StatusPatch, StatusSnapshot},
};

/// Upper bound for a credential probe before launch.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(2500);

/// Where the supervisor reads channel configuration from. Re-read on every
/// `start` so edits take effect without a restart.
pub trait ConfigSource: Send + Sync {
    fn channels(&self) -> ChannelsConfig;
}

impl<F> ConfigSource for F
where
    F: Fn() -> ChannelsConfig + Send + Sync,
{
    fn channels(&self) -> ChannelsConfig {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
    /// The connector ignored cancellation past `stop_timeout_ms` and was aborted.
    TimedOut,
}

impl StartOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::AlreadyRunning => "already running",
            Self::Skipped(_) => "skipped",
        }
    }
}

impl StopOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::NotRunning => "not running",
            Self::TimedOut => "timed out",
        }
    }
}

// ── Shared state ─────────────────────────────────────────────────────────────

struct ConnectorHandle {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    settled: watch::Receiver<bool>,
}

#[derive(Default)]
struct Slot {
    status: ConnectorStatus,
    handle: Option<ConnectorHandle>,
    generation: u64,
}

impl Slot {
    fn owned_by(&self, generation: u64) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.generation == generation)
    }
}

struct Shared {
    slots: Mutex<BTreeMap<ConnectorKind, Slot>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<ConnectorKind, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_slot<R>(&self, kind: ConnectorKind, f: impl FnOnce(&mut Slot) -> R) -> R {
        let mut slots = self.lock();
        f(slots.entry(kind).or_default())
    }

    /// Record the end of a run. Handle and `running` are cleared together;
    /// a run that no longer owns the slot (aborted by a timed-out stop) is
    /// ignored.
    fn settle(&self, kind: ConnectorKind, generation: u64, outcome: Result<(), String>) {
        self.with_slot(kind, |slot| {
            if !slot.owned_by(generation) {
                debug!(connector = %kind, generation, "stale connector run settled");
                return;
            }
            match outcome {
                Ok(()) => info!(connector = %kind, "connector exited"),
                Err(message) => {
                    error!(connector = %kind, error = %message, "connector failed");
                    slot.status.last_error = Some(message);
                },
            }
            slot.handle = None;
            slot.status.running = false;
        });
    }
}

/// Handed to a running connector for pushing live sub-status.
///
/// Updates merge into the stored record field by field. Once the run that
/// owns the sink has settled, further updates are dropped.
#[derive(Clone)]
pub struct StatusSink {
    shared: Arc<Shared>,
    kind: ConnectorKind,
    generation: u64,
}

impl StatusSink {
    pub fn kind(&self) -> ConnectorKind {
        self.kind
    }

    pub fn update(&self, patch: StatusPatch) {
        self.shared.with_slot(self.kind, |slot| {
            if slot.owned_by(self.generation) {
                patch.apply(&mut slot.status);
            }
        });
    }

    pub fn event(&self, event: ConnectorEvent) {
        self.shared.with_slot(self.kind, |slot| {
            if slot.owned_by(self.generation) {
                event.apply(&mut slot.status, now_ms());
            }
        });
    }
}

impl fmt::Debug for StatusSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusSink")
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .finish()
    }
}

// ── Supervisor ───────────────────────────────────────────────────────────────

pub struct ConnectorSupervisor {
    shared: Arc<Shared>,
    connectors: BTreeMap<ConnectorKind, Arc<dyn Connector>>,
    config: Arc<dyn ConfigSource>,
    ops: [tokio::sync::Mutex<()>; ConnectorKind::ALL.len()],
    probe_timeout: Duration,
}

impl ConnectorSupervisor {
    pub fn new(config: impl ConfigSource + 'static) -> Self {
        let slots = ConnectorKind::ALL
            .into_iter()
            .map(|kind| (kind, Slot::default()))
            .collect();
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(slots),
            }),
            connectors: BTreeMap::new(),
            config: Arc::new(config),
            ops: std::array::from_fn(|_| tokio::sync::Mutex::new(())),
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Register the implementation for one kind, replacing any earlier one.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connectors.insert(connector.kind(), connector);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn has_connector(&self, kind: ConnectorKind) -> bool {
        self.connectors.contains_key(&kind)
    }

    /// Start `kind` unless it is already running or not ready.
    pub async fn start(&self, kind: ConnectorKind) -> StartOutcome {
        let _op = self.ops[kind.index()].lock().await;

        if self.shared.with_slot(kind, |slot| slot.handle.is_some()) {
            debug!(connector = %kind, "connector already running");
            return StartOutcome::AlreadyRunning;
        }

        let config = self.config.channels();
        let LaunchPlan { token, mut status } = match readiness::check(kind, &config) {
            Readiness::Ready(plan) => plan,
            Readiness::Skip(reason) => return self.skip(kind, reason),
        };
        let Some(connector) = self.connectors.get(&kind).cloned() else {
            return self.skip(kind, SkipReason::Unavailable);
        };

        if let Some(token) = token.as_deref() {
            let probe = connector.probe(token, self.probe_timeout);
            match tokio::time::timeout(self.probe_timeout, probe).await {
                Ok(ProbeResult {
                    ok: true,
                    identity: Some(identity),
                    ..
                }) => {
                    info!(connector = %kind, identity = %identity, "credential probe ok");
                    status.identity = Some(identity);
                },
                Ok(ProbeResult {
                    error: Some(e), ..
                }) => {
                    warn!(connector = %kind, error = %e, "credential probe failed");
                },
                Ok(_) => {},
                Err(_) => warn!(connector = %kind, "credential probe timed out"),
            }
        }

        self.launch(kind, connector, config, token, status);
        StartOutcome::Started
    }

    fn skip(&self, kind: ConnectorKind, reason: SkipReason) -> StartOutcome {
        info!(connector = %kind, reason = %reason, "connector not started");
        self.shared.with_slot(kind, |slot| {
            slot.status.last_error = Some(reason.to_string());
        });
        StartOutcome::Skipped(reason)
    }

    fn launch(
        &self,
        kind: ConnectorKind,
        connector: Arc<dyn Connector>,
        config: ChannelsConfig,
        token: Option<String>,
        seed: StatusPatch,
    ) {
        let mut slots = self.shared.lock();
        let slot = slots.entry(kind).or_default();
        slot.generation += 1;
        let generation = slot.generation;

        slot.status.running = true;
        slot.status.last_start_at = Some(now_ms());
        slot.status.last_error = None;
        seed.apply(&mut slot.status);

        let cancel = CancellationToken::new();
        let (settled_tx, settled_rx) = watch::channel(false);
        let ctx = ConnectorContext {
            config,
            token,
            cancel: cancel.clone(),
            status: StatusSink {
                shared: Arc::clone(&self.shared),
                kind,
                generation,
            },
        };
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(connector.run(ctx)).catch_unwind().await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(format_error(&e)),
                Err(panic) => Err(format_panic(panic)),
            };
            shared.settle(kind, generation, outcome);
            let _ = settled_tx.send(true);
        });

        slot.handle = Some(ConnectorHandle {
            generation,
            cancel,
            task,
            settled: settled_rx,
        });
        info!(connector = %kind, generation, "connector started");
    }

    /// Cancel `kind` and wait for its task to settle.
    pub async fn stop(&self, kind: ConnectorKind) -> StopOutcome {
        let _op = self.ops[kind.index()].lock().await;

        let running = self.shared.with_slot(kind, |slot| {
            slot.handle
                .as_ref()
                .map(|h| (h.generation, h.cancel.clone(), h.settled.clone()))
        });
        let Some((generation, cancel, mut settled)) = running else {
            debug!(connector = %kind, "connector not running, nothing to stop");
            return StopOutcome::NotRunning;
        };

        info!(connector = %kind, "stopping connector");
        cancel.cancel();

        let limit = self
            .config
            .channels()
            .stop_timeout_ms
            .map(Duration::from_millis);
        let wait = settled.wait_for(|done| *done);
        let timed_out = match limit {
            Some(limit) => tokio::time::timeout(limit, wait).await.is_err(),
            None => {
                // A closed channel means the task is gone either way.
                let _ = wait.await;
                false
            },
        };

        let now = now_ms();
        self.shared.with_slot(kind, |slot| {
            if timed_out {
                if let Some(handle) = slot.handle.take_if(|h| h.generation == generation) {
                    handle.task.abort();
                    slot.status.running = false;
                    slot.status.last_error = Some("stop timed out".into());
                }
            } else if slot.owned_by(generation) {
                slot.handle = None;
                slot.status.running = false;
            }
            slot.status.last_stop_at = Some(now);
        });

        if timed_out {
            warn!(connector = %kind, "connector ignored cancellation, aborted");
            StopOutcome::TimedOut
        } else {
            info!(connector = %kind, "connector stopped");
            StopOutcome::Stopped
        }
    }

    /// Start every kind in order. A skip or failure never blocks the next.
    pub async fn start_all(&self) -> Vec<(ConnectorKind, StartOutcome)> {
        let mut outcomes = Vec::with_capacity(ConnectorKind::ALL.len());
        for kind in ConnectorKind::ALL {
            outcomes.push((kind, self.start(kind).await));
        }
        outcomes
    }

    /// Stop every kind, in reverse start order.
    pub async fn stop_all(&self) -> Vec<(ConnectorKind, StopOutcome)> {
        let mut outcomes = Vec::with_capacity(ConnectorKind::ALL.len());
        for kind in ConnectorKind::ALL.into_iter().rev() {
            outcomes.push((kind, self.stop(kind).await));
        }
        outcomes
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let slots = self.shared.lock();
        StatusSnapshot::new(
            slots
                .iter()
                .map(|(kind, slot)| (*kind, slot.status.clone()))
                .collect(),
        )
    }

    pub fn status(&self, kind: ConnectorKind) -> ConnectorStatus {
        self.shared.with_slot(kind, |slot| slot.status.clone())
    }

    pub fn is_running(&self, kind: ConnectorKind) -> bool {
        self.shared.with_slot(kind, |slot| slot.handle.is_some())
    }

    /// Record something observed outside the connector's task. Leaves
    /// `running` and task ownership alone.
    pub fn mark_external_event(&self, kind: ConnectorKind, event: ConnectorEvent) {
        debug!(connector = %kind, event = ?event, "external connector event");
        self.shared
            .with_slot(kind, |slot| event.apply(&mut slot.status, now_ms()));
    }
}
