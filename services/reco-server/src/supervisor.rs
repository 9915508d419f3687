//! Database liveness supervisor
//!
//! Pure state machine: receives events, returns (new_state, action).
//! `spawn_supervisor` runs it as a background task, executes the probe and
//! timer I/O implied by each action, and publishes the resulting
//! [`DatabaseHealth`] on a watch channel for `/health`.
//!
//! Reconnect backoff: 1s, 2s, 4s, ... capped at 30s, reset by any
//! successful probe.

use std::sync::Arc;
use std::time::Duration;

use integrations::LivenessProbe;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::metrics;

/// First reconnect delay.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Observable database status, as published to `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DatabaseHealth {
    /// No probe has completed yet
    Connecting,
    Connected,
    /// Last probe failed; another attempt is scheduled
    Reconnecting { failures: u32, last_error: String },
}

impl DatabaseHealth {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short label for the `/health` body.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "disconnected",
        }
    }
}

/// Supervisor states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    /// Probe in flight; `failures` consecutive failures precede it
    Probing { failures: u32 },
    /// Last probe succeeded; waiting for the next periodic check
    Connected,
    /// Waiting out the backoff after `failures` consecutive failures
    Backoff { failures: u32, last_error: String },
    /// Terminal state
    Stopped,
}

impl SupervisorState {
    pub fn health(&self) -> DatabaseHealth {
        match self {
            Self::Probing { .. } | Self::Stopped => DatabaseHealth::Connecting,
            Self::Connected => DatabaseHealth::Connected,
            Self::Backoff {
                failures,
                last_error,
            } => DatabaseHealth::Reconnecting {
                failures: *failures,
                last_error: last_error.clone(),
            },
        }
    }
}

/// Events that drive state transitions.
#[derive(Debug)]
pub enum SupervisorEvent {
    ProbeSucceeded,
    ProbeFailed(String),
    /// Backoff delay elapsed
    RetryTimer,
    /// Periodic re-check interval elapsed
    CheckTimer,
    Shutdown,
}

/// Actions the caller should execute after a state transition
#[derive(Debug, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Run the liveness probe now
    Probe,
    /// Sleep, then deliver `RetryTimer`
    ScheduleRetry { delay: Duration },
    /// Sleep for the probe interval, then deliver `CheckTimer`
    ScheduleCheck,
    Stop,
    None,
}

/// Delay before the reconnect that follows `failures` consecutive failures.
pub fn backoff_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    INITIAL_BACKOFF
        .saturating_mul(2u32.pow(exponent))
        .min(MAX_BACKOFF)
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(
    state: SupervisorState,
    event: SupervisorEvent,
) -> (SupervisorState, SupervisorAction) {
    match (state, event) {
        (_, SupervisorEvent::Shutdown) => (SupervisorState::Stopped, SupervisorAction::Stop),

        (SupervisorState::Stopped, _) => (SupervisorState::Stopped, SupervisorAction::None),

        // --- Probing ---
        (SupervisorState::Probing { .. }, SupervisorEvent::ProbeSucceeded) => {
            (SupervisorState::Connected, SupervisorAction::ScheduleCheck)
        }

        (SupervisorState::Probing { failures }, SupervisorEvent::ProbeFailed(error)) => {
            let failures = failures.saturating_add(1);
            (
                SupervisorState::Backoff {
                    failures,
                    last_error: error,
                },
                SupervisorAction::ScheduleRetry {
                    delay: backoff_delay(failures),
                },
            )
        }

        // --- Backoff ---
        (SupervisorState::Backoff { failures, .. }, SupervisorEvent::RetryTimer) => (
            SupervisorState::Probing { failures },
            SupervisorAction::Probe,
        ),

        // --- Connected ---
        (SupervisorState::Connected, SupervisorEvent::CheckTimer) => (
            SupervisorState::Probing { failures: 0 },
            SupervisorAction::Probe,
        ),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, SupervisorAction::None),
    }
}

/// Run the supervisor until `shutdown` fires.
///
/// Returns the health receiver and the task handle. The first probe runs
/// immediately; until it completes, health is `Connecting`.
pub fn spawn_supervisor(
    probe: Arc<dyn LivenessProbe>,
    probe_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> (watch::Receiver<DatabaseHealth>, JoinHandle<()>) {
    let (health_tx, health_rx) = watch::channel(DatabaseHealth::Connecting);

    let task = tokio::spawn(async move {
        info!(addr = probe.target(), "database supervisor started");
        let mut state = SupervisorState::Probing { failures: 0 };
        let mut action = SupervisorAction::Probe;

        loop {
            let event = match action {
                SupervisorAction::Probe => match probe.ping().await {
                    Ok(()) => SupervisorEvent::ProbeSucceeded,
                    Err(e) => SupervisorEvent::ProbeFailed(Error::from_probe(e).to_string()),
                },
                SupervisorAction::ScheduleRetry { delay } => {
                    if wait_or_shutdown(delay, &mut shutdown).await {
                        SupervisorEvent::Shutdown
                    } else {
                        SupervisorEvent::RetryTimer
                    }
                }
                SupervisorAction::ScheduleCheck => {
                    if wait_or_shutdown(probe_interval, &mut shutdown).await {
                        SupervisorEvent::Shutdown
                    } else {
                        SupervisorEvent::CheckTimer
                    }
                }
                SupervisorAction::Stop => break,
                SupervisorAction::None => {
                    warn!(?state, "supervisor stalled, stopping");
                    break;
                }
            };

            (state, action) = handle_event(state, event);

            if let (
                SupervisorState::Backoff {
                    failures,
                    last_error,
                },
                SupervisorAction::ScheduleRetry { delay },
            ) = (&state, &action)
            {
                warn!(
                    failures,
                    error = %last_error,
                    retry_in_secs = delay.as_secs(),
                    "database probe failed, retrying"
                );
            }

            // Probing is transient; keep publishing the last settled health.
            if matches!(
                state,
                SupervisorState::Connected | SupervisorState::Backoff { .. }
            ) {
                let health = state.health();
                let connected = health.is_connected();
                metrics::set_database_connected(connected);
                let changed = health_tx.send_if_modified(|current| {
                    if *current == health {
                        false
                    } else {
                        *current = health;
                        true
                    }
                });
                if changed && connected {
                    info!("database connected");
                }
            } else {
                debug!(?state, "database supervisor transition");
            }
        }

        metrics::set_database_connected(false);
        info!("database supervisor stopped");
    });

    (health_rx, task)
}

/// Sleep for `delay`; true if shutdown was signalled first.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
