//! AlertActor - Turns failure streaks into alert events
//!
//! ## State Machine
//!
//! One tracker per target, driven by every outcome in arrival order:
//!
//! ```text
//! failure:
//!   consecutive += 1
//!   !alerting && consecutive >= threshold      → Critical, alerting = true
//!   !alerting && consecutive == warning (once) → Warning
//!
//! success:
//!   consecutive = 0
//!   alerting                                   → Resolved, alerting = false
//! ```
//!
//! At most one Critical is emitted per failure episode, and every Critical is
//! eventually followed by exactly one Resolved if the target recovers.
//!
//! ## Notification rate limit
//!
//! With `min_alert_interval` set, a Critical raised sooner than that after the
//! last *delivered* Critical is not sent to the notifier. The state still
//! transitions and the dashboard still gets the event. The Resolved that ends
//! a suppressed episode is suppressed as well.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::alerts::Notifier;
use crate::config::{AlertPolicy, Target};
use crate::error::{PipelineError, PipelineResult};

use super::messages::{AlertCommand, AlertEvent, AlertState, DashboardUpdate, ProbeOutcome, Severity};

/// Event produced by a tracker, with the delivery decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub event: AlertEvent,

    /// Whether the notifier should receive this event
    pub notify: bool,
}

/// Alert state machine for a single target
#[derive(Debug, Clone)]
pub struct AlertTracker {
    policy: AlertPolicy,
    state: AlertState,

    /// Warning already raised in the current failure streak
    warned: bool,

    /// Time of the last Critical handed to the notifier
    last_notified: Option<DateTime<Utc>>,

    /// The Critical of the current episode was not delivered
    suppressed: bool,
}

impl AlertTracker {
    pub fn new(target: impl Into<String>, policy: AlertPolicy) -> Self {
        Self {
            policy,
            state: AlertState {
                target: target.into(),
                consecutive_failures: 0,
                currently_alerting: false,
                last_alert_time: None,
            },
            warned: false,
            last_notified: None,
            suppressed: false,
        }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    /// Apply one outcome, returning the event it triggers (if any)
    pub fn observe(&mut self, outcome: &ProbeOutcome) -> Option<Transition> {
        if outcome.success {
            self.observe_success(outcome)
        } else {
            self.observe_failure(outcome)
        }
    }

    fn observe_failure(&mut self, outcome: &ProbeOutcome) -> Option<Transition> {
        self.state.consecutive_failures += 1;

        if self.state.currently_alerting {
            return None;
        }

        let failures = self.state.consecutive_failures;

        if failures >= self.policy.failure_threshold {
            let now = outcome.timestamp;
            let notify = self.rate_limit_allows(now);

            self.state.currently_alerting = true;
            self.state.last_alert_time = Some(now);
            self.suppressed = !notify;
            if notify {
                self.last_notified = Some(now);
            }

            return Some(Transition {
                event: self.event(
                    Severity::Critical,
                    now,
                    format!("{failures} consecutive failed probes: {}", outcome.failure_reason()),
                ),
                notify,
            });
        }

        if !self.warned && self.policy.warning_threshold == Some(failures) {
            self.warned = true;
            return Some(Transition {
                event: self.event(
                    Severity::Warning,
                    outcome.timestamp,
                    format!("{failures} consecutive failed probes: {}", outcome.failure_reason()),
                ),
                notify: true,
            });
        }

        None
    }

    fn observe_success(&mut self, outcome: &ProbeOutcome) -> Option<Transition> {
        let failures = self.state.consecutive_failures;
        self.state.consecutive_failures = 0;
        self.warned = false;

        if !self.state.currently_alerting {
            return None;
        }

        self.state.currently_alerting = false;
        let notify = !self.suppressed;
        self.suppressed = false;

        Some(Transition {
            event: self.event(
                Severity::Resolved,
                outcome.timestamp,
                format!("target recovered after {failures} failed probes"),
            ),
            notify,
        })
    }

    fn rate_limit_allows(&self, now: DateTime<Utc>) -> bool {
        match (self.policy.min_alert_interval, self.last_notified) {
            (Some(min_interval), Some(last)) => match chrono::Duration::from_std(min_interval) {
                Ok(min_interval) => now - last >= min_interval,
                Err(_) => false,
            },
            _ => true,
        }
    }

    fn event(&self, severity: Severity, triggered_at: DateTime<Utc>, reason: String) -> AlertEvent {
        AlertEvent {
            target: self.state.target.clone(),
            severity,
            triggered_at,
            reason,
        }
    }
}

/// Actor that evaluates outcomes and dispatches alerts
pub struct AlertActor {
    /// Per-target state
    trackers: HashMap<String, AlertTracker>,

    /// Alert queue fed by the fan-out stage
    input: mpsc::Receiver<ProbeOutcome>,

    /// Command receiver
    command_rx: mpsc::Receiver<AlertCommand>,

    notifier: Arc<dyn Notifier>,
    dashboard_tx: mpsc::Sender<DashboardUpdate>,
    cancel: CancellationToken,
}

impl AlertActor {
    pub fn new(
        input: mpsc::Receiver<ProbeOutcome>,
        command_rx: mpsc::Receiver<AlertCommand>,
        notifier: Arc<dyn Notifier>,
        dashboard_tx: mpsc::Sender<DashboardUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            trackers: HashMap::new(),
            input,
            command_rx,
            notifier,
            dashboard_tx,
            cancel,
        }
    }

    /// Register a target before outcomes start flowing
    pub fn register_target(&mut self, target: &Target) {
        self.trackers.insert(
            target.url.clone(),
            AlertTracker::new(&target.url, target.policy),
        );
    }

    /// Run the actor's main loop
    ///
    /// After cancellation the queue is drained until the fan-out stage closes
    /// it. A queue closed before cancellation is fatal.
    #[instrument(skip(self), name = "alert_evaluator")]
    pub async fn run(mut self) -> PipelineResult<()> {
        debug!("starting alert actor with {} targets", self.trackers.len());

        let mut draining = false;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !draining => {
                    debug!("shutdown requested, draining alert queue");
                    draining = true;
                }

                outcome = self.input.recv() => {
                    match outcome {
                        Some(outcome) => self.handle_outcome(outcome).await,
                        None if self.cancel.is_cancelled() => break,
                        None => {
                            return Err(PipelineError::ChannelClosed { component: "alert evaluator" });
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    self.handle_command(cmd);
                }
            }
        }

        debug!("alert actor stopped");
        Ok(())
    }

    fn handle_command(&self, cmd: AlertCommand) {
        match cmd {
            AlertCommand::GetState { target, respond_to } => {
                let state = self.trackers.get(&target).map(|t| t.state().clone());
                let _ = respond_to.send(state);
            }
        }
    }

    #[instrument(skip(self, outcome), fields(target = %outcome.target))]
    async fn handle_outcome(&mut self, outcome: ProbeOutcome) {
        let Some(tracker) = self.trackers.get_mut(&outcome.target) else {
            trace!("received outcome for unregistered target, ignoring");
            return;
        };

        let Some(transition) = tracker.observe(&outcome) else {
            return;
        };

        let event = transition.event;
        info!("{} alert for {}: {}", event.severity, event.target, event.reason);

        if transition.notify {
            if let Err(e) = self.notifier.notify(&event).await {
                warn!("failed to deliver {} alert for {}: {e:#}", event.severity, event.target);
            }
        } else {
            debug!("notification suppressed by min_alert_interval");
        }

        if self
            .dashboard_tx
            .send(DashboardUpdate::Alert(event))
            .await
            .is_err()
        {
            warn!("dashboard feed closed, alert event dropped");
        }
    }
}

/// Handle for querying the AlertActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    pub fn new(sender: mpsc::Sender<AlertCommand>) -> Self {
        Self { sender }
    }

    /// Get alert state for a target
    ///
    /// `None` for unknown targets or once the actor has stopped.
    pub async fn get_state(&self, target: impl Into<String>) -> Option<AlertState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertCommand::GetState {
                target: target.into(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }
}
