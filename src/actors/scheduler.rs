//! SchedulerActor - Probes one target at a fixed rate
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → Prober → ProbeOutcome → Result bus → [fan-out → LogProcessor, AlertActor]
//!     ↑
//!     └─── Cancellation token (stop, discard in-flight probe)
//! ```
//!
//! The timer is fixed-rate (`tokio::time::interval`), so the schedule does not
//! drift with probe duration. Ticks missed while a slow probe was running are
//! skipped rather than queued.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::config::Target;
use crate::error::{PipelineError, PipelineResult};
use crate::probe::Prober;

use super::messages::ProbeOutcome;

/// Actor that probes a single target
///
/// Each target gets its own scheduler. The actor loops until the
/// cancellation token fires and forwards every outcome to the result bus.
pub struct SchedulerActor {
    target: Target,
    prober: Arc<dyn Prober>,

    /// Sender side of the result bus (fan-in)
    result_tx: mpsc::Sender<ProbeOutcome>,

    cancel: CancellationToken,
}

impl SchedulerActor {
    pub fn new(
        target: Target,
        prober: Arc<dyn Prober>,
        result_tx: mpsc::Sender<ProbeOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            target,
            prober,
            result_tx,
            cancel,
        }
    }

    /// Run the actor's main loop
    ///
    /// Returns `Ok(())` when cancelled. Fails only when the result bus was
    /// closed while the pipeline is still running.
    #[instrument(skip(self), fields(target = %self.target.url))]
    pub async fn run(self) -> PipelineResult<()> {
        debug!(
            "starting scheduler with interval {:?}",
            self.target.check_interval
        );

        let mut ticker = interval(self.target.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = ticker.tick() => {
                    let outcome = tokio::select! {
                        biased;

                        _ = self.cancel.cancelled() => {
                            trace!("discarding in-flight probe");
                            break;
                        }
                        outcome = self.prober.probe(&self.target) => outcome,
                    };

                    trace!("probe finished (success: {})", outcome.success);

                    tokio::select! {
                        biased;

                        _ = self.cancel.cancelled() => break,

                        sent = self.result_tx.send(outcome) => {
                            if sent.is_err() {
                                if self.cancel.is_cancelled() {
                                    break;
                                }
                                return Err(PipelineError::ChannelClosed { component: "scheduler" });
                            }
                        }
                    }
                }
            }
        }

        debug!("scheduler stopped");
        Ok(())
    }
}
