//! Result bus - fan-in from the schedulers, fan-out to the consumers
//!
//! ```text
//! Scheduler ─┐                      ┌─→ log queue   → LogProcessorActor
//! Scheduler ─┼─→ result bus → FanOut┤
//! Scheduler ─┘                      └─→ alert queue → AlertActor
//! ```
//!
//! Every outcome is cloned into both queues, so each consumer sees every
//! outcome exactly once and in per-target order.
//!
//! The fan-out stage does not stop on cancellation. It ends once every
//! scheduler has dropped its sender, which closes both queues in turn. This
//! keeps the two consumers in step: an outcome is never delivered to one
//! queue and dropped for the other.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::error::{PipelineError, PipelineResult};

use super::messages::ProbeOutcome;

/// Create the bounded result bus the schedulers send into
pub fn result_bus(capacity: usize) -> (mpsc::Sender<ProbeOutcome>, mpsc::Receiver<ProbeOutcome>) {
    mpsc::channel(capacity)
}

/// Duplicates every outcome into the log and alert queues
pub struct FanOutActor {
    input: mpsc::Receiver<ProbeOutcome>,
    log_tx: mpsc::Sender<ProbeOutcome>,
    alert_tx: mpsc::Sender<ProbeOutcome>,
    cancel: CancellationToken,
    forwarded: u64,
}

impl FanOutActor {
    pub fn new(
        input: mpsc::Receiver<ProbeOutcome>,
        log_tx: mpsc::Sender<ProbeOutcome>,
        alert_tx: mpsc::Sender<ProbeOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            input,
            log_tx,
            alert_tx,
            cancel,
            forwarded: 0,
        }
    }

    #[instrument(skip(self), name = "fan_out")]
    pub async fn run(mut self) -> PipelineResult<()> {
        debug!("starting fan-out stage");

        while let Some(outcome) = self.input.recv().await {
            trace!("forwarding outcome for {}", outcome.target);

            if self.log_tx.send(outcome.clone()).await.is_err() {
                return self.consumer_gone("log processor");
            }
            if self.alert_tx.send(outcome).await.is_err() {
                return self.consumer_gone("alert evaluator");
            }

            self.forwarded += 1;
        }

        debug!("result bus closed after {} outcomes", self.forwarded);
        Ok(())
    }

    /// A consumer dropped its queue. During shutdown this only means it
    /// already failed and the supervisor has its error.
    fn consumer_gone(&self, consumer: &str) -> PipelineResult<()> {
        if self.cancel.is_cancelled() {
            debug!("{consumer} queue closed during shutdown");
            Ok(())
        } else {
            Err(PipelineError::ChannelClosed { component: "fan-out" })
        }
    }
}
