//! Pipeline wiring and supervision
//!
//! [`Pipeline::start`] creates every channel, spawns every actor into one
//! `JoinSet` and hands back a [`Supervisor`]. The supervisor owns no data
//! channel: each queue closes when the last actor holding its sender stops.
//!
//! The first component that fails (error or panic) cancels the shared token.
//! [`Supervisor::wait`] still joins every remaining task before it returns
//! that first error.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actors::alert::{AlertActor, AlertHandle};
use crate::actors::bus::{FanOutActor, result_bus};
use crate::actors::dashboard::{DashboardActor, DashboardHandle, DashboardState};
use crate::actors::log_processor::{LogProcessorActor, WindowAggregator};
use crate::actors::scheduler::SchedulerActor;
use crate::actors::writer::{PersistenceWriter, WRITE_QUEUE_CAPACITY};
use crate::alerts::Notifier;
use crate::config::{PipelineSettings, Target};
use crate::error::{PipelineError, PipelineResult};
use crate::probe::Prober;
use crate::storage::StorageBackend;

/// Capacity of the window/alert feed into the dashboard
const DASHBOARD_FEED_CAPACITY: usize = 256;

/// Capacity of the actor command channels
const COMMAND_CAPACITY: usize = 32;

type ComponentResult = (&'static str, PipelineResult<()>);

/// Everything needed to run the monitoring pipeline
pub struct Pipeline {
    targets: Vec<Target>,
    settings: PipelineSettings,
    prober: Arc<dyn Prober>,
    storage: Arc<dyn StorageBackend>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(
        targets: Vec<Target>,
        settings: PipelineSettings,
        prober: Arc<dyn Prober>,
        storage: Arc<dyn StorageBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            targets,
            settings,
            prober,
            storage,
            notifier,
        }
    }

    /// Spawn all components
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self, cancel: CancellationToken) -> PipelineResult<Supervisor> {
        self.validate()?;

        let Pipeline {
            targets,
            settings,
            prober,
            storage,
            notifier,
        } = self;

        let capacity = settings.bus_capacity.max(1);
        let (bus_tx, bus_rx) = result_bus(capacity);
        let (log_tx, log_rx) = mpsc::channel(capacity);
        let (alert_tx, alert_rx) = mpsc::channel(capacity);
        let (persist_tx, persist_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (dashboard_tx, dashboard_rx) = mpsc::channel(DASHBOARD_FEED_CAPACITY);
        let (alert_cmd_tx, alert_cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (dashboard_cmd_tx, dashboard_cmd_rx) = mpsc::channel(COMMAND_CAPACITY);

        let mut supervisor = Supervisor {
            tasks: JoinSet::new(),
            names: HashMap::new(),
            cancel: cancel.clone(),
            dashboard: DashboardHandle::new(dashboard_cmd_tx),
            alerts: AlertHandle::new(alert_cmd_tx),
            storage: storage.clone(),
        };

        let dashboard_state =
            DashboardState::new(&targets, settings.window, settings.stale_after_intervals)
                .with_history(settings.history);
        supervisor.spawn_component(
            "dashboard",
            DashboardActor::new(dashboard_state, dashboard_rx, dashboard_cmd_rx, cancel.clone()).run(),
        );

        supervisor.spawn_component(
            "persistence writer",
            PersistenceWriter::new(
                persist_rx,
                storage,
                settings.retry,
                settings.retention,
                cancel.clone(),
            )
            .run(),
        );

        let aggregator = WindowAggregator::new(Utc::now(), settings.window);
        supervisor.spawn_component(
            "log processor",
            LogProcessorActor::new(
                aggregator,
                log_rx,
                persist_tx,
                dashboard_tx.clone(),
                cancel.clone(),
            )
            .run(),
        );

        let mut alert_actor =
            AlertActor::new(alert_rx, alert_cmd_rx, notifier, dashboard_tx, cancel.clone());
        for target in &targets {
            alert_actor.register_target(target);
        }
        supervisor.spawn_component("alert evaluator", alert_actor.run());

        supervisor.spawn_component(
            "fan-out",
            FanOutActor::new(bus_rx, log_tx, alert_tx, cancel.clone()).run(),
        );

        let target_count = targets.len();
        for target in targets {
            supervisor.spawn_component(
                "scheduler",
                SchedulerActor::new(target, prober.clone(), bus_tx.clone(), cancel.clone()).run(),
            );
        }
        // the bus closes once every scheduler has stopped
        drop(bus_tx);

        info!("pipeline started with {target_count} targets");
        Ok(supervisor)
    }

    /// Reject settings the timers cannot run with
    fn validate(&self) -> PipelineResult<()> {
        if self.targets.is_empty() {
            return Err(PipelineError::Config("no targets to monitor".to_string()));
        }

        if self.settings.window.is_zero() {
            return Err(PipelineError::Config("aggregation window must be positive".to_string()));
        }

        if let Some(target) = self.targets.iter().find(|t| t.check_interval.is_zero()) {
            return Err(PipelineError::Config(format!(
                "check interval of '{}' must be positive",
                target.url
            )));
        }

        Ok(())
    }
}

/// Running pipeline
pub struct Supervisor {
    tasks: JoinSet<ComponentResult>,

    /// Component names by task, for tasks that end without a result
    names: HashMap<Id, &'static str>,
    cancel: CancellationToken,
    dashboard: DashboardHandle,
    alerts: AlertHandle,
    storage: Arc<dyn StorageBackend>,
}

impl Supervisor {
    pub fn dashboard(&self) -> DashboardHandle {
        self.dashboard.clone()
    }

    pub fn alerts(&self) -> AlertHandle {
        self.alerts.clone()
    }

    pub fn storage(&self) -> Arc<dyn StorageBackend> {
        self.storage.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run an additional component under supervision
    ///
    /// The component must return once the cancellation token fires.
    pub fn spawn_component<F>(&mut self, name: &'static str, component: F)
    where
        F: Future<Output = PipelineResult<()>> + Send + 'static,
    {
        self.spawn_named(name, component);
    }

    fn spawn_named<F>(&mut self, name: &'static str, component: F) -> AbortHandle
    where
        F: Future<Output = PipelineResult<()>> + Send + 'static,
    {
        debug!("spawning {name}");
        let handle = self.tasks.spawn(supervised(name, component));
        self.names.insert(handle.id(), name);
        handle
    }

    fn joined(&mut self, joined: Result<(Id, ComponentResult), JoinError>) -> ComponentResult {
        match joined {
            Ok((id, result)) => {
                self.names.remove(&id);
                result
            }
            Err(e) => {
                let name = self.names.remove(&e.id()).unwrap_or("unknown component");
                (
                    name,
                    Err(PipelineError::TaskFailed {
                        component: name,
                        reason: e.to_string(),
                    }),
                )
            }
        }
    }

    /// Wait until every component has stopped
    ///
    /// Returns the first fatal error, if any. Storage is closed last.
    pub async fn wait(mut self) -> PipelineResult<()> {
        let mut first_error: Option<PipelineError> = None;

        while let Some(joined) = self.tasks.join_next_with_id().await {
            let (name, result) = self.joined(joined);

            match result {
                Ok(()) => debug!("{name} stopped"),
                Err(e) if first_error.is_none() => {
                    error!("{name} failed, shutting down pipeline: {e}");
                    self.cancel.cancel();
                    first_error = Some(e);
                }
                Err(e) => warn!("{name} failed during shutdown: {e}"),
            }
        }

        if let Err(e) = self.storage.close().await {
            warn!("error closing storage backend: {e}");
        }

        info!("pipeline stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Cancel all components and wait for them
    pub async fn shutdown(self) -> PipelineResult<()> {
        self.cancel.cancel();
        self.wait().await
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("components", &self.tasks.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn supervised<F>(name: &'static str, component: F) -> ComponentResult
where
    F: Future<Output = PipelineResult<()>>,
{
    let result = match AssertUnwindSafe(component).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(PipelineError::TaskFailed {
            component: name,
            reason: panic_message(panic.as_ref()),
        }),
    };

    (name, result)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}
