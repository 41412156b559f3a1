//! Actor-based monitoring pipeline
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels. All actors are spawned and joined by the
//! [`Supervisor`](crate::supervisor::Supervisor).
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌─────────────┐  ┌─────────────┐
//!   │ Scheduler-1 │  │ Scheduler-N │   one per target, fixed-rate probes
//!   └──────┬──────┘  └──────┬──────┘
//!          └────────┬───────┘
//!                   ▼
//!            ┌────────────┐
//!            │ Result bus │  bounded mpsc (fan-in)
//!            └─────┬──────┘
//!                  ▼
//!            ┌────────────┐
//!            │  Fan-out   │  clones every outcome
//!            └──┬──────┬──┘
//!     log queue │      │ alert queue
//!               ▼      ▼
//!   ┌──────────────┐  ┌────────────┐
//!   │ LogProcessor │  │ AlertActor │──→ Notifier
//!   └──┬────────┬──┘  └─────┬──────┘
//!      │        │ windows   │ events
//!      ▼        └─────┬─────┘
//!   ┌────────┐        ▼
//!   │ Writer │  ┌───────────┐
//!   └───┬────┘  │ Dashboard │←── snapshot queries
//!       ▼       └───────────┘
//!    Storage
//! ```
//!
//! ## Actor Types
//!
//! - **SchedulerActor**: Probes one target at its check interval
//! - **FanOutActor**: Duplicates outcomes into the log and alert queues
//! - **LogProcessorActor**: Aggregates outcomes into time windows
//! - **PersistenceWriter**: Stores outcomes and windows with bounded retry
//! - **AlertActor**: Runs the per-target alert state machine
//! - **DashboardActor**: Keeps the latest view of every target
//!
//! ## Shutdown
//!
//! Schedulers stop on cancellation. Every downstream actor keeps draining its
//! input until the producer side closes it, so shutdown ripples through the
//! pipeline in order and nothing accepted by the bus is lost.
//!
//! ## Communication Patterns
//!
//! 1. **Events**: Bounded mpsc queues between stages
//! 2. **Commands**: mpsc command channels behind cloneable handles
//! 3. **Request/Response**: oneshot channels for queries

pub mod alert;
pub mod bus;
pub mod dashboard;
pub mod log_processor;
pub mod messages;
pub mod scheduler;
pub mod writer;
