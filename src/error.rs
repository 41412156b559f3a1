//! Fatal pipeline errors
//!
//! Only errors of this type cross component boundaries. Probe failures become
//! failed outcomes and persistence failures are retried and logged, so neither
//! appears here.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An input channel closed while the pipeline was still supposed to run
    #[error("{component}: input channel closed before shutdown was requested")]
    ChannelClosed { component: &'static str },

    /// Invalid or inconsistent configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A component task panicked or was aborted
    #[error("{component} terminated abnormally: {reason}")]
    TaskFailed {
        component: &'static str,
        reason: String,
    },

    /// A supervised service (e.g. the HTTP API) failed
    #[error("{component} failed: {source}")]
    Service {
        component: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PipelineError {
    pub fn service(component: &'static str, source: impl Into<anyhow::Error>) -> Self {
        let source: anyhow::Error = source.into();
        PipelineError::Service {
            component,
            source: source.into(),
        }
    }
}
