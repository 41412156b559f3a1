//! Persistence backends for probe outcomes and aggregate windows
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Non-fatal**: Every failure is a `StorageError` the log processor can
//!   retry and drop without stopping the pipeline
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory**: Bounded history, no persistence
//! - **Null**: Discards all writes
//!
//! ## Usage
//!
//! ```no_run
//! use site_monitoring::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./monitor.db").await?;
//!     backend.health_check().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use crate::config::StorageConfig;

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, NullBackend, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

/// Build the backend selected in the configuration
pub async fn open_backend(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => Ok(Arc::new(NullBackend)),
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path, .. } => Ok(Arc::new(sqlite::SqliteBackend::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::Unavailable(
            "compiled without the storage-sqlite feature".to_string(),
        )),
    }
}
