//! API shared state containing actor handles

use std::sync::Arc;

use crate::actors::dashboard::DashboardHandle;
use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Handle to the dashboard actor for the live view
    pub dashboard: DashboardHandle,

    /// Storage backend for window history
    pub storage: Arc<dyn StorageBackend>,
}

impl ApiState {
    pub fn new(dashboard: DashboardHandle, storage: Arc<dyn StorageBackend>) -> Self {
        Self { dashboard, storage }
    }
}
