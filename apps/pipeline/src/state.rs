use std::sync::Arc;

use crate::reports::ReportGenerator;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Shared with the report sweep so ad hoc and scheduled generation use one path.
    pub reports: Arc<ReportGenerator>,
}
