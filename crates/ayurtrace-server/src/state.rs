use std::sync::Arc;

use ayurtrace_core::ProvenanceService;
use ayurtrace_db::RedbLedger;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProvenanceService<RedbLedger>>,
}

impl AppState {
    pub fn new(service: ProvenanceService<RedbLedger>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
