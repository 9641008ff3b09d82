use crate::service::SummaryService;

/// Shared application state passed to every route handler.
#[derive(Debug)]
pub struct AppState {
    pub service: SummaryService,
}

impl AppState {
    pub fn new(service: SummaryService) -> Self {
        Self { service }
    }
}
