//! HTTP API for the collection server

mod handlers;
mod types;

pub use handlers::create_router;

use crate::runtime::ProductionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ProductionManager>,
}

impl AppState {
    pub fn new(manager: Arc<ProductionManager>) -> Self {
        Self { manager }
    }
}
