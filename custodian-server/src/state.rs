use std::sync::Arc;
use std::time::Instant;

use custodian_core::{Catalog, engine::Engine};

use crate::config::Config;

/// Shared handle every handler receives via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub catalog: Catalog,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
