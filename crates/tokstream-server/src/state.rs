//! Application state management

use std::sync::Arc;
use tokstream_core::Token2Audio;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Token2Audio>,
}

impl AppState {
    pub fn new(engine: Token2Audio) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
