//! Tokstream Server - HTTP and WebSocket front end for the conversion engine

pub mod api;
pub mod config;
pub mod error;
pub mod state;

pub use api::create_router;
pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;
