//! HTTP API, WebSocket live feed and dashboard, served with warp.

pub mod routes;
pub mod types;
pub mod web_server;

pub use types::{ApiError, ApiMessage};
pub use web_server::WebServer;
