use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::AbortHandle;

/// Lifecycle of a relay session.
///
/// `Connecting -> Relaying -> Closing -> Closed`, or straight from
/// `Connecting` to `Closed` when the target cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Connecting,
    Relaying,
    Closing,
    Closed,
}

/// Public description of a live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub connection_id: String,
    pub local_port: u16,
    pub proxy_name: String,
    pub client_addr: SocketAddr,
    pub start_time: DateTime<Utc>,
}

/// A tracked session and the handle used to cancel its task.
pub struct ActiveSession {
    pub info: SessionInfo,
    pub abort: Option<AbortHandle>,
}
