use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data_capture::types::PacketRecord;

/// Reachability of a relay's target as last observed by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub local_port: u16,
    pub status: TargetStatus,
    pub error_msg: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Opened,
    DialFailed,
    Closed,
}

/// Lifecycle notice for one relay session.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEvent {
    pub local_port: u16,
    pub proxy_name: String,
    pub connection_id: String,
    pub client_addr: String,
    pub phase: ConnectionPhase,
    pub error_msg: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Everything delivered to observers. Serialized with a `type` tag so a feed
/// consumer can tell packets from notices.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Packet(Arc<PacketRecord>),
    Status(StatusEvent),
    Connection(ConnectionEvent),
}

impl Event {
    pub fn as_packet(&self) -> Option<&PacketRecord> {
        match self {
            Event::Packet(record) => Some(record),
            _ => None,
        }
    }
}
