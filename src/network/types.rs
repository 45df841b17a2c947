use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::configuration::types::ProxyConfig;
use crate::event_bus::TargetStatus;

/// Running totals of one relay, shared between its listener and sessions.
#[derive(Debug, Default)]
pub struct RelayCounters {
    pub connections_accepted: AtomicU64,
    pub dial_failures: AtomicU64,
    pub bytes_tx: AtomicU64,
    pub bytes_rx: AtomicU64,
}

impl RelayCounters {
    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            bytes_tx: self.bytes_tx.load(Ordering::Relaxed),
            bytes_rx: self.bytes_rx.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub connections_accepted: u64,
    pub dial_failures: u64,
    pub bytes_tx: u64,
    pub bytes_rx: u64,
}

/// Last health probe result of a relay target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetHealth {
    pub status: TargetStatus,
    pub error_msg: Option<String>,
}

impl Default for TargetHealth {
    fn default() -> Self {
        Self {
            status: TargetStatus::Unknown,
            error_msg: None,
        }
    }
}

/// Everything an operator wants to see about one active relay.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    #[serde(flatten)]
    pub config: ProxyConfig,
    pub status: TargetStatus,
    pub error_msg: Option<String>,
    pub active_sessions: usize,
    pub stats: RelayStats,
}
