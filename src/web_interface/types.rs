use serde::{Deserialize, Serialize};

use crate::configuration::types::ProxyConfig;
use crate::protocol_decoding::ProtocolMode;

/// Packets returned by `GET /api/history` when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// API error payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Acknowledgement of a command endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiMessage {
    pub status: OutcomeStatus,
    pub message: String,
}

impl ApiMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: message.into(),
        }
    }
}

/// Body of `POST /api/proxies`.
#[derive(Debug, Deserialize)]
pub struct CreateProxyRequest {
    pub local_port: u16,
    pub target_host: String,
    pub target_port: u16,
    pub name: String,
    #[serde(default)]
    pub protocol: ProtocolMode,
}

impl From<CreateProxyRequest> for ProxyConfig {
    fn from(req: CreateProxyRequest) -> Self {
        ProxyConfig::new(req.name, req.local_port, req.target_host, req.target_port, req.protocol)
    }
}

/// Body of `POST /api/proxies/test`.
#[derive(Debug, Deserialize)]
pub struct TestTargetRequest {
    pub target_host: String,
    pub target_port: u16,
}

/// Query string of `GET /api/history`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub proxy_name: Option<String>,
    pub since: Option<u64>,
}
