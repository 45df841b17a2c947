//! Common data types used across the data_capture subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Direction of TCP flow for captured bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Bytes flowing from the client to the relay target.
    #[serde(rename = "TX")]
    Tx,
    /// Bytes flowing from the relay target back to the client.
    #[serde(rename = "RX")]
    Rx,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Tx => "TX",
            Direction::Rx => "RX",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured chunk before the history log has given it a sequence number.
#[derive(Debug, Clone)]
pub struct PacketDraft {
    pub timestamp: DateTime<Utc>,
    pub proxy_name: String,
    pub local_port: u16,
    pub connection_id: String,
    pub direction: Direction,
    pub raw_bytes: Vec<u8>,
    pub semantic: Option<String>,
}

/// One captured transfer event, immutable once appended to the history log.
///
/// Serialized form is the JSON object consumed by the HTTP API and the live
/// feed: `timestamp` is fractional seconds since the epoch, `data_hex` is
/// lowercase without separators and `data_str` is a lossy UTF-8 rendering.
#[derive(Debug, Clone, Serialize)]
pub struct PacketRecord {
    pub sequence: u64,
    #[serde(serialize_with = "epoch_seconds")]
    pub timestamp: DateTime<Utc>,
    pub proxy_name: String,
    pub local_port: u16,
    pub connection_id: String,
    pub direction: Direction,
    #[serde(skip)]
    pub raw_bytes: Vec<u8>,
    #[serde(rename = "data_hex")]
    pub hex_repr: String,
    #[serde(rename = "data_str")]
    pub text_repr: String,
    pub semantic: Option<String>,
}

impl PacketRecord {
    pub(crate) fn from_draft(sequence: u64, draft: PacketDraft) -> Self {
        let hex_repr = hex::encode(&draft.raw_bytes);
        let text_repr = String::from_utf8_lossy(&draft.raw_bytes).into_owned();
        Self {
            sequence,
            timestamp: draft.timestamp,
            proxy_name: draft.proxy_name,
            local_port: draft.local_port,
            connection_id: draft.connection_id,
            direction: draft.direction,
            raw_bytes: draft.raw_bytes,
            hex_repr,
            text_repr,
            semantic: draft.semantic,
        }
    }
}

fn epoch_seconds<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(ts.timestamp_micros() as f64 / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft(bytes: &[u8]) -> PacketDraft {
        PacketDraft {
            timestamp: Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap(),
            proxy_name: "Radio".to_string(),
            local_port: 9000,
            connection_id: "abcd1234".to_string(),
            direction: Direction::Tx,
            raw_bytes: bytes.to_vec(),
            semantic: Some("SET FREQ: 14200000".to_string()),
        }
    }

    #[test]
    fn record_serializes_to_wire_format() {
        let record = PacketRecord::from_draft(7, draft(b"F 14200000"));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["sequence"], 7);
        assert_eq!(json["timestamp"], 1_700_000_000.25);
        assert_eq!(json["proxy_name"], "Radio");
        assert_eq!(json["direction"], "TX");
        assert_eq!(json["data_str"], "F 14200000");
        assert_eq!(json["data_hex"], "462031343230303030");
        assert_eq!(json["semantic"], "SET FREQ: 14200000");
        assert!(json.get("raw_bytes").is_none());
    }

    #[test]
    fn missing_semantic_serializes_as_null() {
        let mut d = draft(&[0xff, 0x00, 0x41]);
        d.semantic = None;
        d.direction = Direction::Rx;
        let record = PacketRecord::from_draft(1, d);
        let json = serde_json::to_value(&record).unwrap();

        assert!(json["semantic"].is_null());
        assert_eq!(json["direction"], "RX");
        assert_eq!(json["data_hex"], "ff0041");
        assert_eq!(record.text_repr, "\u{fffd}\u{0}A");
    }
}
