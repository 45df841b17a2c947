//! Packet recording shared by every relay session.
//!
//! `PacketRecorder` is the single place a captured chunk goes through:
//! semantic decoding via the [`PacketCodec`], insertion into the
//! [`HistoryLog`] (which assigns the sequence number) and fan-out on the
//! [`EventBus`]. Sessions hold a cheap clone of it.
//!
//! Publishing happens under the log lock, so live observers see packet
//! sequences in strictly increasing order even with many sessions recording
//! at once.

use std::sync::Arc;

use chrono::Utc;

use super::history_log::HistoryLog;
use super::types::{Direction, PacketDraft, PacketRecord};
use crate::event_bus::{Event, EventBus};
use crate::protocol_decoding::{PacketCodec, ProtocolMode};

/// Where a chunk was captured.
#[derive(Debug, Clone)]
pub struct CaptureOrigin {
    pub proxy_name: String,
    pub local_port: u16,
    pub connection_id: String,
    pub protocol: ProtocolMode,
}

#[derive(Clone)]
pub struct PacketRecorder {
    history: Arc<HistoryLog>,
    bus: Arc<EventBus>,
    codec: Arc<PacketCodec>,
}

impl PacketRecorder {
    pub fn new(history: Arc<HistoryLog>, bus: Arc<EventBus>, codec: Arc<PacketCodec>) -> Self {
        Self {
            history,
            bus,
            codec,
        }
    }

    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Decodes, stores and publishes one chunk, returning the stored record.
    pub fn record(&self, origin: &CaptureOrigin, direction: Direction, bytes: &[u8]) -> Arc<PacketRecord> {
        let semantic = self.codec.decode(direction, bytes, origin.protocol);
        self.history.append_then(
            PacketDraft {
                timestamp: Utc::now(),
                proxy_name: origin.proxy_name.clone(),
                local_port: origin.local_port,
                connection_id: origin.connection_id.clone(),
                direction,
                raw_bytes: bytes.to_vec(),
                semantic,
            },
            |record| self.bus.publish(Event::Packet(Arc::clone(record))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> PacketRecorder {
        PacketRecorder::new(
            Arc::new(HistoryLog::new(16)),
            Arc::new(EventBus::new(16)),
            Arc::new(PacketCodec::with_builtin_decoders().unwrap()),
        )
    }

    fn origin(protocol: ProtocolMode) -> CaptureOrigin {
        CaptureOrigin {
            proxy_name: "Radio".to_string(),
            local_port: 9000,
            connection_id: "c0ffee00".to_string(),
            protocol,
        }
    }

    #[test]
    fn record_is_logged_decoded_and_published() {
        let recorder = recorder();
        let mut sub = recorder.bus().subscribe();

        let record = recorder.record(&origin(ProtocolMode::Hamlib), Direction::Tx, b"F 14200000");
        assert_eq!(record.sequence, 1);
        assert_eq!(record.semantic.as_deref(), Some("SET FREQ: 14200000"));
        assert_eq!(record.text_repr, "F 14200000");

        let logged = recorder.history().snapshot(1);
        assert_eq!(logged[0].sequence, record.sequence);

        let event = sub.try_recv().expect("packet event");
        assert_eq!(event.as_packet().unwrap().sequence, 1);
    }

    #[test]
    fn raw_relays_capture_without_meaning() {
        let recorder = recorder();
        let record = recorder.record(&origin(ProtocolMode::Raw), Direction::Rx, b"F 14200000");
        assert_eq!(record.semantic, None);
        assert_eq!(record.direction, Direction::Rx);
    }

    #[test]
    fn concurrent_recorders_publish_in_sequence_order() {
        let recorder = PacketRecorder::new(
            Arc::new(HistoryLog::new(1024)),
            Arc::new(EventBus::new(1024)),
            Arc::new(PacketCodec::with_builtin_decoders().unwrap()),
        );
        let mut sub = recorder.bus().subscribe();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    let origin = origin(ProtocolMode::Raw);
                    for _ in 0..200 {
                        recorder.record(&origin, Direction::Tx, b"chunk");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let seen: Vec<u64> = std::iter::from_fn(|| sub.try_recv())
            .map(|event| event.as_packet().unwrap().sequence)
            .collect();
        assert_eq!(seen, (1..=800).collect::<Vec<u64>>());
        assert_eq!(sub.dropped(), 0);
    }
}
