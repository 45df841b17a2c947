//! Bounded, shared log of captured packets.
//!
//! Every relay session appends to the same [`HistoryLog`]. The log assigns a
//! global sequence number under its lock, so sequences strictly increase across
//! all sessions and are never reused, even after the oldest records have been
//! evicted. Consumers can therefore resume with [`HistoryLog::since`] using the
//! last sequence they saw.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;

use super::types::{PacketDraft, PacketRecord};

struct Ring {
    records: VecDeque<Arc<PacketRecord>>,
    next_sequence: u64,
}

pub struct HistoryLog {
    capacity: usize,
    inner: Mutex<Ring>,
}

impl HistoryLog {
    /// Creates an empty log retaining at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Ring {
                records: VecDeque::with_capacity(capacity),
                next_sequence: 1,
            }),
        }
    }

    fn ring(&self) -> MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Assigns the next sequence number to `draft` and stores it, evicting the
    /// oldest record first when the log is full.
    pub fn append(&self, draft: PacketDraft) -> Arc<PacketRecord> {
        self.append_then(draft, |_| {})
    }

    /// Like [`HistoryLog::append`], running `then` on the stored record before
    /// the lock is released. Whatever `then` emits is ordered by sequence
    /// across concurrent appenders. `then` must not block or touch the log.
    pub fn append_then(
        &self,
        draft: PacketDraft,
        then: impl FnOnce(&Arc<PacketRecord>),
    ) -> Arc<PacketRecord> {
        let mut ring = self.ring();
        let sequence = ring.next_sequence;
        ring.next_sequence += 1;

        if ring.records.len() >= self.capacity {
            if let Some(evicted) = ring.records.pop_front() {
                trace!("history full, evicted sequence {}", evicted.sequence);
            }
        }

        let record = Arc::new(PacketRecord::from_draft(sequence, draft));
        ring.records.push_back(Arc::clone(&record));
        then(&record);
        record
    }

    /// The most recent `limit` records, newest first.
    pub fn snapshot(&self, limit: usize) -> Vec<Arc<PacketRecord>> {
        self.ring().records.iter().rev().take(limit).cloned().collect()
    }

    /// The most recent `limit` records captured by relays named `proxy_name`,
    /// newest first.
    pub fn snapshot_for(&self, proxy_name: &str, limit: usize) -> Vec<Arc<PacketRecord>> {
        self.ring()
            .records
            .iter()
            .rev()
            .filter(|r| r.proxy_name == proxy_name)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Records with a sequence strictly greater than `sequence`, oldest first.
    pub fn since(&self, sequence: u64) -> Vec<Arc<PacketRecord>> {
        let ring = self.ring();
        // sequences are contiguous inside the ring, so the start index is direct
        let first = match ring.records.front() {
            Some(r) => r.sequence,
            None => return Vec::new(),
        };
        let skip = sequence.saturating_add(1).saturating_sub(first) as usize;
        ring.records.iter().skip(skip).cloned().collect()
    }

    /// Sequence of the newest record ever appended, 0 when nothing was captured.
    pub fn last_sequence(&self) -> u64 {
        self.ring().next_sequence - 1
    }

    pub fn len(&self) -> usize {
        self.ring().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
