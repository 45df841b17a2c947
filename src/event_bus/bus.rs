//! Fan-out of captured events to live observers.
//!
//! Built on a `tokio::sync::broadcast` channel. Publishing never waits: each
//! observer reads from its own cursor into the shared ring, and one that
//! falls more than `mailbox_capacity` events behind loses its oldest unread
//! events (drop-oldest). The loss is counted per observer and only ever
//! affects that observer. The log is the durable source for catching up.
//!
//! The channel rounds `mailbox_capacity` up to the next power of two.

use log::{debug, warn};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use uuid::Uuid;

use super::types::Event;

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

    pub fn new(mailbox_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(mailbox_capacity.max(1));
        Self { sender }
    }

    /// Registers a new observer. It receives every event published from now
    /// until it is unsubscribed or dropped.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        debug!("observer {} subscribed", id);
        Subscription {
            id,
            receiver: Some(self.sender.subscribe()),
            dropped: 0,
        }
    }

    pub fn unsubscribe(&self, subscription: &mut Subscription) {
        subscription.close();
    }

    /// Delivers `event` to every current observer without blocking.
    pub fn publish(&self, event: Event) {
        // no observers is not an error
        let _ = self.sender.send(event);
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Handle of one observer. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    receiver: Option<broadcast::Receiver<Event>>,
    dropped: u64,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn lagged(&mut self, missed: u64) {
        self.dropped += missed;
        warn!(
            "observer {} fell behind, {} events dropped ({} so far)",
            self.id, missed, self.dropped
        );
    }

    /// Waits for the next event; `None` once the subscription is closed or
    /// the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => self.lagged(missed),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Takes the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => self.lagged(missed),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Number of events discarded because this observer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn close(&mut self) {
        if self.receiver.take().is_some() {
            debug!("observer {} unsubscribed", self.id);
        }
    }
}
