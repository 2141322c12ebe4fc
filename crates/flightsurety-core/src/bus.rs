use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::{EventKind, SuretyEvent};
use crate::journal::{EventJournal, JournalEntry};

/// A delivered notification is the journal entry that recorded it.
pub type Notification = JournalEntry;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscription {
    id: SubscriptionId,
    /// Filter by event kind (None = all kinds)
    kinds: Option<Vec<EventKind>>,
    sender: mpsc::Sender<Notification>,
}

impl Subscription {
    fn matches(&self, event: &SuretyEvent) -> bool {
        match &self.kinds {
            Some(kinds) => kinds.contains(&event.kind()),
            None => true,
        }
    }
}

/// Append-only notification channel.
///
/// Every published event is journaled first, then fanned out to matching
/// subscribers. Delivery never blocks the publisher: a full subscriber
/// channel drops the notification (the journal still has it) and a closed
/// one is pruned.
pub struct NotificationBus {
    journal: Mutex<EventJournal>,
    subscriptions: RwLock<Vec<Subscription>>,
    buffer: usize,
}

impl NotificationBus {
    pub fn new(buffer: usize) -> Self {
        Self {
            journal: Mutex::new(EventJournal::new()),
            subscriptions: RwLock::new(Vec::new()),
            buffer: buffer.max(1),
        }
    }

    /// Subscribe to notifications, optionally filtered by kind.
    pub async fn subscribe(
        &self,
        kinds: Option<Vec<EventKind>>,
    ) -> (SubscriptionId, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = SubscriptionId::new();

        self.subscriptions.write().await.push(Subscription {
            id: id.clone(),
            kinds,
            sender,
        });
        debug!(subscription_id = %id.0, "New subscription registered");

        (id, receiver)
    }

    pub async fn unsubscribe(&self, id: &SubscriptionId) {
        let mut subs = self.subscriptions.write().await;
        subs.retain(|s| s.id != *id);
        debug!(subscription_id = %id.0, "Subscription removed");
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Journal and route one event.
    pub async fn publish(&self, event: SuretyEvent) -> Notification {
        let entry = self.journal.lock().await.append(event);
        self.route(&entry).await;
        entry
    }

    /// Journal and route events in order.
    pub async fn publish_all(&self, events: Vec<SuretyEvent>) -> Vec<Notification> {
        let mut delivered = Vec::with_capacity(events.len());
        for event in events {
            delivered.push(self.publish(event).await);
        }
        delivered
    }

    async fn route(&self, entry: &Notification) -> usize {
        let subs = self.subscriptions.read().await;
        let mut delivered = 0;
        let mut closed_ids = Vec::new();

        for sub in subs.iter() {
            if !sub.matches(&entry.event) {
                continue;
            }
            match sub.sender.try_send(entry.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscription_id = %sub.id.0,
                        index = entry.index,
                        "Subscriber channel full, dropping notification"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed_ids.push(sub.id.clone());
                }
            }
        }

        drop(subs);

        if !closed_ids.is_empty() {
            let mut subs = self.subscriptions.write().await;
            subs.retain(|s| !closed_ids.contains(&s.id));
            debug!(removed = closed_ids.len(), "Cleaned up closed subscriptions");
        }

        delivered
    }

    /// Journal entries with `index >= from`.
    pub async fn journal_since(&self, from: u64) -> Vec<JournalEntry> {
        self.journal.lock().await.since(from).to_vec()
    }

    pub async fn journal_len(&self) -> usize {
        self.journal.lock().await.len()
    }

    pub async fn verify_journal(&self) -> bool {
        self.journal.lock().await.verify_chain()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn operating(operational: bool) -> SuretyEvent {
        SuretyEvent::OperatingStatusChanged { operational }
    }

    fn voted() -> SuretyEvent {
        SuretyEvent::AirlineVoted {
            candidate: Identity::new("a5"),
            voter: Identity::new("a1"),
            votes: 1,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let bus = NotificationBus::default();
        let (_id, mut rx) = bus.subscribe(None).await;

        let published = bus.publish(operating(false)).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.entry_hash, published.entry_hash);
        assert_eq!(received.index, 0);
    }

    #[tokio::test]
    async fn kind_filter() {
        let bus = NotificationBus::default();
        let (_id, mut rx) = bus.subscribe(Some(vec![EventKind::AirlineVoted])).await;

        bus.publish(operating(false)).await;
        assert!(rx.try_recv().is_err());

        bus.publish(voted()).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.kind(), EventKind::AirlineVoted);
        // Filtered events are still journaled.
        assert_eq!(bus.journal_len().await, 2);
    }

    #[tokio::test]
    async fn full_channel_drops_without_blocking() {
        let bus = NotificationBus::new(1);
        let (_id, mut rx) = bus.subscribe(None).await;

        bus.publish(operating(false)).await;
        bus.publish(operating(true)).await;

        assert_eq!(rx.recv().await.unwrap().index, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.journal_len().await, 2);
        assert!(bus.verify_journal().await);
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let bus = NotificationBus::default();
        let (_id, rx) = bus.subscribe(None).await;
        assert_eq!(bus.subscription_count().await, 1);
        drop(rx);

        bus.publish(operating(true)).await;
        assert_eq!(bus.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_subscription() {
        let bus = NotificationBus::default();
        let (id, _rx) = bus.subscribe(None).await;
        bus.unsubscribe(&id).await;
        assert_eq!(bus.subscription_count().await, 0);
    }
}
