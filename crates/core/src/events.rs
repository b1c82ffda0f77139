//! Event fan-out to UI subscribers.
//!
//! A thin wrapper over a broadcast channel. Delivery order relative to a
//! subscriber's own index reads is not guaranteed; an observed event only
//! means the mutation has already been applied to the index.

use tokio::sync::broadcast;

use crate::favorites::FavoriteEntry;
use crate::index::HistoryRecord;

/// Notifications emitted for every observable mutation.
#[derive(Debug, Clone)]
pub enum HistoryEvent {
    /// A known URL received a new favicon.
    IconUpdated { url: String, icon: Vec<u8> },
    /// An existing record changed.
    ItemUpdated { record: HistoryRecord },
    /// A record was created.
    NewItem { record: HistoryRecord },
    /// The favorites view is ready after population, with decrypted entries
    /// so the UI can render without a second store read.
    PopulatedFavorites { favorites: Vec<FavoriteEntry> },
    /// Population finished. `complete` is false after cancellation or a
    /// store failure left the index partially populated.
    Populated { complete: bool },
    /// Records were deleted.
    RemoveItems { urls: Vec<String> },
}

/// Multi-subscriber event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HistoryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Having no subscribers is not an error.
    pub fn emit(&self, event: HistoryEvent) {
        let _ = self.tx.send(event);
    }
}
