//! Repository notifications.
//!
//! Every repository and factory operation reports its outcome as a
//! [`RepositoryEvent`] on an [`EventBus`]. Failures are never thrown across the
//! repository boundary; subscribers learn about them here.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tessera_core::identity::EntityId;
use tessera_core::ErrorCode;

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel over `flume`.
///
/// Each [`subscribe`](EventBus::subscribe) call gets its own unbounded
/// receiver and sees every event published after it subscribed. Dropped
/// receivers are pruned on the next publish.
pub struct EventBus<T: Clone + Send + 'static> {
    subscribers: Mutex<Vec<flume::Sender<T>>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (sender, receiver) = flume::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: T) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| s.send(event.clone()).is_ok());
    }

    /// Number of subscribers still holding their receiver, as of the last
    /// publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RepositoryEvent
// ---------------------------------------------------------------------------

/// Outcome of a factory or repository operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryEvent {
    /// An entity was built from its type name.
    Created { id: EntityId },
    CreateFailed {
        id: EntityId,
        code: ErrorCode,
        message: String,
    },
    /// An entity was built from a document; `from_store` is `true` when the
    /// document was read back from the store.
    Constituted { id: EntityId, from_store: bool },
    ConstituteFailed {
        id: EntityId,
        code: ErrorCode,
        message: String,
    },
    /// An entity was persisted; `digest` identifies the stored document.
    Put { id: EntityId, digest: String },
    PutFailed {
        id: EntityId,
        code: ErrorCode,
        message: String,
    },
    Removed { id: EntityId },
    RemoveFailed {
        id: EntityId,
        code: ErrorCode,
        message: String,
    },
}

impl RepositoryEvent {
    pub fn id(&self) -> &EntityId {
        match self {
            RepositoryEvent::Created { id }
            | RepositoryEvent::CreateFailed { id, .. }
            | RepositoryEvent::Constituted { id, .. }
            | RepositoryEvent::ConstituteFailed { id, .. }
            | RepositoryEvent::Put { id, .. }
            | RepositoryEvent::PutFailed { id, .. }
            | RepositoryEvent::Removed { id }
            | RepositoryEvent::RemoveFailed { id, .. } => id,
        }
    }

    /// Error code of a failure event, `None` for successes.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RepositoryEvent::CreateFailed { code, .. }
            | RepositoryEvent::ConstituteFailed { code, .. }
            | RepositoryEvent::PutFailed { code, .. }
            | RepositoryEvent::RemoveFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.code().is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::<u32>::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(1);
        bus.publish(2);

        assert_eq!(a.try_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(b.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::<u32>::new();
        bus.publish(1);
        let rx = bus.subscribe();
        bus.publish(2);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::<u32>::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(7);

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), 7);
    }

    #[test]
    fn failure_events_expose_code() {
        let id = EntityId::new("earth", "Texture");
        let failed = RepositoryEvent::CreateFailed {
            id: id.clone(),
            code: ErrorCode::FactoryNotFound,
            message: "no factory".to_owned(),
        };
        assert!(failed.is_failure());
        assert_eq!(failed.code(), Some(ErrorCode::FactoryNotFound));
        assert_eq!(failed.id(), &id);

        let ok = RepositoryEvent::Removed { id };
        assert!(!ok.is_failure());
    }
}
