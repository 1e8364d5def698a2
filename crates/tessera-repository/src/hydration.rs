//! Ghost-to-ready hydration.
//!
//! Entities whose payload is expensive (image data, geometry buffers) are
//! first constituted as *ghosts* and hydrated later. A [`HydrationQueue`] runs
//! one job at a time: [`pump`](HydrationQueue::pump) moves the next ghost to
//! `Loading` and hands it to the [`Hydrator`] together with a one-shot
//! [`Completion`]. Resolving the completion marks the entity `Ready` or
//! `Failed` and immediately starts the next job.
//!
//! The hydrator may resolve synchronously, inside `hydrate`, or later from any
//! thread. A completion dropped without being resolved fails its job.
//!
//! ```text
//!  enqueue            pump                    Completion::succeed
//!  Ghost -> InQueue -> Loading -> Hydrator -> Ready
//!                                          \-> Failed  (Completion::fail / drop)
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tessera_core::document::GenericDocument;
use tessera_core::entity::Entity;
use tessera_core::identity::EntityId;
use tessera_core::lazy::LazyStatus;

use crate::events::EventBus;
use crate::RepositoryError;

/// Reason recorded when a completion is dropped unresolved.
pub const DROPPED_REASON: &str = "completion dropped";

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An entity with a deferred payload.
pub trait Hydratable: Entity {
    fn status(&self) -> &LazyStatus;
}

/// Loads the payload of one entity kind.
pub trait Hydrator<E: Hydratable + ?Sized>: Send + Sync {
    /// Start loading `completion.entity()`. Must eventually resolve
    /// `completion`, or drop it.
    fn hydrate(&self, completion: Completion<E>, document: GenericDocument);
}

/// Hydration outcome notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HydrationEvent {
    Started { id: EntityId },
    Hydrated { id: EntityId },
    HydrationFailed { id: EntityId, reason: String },
}

// ---------------------------------------------------------------------------
// Queue internals
// ---------------------------------------------------------------------------

struct Job<E: ?Sized> {
    entity: Arc<E>,
    document: GenericDocument,
}

struct QueueState<E: ?Sized> {
    pending: VecDeque<Job<E>>,
    current: Option<EntityId>,
    pumping: bool,
}

struct QueueInner<E: Hydratable + ?Sized> {
    hydrator: Arc<dyn Hydrator<E>>,
    state: Mutex<QueueState<E>>,
    events: EventBus<HydrationEvent>,
}

impl<E: Hydratable + ?Sized> QueueInner<E> {
    /// Start jobs until one is in flight or none are left.
    ///
    /// Re-entrant calls (a completion resolved inside `hydrate`) return
    /// immediately and leave the outer loop to start the next job.
    fn pump(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.pumping {
                return;
            }
            state.pumping = true;
        }

        loop {
            let job = {
                let mut state = self.state.lock();
                if state.current.is_some() {
                    state.pumping = false;
                    return;
                }
                match state.pending.pop_front() {
                    Some(job) => {
                        state.current = Some(job.entity.id().clone());
                        job
                    }
                    None => {
                        state.pumping = false;
                        return;
                    }
                }
            };
            self.start(job);
        }
    }

    fn start(self: &Arc<Self>, job: Job<E>) {
        let id = job.entity.id().clone();
        if let Err(e) = job.entity.status().start_loading() {
            tracing::warn!(%id, error = %e, "hydration job skipped, entity left the queue state");
            self.finish_current();
            return;
        }
        tracing::debug!(%id, "hydration started");
        self.events.publish(HydrationEvent::Started { id });

        let completion = Completion {
            entity: job.entity,
            queue: Arc::downgrade(self),
            resolved: false,
        };
        self.hydrator.hydrate(completion, job.document);
    }

    fn finish_current(&self) {
        self.state.lock().current = None;
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// One-shot handle resolving a hydration job.
pub struct Completion<E: Hydratable + ?Sized> {
    entity: Arc<E>,
    queue: Weak<QueueInner<E>>,
    resolved: bool,
}

impl<E: Hydratable + ?Sized> Completion<E> {
    /// The entity being hydrated.
    pub fn entity(&self) -> &Arc<E> {
        &self.entity
    }

    /// Mark the entity `Ready`.
    pub fn succeed(mut self) {
        self.resolve(Ok(()));
    }

    /// Mark the entity `Failed(reason)`.
    pub fn fail(mut self, reason: impl Into<String>) {
        self.resolve(Err(reason.into()));
    }

    fn resolve(&mut self, outcome: Result<(), String>) {
        if self.resolved {
            return;
        }
        self.resolved = true;

        let id = self.entity.id().clone();
        let event = match outcome {
            Ok(()) => match self.entity.status().complete() {
                Ok(()) => HydrationEvent::Hydrated { id: id.clone() },
                Err(e) => {
                    tracing::warn!(
                        %id,
                        status = ?self.entity.status().current(),
                        error = %e,
                        "payload loaded but entity left loading, status kept"
                    );
                    HydrationEvent::HydrationFailed {
                        id: id.clone(),
                        reason: e.to_string(),
                    }
                }
            },
            Err(reason) => {
                if let Err(e) = self.entity.status().fail(reason.as_str()) {
                    tracing::warn!(%id, error = %e, "could not record hydration failure");
                }
                HydrationEvent::HydrationFailed {
                    id: id.clone(),
                    reason,
                }
            }
        };
        match &event {
            HydrationEvent::HydrationFailed { reason, .. } => {
                tracing::warn!(%id, reason = %reason, "hydration failed");
            }
            _ => tracing::debug!(%id, "hydration complete"),
        }

        if let Some(queue) = self.queue.upgrade() {
            queue.events.publish(event);
            queue.finish_current();
            queue.pump();
        }
    }
}

impl<E: Hydratable + ?Sized> Drop for Completion<E> {
    fn drop(&mut self) {
        if !self.resolved {
            self.resolve(Err(DROPPED_REASON.to_owned()));
        }
    }
}

impl<E: Hydratable + ?Sized> fmt::Debug for Completion<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("id", self.entity.id())
            .field("resolved", &self.resolved)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// HydrationQueue
// ---------------------------------------------------------------------------

/// Serial queue of hydration jobs for one entity kind.
pub struct HydrationQueue<E: Hydratable + ?Sized> {
    inner: Arc<QueueInner<E>>,
}

impl<E: Hydratable + ?Sized> HydrationQueue<E> {
    pub fn new(hydrator: Arc<dyn Hydrator<E>>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                hydrator,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    current: None,
                    pumping: false,
                }),
                events: EventBus::new(),
            }),
        }
    }

    /// Queue `entity` for hydration from `document`. The entity must be a
    /// ghost; it moves to `InQueue`.
    ///
    /// Nothing starts until [`pump`](Self::pump) is called.
    pub fn enqueue(&self, entity: Arc<E>, document: GenericDocument) -> Result<(), RepositoryError> {
        entity
            .status()
            .enqueue()
            .map_err(|e| RepositoryError::InvariantViolation {
                id: entity.id().clone(),
                details: format!("only ghosts can be hydrated: {e}"),
            })?;
        tracing::debug!(id = %entity.id(), "queued for hydration");
        self.inner.state.lock().pending.push_back(Job { entity, document });
        Ok(())
    }

    /// Start the next job if none is in flight.
    pub fn pump(&self) {
        self.inner.pump();
    }

    /// Jobs waiting behind the current one.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Id of the job in flight.
    pub fn current(&self) -> Option<EntityId> {
        self.inner.state.lock().current.clone()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.current.is_none() && state.pending.is_empty()
    }

    pub fn subscribe(&self) -> flume::Receiver<HydrationEvent> {
        self.inner.events.subscribe()
    }
}

impl<E: Hydratable + ?Sized> fmt::Debug for HydrationQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("HydrationQueue")
            .field("current", &state.current)
            .field("pending", &state.pending.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::desc::FactoryDesc;
    use tessera_core::entity::Assembler;
    use tessera_core::lazy::LazyState;

    // -- helpers --

    struct Blob {
        id: EntityId,
        desc: FactoryDesc,
        status: LazyStatus,
    }

    impl Blob {
        fn ghost(name: &str) -> Arc<Self> {
            Arc::new(Self {
                id: EntityId::new(name, "Blob"),
                desc: FactoryDesc::new("Blob"),
                status: LazyStatus::ghost(),
            })
        }
    }

    impl Entity for Blob {
        fn id(&self) -> &EntityId {
            &self.id
        }

        fn factory_desc(&self) -> &FactoryDesc {
            &self.desc
        }

        fn assemble(&self) -> GenericDocument {
            Assembler::new(&self.id, &self.desc).finish()
        }

        fn lazy_status(&self) -> Option<&LazyStatus> {
            Some(&self.status)
        }
    }

    impl Hydratable for Blob {
        fn status(&self) -> &LazyStatus {
            &self.status
        }
    }

    /// Resolves synchronously: names starting with `bad` fail.
    struct Immediate;

    impl Hydrator<Blob> for Immediate {
        fn hydrate(&self, completion: Completion<Blob>, _document: GenericDocument) {
            if completion.entity().id().name().starts_with("bad") {
                completion.fail("corrupt payload");
            } else {
                completion.succeed();
            }
        }
    }

    /// Parks completions for the test to resolve.
    #[derive(Default)]
    struct Parking {
        parked: Mutex<Vec<Completion<Blob>>>,
    }

    impl Hydrator<Blob> for Parking {
        fn hydrate(&self, completion: Completion<Blob>, _document: GenericDocument) {
            self.parked.lock().push(completion);
        }
    }

    // -- 1. synchronous hydration drains the queue --

    #[test]
    fn synchronous_hydrator_drains_everything() {
        let queue: HydrationQueue<Blob> = HydrationQueue::new(Arc::new(Immediate));
        let events = queue.subscribe();
        let a = Blob::ghost("a");
        let bad = Blob::ghost("bad");
        let c = Blob::ghost("c");

        for blob in [&a, &bad, &c] {
            queue.enqueue(Arc::clone(blob), GenericDocument::new()).unwrap();
        }
        assert!(a.status.is_in_queue());
        assert_eq!(queue.pending_count(), 3);

        queue.pump();

        assert!(a.status.is_ready());
        assert_eq!(bad.status.current(), LazyState::Failed("corrupt payload".to_owned()));
        assert!(c.status.is_ready());
        assert!(queue.is_idle());

        let hydrated = events
            .try_iter()
            .filter(|e| matches!(e, HydrationEvent::Hydrated { .. }))
            .count();
        assert_eq!(hydrated, 2);
    }

    // -- 2. one job at a time --

    #[test]
    fn deferred_completion_serializes_jobs() {
        let hydrator = Arc::new(Parking::default());
        let queue: HydrationQueue<Blob> = HydrationQueue::new(hydrator.clone());
        let a = Blob::ghost("a");
        let b = Blob::ghost("b");
        queue.enqueue(a.clone(), GenericDocument::new()).unwrap();
        queue.enqueue(b.clone(), GenericDocument::new()).unwrap();

        queue.pump();
        queue.pump();

        assert_eq!(queue.current(), Some(a.id.clone()));
        assert!(a.status.is_loading());
        assert!(b.status.is_in_queue());
        assert_eq!(queue.pending_count(), 1);

        let first = hydrator.parked.lock().pop().unwrap();
        first.succeed();

        assert!(a.status.is_ready());
        assert_eq!(queue.current(), Some(b.id.clone()));
        assert!(b.status.is_loading());
    }

    // -- 3. failure handling --

    #[test]
    fn dropped_completion_fails_the_job() {
        let hydrator = Arc::new(Parking::default());
        let queue: HydrationQueue<Blob> = HydrationQueue::new(hydrator.clone());
        let a = Blob::ghost("a");
        queue.enqueue(a.clone(), GenericDocument::new()).unwrap();
        queue.pump();

        hydrator.parked.lock().clear();

        assert_eq!(a.status.current(), LazyState::Failed(DROPPED_REASON.to_owned()));
        assert!(queue.is_idle());
    }

    #[test]
    fn failed_stays_failed_until_reset() {
        let queue: HydrationQueue<Blob> = HydrationQueue::new(Arc::new(Immediate));
        let bad = Blob::ghost("bad");
        queue.enqueue(bad.clone(), GenericDocument::new()).unwrap();
        queue.pump();
        assert!(bad.status.is_failed());

        let err = queue.enqueue(bad.clone(), GenericDocument::new()).unwrap_err();
        assert_eq!(err.code(), tessera_core::ErrorCode::InvariantViolation);
        assert!(bad.status.is_failed());

        bad.status.reset();
        queue.enqueue(bad.clone(), GenericDocument::new()).unwrap();
        assert!(bad.status.is_in_queue());
    }

    #[test]
    fn success_after_reset_reports_failure_and_keeps_ghost() {
        let hydrator = Arc::new(Parking::default());
        let queue: HydrationQueue<Blob> = HydrationQueue::new(hydrator.clone());
        let events = queue.subscribe();
        let a = Blob::ghost("a");
        queue.enqueue(a.clone(), GenericDocument::new()).unwrap();
        queue.pump();

        a.status.reset();
        hydrator.parked.lock().pop().unwrap().succeed();

        assert!(a.status.is_ghost());
        assert!(queue.is_idle());
        assert!(matches!(
            events.try_iter().last(),
            Some(HydrationEvent::HydrationFailed { .. })
        ));
    }

    #[test]
    fn completion_from_another_thread() {
        let hydrator = Arc::new(Parking::default());
        let queue: HydrationQueue<Blob> = HydrationQueue::new(hydrator.clone());
        let events = queue.subscribe();
        let a = Blob::ghost("a");
        queue.enqueue(a.clone(), GenericDocument::new()).unwrap();
        queue.pump();

        let completion = hydrator.parked.lock().pop().unwrap();
        std::thread::spawn(move || completion.succeed())
            .join()
            .unwrap();

        assert!(a.status.is_ready());
        let last = events.try_iter().last().unwrap();
        assert_eq!(last, HydrationEvent::Hydrated { id: a.id.clone() });
    }
}
