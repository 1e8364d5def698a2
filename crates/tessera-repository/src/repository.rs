//! Per-family entity repository.
//!
//! A [`Repository`] answers "give me entity X" from a cache of `Weak`
//! references, falling back to its store and factory on a miss. It never
//! owns entities: callers hold the `Arc`, and an entity nobody holds is
//! simply reloaded on the next query.
//!
//! Storage always uses the origin id. Instance ids (sequence above zero) live
//! only in the cache.
//!
//! Loads and creation requests for one id run one at a time. A factory
//! constructor must not query or create the id it is building.
//!
//! Outcomes are reported as [`RepositoryEvent`]s; public methods return plain
//! values (`Option`, `bool`) and never panic on bad data.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tessera_core::document::GenericDocument;
use tessera_core::entity::Entity;
use tessera_core::identity::{EntityId, SequenceSource};
use tessera_store::mapper::StoreMapper;

use crate::events::{EventBus, RepositoryEvent};
use crate::factory::Factory;
use crate::RepositoryError;

/// How far a newly created entity is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PersistenceLevel {
    /// Returned to the caller only.
    None,
    /// Cached in the repository.
    #[default]
    Repository,
    /// Cached and persisted to the store.
    Store,
}

/// Weakly cached repository for one store family.
pub struct Repository<E: Entity + ?Sized> {
    store: Arc<dyn StoreMapper>,
    factory: Factory<E>,
    events: Arc<EventBus<RepositoryEvent>>,
    cache: Mutex<HashMap<EntityId, Weak<E>>>,
    /// Per-id gates serializing loads and creation requests for one id.
    in_flight: Mutex<HashMap<EntityId, Arc<Mutex<()>>>>,
}

impl<E: Entity + ?Sized> Repository<E> {
    /// Repository over `store` with its own event bus and an empty factory.
    pub fn new(store: Arc<dyn StoreMapper>) -> Self {
        Self::with_event_bus(store, Arc::new(EventBus::new()))
    }

    /// Repository publishing on a shared bus.
    pub fn with_event_bus(store: Arc<dyn StoreMapper>, events: Arc<EventBus<RepositoryEvent>>) -> Self {
        Self {
            store,
            factory: Factory::new(Arc::clone(&events)),
            events,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> &Factory<E> {
        &self.factory
    }

    pub fn store(&self) -> &Arc<dyn StoreMapper> {
        &self.store
    }

    pub fn subscribe(&self) -> flume::Receiver<RepositoryEvent> {
        self.events.subscribe()
    }

    // -- lifecycle --

    /// Open the store. Returns `false` and logs if it cannot be read.
    pub fn connect(&self) -> bool {
        match self.store.connect() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(family = %self.store.family(), error = %e, "failed to connect store");
                false
            }
        }
    }

    /// Close the store and forget every cached entity.
    pub fn disconnect(&self) {
        self.store.disconnect();
        self.cache.lock().clear();
        tracing::debug!(family = %self.store.family(), "repository disconnected");
    }

    // -- lookup --

    /// `true` if `id` is cached and alive, or its origin is stored.
    pub fn has(&self, id: &EntityId) -> bool {
        if self.cached(id).is_some() {
            return true;
        }
        self.store_has(id)
    }

    /// The live entity for `id`, loading it from the store on a miss.
    pub fn query(&self, id: &EntityId) -> Option<Arc<E>> {
        if let Some(entity) = self.cached(id) {
            tracing::debug!(%id, "cache hit");
            return Some(entity);
        }

        self.gated(id, || match self.cached(id) {
            Some(entity) => Some(entity),
            None => self.load(id),
        })
    }

    /// Run `f` holding the gate of `id`.
    ///
    /// The gate leaves the map only when no other caller holds a clone, so a
    /// late arrival always queues behind the running one.
    fn gated<R>(&self, id: &EntityId, f: impl FnOnce() -> R) -> R {
        let gate = Arc::clone(self.in_flight.lock().entry(id.clone()).or_default());
        let result = {
            let _held = gate.lock();
            f()
        };

        // Gates are cloned and dropped only under this lock.
        let mut in_flight = self.in_flight.lock();
        drop(gate);
        if in_flight.get(id).is_some_and(|g| Arc::strong_count(g) == 1) {
            in_flight.remove(id);
        }
        result
    }

    fn load(&self, id: &EntityId) -> Option<Arc<E>> {
        tracing::debug!(%id, "cache miss");
        let document = match self.store.query(&id.origin()) {
            Ok(Some(document)) => document,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%id, error = %e, "failed to read stored document");
                self.events.publish(RepositoryEvent::ConstituteFailed {
                    id: id.clone(),
                    code: e.code(),
                    message: e.to_string(),
                });
                return None;
            }
        };
        let entity = self.factory.constitute(id, &document, true).ok()?;
        self.cache_entity(id, &entity);
        Some(entity)
    }

    // -- mutation --

    /// Register `entity` under `id` and persist it.
    ///
    /// - Instance ids are cached only; the store is not touched and no event
    ///   is published.
    /// - An origin already in the store, or an id cached with another live
    ///   entity, is left alone.
    /// - Otherwise the entity is cached, assembled and written, reported as
    ///   `Put` or `PutFailed`.
    pub fn put(&self, id: &EntityId, entity: &Arc<E>) {
        if let Some(existing) = self.cached(id) {
            if !Arc::ptr_eq(&existing, entity) {
                tracing::debug!(%id, "another instance is cached, put ignored");
                return;
            }
        }

        if !id.is_origin() {
            self.cache_entity(id, entity);
            tracing::debug!(%id, "instance cached, not persisted");
            return;
        }

        match self.store.has(id) {
            Ok(true) => {
                tracing::debug!(%id, "already stored, put ignored");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                self.report_put_failure(id, RepositoryError::from(e));
                return;
            }
        }

        self.cache_entity(id, entity);
        let document = entity.assemble();
        match self.store.put(id, &document) {
            Ok(()) => {
                self.events.publish(RepositoryEvent::Put {
                    id: id.clone(),
                    digest: document.digest(),
                });
            }
            Err(e) => self.report_put_failure(id, RepositoryError::from(e)),
        }
    }

    /// Forget `id`. Origin ids are also dropped from the store; the backing
    /// document stays on disk. Unknown ids are a no-op.
    pub fn remove(&self, id: &EntityId) {
        let was_cached = self.cache.lock().remove(id).is_some();
        let stored = id.is_origin() && self.store_has(id);
        if !was_cached && !stored {
            tracing::debug!(%id, "nothing to remove");
            return;
        }

        if stored {
            if let Err(e) = self.store.remove(id) {
                tracing::warn!(%id, error = %e, "failed to remove stored record");
                self.events.publish(RepositoryEvent::RemoveFailed {
                    id: id.clone(),
                    code: e.code(),
                    message: e.to_string(),
                });
                return;
            }
        }
        self.events.publish(RepositoryEvent::Removed { id: id.clone() });
    }

    /// Create a new entity of `type_name` and register it at `level`.
    ///
    /// Fails with `AlreadyExists` (reported as `CreateFailed`) if `id` is
    /// known to the repository.
    pub fn request_creation(
        &self,
        id: &EntityId,
        type_name: &str,
        level: PersistenceLevel,
    ) -> Option<Arc<E>> {
        self.gated(id, || {
            if self.has(id) {
                let e = RepositoryError::AlreadyExists { id: id.clone() };
                tracing::warn!(%id, "creation refused, entity exists");
                self.events.publish(RepositoryEvent::CreateFailed {
                    id: id.clone(),
                    code: e.code(),
                    message: e.to_string(),
                });
                return None;
            }
            let entity = self.factory.create(id, type_name).ok()?;
            self.apply_level(id, &entity, level);
            Some(entity)
        })
    }

    /// Build an entity from `document` and register it at `level`.
    ///
    /// Fails with `AlreadyExists` (reported as `ConstituteFailed`) if `id` is
    /// known to the repository.
    pub fn request_constitution(
        &self,
        id: &EntityId,
        document: &GenericDocument,
        level: PersistenceLevel,
    ) -> Option<Arc<E>> {
        self.gated(id, || {
            if self.has(id) {
                let e = RepositoryError::AlreadyExists { id: id.clone() };
                tracing::warn!(%id, "constitution refused, entity exists");
                self.events.publish(RepositoryEvent::ConstituteFailed {
                    id: id.clone(),
                    code: e.code(),
                    message: e.to_string(),
                });
                return None;
            }
            let entity = self.factory.constitute(id, document, false).ok()?;
            self.apply_level(id, &entity, level);
            Some(entity)
        })
    }

    // -- cache inspection --

    /// Number of cached entities still alive.
    pub fn cached_count(&self) -> usize {
        self.cache
            .lock()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_cached(&self, id: &EntityId) -> bool {
        self.cached(id).is_some()
    }

    /// Drop cache entries whose entity is gone. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, w| w.strong_count() > 0);
        before - cache.len()
    }

    // -- internals --

    fn cached(&self, id: &EntityId) -> Option<Arc<E>> {
        let mut cache = self.cache.lock();
        let entity = cache.get(id)?.upgrade();
        if entity.is_none() {
            cache.remove(id);
        }
        entity
    }

    fn cache_entity(&self, id: &EntityId, entity: &Arc<E>) {
        self.cache.lock().insert(id.clone(), Arc::downgrade(entity));
    }

    fn store_has(&self, id: &EntityId) -> bool {
        self.store.has(&id.origin()).unwrap_or_else(|e| {
            tracing::warn!(%id, error = %e, "store lookup failed");
            false
        })
    }

    fn apply_level(&self, id: &EntityId, entity: &Arc<E>, level: PersistenceLevel) {
        match level {
            PersistenceLevel::None => {}
            PersistenceLevel::Repository => self.cache_entity(id, entity),
            PersistenceLevel::Store => {
                self.cache_entity(id, entity);
                self.put(id, entity);
            }
        }
    }

    fn report_put_failure(&self, id: &EntityId, e: RepositoryError) {
        tracing::warn!(%id, error = %e, "failed to persist entity");
        self.events.publish(RepositoryEvent::PutFailed {
            id: id.clone(),
            code: e.code(),
            message: e.to_string(),
        });
    }
}

impl<E: Entity + ?Sized> SequenceSource for Repository<E> {
    fn next_sequence_number(&self) -> u64 {
        self.store.next_sequence_number()
    }
}

impl<E: Entity + ?Sized> Repository<E> {
    /// Issue the next sequence number of this family.
    pub fn next_sequence_number(&self) -> u64 {
        SequenceSource::next_sequence_number(self)
    }
}

impl<E: Entity + ?Sized> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("family", &self.store.family())
            .field("cached", &self.cached_count())
            .finish_non_exhaustive()
    }
}
