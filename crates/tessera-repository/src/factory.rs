//! Type-name keyed entity constructors.
//!
//! Each entity type registers two functions under its type name: `create`
//! builds a fresh entity from an id alone, `constitute` rebuilds one from a
//! document. Registration is explicit, normally done once at start-up.
//!
//! Every call reports its outcome on the shared [`EventBus`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tessera_core::document::GenericDocument;
use tessera_core::entity::Entity;
use tessera_core::identity::EntityId;

use crate::events::{EventBus, RepositoryEvent};
use crate::RepositoryError;

/// Builds an entity from its id.
pub type CreateFn<E> = Arc<dyn Fn(&EntityId) -> Arc<E> + Send + Sync>;

/// Rebuilds an entity from its id and a document.
pub type ConstituteFn<E> =
    Arc<dyn Fn(&EntityId, &GenericDocument) -> Result<Arc<E>, RepositoryError> + Send + Sync>;

struct FactoryEntry<E: ?Sized> {
    create: CreateFn<E>,
    constitute: ConstituteFn<E>,
}

impl<E: ?Sized> Clone for FactoryEntry<E> {
    fn clone(&self) -> Self {
        Self {
            create: Arc::clone(&self.create),
            constitute: Arc::clone(&self.constitute),
        }
    }
}

/// Registry of constructors for one entity family.
pub struct Factory<E: Entity + ?Sized> {
    entries: RwLock<HashMap<String, FactoryEntry<E>>>,
    events: Arc<EventBus<RepositoryEvent>>,
}

impl<E: Entity + ?Sized> Factory<E> {
    pub fn new(events: Arc<EventBus<RepositoryEvent>>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Register constructors for `type_name`.
    ///
    /// Returns `false`, logs a warning and leaves the existing registration in
    /// place if the name is already taken.
    pub fn register<C, K>(&self, type_name: &str, create: C, constitute: K) -> bool
    where
        C: Fn(&EntityId) -> Arc<E> + Send + Sync + 'static,
        K: Fn(&EntityId, &GenericDocument) -> Result<Arc<E>, RepositoryError> + Send + Sync + 'static,
    {
        let mut entries = self.entries.write();
        if entries.contains_key(type_name) {
            tracing::warn!(type_name, "factory already registered, ignoring");
            return false;
        }
        entries.insert(
            type_name.to_owned(),
            FactoryEntry {
                create: Arc::new(create),
                constitute: Arc::new(constitute),
            },
        );
        true
    }

    /// Remove the constructors for `type_name`. Returns `false` and logs a
    /// warning if none were registered.
    pub fn unregister(&self, type_name: &str) -> bool {
        if self.entries.write().remove(type_name).is_none() {
            tracing::warn!(type_name, "no factory registered, nothing to unregister");
            return false;
        }
        true
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.entries.read().contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a fresh entity of `type_name`.
    ///
    /// Publishes `Created`, or `CreateFailed` with
    /// [`FactoryNotFound`](RepositoryError::FactoryNotFound).
    pub fn create(&self, id: &EntityId, type_name: &str) -> Result<Arc<E>, RepositoryError> {
        let entry = match self.lookup(type_name) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(%id, type_name, "cannot create entity without a factory");
                self.events.publish(RepositoryEvent::CreateFailed {
                    id: id.clone(),
                    code: e.code(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        let entity = (entry.create)(id);
        tracing::trace!(%id, "entity created");
        self.events.publish(RepositoryEvent::Created { id: id.clone() });
        Ok(entity)
    }

    /// Rebuild an entity from `document`, dispatching on the document's own
    /// runtime-type name.
    ///
    /// Publishes `Constituted { from_store }`, or `ConstituteFailed` with the
    /// lookup or constitution error.
    pub fn constitute(
        &self,
        id: &EntityId,
        document: &GenericDocument,
        from_store: bool,
    ) -> Result<Arc<E>, RepositoryError> {
        let result = document
            .rtti()
            .map(|desc| desc.rtti_name().to_owned())
            .ok_or_else(|| RepositoryError::InvariantViolation {
                id: id.clone(),
                details: "document carries no factory descriptor".to_owned(),
            })
            .and_then(|type_name| self.lookup(&type_name))
            .and_then(|entry| (entry.constitute)(id, document));

        match result {
            Ok(entity) => {
                tracing::trace!(%id, from_store, "entity constituted");
                self.events.publish(RepositoryEvent::Constituted {
                    id: id.clone(),
                    from_store,
                });
                Ok(entity)
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "constitution failed");
                self.events.publish(RepositoryEvent::ConstituteFailed {
                    id: id.clone(),
                    code: e.code(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Clone the entry out so no lock is held while user constructors run.
    fn lookup(&self, type_name: &str) -> Result<FactoryEntry<E>, RepositoryError> {
        let entries = self.entries.read();
        entries
            .get(type_name)
            .cloned()
            .ok_or_else(|| RepositoryError::FactoryNotFound {
                type_name: type_name.to_owned(),
                registered: {
                    let mut names: Vec<&str> = entries.keys().map(String::as_str).collect();
                    names.sort_unstable();
                    names.join(", ")
                },
            })
    }
}

impl<E: Entity + ?Sized> fmt::Debug for Factory<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("registered", &self.registered_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
