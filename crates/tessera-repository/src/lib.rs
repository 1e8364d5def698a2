//! Tessera Repository -- weakly cached entity repositories over file stores.
//!
//! This crate builds on [`tessera_core`] and [`tessera_store`] to provide the
//! service layer:
//!
//! - [`factory`]: type-name keyed constructors turning ids and documents into
//!   live entities.
//! - [`repository`]: the per-family [`Repository`](repository::Repository)
//!   holding `Weak` references to live entities and routing persistence to a
//!   [`StoreMapper`](tessera_store::mapper::StoreMapper).
//! - [`hydration`]: the one-at-a-time queue that turns ghost entities into
//!   ready ones.
//! - [`events`]: the notification bus every outcome is reported on.
//! - [`texture`]: a complete reference entity with its assembler,
//!   disassembler and hydrator.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tessera_repository::prelude::*;
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! let store = Arc::new(FileStoreMapper::new(&Family::Textures.config(), fs));
//! let repo: Repository<Texture> = Repository::new(store);
//! register_texture_factory(repo.factory());
//!
//! let id = EntityId::new("earth", "Texture");
//! let earth = repo
//!     .request_creation(&id, "Texture", PersistenceLevel::Store)
//!     .unwrap();
//! assert!(earth.status().is_ghost());
//!
//! repo.disconnect();
//! repo.connect();
//! assert!(repo.has(&id));
//! assert!(!repo.is_cached(&id));
//! drop(earth);
//!
//! let again = repo.query(&id).unwrap();
//! assert_eq!(again.id(), &id);
//! ```

#![deny(unsafe_code)]

use tessera_core::identity::EntityId;
use tessera_core::{CoreError, ErrorCode};
use tessera_store::StoreError;

pub mod events;
pub mod factory;
pub mod hydration;
pub mod repository;
pub mod texture;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the core crate for convenience.
pub use tessera_core;

/// Re-export the store crate for convenience.
pub use tessera_store;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by factory, repository and hydration operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The id is already cached or stored.
    #[error("entity {id} already exists")]
    AlreadyExists { id: EntityId },

    /// No factory is registered under the requested type name.
    #[error("no factory registered for type '{type_name}'. Registered types: [{registered}]")]
    FactoryNotFound {
        type_name: String,
        registered: String,
    },

    /// An operation was asked of an entity in the wrong state.
    #[error("invariant violated for {id}: {details}")]
    InvariantViolation { id: EntityId, details: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RepositoryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RepositoryError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            RepositoryError::FactoryNotFound { .. } => ErrorCode::FactoryNotFound,
            RepositoryError::InvariantViolation { .. } => ErrorCode::InvariantViolation,
            RepositoryError::Store(e) => e.code(),
            RepositoryError::Core(e) => e.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use tessera_core::prelude::*;
    pub use tessera_store::prelude::*;

    pub use crate::events::{EventBus, RepositoryEvent};
    pub use crate::factory::Factory;
    pub use crate::hydration::{Completion, Hydratable, HydrationEvent, HydrationQueue, Hydrator};
    pub use crate::repository::{PersistenceLevel, Repository};
    pub use crate::texture::{
        register_texture_factory, Texture, TextureAssembler, TextureDisassembler, TextureHydrator,
    };
    pub use crate::RepositoryError;
}
