//! Tessera Store -- file-backed persistence for entity documents.
//!
//! A store *family* (textures, primitives, animators, ...) is one mapper file
//! (the index of `EntityId -> backing filename` records) plus one document
//! file per entity. This crate provides:
//!
//! - [`gateway`]: the document ⇄ bytes codec ([`JsonGateway`](gateway::JsonGateway)).
//! - [`fs`]: the file I/O capability, with a disk and an in-memory backend.
//! - [`index`]: the mapper-file layouts and their text codec.
//! - [`mapper`]: the [`StoreMapper`](mapper::StoreMapper) contract and its
//!   file-backed implementation.
//! - [`config`]: family presets and JSON-loadable store configuration.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_core::prelude::*;
//! use tessera_store::prelude::*;
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! let mapper = FileStoreMapper::new(&Family::Textures.config(), fs.clone());
//!
//! let id = EntityId::new("earth", "Texture");
//! let mut doc = GenericDocument::new();
//! doc.add_rtti(FactoryDesc::new("Texture"));
//! doc.add_name("earth");
//!
//! mapper.put(&id, &doc).unwrap();
//! assert!(mapper.has(&id).unwrap());
//! assert_eq!(fs.contents_str("textures.db.txt").as_deref(), Some("earth,earth.json\n"));
//! ```

#![deny(unsafe_code)]

use std::io;

use tessera_core::identity::EntityId;
use tessera_core::ErrorCode;

pub mod config;
pub mod fs;
pub mod gateway;
pub mod index;
pub mod mapper;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the entity.
    #[error("no stored record for {id}")]
    NotFound { id: EntityId },

    /// The mapper file could not be read while connecting.
    #[error("failed to open store '{family}' from '{file}': {source}")]
    OpenFailed {
        family: String,
        file: String,
        source: io::Error,
    },

    /// A backing document could not be read.
    #[error("failed to read '{file}': {source}")]
    ReadFailed { file: String, source: io::Error },

    /// The mapper file or a backing document could not be written.
    #[error("failed to write '{file}': {source}")]
    WriteFailed { file: String, source: io::Error },

    /// A document could not be encoded or decoded by the gateway.
    #[error("document serialization failed: {details}")]
    Serialization { details: String },

    /// An id or filename cannot be represented in the mapper file.
    #[error("record for '{name}' cannot be stored: {details}")]
    InvalidRecord { name: String, details: String },

    /// The store configuration could not be loaded.
    #[error("invalid store configuration: {details}")]
    Config { details: String },
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::NotFound { .. } => ErrorCode::NotFound,
            StoreError::OpenFailed { .. } | StoreError::Config { .. } => ErrorCode::StoreOpenFailed,
            StoreError::ReadFailed { .. } => ErrorCode::StoreReadFailed,
            StoreError::WriteFailed { .. } => ErrorCode::StoreWriteFailed,
            StoreError::Serialization { .. } | StoreError::InvalidRecord { .. } => {
                ErrorCode::SerializationFailed
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::{Family, FamilyConfig, StoreConfig};
    pub use crate::fs::{DiskFileSystem, FileSystem, MemoryFileSystem};
    pub use crate::gateway::{Gateway, JsonGateway};
    pub use crate::index::{Index, IndexLayout};
    pub use crate::mapper::{FileStoreMapper, StoreMapper};
    pub use crate::StoreError;
}
