//! Tessera Core -- identity, documents and hydration state for persistable
//! entities.
//!
//! This crate holds the vocabulary shared by the store and the repository:
//! the composite [`EntityId`](identity::EntityId), the schema-less
//! [`GenericDocument`](document::GenericDocument) envelope, the runtime-type
//! [`FactoryDesc`](desc::FactoryDesc), the [`Entity`](entity::Entity) trait
//! with its assembler/disassembler helpers, and the
//! [`LazyStatus`](lazy::LazyStatus) state machine.
//!
//! # Quick Start
//!
//! ```
//! use tessera_core::prelude::*;
//!
//! let id = EntityId::new("earth", "Texture");
//! let desc = FactoryDesc::new("Texture").claim_from_resource("earth", "earth.png", "media");
//!
//! let doc = Assembler::new(&id, &desc).attribute("Width", 512u32).finish();
//!
//! let reader = Disassembler::new(&doc);
//! assert_eq!(reader.id().unwrap(), id);
//! assert_eq!(reader.required::<u32>("Width").unwrap(), 512);
//! ```

#![deny(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod desc;
pub mod document;
pub mod entity;
pub mod identity;
pub mod lazy;

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Stable classification of every failure reported by the workspace.
///
/// Error enums in each crate map their variants onto one of these codes, and
/// failure notifications carry the code so subscribers can react without
/// matching on crate-specific error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    FactoryNotFound,
    StoreOpenFailed,
    StoreReadFailed,
    StoreWriteFailed,
    SerializationFailed,
    InvariantViolation,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::FactoryNotFound => "factory_not_found",
            ErrorCode::StoreOpenFailed => "store_open_failed",
            ErrorCode::StoreReadFailed => "store_read_failed",
            ErrorCode::StoreWriteFailed => "store_write_failed",
            ErrorCode::SerializationFailed => "serialization_failed",
            ErrorCode::InvariantViolation => "invariant_violation",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by core data-model operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Identity tokens could not be parsed back into an `EntityId`.
    #[error("malformed entity id tokens: {details}")]
    MalformedTokens { details: String },

    /// A required document attribute is absent.
    #[error("document attribute '{attribute}' is missing")]
    MissingAttribute { attribute: String },

    /// A document attribute holds a value of another type.
    #[error("document attribute '{attribute}' has type {found}, expected {expected}")]
    AttributeTypeMismatch {
        attribute: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A `LazyStatus` transition not allowed by the state machine.
    #[error("invalid hydration transition {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::MalformedTokens { .. }
            | CoreError::MissingAttribute { .. }
            | CoreError::AttributeTypeMismatch { .. } => ErrorCode::SerializationFailed,
            CoreError::InvalidTransition { .. } => ErrorCode::InvariantViolation,
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::desc::{combine_filename_at_path, FactoryDesc, InstanceType};
    pub use crate::document::{AttributeValue, FromAttribute, GenericDocument};
    pub use crate::entity::{Assembler, Disassembler, Entity};
    pub use crate::identity::{EntityId, SequenceSource, TypeTag};
    pub use crate::lazy::{LazyState, LazyStatus};
    pub use crate::{CoreError, ErrorCode};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_classify_core_errors() {
        let err = CoreError::MissingAttribute {
            attribute: "Width".to_owned(),
        };
        assert_eq!(err.code(), ErrorCode::SerializationFailed);
        assert_eq!(err.to_string(), "document attribute 'Width' is missing");

        let err = CoreError::InvalidTransition {
            from: "Ready",
            to: "Loading",
        };
        assert_eq!(err.code(), ErrorCode::InvariantViolation);
    }

    #[test]
    fn error_code_display_is_snake_case() {
        assert_eq!(ErrorCode::FactoryNotFound.to_string(), "factory_not_found");
        assert_eq!(ErrorCode::StoreWriteFailed.to_string(), "store_write_failed");
    }
}
