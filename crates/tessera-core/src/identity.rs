//! Composite entity identity.
//!
//! An [`EntityId`] is the triple `(name, sequence, rtti)`:
//!
//! - **name**: the logical entity name shared by every instance (`"earth"`).
//! - **sequence**: `0` for the *origin* identity, which is the key the entity
//!   is persisted under. Values above zero denote in-memory variants.
//! - **rtti**: a [`TypeTag`] naming the concrete entity kind (`"Texture"`,
//!   `"MeshPrimitive"`, ...).
//!
//! Equality is exact on all three fields. An origin id and an instance id of the
//! same entity are **not** equal; compare [`EntityId::origin`] when the logical
//! entity is what matters.
//!
//! Sequence numbers are never generated locally. [`EntityId::next`] asks a
//! [`SequenceSource`] (the owning repository) so that concurrent callers can
//! never hand out the same number twice.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;

// ---------------------------------------------------------------------------
// TypeTag
// ---------------------------------------------------------------------------

/// Runtime type tag naming a concrete entity kind.
///
/// Type tags are plain strings so they survive a textual round-trip through the
/// mapper file and through documents. They must not contain `,`, `\n` or `\r`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl TypeTag {
    /// Create a type tag from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ---------------------------------------------------------------------------
// SequenceSource
// ---------------------------------------------------------------------------

/// Issues monotonically increasing sequence numbers for one store family.
///
/// Implemented by the repository (which forwards to its store mapper). Every
/// call must return a number that has never been returned before.
pub trait SequenceSource {
    /// Allocate the next sequence number.
    fn next_sequence_number(&self) -> u64;
}

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Composite identity of an entity: logical name, sequence, runtime type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    name: String,
    sequence: u64,
    rtti: TypeTag,
}

impl EntityId {
    /// Number of tokens produced by [`tokens`](Self::tokens).
    pub const TOKEN_COUNT: usize = 3;

    /// Create the origin identity (sequence 0) for `name` of kind `rtti`.
    pub fn new(name: impl Into<String>, rtti: impl Into<TypeTag>) -> Self {
        Self {
            name: name.into(),
            sequence: 0,
            rtti: rtti.into(),
        }
    }

    /// Create an identity with an explicit sequence number.
    pub fn with_sequence(name: impl Into<String>, sequence: u64, rtti: impl Into<TypeTag>) -> Self {
        Self {
            name: name.into(),
            sequence,
            rtti: rtti.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn rtti(&self) -> &TypeTag {
        &self.rtti
    }

    /// The origin identity: same name and type, sequence 0.
    ///
    /// This is the key every storage operation uses, whatever instance the
    /// caller holds.
    pub fn origin(&self) -> EntityId {
        Self {
            name: self.name.clone(),
            sequence: 0,
            rtti: self.rtti.clone(),
        }
    }

    /// Returns `true` if this is the origin identity (sequence 0).
    pub fn is_origin(&self) -> bool {
        self.sequence == 0
    }

    /// Issue a new instance identity for the same name and type.
    ///
    /// The sequence number comes from `source`, normally the repository that
    /// owns this entity family.
    pub fn next(&self, source: &dyn SequenceSource) -> EntityId {
        Self {
            name: self.name.clone(),
            sequence: source.next_sequence_number(),
            rtti: self.rtti.clone(),
        }
    }

    /// Textual form: `[name, sequence, rtti_name]`.
    pub fn tokens(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.sequence.to_string(),
            self.rtti.as_str().to_owned(),
        ]
    }

    /// Rebuild an identity from the output of [`tokens`](Self::tokens).
    ///
    /// # Errors
    ///
    /// [`CoreError::MalformedTokens`] if the token count is wrong, the name is
    /// empty or the sequence is not an unsigned integer.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CoreError> {
        if tokens.len() != Self::TOKEN_COUNT {
            return Err(CoreError::MalformedTokens {
                details: format!(
                    "expected {} tokens, got {}",
                    Self::TOKEN_COUNT,
                    tokens.len()
                ),
            });
        }
        let name = tokens[0].as_ref();
        if name.is_empty() {
            return Err(CoreError::MalformedTokens {
                details: "empty entity name".to_owned(),
            });
        }
        let sequence = tokens[1]
            .as_ref()
            .parse::<u64>()
            .map_err(|e| CoreError::MalformedTokens {
                details: format!("bad sequence '{}': {e}", tokens[1].as_ref()),
            })?;
        Ok(Self::with_sequence(name, sequence, tokens[2].as_ref()))
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({self})")
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}({})", self.name, self.sequence, self.rtti)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
