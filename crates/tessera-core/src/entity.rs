//! The entity capability and the assembler/disassembler building blocks.
//!
//! Every persistable entity implements [`Entity`]: it knows its identity, its
//! runtime-type descriptor and how to assemble itself into a
//! [`GenericDocument`]. The reverse direction is a per-type *disassembler*
//! function registered with the factory.
//!
//! [`Assembler`] and [`Disassembler`] hold the shared plumbing (descriptor,
//! name and identity tokens) so a concrete type's assembler only deals with
//! its own fields.

use crate::desc::FactoryDesc;
use crate::document::{AttributeValue, FromAttribute, GenericDocument};
use crate::identity::EntityId;
use crate::lazy::LazyStatus;
use crate::CoreError;

/// Attribute holding the identity tokens of the assembled entity.
pub const ID_TOKEN: &str = "Id";

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A domain object with a persistent identity.
pub trait Entity: Send + Sync + 'static {
    fn id(&self) -> &EntityId;

    fn factory_desc(&self) -> &FactoryDesc;

    /// Assemble the entity's current state into a document.
    fn assemble(&self) -> GenericDocument;

    /// Hydration status, for entities whose payload is loaded after
    /// construction.
    fn lazy_status(&self) -> Option<&LazyStatus> {
        None
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Builder writing an entity's fields into a [`GenericDocument`].
///
/// The descriptor, the `"Name"` attribute and the identity tokens are written
/// up front.
#[derive(Debug)]
pub struct Assembler {
    document: GenericDocument,
}

impl Assembler {
    pub fn new(id: &EntityId, desc: &FactoryDesc) -> Self {
        let mut document = GenericDocument::new();
        document.add_rtti(desc.clone());
        document.add_name(id.name());
        document.add_or_update(ID_TOKEN, id.tokens());
        Self { document }
    }

    /// Write one attribute.
    pub fn attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.document.add_or_update(key, value);
        self
    }

    /// Write an attribute only when `value` is `Some`.
    pub fn optional(self, key: &str, value: Option<impl Into<AttributeValue>>) -> Self {
        match value {
            Some(v) => self.attribute(key, v),
            None => self,
        }
    }

    pub fn finish(self) -> GenericDocument {
        self.document
    }
}

// ---------------------------------------------------------------------------
// Disassembler
// ---------------------------------------------------------------------------

/// Reader pulling typed fields back out of a [`GenericDocument`].
#[derive(Debug, Clone, Copy)]
pub struct Disassembler<'a> {
    document: &'a GenericDocument,
}

impl<'a> Disassembler<'a> {
    pub fn new(document: &'a GenericDocument) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &'a GenericDocument {
        self.document
    }

    /// The descriptor the document was assembled with.
    pub fn factory_desc(&self) -> Result<FactoryDesc, CoreError> {
        self.document
            .rtti()
            .cloned()
            .ok_or_else(|| CoreError::MissingAttribute {
                attribute: "FactoryDesc".to_owned(),
            })
    }

    /// The identity recorded by [`Assembler::new`].
    pub fn id(&self) -> Result<EntityId, CoreError> {
        let tokens: Vec<String> = self.document.try_get(ID_TOKEN)?;
        EntityId::from_tokens(&tokens)
    }

    pub fn required<T: FromAttribute>(&self, key: &str) -> Result<T, CoreError> {
        self.document.try_get(key)
    }

    /// A field that may be absent. A present value of the wrong type is still
    /// an error.
    pub fn optional<T: FromAttribute>(&self, key: &str) -> Result<Option<T>, CoreError> {
        if self.document.contains(key) {
            self.document.try_get(key).map(Some)
        } else {
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembler_writes_common_fields() {
        let id = EntityId::with_sequence("earth", 4, "Texture");
        let desc = FactoryDesc::new("Texture");
        let doc = Assembler::new(&id, &desc)
            .attribute("Width", 64u32)
            .optional("Format", None::<String>)
            .finish();

        assert_eq!(doc.name().as_deref(), Some("earth"));
        assert_eq!(doc.rtti(), Some(&desc));
        assert!(!doc.contains("Format"));

        let reader = Disassembler::new(&doc);
        assert_eq!(reader.id().unwrap(), id);
        assert_eq!(reader.factory_desc().unwrap(), desc);
        assert_eq!(reader.required::<u32>("Width").unwrap(), 64);
        assert_eq!(reader.optional::<String>("Format").unwrap(), None);
    }

    #[test]
    fn optional_with_wrong_type_is_error() {
        let mut doc = GenericDocument::new();
        doc.add_or_update("Format", 3u32);
        let reader = Disassembler::new(&doc);
        assert!(reader.optional::<String>("Format").is_err());
    }

    #[test]
    fn missing_descriptor_is_reported() {
        let doc = GenericDocument::new();
        match Disassembler::new(&doc).factory_desc() {
            Err(CoreError::MissingAttribute { attribute }) => assert_eq!(attribute, "FactoryDesc"),
            other => panic!("expected MissingAttribute, got {other:?}"),
        }
    }
}
