//! Schema-less serialization envelope.
//!
//! A [`GenericDocument`] is a bag of named, dynamically typed attributes plus an
//! optional [`FactoryDesc`] describing the runtime type it was produced from.
//! Assemblers write live entity state into a document; disassemblers read it
//! back; gateways turn it into bytes for the store.
//!
//! Attributes are kept in a `BTreeMap` so the serialized form (and therefore
//! [`GenericDocument::digest`]) is canonical regardless of insertion order.
//!
//! # Example
//!
//! ```
//! use tessera_core::document::GenericDocument;
//! use tessera_core::desc::FactoryDesc;
//!
//! let mut doc = GenericDocument::new();
//! doc.add_rtti(FactoryDesc::new("Texture"));
//! doc.add_name("earth");
//! doc.add_or_update("Width", 512u32);
//!
//! assert_eq!(doc.name(), Some("earth".to_owned()));
//! assert_eq!(doc.get::<u32>("Width"), Some(512));
//! assert_eq!(doc.get::<u64>("Width"), None); // wrong type
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::desc::FactoryDesc;
use crate::CoreError;

/// Well-known attribute holding the entity name.
pub const NAME_TOKEN: &str = "Name";
/// Well-known attribute flagging a top-level document of a bundle.
pub const TOP_LEVEL_TOKEN: &str = "TopLevel";

// ---------------------------------------------------------------------------
// AttributeValue
// ---------------------------------------------------------------------------

/// A dynamically typed attribute value.
///
/// Serialized adjacently tagged, `{"Type": "Uint32", "Value": 512}`, so the
/// textual form is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", content = "Value")]
pub enum AttributeValue {
    #[serde(rename = "Boolean")]
    Bool(bool),
    #[serde(rename = "Uint32")]
    U32(u32),
    #[serde(rename = "Uint64")]
    U64(u64),
    #[serde(rename = "Float")]
    F32(f32),
    String(String),
    #[serde(rename = "DataObject")]
    Document(GenericDocument),
    StringArray(Vec<String>),
    #[serde(rename = "Uint32Array")]
    U32Array(Vec<u32>),
    #[serde(rename = "FloatArray")]
    F32Array(Vec<f32>),
    #[serde(rename = "DataObjectArray")]
    DocumentArray(Vec<GenericDocument>),
}

impl AttributeValue {
    /// The wire name of this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Bool(_) => "Boolean",
            AttributeValue::U32(_) => "Uint32",
            AttributeValue::U64(_) => "Uint64",
            AttributeValue::F32(_) => "Float",
            AttributeValue::String(_) => "String",
            AttributeValue::Document(_) => "DataObject",
            AttributeValue::StringArray(_) => "StringArray",
            AttributeValue::U32Array(_) => "Uint32Array",
            AttributeValue::F32Array(_) => "FloatArray",
            AttributeValue::DocumentArray(_) => "DataObjectArray",
        }
    }
}

/// Conversion from an [`AttributeValue`] to a concrete Rust type.
pub trait FromAttribute: Sized {
    /// Wire name of the expected type, for error messages.
    const TYPE_NAME: &'static str;

    fn from_attribute(value: &AttributeValue) -> Option<Self>;
}

macro_rules! attribute_conversions {
    ($($ty:ty => $variant:ident, $wire:literal;)*) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(value: $ty) -> Self {
                    AttributeValue::$variant(value)
                }
            }

            impl FromAttribute for $ty {
                const TYPE_NAME: &'static str = $wire;

                fn from_attribute(value: &AttributeValue) -> Option<Self> {
                    match value {
                        AttributeValue::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

attribute_conversions! {
    bool => Bool, "Boolean";
    u32 => U32, "Uint32";
    u64 => U64, "Uint64";
    f32 => F32, "Float";
    String => String, "String";
    GenericDocument => Document, "DataObject";
    Vec<String> => StringArray, "StringArray";
    Vec<u32> => U32Array, "Uint32Array";
    Vec<f32> => F32Array, "FloatArray";
    Vec<GenericDocument> => DocumentArray, "DataObjectArray";
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

// ---------------------------------------------------------------------------
// GenericDocument
// ---------------------------------------------------------------------------

/// Schema-less attribute bag used as the universal serialization envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenericDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    factory_desc: Option<FactoryDesc>,
    #[serde(default)]
    attributes: BTreeMap<String, AttributeValue>,
}

impl GenericDocument {
    /// Create an empty document with no runtime-type descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the runtime-type descriptor. Replaces any previous one.
    pub fn add_rtti(&mut self, desc: FactoryDesc) {
        self.factory_desc = Some(desc);
    }

    /// The runtime-type descriptor, if one was attached.
    pub fn rtti(&self) -> Option<&FactoryDesc> {
        self.factory_desc.as_ref()
    }

    /// Insert or replace an attribute.
    pub fn add_or_update(&mut self, attribute: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(attribute.into(), value.into());
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove(&mut self, attribute: &str) -> Option<AttributeValue> {
        self.attributes.remove(attribute)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Raw access to an attribute value.
    pub fn value(&self, attribute: &str) -> Option<&AttributeValue> {
        self.attributes.get(attribute)
    }

    /// Typed copy of an attribute, `None` if absent or of another type.
    pub fn get<T: FromAttribute>(&self, attribute: &str) -> Option<T> {
        self.attributes.get(attribute).and_then(T::from_attribute)
    }

    /// Typed copy of an attribute that must be present.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingAttribute`] if the attribute is absent.
    /// - [`CoreError::AttributeTypeMismatch`] if it holds another type.
    pub fn try_get<T: FromAttribute>(&self, attribute: &str) -> Result<T, CoreError> {
        let value = self
            .attributes
            .get(attribute)
            .ok_or_else(|| CoreError::MissingAttribute {
                attribute: attribute.to_owned(),
            })?;
        T::from_attribute(value).ok_or_else(|| CoreError::AttributeTypeMismatch {
            attribute: attribute.to_owned(),
            expected: T::TYPE_NAME,
            found: value.type_name(),
        })
    }

    pub fn add_name(&mut self, name: impl Into<String>) {
        let name: String = name.into();
        self.add_or_update(NAME_TOKEN, name);
    }

    pub fn name(&self) -> Option<String> {
        self.get(NAME_TOKEN)
    }

    pub fn set_top_level(&mut self, top_level: bool) {
        self.add_or_update(TOP_LEVEL_TOKEN, top_level);
    }

    pub fn is_top_level(&self) -> bool {
        self.get(TOP_LEVEL_TOKEN).unwrap_or(false)
    }

    /// Number of attributes (the descriptor is not counted).
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// BLAKE3 hex digest of the canonical JSON form of this document.
    ///
    /// Two documents with equal attributes and descriptor always share a
    /// digest, whatever order the attributes were inserted in.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self)
            .expect("GenericDocument should always be JSON-serializable");
        blake3::hash(&bytes).to_hex().to_string()
    }
}

impl<'a> IntoIterator for &'a GenericDocument {
    type Item = (&'a String, &'a AttributeValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
