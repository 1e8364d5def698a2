//! Document ⇄ bytes codec.
//!
//! The store never interprets document contents; it hands them to a
//! [`Gateway`] and writes whatever bytes come back.

use tessera_core::document::GenericDocument;

use crate::StoreError;

/// Serialization gateway between documents and their stored form.
pub trait Gateway: Send + Sync {
    fn serialize(&self, document: &GenericDocument) -> Result<Vec<u8>, StoreError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<GenericDocument, StoreError>;
}

/// JSON gateway.
///
/// Writes a `"FactoryDesc"` member plus an `"Attributes"` object whose
/// entries are `{"Type": ..., "Value": ...}` pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonGateway {
    pretty: bool,
}

impl JsonGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented output, for stores meant to be read by people.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Gateway for JsonGateway {
    fn serialize(&self, document: &GenericDocument) -> Result<Vec<u8>, StoreError> {
        let result = if self.pretty {
            serde_json::to_vec_pretty(document)
        } else {
            serde_json::to_vec(document)
        };
        result.map_err(|e| StoreError::Serialization {
            details: e.to_string(),
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<GenericDocument, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization {
            details: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::desc::FactoryDesc;

    fn sample() -> GenericDocument {
        let mut doc = GenericDocument::new();
        doc.add_rtti(FactoryDesc::new("Texture"));
        doc.add_name("earth");
        doc.add_or_update("Dimension", vec![512u32, 256]);
        doc
    }

    #[test]
    fn json_layout_is_self_describing() {
        let bytes = JsonGateway::new().serialize(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["FactoryDesc"]["RttiName"], "Texture");
        assert_eq!(value["Attributes"]["Name"]["Type"], "String");
        assert_eq!(value["Attributes"]["Name"]["Value"], "earth");
        assert_eq!(value["Attributes"]["Dimension"]["Type"], "Uint32Array");
    }

    #[test]
    fn pretty_and_compact_decode_alike() {
        let doc = sample();
        let compact = JsonGateway::new().serialize(&doc).unwrap();
        let pretty = JsonGateway::pretty().serialize(&doc).unwrap();
        assert!(pretty.len() > compact.len());
        assert_eq!(JsonGateway::new().deserialize(&pretty).unwrap(), doc);
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let err = JsonGateway::new().deserialize(b"{not json").unwrap_err();
        assert_eq!(err.code(), tessera_core::ErrorCode::SerializationFailed);
    }
}
