//! Runtime-type descriptor carried by documents and entities.
//!
//! A [`FactoryDesc`] tells the factory which constructor turns a document back
//! into a live entity (`rtti_name`) and tells the store where the entity's
//! backing document lives (deferred or resource filename).
//!
//! Filenames may carry a path id suffix, `"earth.png@media"`, which the
//! filesystem resolves against a mounted directory.

use serde::{Deserialize, Serialize};

/// How the described object was (or will be) instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstanceType {
    /// Built directly from the document.
    #[default]
    Native,
    /// Cloned from a prefab file.
    ByPrefab,
    /// A ghost whose content is loaded later from a deferred file.
    Deferred,
    /// A deferred object whose content has been instantiated.
    Instanced,
    /// Content read from raw resource data.
    FromResource,
    /// The raw resource data itself.
    ResourceAsset,
}

/// Runtime-type descriptor: type name plus the files backing the object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FactoryDesc {
    instance_type: InstanceType,
    rtti_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    resource_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    resource_filename: String,
    /// Shared by prefab and deferred claims.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    prefab_filename: String,
}

impl FactoryDesc {
    /// A native descriptor for the given type name, with no backing files.
    pub fn new(rtti_name: impl Into<String>) -> Self {
        Self {
            instance_type: InstanceType::Native,
            rtti_name: rtti_name.into(),
            resource_name: String::new(),
            resource_filename: String::new(),
            prefab_filename: String::new(),
        }
    }

    /// Claim as native. An empty `filename` keeps the current one.
    pub fn claim_as_native(mut self, filename: &str, path_id: &str) -> Self {
        self.instance_type = InstanceType::Native;
        self.set_linked_filename(filename, path_id);
        self
    }

    /// Claim as cloned from the given prefab file.
    pub fn claim_by_prefab(mut self, prefab_filename: &str) -> Self {
        self.instance_type = InstanceType::ByPrefab;
        if !prefab_filename.is_empty() {
            self.prefab_filename = prefab_filename.to_owned();
        }
        self
    }

    /// Claim as a deferred ghost stored in `filename`.
    pub fn claim_as_deferred(mut self, filename: &str, path_id: &str) -> Self {
        self.instance_type = InstanceType::Deferred;
        self.set_linked_filename(filename, path_id);
        self
    }

    /// Claim as an instanced (hydrated) deferred object.
    pub fn claim_as_instanced(mut self, filename: &str, path_id: &str) -> Self {
        self.instance_type = InstanceType::Instanced;
        self.set_linked_filename(filename, path_id);
        self
    }

    /// Claim as raw resource data named `name` in `filename`.
    pub fn claim_as_resource_asset(mut self, name: &str, filename: &str, path_id: &str) -> Self {
        self.instance_type = InstanceType::ResourceAsset;
        self.set_resource(name, filename, path_id);
        self
    }

    /// Claim as built from the resource `name` in `filename`.
    pub fn claim_from_resource(mut self, name: &str, filename: &str, path_id: &str) -> Self {
        self.instance_type = InstanceType::FromResource;
        self.set_resource(name, filename, path_id);
        self
    }

    pub fn instance_type(&self) -> InstanceType {
        self.instance_type
    }

    pub fn rtti_name(&self) -> &str {
        &self.rtti_name
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn resource_filename(&self) -> &str {
        &self.resource_filename
    }

    pub fn prefab_filename(&self) -> &str {
        &self.prefab_filename
    }

    pub fn deferred_filename(&self) -> &str {
        &self.prefab_filename
    }

    /// The path id of the linked (deferred/prefab) file, or of the resource
    /// file when no linked file is set. Empty if neither carries one.
    pub fn path_id(&self) -> &str {
        let filename = if self.prefab_filename.is_empty() {
            &self.resource_filename
        } else {
            &self.prefab_filename
        };
        filename.rsplit_once('@').map_or("", |(_, id)| id)
    }

    fn set_linked_filename(&mut self, filename: &str, path_id: &str) {
        if !filename.is_empty() {
            self.prefab_filename = combine_filename_at_path(filename, path_id);
        }
    }

    fn set_resource(&mut self, name: &str, filename: &str, path_id: &str) {
        if !name.is_empty() {
            self.resource_name = name.to_owned();
        }
        if !filename.is_empty() {
            self.resource_filename = combine_filename_at_path(filename, path_id);
        }
    }
}

/// `"file"` + `"id"` → `"file@id"`; an empty path id leaves the name as is.
pub fn combine_filename_at_path(filename: &str, path_id: &str) -> String {
    if path_id.is_empty() {
        filename.to_owned()
    } else {
        format!("{filename}@{path_id}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_native_without_files() {
        let desc = FactoryDesc::new("Texture");
        assert_eq!(desc.instance_type(), InstanceType::Native);
        assert_eq!(desc.rtti_name(), "Texture");
        assert!(desc.deferred_filename().is_empty());
        assert!(desc.resource_filename().is_empty());
    }

    #[test]
    fn deferred_claim_combines_path_id() {
        let desc = FactoryDesc::new("MeshPrimitive").claim_as_deferred("cube.mesh", "data");
        assert_eq!(desc.instance_type(), InstanceType::Deferred);
        assert_eq!(desc.deferred_filename(), "cube.mesh@data");
        assert_eq!(desc.path_id(), "data");
    }

    #[test]
    fn empty_filename_keeps_previous() {
        let desc = FactoryDesc::new("MeshPrimitive")
            .claim_as_deferred("cube.mesh", "")
            .claim_as_instanced("", "");
        assert_eq!(desc.instance_type(), InstanceType::Instanced);
        assert_eq!(desc.deferred_filename(), "cube.mesh");
    }

    #[test]
    fn resource_claim_sets_name_and_file() {
        let desc = FactoryDesc::new("Texture").claim_from_resource("earth", "earth.png", "media");
        assert_eq!(desc.instance_type(), InstanceType::FromResource);
        assert_eq!(desc.resource_name(), "earth");
        assert_eq!(desc.resource_filename(), "earth.png@media");
        assert_eq!(desc.path_id(), "media");
    }

    #[test]
    fn json_uses_pascal_case_and_skips_empty() {
        let desc = FactoryDesc::new("Texture").claim_by_prefab("earth.prefab");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["RttiName"], "Texture");
        assert_eq!(json["InstanceType"], "ByPrefab");
        assert_eq!(json["PrefabFilename"], "earth.prefab");
        assert!(json.get("ResourceName").is_none());
        let back: FactoryDesc = serde_json::from_value(json).unwrap();
        assert_eq!(back, desc);
    }
}
