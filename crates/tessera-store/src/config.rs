//! Store configuration.
//!
//! [`Family`] lists the built-in store families with their mapper filenames
//! and layouts. [`StoreConfig`] is the JSON-loadable description of a whole
//! store: root directory, path id mounts and the families to open.
//!
//! ```json
//! {
//!   "root": "data",
//!   "mounts": { "media": "assets/media" },
//!   "families": [
//!     { "family": "textures", "mapper_filename": "textures.db.txt",
//!       "layout": "Asset", "default_type": "Texture" }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tessera_core::identity::TypeTag;

use crate::fs::{DiskFileSystem, FileSystem};
use crate::index::IndexLayout;
use crate::mapper::FileStoreMapper;
use crate::StoreError;

// ---------------------------------------------------------------------------
// Family presets
// ---------------------------------------------------------------------------

/// Built-in store families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Primitives,
    Animators,
    AnimationAssets,
    Geometries,
    Textures,
    WorldMaps,
    SceneGraph,
}

impl Family {
    pub const ALL: [Family; 7] = [
        Family::Primitives,
        Family::Animators,
        Family::AnimationAssets,
        Family::Geometries,
        Family::Textures,
        Family::WorldMaps,
        Family::SceneGraph,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Family::Primitives => "primitives",
            Family::Animators => "animators",
            Family::AnimationAssets => "animation_assets",
            Family::Geometries => "geometries",
            Family::Textures => "textures",
            Family::WorldMaps => "world_maps",
            Family::SceneGraph => "scene_graph",
        }
    }

    pub fn layout(self) -> IndexLayout {
        match self {
            Family::Primitives | Family::Animators => IndexLayout::Sequenced,
            Family::AnimationAssets | Family::Geometries | Family::Textures | Family::WorldMaps => {
                IndexLayout::Asset
            }
            Family::SceneGraph => IndexLayout::Typed,
        }
    }

    /// Type tag given to ids reloaded from layouts that do not record one.
    pub fn default_type(self) -> TypeTag {
        TypeTag::new(match self {
            Family::Primitives => "Primitive",
            Family::Animators => "Animator",
            Family::AnimationAssets => "AnimationAsset",
            Family::Geometries => "GeometryData",
            Family::Textures => "Texture",
            Family::WorldMaps => "WorldMap",
            Family::SceneGraph => "SceneGraphNode",
        })
    }

    /// Default configuration: `<name>.db.txt` in the store root.
    pub fn config(self) -> FamilyConfig {
        FamilyConfig {
            family: self.name().to_owned(),
            mapper_filename: format!("{}.db.txt", self.name()),
            layout: self.layout(),
            default_type: self.default_type(),
        }
    }
}

// ---------------------------------------------------------------------------
// FamilyConfig
// ---------------------------------------------------------------------------

/// Configuration of one store family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyConfig {
    /// Family name, used in logs and to look the family up.
    pub family: String,
    /// Mapper filename, may carry a `@path_id` suffix.
    pub mapper_filename: String,
    pub layout: IndexLayout,
    pub default_type: TypeTag,
}

impl FamilyConfig {
    pub fn new(
        family: impl Into<String>,
        mapper_filename: impl Into<String>,
        layout: IndexLayout,
        default_type: impl Into<TypeTag>,
    ) -> Self {
        Self {
            family: family.into(),
            mapper_filename: mapper_filename.into(),
            layout,
            default_type: default_type.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Configuration of a disk-backed store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding mapper files and documents without a path id.
    /// Default: `"."`.
    pub root: PathBuf,

    /// Path id → directory. Relative directories are taken relative to
    /// `root`. Default: none.
    pub mounts: BTreeMap<String, PathBuf>,

    /// Families to open. Default: every [`Family`] preset.
    pub families: Vec<FamilyConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            mounts: BTreeMap::new(),
            families: Family::ALL.iter().map(|f| f.config()).collect(),
        }
    }
}

impl StoreConfig {
    /// Parse and validate a JSON configuration. Missing fields take their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let config: StoreConfig = serde_json::from_str(json).map_err(|e| StoreError::Config {
            details: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| StoreError::Config {
            details: format!("cannot read '{}': {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    /// Family names must be unique and mapper filenames non-empty.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        for family in &self.families {
            if !seen.insert(family.family.as_str()) {
                return Err(StoreError::Config {
                    details: format!("family '{}' configured twice", family.family),
                });
            }
            if family.mapper_filename.is_empty() {
                return Err(StoreError::Config {
                    details: format!("family '{}' has no mapper filename", family.family),
                });
            }
        }
        Ok(())
    }

    pub fn family(&self, name: &str) -> Option<&FamilyConfig> {
        self.families.iter().find(|f| f.family == name)
    }

    /// Disk filesystem rooted at `root` with every mount applied.
    pub fn file_system(&self) -> DiskFileSystem {
        let mut fs = DiskFileSystem::new(&self.root);
        for (path_id, dir) in &self.mounts {
            fs.mount(path_id.clone(), dir.clone());
        }
        fs
    }

    /// Mapper for the named family over `fs`.
    pub fn mapper(&self, name: &str, fs: Arc<dyn FileSystem>) -> Option<FileStoreMapper> {
        self.family(name).map(|config| FileStoreMapper::new(config, fs))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_mapper_filenames() {
        assert_eq!(Family::Textures.config().mapper_filename, "textures.db.txt");
        assert_eq!(Family::Primitives.layout(), IndexLayout::Sequenced);
        assert_eq!(Family::Geometries.layout(), IndexLayout::Asset);
        assert_eq!(Family::SceneGraph.layout(), IndexLayout::Typed);
        assert_eq!(Family::Textures.default_type(), TypeTag::new("Texture"));
    }

    #[test]
    fn default_config_opens_every_family() {
        let config = StoreConfig::default();
        assert_eq!(config.families.len(), Family::ALL.len());
        assert!(config.family("world_maps").is_some());
        config.validate().unwrap();
    }

    #[test]
    fn json_config_with_defaults() {
        let config = StoreConfig::from_json_str(
            r#"{
                "root": "data",
                "mounts": { "media": "assets/media" },
                "families": [
                    { "family": "textures", "mapper_filename": "tex.db.txt@media",
                      "layout": "Asset", "default_type": "Texture" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("data"));
        assert_eq!(config.families.len(), 1);
        assert_eq!(config.family("textures").unwrap().layout, IndexLayout::Asset);

        let fs = config.file_system();
        assert_eq!(
            fs.resolve("earth.png@media").unwrap(),
            PathBuf::from("data/assets/media/earth.png")
        );

        let empty = StoreConfig::from_json_str("{}").unwrap();
        assert_eq!(empty, StoreConfig::default());
    }

    #[test]
    fn duplicate_family_rejected() {
        let result = StoreConfig::from_json_str(
            r#"{ "families": [
                { "family": "a", "mapper_filename": "a.txt", "layout": "Asset", "default_type": "A" },
                { "family": "a", "mapper_filename": "b.txt", "layout": "Asset", "default_type": "A" }
            ] }"#,
        );
        assert!(matches!(result, Err(StoreError::Config { .. })));
    }

    #[test]
    fn config_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{ "root": "x" }"#).unwrap();
        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("x"));
        assert!(StoreConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
