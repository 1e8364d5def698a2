//! Texture: the reference lazily hydrated entity.
//!
//! A texture's document records its name, dimension, format and the raw
//! image file it is loaded from (`Source`, `"earth.png@media"`). The pixel
//! payload is not part of the document; [`TextureHydrator`] reads it from the
//! source file once the texture is queued for hydration.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_repository::prelude::*;
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! fs.insert("earth.png", vec![1u8, 2, 3, 4]);
//!
//! let earth = Arc::new(Texture::ghost(EntityId::new("earth", "Texture")).with_source("earth.png"));
//! let queue: HydrationQueue<Texture> = HydrationQueue::new(Arc::new(TextureHydrator::new(fs)));
//! queue.enqueue(earth.clone(), TextureAssembler::assemble(&earth)).unwrap();
//! queue.pump();
//!
//! assert!(earth.status().is_ready());
//! assert_eq!(earth.with_payload(|p| p.len()), Some(4));
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tessera_core::desc::FactoryDesc;
use tessera_core::document::GenericDocument;
use tessera_core::entity::{Assembler, Disassembler, Entity};
use tessera_core::identity::EntityId;
use tessera_core::lazy::LazyStatus;
use tessera_core::CoreError;
use tessera_store::fs::FileSystem;

use crate::factory::Factory;
use crate::hydration::{Completion, Hydratable, Hydrator};

/// Runtime type name of textures.
pub const TEXTURE_RTTI: &str = "Texture";

const DIMENSION_TOKEN: &str = "Dimension";
const FORMAT_TOKEN: &str = "Format";
const SOURCE_TOKEN: &str = "Source";

/// Default pixel format of new textures.
pub const DEFAULT_FORMAT: &str = "R8G8B8A8";

// ---------------------------------------------------------------------------
// Texture
// ---------------------------------------------------------------------------

pub struct Texture {
    id: EntityId,
    desc: FactoryDesc,
    dimension: [u32; 2],
    format: String,
    source: Option<String>,
    status: LazyStatus,
    payload: RwLock<Option<Vec<u8>>>,
}

impl Texture {
    /// A ghost texture with no source, zero dimension and the default format.
    pub fn ghost(id: EntityId) -> Self {
        Self {
            id,
            desc: FactoryDesc::new(TEXTURE_RTTI),
            dimension: [0, 0],
            format: DEFAULT_FORMAT.to_owned(),
            source: None,
            status: LazyStatus::ghost(),
            payload: RwLock::new(None),
        }
    }

    /// A ready texture holding `payload`.
    pub fn with_pixels(id: EntityId, dimension: [u32; 2], payload: Vec<u8>) -> Self {
        Self {
            dimension,
            status: LazyStatus::ready(),
            payload: RwLock::new(Some(payload)),
            ..Self::ghost(id)
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_dimension(mut self, width: u32, height: u32) -> Self {
        self.dimension = [width, height];
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_factory_desc(mut self, desc: FactoryDesc) -> Self {
        self.desc = desc;
        self
    }

    pub fn dimension(&self) -> [u32; 2] {
        self.dimension
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn status(&self) -> &LazyStatus {
        &self.status
    }

    /// Run `f` over the pixel payload. `None` unless the texture is ready.
    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        if !self.status.is_ready() {
            return None;
        }
        self.payload.read().as_deref().map(f)
    }

    fn install_payload(&self, bytes: Vec<u8>) {
        *self.payload.write() = Some(bytes);
    }
}

impl Entity for Texture {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn factory_desc(&self) -> &FactoryDesc {
        &self.desc
    }

    fn assemble(&self) -> GenericDocument {
        TextureAssembler::assemble(self)
    }

    fn lazy_status(&self) -> Option<&LazyStatus> {
        Some(&self.status)
    }
}

impl Hydratable for Texture {
    fn status(&self) -> &LazyStatus {
        &self.status
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("dimension", &self.dimension)
            .field("format", &self.format)
            .field("source", &self.source)
            .field("status", &self.status)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Assembler / Disassembler
// ---------------------------------------------------------------------------

/// Writes a [`Texture`] into a document.
pub struct TextureAssembler;

impl TextureAssembler {
    pub fn assemble(texture: &Texture) -> GenericDocument {
        Assembler::new(&texture.id, &texture.desc)
            .attribute(DIMENSION_TOKEN, texture.dimension.to_vec())
            .attribute(FORMAT_TOKEN, texture.format.as_str())
            .optional(SOURCE_TOKEN, texture.source.clone())
            .finish()
    }
}

/// Rebuilds a ghost [`Texture`] from a document.
pub struct TextureDisassembler;

impl TextureDisassembler {
    pub fn disassemble(id: &EntityId, document: &GenericDocument) -> Result<Texture, CoreError> {
        let reader = Disassembler::new(document);
        let dimension: Vec<u32> = reader.required(DIMENSION_TOKEN)?;
        let [width, height] = <[u32; 2]>::try_from(dimension).map_err(|found| {
            CoreError::MalformedTokens {
                details: format!("texture dimension needs 2 values, got {}", found.len()),
            }
        })?;

        let mut texture = Texture::ghost(id.clone())
            .with_factory_desc(reader.factory_desc()?)
            .with_dimension(width, height);
        if let Some(format) = reader.optional::<String>(FORMAT_TOKEN)? {
            texture = texture.with_format(format);
        }
        if let Some(source) = reader.optional::<String>(SOURCE_TOKEN)? {
            texture = texture.with_source(source);
        }
        Ok(texture)
    }
}

/// Register the texture constructors under [`TEXTURE_RTTI`].
pub fn register_texture_factory(factory: &Factory<Texture>) -> bool {
    factory.register(
        TEXTURE_RTTI,
        |id: &EntityId| Arc::new(Texture::ghost(id.clone())),
        |id: &EntityId, document: &GenericDocument| {
            Ok(Arc::new(TextureDisassembler::disassemble(id, document)?))
        },
    )
}

// ---------------------------------------------------------------------------
// TextureHydrator
// ---------------------------------------------------------------------------

/// Loads texture payloads from their source file.
///
/// The document's `Source` attribute takes precedence over the texture's own.
pub struct TextureHydrator {
    fs: Arc<dyn FileSystem>,
}

impl TextureHydrator {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl Hydrator<Texture> for TextureHydrator {
    fn hydrate(&self, completion: Completion<Texture>, document: GenericDocument) {
        let texture = Arc::clone(completion.entity());
        let source = document
            .get::<String>(SOURCE_TOKEN)
            .or_else(|| texture.source().map(str::to_owned));
        let Some(source) = source else {
            completion.fail("texture has no source file");
            return;
        };

        match self.fs.read(&source) {
            Ok(Some(bytes)) => {
                texture.install_payload(bytes);
                completion.succeed();
            }
            Ok(None) => completion.fail(format!("source file '{source}' not found")),
            Err(e) => completion.fail(format!("failed to read '{source}': {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
