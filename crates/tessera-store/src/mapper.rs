//! Store mapper: the index of one family plus its backing documents.
//!
//! A [`FileStoreMapper`] keeps the parsed mapper file in memory and rewrites
//! it in full on every mutation. Documents live one per file next to it.
//!
//! # Consistency
//!
//! `put` writes the index first and the document second. If the second write
//! fails the index references a missing or stale document until the next
//! successful `put` of the same id. The window is observable: `has` reports
//! the id while `query` fails with [`StoreError::ReadFailed`].
//!
//! # Locking
//!
//! Every operation holds one re-entrant lock for its whole duration,
//! including document I/O, so a reader never observes an index and its files
//! out of step. Operations connect lazily and may nest (`put` calls
//! `connect`) without deadlocking.

use std::cell::RefCell;
use std::io;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tessera_core::document::GenericDocument;
use tessera_core::identity::EntityId;

use crate::config::FamilyConfig;
use crate::fs::FileSystem;
use crate::gateway::{Gateway, JsonGateway};
use crate::index::{Index, IndexLayout};
use crate::StoreError;

// ---------------------------------------------------------------------------
// StoreMapper
// ---------------------------------------------------------------------------

/// Persistence contract shared by every store family.
///
/// Ids are stored exactly as given. Callers that persist logical entities
/// pass origin ids.
pub trait StoreMapper: Send + Sync {
    /// Family name, for logs.
    fn family(&self) -> &str;

    /// Load the index. Idempotent; a missing index file is an empty store.
    fn connect(&self) -> Result<(), StoreError>;

    /// Drop the in-memory index without writing anything.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    fn has(&self, id: &EntityId) -> Result<bool, StoreError>;

    /// The stored document, `None` if the id has no record.
    fn query(&self, id: &EntityId) -> Result<Option<GenericDocument>, StoreError>;

    /// Record `id` and write `document` to its backing file.
    fn put(&self, id: &EntityId, document: &GenericDocument) -> Result<(), StoreError>;

    /// Drop the record of `id`. The backing file is left in place. Removing
    /// an unknown id succeeds without touching storage.
    fn remove(&self, id: &EntityId) -> Result<(), StoreError>;

    /// Issue a sequence number never issued before by this family.
    ///
    /// Layouts that carry the counter persist it immediately. A failed
    /// persist is logged and the number is still issued.
    fn next_sequence_number(&self) -> u64;

    /// Snapshot of `(id, filename)` records in id order.
    fn records(&self) -> Result<Vec<(EntityId, String)>, StoreError>;
}

/// Backing filename of a document: the deferred filename, else the resource
/// filename, else `"<name>.json"`.
pub fn resolve_filename(id: &EntityId, document: &GenericDocument) -> String {
    if let Some(desc) = document.rtti() {
        if !desc.deferred_filename().is_empty() {
            return desc.deferred_filename().to_owned();
        }
        if !desc.resource_filename().is_empty() {
            return desc.resource_filename().to_owned();
        }
    }
    format!("{}.json", id.name())
}

// ---------------------------------------------------------------------------
// FileStoreMapper
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MapperState {
    connected: bool,
    index: Index,
}

/// File-backed [`StoreMapper`] for one family.
pub struct FileStoreMapper {
    config: FamilyConfig,
    fs: Arc<dyn FileSystem>,
    gateway: Arc<dyn Gateway>,
    state: ReentrantMutex<RefCell<MapperState>>,
}

impl FileStoreMapper {
    /// Mapper using the [`JsonGateway`].
    pub fn new(config: &FamilyConfig, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            config: config.clone(),
            fs,
            gateway: Arc::new(JsonGateway::new()),
            state: ReentrantMutex::new(RefCell::new(MapperState::default())),
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn config(&self) -> &FamilyConfig {
        &self.config
    }

    pub fn layout(&self) -> IndexLayout {
        self.config.layout
    }

    fn write_index(&self, index: &Index) -> Result<(), StoreError> {
        let text = self.config.layout.render(index);
        self.fs
            .write(&self.config.mapper_filename, text.as_bytes())
            .map_err(|source| StoreError::WriteFailed {
                file: self.config.mapper_filename.clone(),
                source,
            })
    }
}

impl StoreMapper for FileStoreMapper {
    fn family(&self) -> &str {
        &self.config.family
    }

    fn connect(&self) -> Result<(), StoreError> {
        let guard = self.state.lock();
        if guard.borrow().connected {
            return Ok(());
        }

        let bytes = self
            .fs
            .read(&self.config.mapper_filename)
            .map_err(|source| StoreError::OpenFailed {
                family: self.config.family.clone(),
                file: self.config.mapper_filename.clone(),
                source,
            })?;
        let loaded = match bytes {
            Some(bytes) => self
                .config
                .layout
                .parse(&String::from_utf8_lossy(&bytes), &self.config.default_type),
            None => Index::default(),
        };

        let mut state = guard.borrow_mut();
        // Numbers issued while disconnected stay issued.
        let sequence = loaded.sequence.max(state.index.sequence);
        state.index = loaded;
        state.index.sequence = sequence;
        state.connected = true;
        tracing::debug!(
            family = %self.config.family,
            records = state.index.records.len(),
            sequence,
            "store connected"
        );
        Ok(())
    }

    fn disconnect(&self) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.connected = false;
        state.index.records.clear();
        tracing::debug!(family = %self.config.family, "store disconnected");
    }

    fn is_connected(&self) -> bool {
        self.state.lock().borrow().connected
    }

    fn has(&self, id: &EntityId) -> Result<bool, StoreError> {
        let guard = self.state.lock();
        self.connect()?;
        let found = guard.borrow().index.records.contains_key(id);
        Ok(found)
    }

    fn query(&self, id: &EntityId) -> Result<Option<GenericDocument>, StoreError> {
        let guard = self.state.lock();
        self.connect()?;
        let filename = match guard.borrow().index.records.get(id) {
            Some(f) => f.clone(),
            None => return Ok(None),
        };

        let bytes = match self.fs.read(&filename) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Err(StoreError::ReadFailed {
                    file: filename,
                    source: io::Error::new(io::ErrorKind::NotFound, "backing document missing"),
                })
            }
            Err(source) => return Err(StoreError::ReadFailed { file: filename, source }),
        };

        self.gateway.deserialize(&bytes).map(Some).map_err(|e| {
            tracing::warn!(family = %self.config.family, file = %filename, error = %e, "unreadable document");
            e
        })
    }

    fn put(&self, id: &EntityId, document: &GenericDocument) -> Result<(), StoreError> {
        let filename = resolve_filename(id, document);
        self.config.layout.validate(id, &filename, &self.config.default_type)?;
        let bytes = self.gateway.serialize(document)?;

        let guard = self.state.lock();
        self.connect()?;

        let previous = guard
            .borrow_mut()
            .index
            .records
            .insert(id.clone(), filename.clone());
        let written = self.write_index(&guard.borrow().index);
        if let Err(e) = written {
            let mut state = guard.borrow_mut();
            match previous {
                Some(old) => state.index.records.insert(id.clone(), old),
                None => state.index.records.remove(id),
            };
            return Err(e);
        }

        self.fs
            .write(&filename, &bytes)
            .map_err(|source| StoreError::WriteFailed {
                file: filename.clone(),
                source,
            })?;
        tracing::debug!(family = %self.config.family, %id, file = %filename, "document stored");
        Ok(())
    }

    fn remove(&self, id: &EntityId) -> Result<(), StoreError> {
        let guard = self.state.lock();
        self.connect()?;

        let removed = guard.borrow_mut().index.records.remove(id);
        let Some(filename) = removed else {
            return Ok(());
        };
        let written = self.write_index(&guard.borrow().index);
        if let Err(e) = written {
            guard.borrow_mut().index.records.insert(id.clone(), filename);
            return Err(e);
        }
        tracing::debug!(family = %self.config.family, %id, "record removed");
        Ok(())
    }

    fn next_sequence_number(&self) -> u64 {
        let guard = self.state.lock();
        if let Err(e) = self.connect() {
            tracing::warn!(family = %self.config.family, error = %e, "issuing sequence number without a loaded index");
        }

        let sequence = {
            let mut state = guard.borrow_mut();
            state.index.sequence += 1;
            state.index.sequence
        };
        if self.config.layout.carries_sequence() {
            let written = self.write_index(&guard.borrow().index);
            if let Err(e) = written {
                tracing::warn!(family = %self.config.family, sequence, error = %e, "failed to persist sequence number");
            }
        }
        sequence
    }

    fn records(&self) -> Result<Vec<(EntityId, String)>, StoreError> {
        let guard = self.state.lock();
        self.connect()?;
        let records = guard
            .borrow()
            .index
            .records
            .iter()
            .map(|(id, f)| (id.clone(), f.clone()))
            .collect();
        Ok(records)
    }
}

impl std::fmt::Debug for FileStoreMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStoreMapper")
            .field("family", &self.config.family)
            .field("mapper_filename", &self.config.mapper_filename)
            .field("layout", &self.config.layout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Family;
    use crate::fs::MemoryFileSystem;
    use tessera_core::desc::FactoryDesc;

    // -- helpers --

    fn texture_doc(name: &str) -> GenericDocument {
        let mut doc = GenericDocument::new();
        doc.add_rtti(FactoryDesc::new("Texture"));
        doc.add_name(name);
        doc.add_or_update("Width", 64u32);
        doc
    }

    fn mapper(family: Family) -> (Arc<MemoryFileSystem>, FileStoreMapper) {
        let fs = Arc::new(MemoryFileSystem::new());
        let mapper = FileStoreMapper::new(&family.config(), fs.clone());
        (fs, mapper)
    }

    // -- 1. filename resolution --

    #[test]
    fn filename_prefers_deferred_then_resource() {
        let id = EntityId::new("earth", "Texture");
        let mut doc = GenericDocument::new();
        assert_eq!(resolve_filename(&id, &doc), "earth.json");

        doc.add_rtti(FactoryDesc::new("Texture").claim_from_resource("earth", "earth.res", "media"));
        assert_eq!(resolve_filename(&id, &doc), "earth.res@media");

        doc.add_rtti(
            FactoryDesc::new("Texture")
                .claim_from_resource("earth", "earth.res", "")
                .claim_as_deferred("earth.lazy", ""),
        );
        assert_eq!(resolve_filename(&id, &doc), "earth.lazy");
    }

    // -- 2. put/query --

    #[test]
    fn put_then_query_returns_document() {
        let (fs, mapper) = mapper(Family::Textures);
        let id = EntityId::new("earth", "Texture");
        let doc = texture_doc("earth");

        mapper.put(&id, &doc).unwrap();

        assert!(mapper.has(&id).unwrap());
        assert_eq!(mapper.query(&id).unwrap(), Some(doc));
        assert_eq!(fs.contents_str("textures.db.txt").as_deref(), Some("earth,earth.json\n"));
        assert!(fs.exists("earth.json"));
    }

    #[test]
    fn query_unknown_is_none() {
        let (_fs, mapper) = mapper(Family::Textures);
        assert_eq!(mapper.query(&EntityId::new("nope", "Texture")).unwrap(), None);
    }

    #[test]
    fn put_rejects_unstorable_names() {
        let (fs, mapper) = mapper(Family::Textures);
        let id = EntityId::new("a,b", "Texture");
        let err = mapper.put(&id, &texture_doc("a,b")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));
        assert!(fs.file_names().is_empty());
    }

    #[test]
    fn asset_family_rejects_foreign_types() {
        let (fs, mapper) = mapper(Family::Textures);
        let id = EntityId::new("earth", "Texture2D");

        let err = mapper.put(&id, &texture_doc("earth")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));
        assert!(fs.file_names().is_empty());

        mapper.disconnect();
        assert!(!mapper.has(&id).unwrap());
    }

    // -- 3. remove --

    #[test]
    fn remove_keeps_backing_file() {
        let (fs, mapper) = mapper(Family::Textures);
        let id = EntityId::new("earth", "Texture");
        mapper.put(&id, &texture_doc("earth")).unwrap();

        mapper.remove(&id).unwrap();

        assert!(!mapper.has(&id).unwrap());
        assert_eq!(fs.contents_str("textures.db.txt").as_deref(), Some(""));
        assert!(fs.exists("earth.json"));
    }

    #[test]
    fn remove_unknown_touches_nothing() {
        let (fs, mapper) = mapper(Family::Textures);
        mapper.remove(&EntityId::new("ghost", "Texture")).unwrap();
        assert!(fs.file_names().is_empty());
    }

    #[test]
    fn failed_index_write_rolls_back_memory() {
        let (fs, mapper) = mapper(Family::Textures);
        let id = EntityId::new("earth", "Texture");
        fs.fail_writes_to("textures.db.txt");

        assert!(mapper.put(&id, &texture_doc("earth")).is_err());
        assert!(!mapper.has(&id).unwrap());
        assert!(!fs.exists("earth.json"));
    }

    // -- 4. lifecycle --

    #[test]
    fn reconnect_reloads_index() {
        let (_fs, mapper) = mapper(Family::Textures);
        let id = EntityId::new("earth", "Texture");
        mapper.put(&id, &texture_doc("earth")).unwrap();

        mapper.disconnect();
        assert!(!mapper.is_connected());
        mapper.connect().unwrap();
        mapper.connect().unwrap();

        assert!(mapper.is_connected());
        assert_eq!(mapper.records().unwrap(), vec![(id, "earth.json".to_owned())]);
    }

    #[test]
    fn operations_connect_lazily() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("textures.db.txt", "earth,earth.json\n");
        let mapper = FileStoreMapper::new(&Family::Textures.config(), fs);
        assert!(!mapper.is_connected());
        assert!(mapper.has(&EntityId::new("earth", "Texture")).unwrap());
        assert!(mapper.is_connected());
    }

    // -- 5. sequence numbers --

    #[test]
    fn sequenced_family_persists_counter() {
        let (fs, mapper) = mapper(Family::Primitives);
        assert_eq!(mapper.next_sequence_number(), 1);
        assert_eq!(mapper.next_sequence_number(), 2);
        assert_eq!(fs.contents_str("primitives.db.txt").as_deref(), Some("2\n"));

        let reopened = FileStoreMapper::new(&Family::Primitives.config(), fs);
        assert_eq!(reopened.next_sequence_number(), 3);
    }

    #[test]
    fn asset_family_does_not_write_counter() {
        let (fs, mapper) = mapper(Family::Textures);
        assert_eq!(mapper.next_sequence_number(), 1);
        assert!(!fs.exists("textures.db.txt"));
    }

    #[test]
    fn sequence_issued_even_if_persist_fails() {
        let (fs, mapper) = mapper(Family::Animators);
        fs.fail_writes_to("animators.db.txt");
        assert_eq!(mapper.next_sequence_number(), 1);
        assert_eq!(mapper.next_sequence_number(), 2);
    }

    #[test]
    fn counter_survives_disconnect() {
        let (_fs, mapper) = mapper(Family::Textures);
        mapper.next_sequence_number();
        mapper.disconnect();
        assert_eq!(mapper.next_sequence_number(), 2);
    }
}
