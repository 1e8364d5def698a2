//! File I/O capability consumed by the store.
//!
//! Names handed to a [`FileSystem`] are store-relative. A name may carry a
//! path id suffix, `"earth.png@media"`, which [`DiskFileSystem`] resolves
//! against a mounted directory.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Minimal file access used by mappers and hydrators.
pub trait FileSystem: Send + Sync {
    /// Whole-file read. A missing file is `Ok(None)`.
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// Whole-file write. After a failure the file holds either its previous
    /// content or nothing new; never a partial write.
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()>;

    fn exists(&self, name: &str) -> bool;
}

impl<T: FileSystem + ?Sized> FileSystem for Arc<T> {
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        (**self).read(name)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        (**self).write(name, bytes)
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }
}

/// Split `"file@id"` into `("file", "id")`. No suffix gives an empty id.
pub fn split_path_id(name: &str) -> (&str, &str) {
    name.rsplit_once('@').unwrap_or((name, ""))
}

// ---------------------------------------------------------------------------
// DiskFileSystem
// ---------------------------------------------------------------------------

/// Filesystem rooted at a directory, with named mounts for path ids.
#[derive(Debug, Clone)]
pub struct DiskFileSystem {
    root: PathBuf,
    mounts: HashMap<String, PathBuf>,
}

impl DiskFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounts: HashMap::new(),
        }
    }

    /// Mount `dir` under `path_id`. A relative `dir` is taken relative to the
    /// root.
    pub fn with_mount(mut self, path_id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.mount(path_id, dir);
        self
    }

    pub fn mount(&mut self, path_id: impl Into<String>, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        let dir = if dir.is_relative() {
            self.root.join(dir)
        } else {
            dir
        };
        self.mounts.insert(path_id.into(), dir);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a store-relative name.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name carries a path id that is not mounted.
    pub fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let (file, path_id) = split_path_id(name);
        if path_id.is_empty() {
            return Ok(self.root.join(file));
        }
        self.mounts
            .get(path_id)
            .map(|dir| dir.join(file))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("path id '{path_id}' is not mounted"),
                )
            })
    }
}

impl FileSystem for DiskFileSystem {
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.resolve(name)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// MemoryFileSystem
// ---------------------------------------------------------------------------

/// In-memory filesystem for tests and tools.
///
/// Writes to names registered with [`fail_writes_to`](Self::fail_writes_to)
/// fail with an I/O error and leave the previous content untouched.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without going through failure injection.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.lock().insert(name.into(), bytes.into());
    }

    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().remove(name)
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).cloned()
    }

    /// File content as UTF-8, `None` if absent or not valid UTF-8.
    pub fn contents_str(&self, name: &str) -> Option<String> {
        self.contents(name).and_then(|b| String::from_utf8(b).ok())
    }

    /// Sorted list of stored names.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn fail_writes_to(&self, name: impl Into<String>) {
        self.failing.lock().insert(name.into());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.contents(name))
    }

    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        if self.failing.lock().contains(name) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("injected write failure for '{name}'"),
            ));
        }
        self.files.lock().insert(name.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
