//! Class sources
//!
//! A `ClassSource` is the engine's view of one namespace scope: it resolves
//! sibling and ancestor classes by internal name. The scope identifier is part
//! of every metadata cache key, so two scopes may reuse a class name for
//! unrelated classes.

use crate::error::SourceError;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// File extension of class files on disk
pub const CLASS_EXTENSION: &str = "wclass";

/// Identifier of a namespace scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

/// Global counter for scope IDs; 0 is reserved for the bootstrap scope
static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

impl ScopeId {
    /// The host's bootstrap scope; its classes are never transformed
    pub const BOOTSTRAP: ScopeId = ScopeId(0);

    /// Allocate a fresh, process-unique scope
    pub fn next() -> Self {
        ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// True for the bootstrap scope
    pub fn is_bootstrap(self) -> bool {
        self == Self::BOOTSTRAP
    }
}

/// Resolves class bytes by internal name within one scope
pub trait ClassSource: Send + Sync {
    /// Scope this source serves
    fn scope(&self) -> ScopeId;

    /// Raw bytes of `name`, or `None` if the scope has no such class
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, SourceError>;
}

/// In-memory class source
#[derive(Debug)]
pub struct MemorySource {
    scope: ScopeId,
    classes: RwLock<FxHashMap<String, Vec<u8>>>,
}

impl MemorySource {
    /// Create an empty source with a fresh scope
    pub fn new() -> Self {
        Self::with_scope(ScopeId::next())
    }

    /// Create an empty source serving `scope`
    pub fn with_scope(scope: ScopeId) -> Self {
        Self {
            scope,
            classes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Add or replace a class
    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.write().insert(name.into(), bytes);
    }

    /// Remove a class
    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        self.classes.write().remove(name)
    }

    /// True if the class is present
    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// Names of all classes, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// True if the source holds no classes
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassSource for MemorySource {
    fn scope(&self) -> ScopeId {
        self.scope
    }

    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self.classes.read().get(name).cloned())
    }
}

/// Class source backed by a directory tree
///
/// Class `a/b/C` is read from `<root>/a/b/C.wclass`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    scope: ScopeId,
    roots: Vec<PathBuf>,
}

impl DirectorySource {
    /// Source over a single root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_roots(vec![root.into()])
    }

    /// Source over several roots, searched in order
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            scope: ScopeId::next(),
            roots,
        }
    }

    /// Root directories
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Relative path of a class file
    pub fn relative_path(name: &str) -> Result<PathBuf, SourceError> {
        let valid = !name.is_empty()
            && name
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != ".." && !part.contains('\\'));
        if !valid {
            return Err(SourceError::InvalidName(name.to_string()));
        }
        let mut path = PathBuf::from(name);
        path.set_extension(CLASS_EXTENSION);
        Ok(path)
    }

    /// Class name of a file under `root`, if it is a class file
    pub fn class_name(root: &Path, file: &Path) -> Option<String> {
        if file.extension()? != CLASS_EXTENSION {
            return None;
        }
        let relative = file.strip_prefix(root).ok()?.with_extension("");
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

impl ClassSource for DirectorySource {
    fn scope(&self) -> ScopeId {
        self.scope
    }

    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, SourceError> {
        let relative = Self::relative_path(name)?;
        for root in &self.roots {
            let path = root.join(&relative);
            match std::fs::read(&path) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(SourceError::Io { path, source }),
            }
        }
        Ok(None)
    }
}
