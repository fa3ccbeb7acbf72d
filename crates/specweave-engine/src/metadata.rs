//! Class metadata cache
//!
//! Metadata is the structural summary the resolver needs: marker presence,
//! the immediate ancestor and declared method signatures. It is decoded with
//! method bodies skipped and memoized per (scope, class name) for the
//! lifetime of the cache.
//!
//! Population is serialized per key: concurrent first lookups of the same
//! class block on one `OnceCell` while lookups of other classes proceed. The
//! map shard lock is never held while a class is being loaded, so a load may
//! itself trigger lookups of further classes.

use crate::error::{WeaveError, WeaveResult};
use crate::source::{ClassSource, ScopeId};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};
use specweave_bytecode::{ClassFile, DecodeOptions, MethodDescriptor};
use std::sync::Arc;
use tracing::{debug, trace};

/// Name and descriptor of a declared method
pub type Signature = (String, MethodDescriptor);

/// Structural summary of one class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMetadata {
    /// Internal class name
    pub name: String,
    /// False if the scope has no such class
    pub resolved: bool,
    /// Class carries the opt-in marker
    pub has_marker: bool,
    /// Class is an interface
    pub is_interface: bool,
    /// Immediate superclass, `None` for the root or unresolved classes
    pub ancestor: Option<String>,
    /// Declared instance methods and their access flags, constructors excluded
    pub instance_methods: FxHashMap<Signature, u16>,
    /// Declared static methods
    pub static_methods: FxHashSet<Signature>,
}

impl ClassMetadata {
    /// Summarize a decoded class
    pub fn from_class(class: &ClassFile, marker: &str) -> Self {
        let mut instance_methods = FxHashMap::default();
        let mut static_methods = FxHashSet::default();
        for method in &class.methods {
            let signature = (method.name.clone(), method.descriptor.clone());
            if method.is_static() {
                static_methods.insert(signature);
            } else if !method.is_constructor() {
                instance_methods.insert(signature, method.access);
            }
        }
        Self {
            name: class.name.clone(),
            resolved: true,
            has_marker: class.has_annotation(marker),
            is_interface: class.is_interface(),
            ancestor: class.super_name.clone(),
            instance_methods,
            static_methods,
        }
    }

    /// Metadata for a class the scope cannot resolve; treated as opted out
    pub fn unresolved(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resolved: false,
            has_marker: false,
            is_interface: false,
            ancestor: None,
            instance_methods: FxHashMap::default(),
            static_methods: FxHashSet::default(),
        }
    }

    /// True if the class declares a static method with this signature
    pub fn has_static(&self, name: &str, descriptor: &MethodDescriptor) -> bool {
        self.static_methods
            .iter()
            .any(|(n, d)| n == name && d == descriptor)
    }

    /// True if the class declares an instance method with this signature
    pub fn has_instance(&self, name: &str, descriptor: &MethodDescriptor) -> bool {
        self.instance_methods
            .keys()
            .any(|(n, d)| n == name && d == descriptor)
    }
}

type CacheKey = (ScopeId, String);
type Slot = Arc<OnceCell<Arc<ClassMetadata>>>;

/// Process-lifetime metadata cache shared by all weaving threads
#[derive(Debug)]
pub struct MetadataCache {
    marker: String,
    entries: DashMap<CacheKey, Slot>,
}

impl MetadataCache {
    /// Create an empty cache recognizing `marker` as the opt-in annotation
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            entries: DashMap::new(),
        }
    }

    fn slot(&self, scope: ScopeId, name: &str) -> Slot {
        let entry = self
            .entries
            .entry((scope, name.to_string()))
            .or_insert_with(|| Arc::new(OnceCell::new()));
        Arc::clone(entry.value())
    }

    /// Metadata of `name` in the source's scope
    ///
    /// Never fails for a class the source cannot find (the result is
    /// unresolved metadata with the marker unset). Source and decode
    /// failures propagate and leave the key unpopulated.
    pub fn get(&self, source: &dyn ClassSource, name: &str) -> WeaveResult<Arc<ClassMetadata>> {
        let slot = self.slot(source.scope(), name);
        slot.get_or_try_init(|| self.load(source, name))
            .map(Arc::clone)
    }

    fn load(&self, source: &dyn ClassSource, name: &str) -> WeaveResult<Arc<ClassMetadata>> {
        let bytes = source.load(name).map_err(|source| WeaveError::Source {
            class: name.to_string(),
            source,
        })?;
        let metadata = match bytes {
            Some(bytes) => {
                let class = ClassFile::decode_with(&bytes, DecodeOptions { skip_code: true })
                    .map_err(|source| WeaveError::Decode {
                        class: name.to_string(),
                        source,
                    })?;
                trace!(class = name, marker = class.has_annotation(&self.marker), "parsed metadata");
                ClassMetadata::from_class(&class, &self.marker)
            }
            None => {
                debug!(class = name, "class not found; treating as unmarked");
                ClassMetadata::unresolved(name)
            }
        };
        Ok(Arc::new(metadata))
    }

    /// Record metadata for a class whose bytes are already decoded
    ///
    /// Used for the class being transformed; an existing entry wins.
    pub fn seed(&self, scope: ScopeId, class: &ClassFile) -> Arc<ClassMetadata> {
        let slot = self.slot(scope, &class.name);
        Arc::clone(slot.get_or_init(|| Arc::new(ClassMetadata::from_class(class, &self.marker))))
    }

    /// True if metadata for the key has been populated
    pub fn contains(&self, scope: ScopeId, name: &str) -> bool {
        self.entries
            .get(&(scope, name.to_string()))
            .map_or(false, |slot| slot.get().is_some())
    }

    /// Number of populated entries
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    /// True if nothing has been populated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry of one scope, e.g. when a namespace is discarded
    pub fn evict_scope(&self, scope: ScopeId) {
        self.entries.retain(|(entry_scope, _), _| *entry_scope != scope);
    }
}
