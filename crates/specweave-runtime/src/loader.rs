//! Class loading
//!
//! The loader is the registration point between the host and the weaver:
//! each class is read from its scope, handed to [`Weaver::transform`]
//! exactly once, decoded and cached. Lookups delegate to the bootstrap
//! scope first, then to the application source.

use crate::bootstrap;
use crate::error::{VmError, VmResult};
use rustc_hash::FxHashMap;
use specweave_bytecode::ClassFile;
use specweave_engine::{ClassSource, MemorySource, ScopeId, Weaver};
use std::sync::Arc;
use tracing::{debug, info};

/// Loads, weaves and caches classes
pub struct ClassLoader {
    bootstrap: MemorySource,
    source: Arc<dyn ClassSource>,
    weaver: Arc<Weaver>,
    classes: FxHashMap<String, Arc<ClassFile>>,
    load_order: Vec<String>,
    woven: Vec<String>,
}

impl ClassLoader {
    /// Create a loader over an application source
    pub fn new(source: Arc<dyn ClassSource>, weaver: Arc<Weaver>) -> VmResult<Self> {
        let bootstrap = MemorySource::with_scope(ScopeId::BOOTSTRAP);
        for class in bootstrap::classes()? {
            bootstrap.insert(class.name.clone(), class.encode());
        }
        Ok(Self {
            bootstrap,
            source,
            weaver,
            classes: FxHashMap::default(),
            load_order: Vec::new(),
            woven: Vec::new(),
        })
    }

    /// The weaver classes pass through
    pub fn weaver(&self) -> &Weaver {
        &self.weaver
    }

    /// Load a class, weaving it on first use
    pub fn load(&mut self, name: &str) -> VmResult<Arc<ClassFile>> {
        if let Some(class) = self.classes.get(name) {
            return Ok(Arc::clone(class));
        }

        let scope: &dyn ClassSource = if self.bootstrap.contains(name) {
            &self.bootstrap
        } else {
            self.source.as_ref()
        };
        let bytes = scope
            .load(name)?
            .ok_or_else(|| VmError::ClassNotFound(name.to_string()))?;

        let transformed = self.weaver.transform(scope, &bytes)?;
        let changed = transformed.is_some();
        let bytes = transformed.unwrap_or(bytes);
        let class = ClassFile::decode(&bytes).map_err(|source| VmError::Decode {
            class: name.to_string(),
            source,
        })?;
        if class.name != name {
            return Err(VmError::ClassNotFound(name.to_string()));
        }

        if changed {
            info!(class = name, "loaded woven class");
            self.woven.push(name.to_string());
        } else {
            debug!(class = name, "loaded class");
        }
        let class = Arc::new(class);
        self.classes.insert(name.to_string(), Arc::clone(&class));
        self.load_order.push(name.to_string());
        Ok(class)
    }

    /// True if the class has been loaded
    pub fn is_loaded(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Loaded classes, in load order
    pub fn loaded(&self) -> &[String] {
        &self.load_order
    }

    /// Classes the weaver changed, in load order
    pub fn woven(&self) -> &[String] {
        &self.woven
    }

    /// True if `class` is `ancestor` or inherits from or implements it
    pub fn is_assignable(&mut self, class: &str, ancestor: &str) -> VmResult<bool> {
        let mut pending = vec![class.to_string()];
        while let Some(current) = pending.pop() {
            if current == ancestor {
                return Ok(true);
            }
            let file = self.load(&current)?;
            pending.extend(file.super_name.iter().cloned());
            pending.extend(file.interfaces.iter().cloned());
        }
        Ok(false)
    }
}

impl std::fmt::Debug for ClassLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassLoader")
            .field("loaded", &self.load_order)
            .field("woven", &self.woven)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specweave_bytecode::{access, ClassBuilder, Kind, ROOT_CLASS};

    fn loader(source: MemorySource) -> ClassLoader {
        ClassLoader::new(Arc::new(source), Arc::new(Weaver::default())).unwrap()
    }

    #[test]
    fn test_bootstrap_classes_load_unchanged() {
        let mut loader = loader(MemorySource::new());
        let object = loader.load(ROOT_CLASS).unwrap();
        assert!(object.super_name.is_none());
        assert!(loader.woven().is_empty());
        assert_eq!(loader.loaded(), &[ROOT_CLASS.to_string()]);
    }

    #[test]
    fn test_bootstrap_shadows_application() {
        let source = MemorySource::new();
        let fake = ClassBuilder::new("lang/Integer").build().unwrap();
        source.insert("lang/Integer", fake.encode());
        let mut loader = loader(source);
        let integer = loader.load("lang/Integer").unwrap();
        assert!(!integer.methods.is_empty());
    }

    #[test]
    fn test_missing_class() {
        let mut loader = loader(MemorySource::new());
        assert!(matches!(loader.load("app/Nope"), Err(VmError::ClassNotFound(_))));
    }

    #[test]
    fn test_loaded_once() {
        let source = MemorySource::new();
        let class = ClassBuilder::new("app/Main")
            .method(access::PUBLIC | access::STATIC, "one", "()I", |code| {
                code.iconst(1).ret(Kind::Int);
            })
            .build()
            .unwrap();
        source.insert("app/Main", class.encode());
        let mut loader = loader(source);
        let first = loader.load("app/Main").unwrap();
        let second = loader.load("app/Main").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loaded().len(), 1);
    }

    #[test]
    fn test_assignability() {
        let source = MemorySource::new();
        let base = ClassBuilder::new("app/Base").implements("contracts/Predicate").build().unwrap();
        let sub = ClassBuilder::new("app/Sub").extends("app/Base").build().unwrap();
        source.insert("app/Base", base.encode());
        source.insert("app/Sub", sub.encode());
        let mut loader = loader(source);
        assert!(loader.is_assignable("app/Sub", "app/Base").unwrap());
        assert!(loader.is_assignable("app/Sub", "contracts/Predicate").unwrap());
        assert!(loader.is_assignable("app/Sub", ROOT_CLASS).unwrap());
        assert!(!loader.is_assignable("app/Base", "app/Sub").unwrap());
    }
}
