//! Contract resolution
//!
//! Finds the class whose specification governs a dispatched call. The walk
//! starts at the static receiver type and follows superclass links:
//!
//! 1. the root class ends the walk with no contract;
//! 2. an unmarked class ends the walk with no contract;
//! 3. a marked class whose companion declares the matching specification
//!    function is the owner;
//! 4. otherwise continue with the superclass.
//!
//! Constructors never walk: a constructor specification binds only in its
//! own class.

use crate::config::WeaverConfig;
use crate::error::{WeaveError, WeaveResult};
use crate::metadata::{ClassMetadata, MetadataCache};
use crate::source::ClassSource;
use rustc_hash::FxHashSet;
use specweave_bytecode::{MethodDescriptor, MethodRef};
use std::sync::Arc;
use tracing::trace;

/// A resolved contract: who owns it and which function implements it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecBinding {
    /// Class whose contract applies
    pub owner: String,
    /// Whether the owner is an interface
    pub owner_is_interface: bool,
    /// Specification function, a static method of the owner's companion
    pub spec: MethodRef,
}

/// Resolves contracts against one scope
pub struct Resolver<'a> {
    cache: &'a MetadataCache,
    source: &'a dyn ClassSource,
    config: &'a WeaverConfig,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over `source`
    pub fn new(cache: &'a MetadataCache, source: &'a dyn ClassSource, config: &'a WeaverConfig) -> Self {
        Self {
            cache,
            source,
            config,
        }
    }

    /// Metadata of a class in this resolver's scope
    pub fn metadata(&self, class: &str) -> WeaveResult<Arc<ClassMetadata>> {
        self.cache.get(self.source, class)
    }

    /// Nearest contract owner for `receiver.name(descriptor)`, if any
    pub fn resolve_owner(
        &self,
        receiver: &str,
        name: &str,
        descriptor: &MethodDescriptor,
    ) -> WeaveResult<Option<SpecBinding>> {
        let mut seen = FxHashSet::default();
        let mut current = receiver.to_string();
        while current != self.config.root_class {
            if !seen.insert(current.clone()) {
                return Err(WeaveError::InheritanceCycle(current));
            }
            let meta = self.metadata(&current)?;
            if !meta.has_marker {
                trace!(receiver, class = %current, "unmarked class stops resolution");
                return Ok(None);
            }
            let spec_name = self.config.spec_method_name(name);
            let spec_desc = self.config.method_spec_descriptor(&current, descriptor);
            if let Some(spec) = self.find_spec(&meta, &spec_name, &spec_desc)? {
                return Ok(Some(SpecBinding {
                    owner: current,
                    owner_is_interface: meta.is_interface,
                    spec,
                }));
            }
            match &meta.ancestor {
                Some(ancestor) => current = ancestor.clone(),
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Constructor contract of `class` itself, if any
    pub fn constructor_binding(
        &self,
        class: &str,
        descriptor: &MethodDescriptor,
    ) -> WeaveResult<Option<SpecBinding>> {
        let meta = self.metadata(class)?;
        if !meta.has_marker {
            return Ok(None);
        }
        let spec_desc = self.config.constructor_spec_descriptor(descriptor);
        let spec_name = self.config.constructor_spec.clone();
        Ok(self
            .find_spec(&meta, &spec_name, &spec_desc)?
            .map(|spec| SpecBinding {
                owner: class.to_string(),
                owner_is_interface: meta.is_interface,
                spec,
            }))
    }

    /// Metadata of the companion of a marked class
    ///
    /// A missing companion means "no contracts" unless companions are strict.
    pub fn companion(&self, meta: &ClassMetadata) -> WeaveResult<Option<Arc<ClassMetadata>>> {
        let companion_name = self.config.companion_name(&meta.name);
        let companion = self.metadata(&companion_name)?;
        if companion.resolved {
            return Ok(Some(companion));
        }
        if self.config.strict_companions {
            return Err(WeaveError::MissingCompanion {
                class: meta.name.clone(),
                companion: companion_name,
            });
        }
        Ok(None)
    }

    fn find_spec(
        &self,
        meta: &ClassMetadata,
        spec_name: &str,
        spec_desc: &MethodDescriptor,
    ) -> WeaveResult<Option<MethodRef>> {
        let companion = match self.companion(meta)? {
            Some(companion) => companion,
            None => return Ok(None),
        };
        if !companion.has_static(spec_name, spec_desc) {
            return Ok(None);
        }
        Ok(Some(MethodRef::new(
            companion.name.as_str(),
            spec_name,
            spec_desc.clone(),
            companion.is_interface,
        )))
    }

    /// Find the declaration of instance method `name` taking `params`
    /// in `class` or its superclasses
    ///
    /// Returns the declared descriptor and access flags of the nearest one.
    pub fn find_inherited(
        &self,
        class: &str,
        name: &str,
        params: &[specweave_bytecode::ValueType],
    ) -> WeaveResult<Option<(MethodDescriptor, u16)>> {
        let mut seen = FxHashSet::default();
        let mut current = Some(class.to_string());
        while let Some(name_of) = current {
            if !seen.insert(name_of.clone()) {
                return Err(WeaveError::InheritanceCycle(name_of));
            }
            let meta = self.metadata(&name_of)?;
            let found = meta
                .instance_methods
                .iter()
                .find(|((n, d), _)| n == name && d.params.as_slice() == params)
                .map(|((_, d), flags)| (d.clone(), *flags));
            if found.is_some() {
                return Ok(found);
            }
            if name_of == self.config.root_class {
                break;
            }
            current = meta.ancestor.clone();
        }
        Ok(None)
    }
}
