//! The weaver: one class in, one (possibly identical) class out
//!
//! Processing a class is two-phase. Phase 1 visits every method: call sites
//! are rewritten, bodies with an own contract are woven and wrapper requests
//! are collected. Phase 2 drains the deduplicated requests and appends one
//! wrapper per request.

use crate::body::{weave_body, BodyKind};
use crate::callsite::rewrite_call_sites;
use crate::config::WeaverConfig;
use crate::error::{WeaveError, WeaveResult};
use crate::metadata::MetadataCache;
use crate::resolver::Resolver;
use crate::source::ClassSource;
use crate::wrapper::{generate_wrapper, PendingWrappers, WrapperRequest};
use serde::Serialize;
use specweave_bytecode::{access, verify_class, ClassFile, MethodDescriptor};
use tracing::{debug, error, info, warn};

/// What the weaver did to one class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeaveReport {
    /// Class name
    pub class: String,
    /// Bodies that received entry/exit checks, as `name` + descriptor
    pub woven_methods: Vec<String>,
    /// Dispatched calls redirected to wrappers
    pub rewritten_calls: usize,
    /// Wrapper functions appended, as `name` + descriptor
    pub wrappers: Vec<String>,
    /// Set when the class was passed through untouched on purpose
    pub skipped: Option<String>,
}

impl WeaveReport {
    fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            ..Self::default()
        }
    }

    fn skipped(class: &str, reason: &str) -> Self {
        Self {
            class: class.to_string(),
            skipped: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// True if the class came out exactly as it went in
    pub fn is_unchanged(&self) -> bool {
        self.woven_methods.is_empty() && self.rewritten_calls == 0 && self.wrappers.is_empty()
    }
}

/// Result of transforming a decoded class
#[derive(Debug, Clone)]
pub struct WeaveOutcome {
    /// The transformed class (identical to the input if unchanged)
    pub class: ClassFile,
    /// Summary of the changes
    pub report: WeaveReport,
}

/// Load-time contract weaver
///
/// One weaver is created at host start-up and shared by every loader
/// thread; its metadata cache lives as long as it does.
#[derive(Debug)]
pub struct Weaver {
    config: WeaverConfig,
    cache: MetadataCache,
}

impl Weaver {
    /// Create a weaver with an empty metadata cache
    pub fn new(config: WeaverConfig) -> Self {
        let cache = MetadataCache::new(config.marker.as_str());
        Self { config, cache }
    }

    /// Configuration in use
    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// Shared metadata cache
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Transform encoded class bytes
    ///
    /// Returns `Ok(None)` when the original bytes should be used unchanged.
    /// Failures are logged before they are returned.
    pub fn transform(&self, source: &dyn ClassSource, bytes: &[u8]) -> WeaveResult<Option<Vec<u8>>> {
        if source.scope().is_bootstrap() {
            return Ok(None);
        }
        let class = match ClassFile::decode(bytes) {
            Ok(class) => class,
            Err(source) => {
                let err = WeaveError::Decode {
                    class: "<unknown>".to_string(),
                    source,
                };
                error!(error = %err, "class transformation failed");
                return Err(err);
            }
        };
        let name = class.name.clone();
        match self.transform_class(source, class) {
            Ok(outcome) if outcome.report.is_unchanged() => Ok(None),
            Ok(outcome) => Ok(Some(outcome.class.encode())),
            Err(err) => {
                error!(class = %name, error = %err, "class transformation failed");
                Err(err)
            }
        }
    }

    /// Transform a decoded class
    pub fn transform_class(&self, source: &dyn ClassSource, mut class: ClassFile) -> WeaveResult<WeaveOutcome> {
        if source.scope().is_bootstrap() {
            let report = WeaveReport::skipped(&class.name, "bootstrap scope");
            return Ok(WeaveOutcome { class, report });
        }
        if self.config.is_skipped(&class.name) {
            debug!(class = %class.name, "skipping by name");
            let report = WeaveReport::skipped(&class.name, "skipped name");
            return Ok(WeaveOutcome { class, report });
        }
        if class.has_annotation(&self.config.woven_marker) {
            debug!(class = %class.name, "already woven");
            let report = WeaveReport::skipped(&class.name, "already woven");
            return Ok(WeaveOutcome { class, report });
        }

        self.cache.seed(source.scope(), &class);
        let resolver = Resolver::new(&self.cache, source, &self.config);
        let marked = class.has_annotation(&self.config.marker);
        let mut report = WeaveReport::new(&class.name);
        let mut pending = PendingWrappers::new();

        // Phase 1: visit every method
        for idx in 0..class.methods.len() {
            if let Some(code) = class.methods[idx].code.as_ref() {
                if let Some((rewritten, calls)) = rewrite_call_sites(code, &resolver, &self.config)? {
                    report.rewritten_calls += calls.len();
                    class.methods[idx].code = Some(rewritten);
                    // Calls into this class's own contracts join the same pending set
                    for call in calls.into_iter().filter(|c| marked && c.binding.owner == class.name) {
                        let flags = match class.find_method(&call.original.name, &call.original.descriptor) {
                            Some(method) => Some(method.access),
                            None => resolver
                                .find_inherited(&class.name, &call.original.name, &call.original.descriptor.params)?
                                .filter(|(descriptor, _)| *descriptor == call.original.descriptor)
                                .map(|(_, flags)| flags),
                        };
                        let visibility = flags.map_or(access::PUBLIC, |flags| flags & access::VISIBILITY);
                        pending.schedule(WrapperRequest {
                            name: call.original.name,
                            descriptor: call.original.descriptor,
                            visibility,
                            binding: call.binding,
                        });
                    }
                }
            }

            if !marked {
                continue;
            }
            let method = &class.methods[idx];
            if method.is_static() {
                continue;
            }
            if method.is_constructor() {
                if let Some(binding) = resolver.constructor_binding(&class.name, &method.descriptor)? {
                    let woven = weave_body(&class.name, method, &binding, BodyKind::Constructor, &self.config)?;
                    debug!(class = %class.name, method = %method.descriptor, "woven constructor");
                    report.woven_methods.push(format!("{}{}", woven.name, woven.descriptor));
                    class.methods[idx] = woven;
                }
                continue;
            }

            let binding = match resolver.resolve_owner(&class.name, &method.name, &method.descriptor)? {
                Some(binding) if binding.owner == class.name => binding,
                _ => continue,
            };
            pending.schedule(WrapperRequest {
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
                visibility: method.access & access::VISIBILITY,
                binding: binding.clone(),
            });
            if method.code.is_some() {
                let woven = weave_body(&class.name, method, &binding, BodyKind::Method, &self.config)?;
                debug!(class = %class.name, method = %woven.name, "woven method body");
                report.woven_methods.push(format!("{}{}", woven.name, woven.descriptor));
                class.methods[idx] = woven;
            }
        }

        if marked {
            self.schedule_inherited(&class, &resolver, &mut pending)?;
        }

        // Phase 2: emit each requested wrapper once
        for request in pending.drain() {
            let wrapper = generate_wrapper(&self.config, &request)?;
            if class.find_method(&wrapper.name, &wrapper.descriptor).is_some() {
                warn!(class = %class.name, wrapper = %wrapper.name, "class already declares wrapper; keeping it");
                continue;
            }
            debug!(class = %class.name, wrapper = %wrapper.name, "emitted wrapper");
            report.wrappers.push(format!("{}{}", wrapper.name, wrapper.descriptor));
            class.methods.push(wrapper);
        }

        if report.is_unchanged() {
            return Ok(WeaveOutcome { class, report });
        }

        class.annotations.push(self.config.woven_marker.clone());
        if self.config.verify_output {
            verify_class(&class).map_err(|source| WeaveError::Verify {
                class: class.name.clone(),
                source,
            })?;
        }
        info!(
            class = %class.name,
            woven = report.woven_methods.len(),
            calls = report.rewritten_calls,
            wrappers = report.wrappers.len(),
            "woven class"
        );
        Ok(WeaveOutcome { class, report })
    }

    /// Request wrappers for inherited methods the companion specifies
    ///
    /// A companion may constrain a method the class does not redeclare;
    /// call sites typed to this class resolve to it and need a wrapper here.
    fn schedule_inherited(
        &self,
        class: &ClassFile,
        resolver: &Resolver<'_>,
        pending: &mut PendingWrappers,
    ) -> WeaveResult<()> {
        let meta = resolver.metadata(&class.name)?;
        let companion = match resolver.companion(&meta)? {
            Some(companion) => companion,
            None => return Ok(()),
        };
        let receiver = specweave_bytecode::ValueType::object(class.name.as_str());

        let mut specs: Vec<_> = companion.static_methods.iter().collect();
        specs.sort_by(|a, b| (&a.0, a.1.to_string()).cmp(&(&b.0, b.1.to_string())));

        for (spec_name, spec_desc) in specs {
            let method_name = match self.config.method_for_spec(spec_name) {
                Some(name) => name,
                None => continue,
            };
            if spec_desc.params.first() != Some(&receiver) {
                continue;
            }
            let params = &spec_desc.params[1..];
            let declared = class
                .methods
                .iter()
                .any(|m| !m.is_static() && m.name == method_name && m.descriptor.params.as_slice() == params);
            if declared {
                continue;
            }
            let ancestor = match &meta.ancestor {
                Some(ancestor) => ancestor,
                None => continue,
            };
            let (descriptor, flags) = match resolver.find_inherited(ancestor, method_name, params)? {
                Some(found) => found,
                None => {
                    warn!(class = %class.name, spec = %spec_name, "specification function matches no inherited method");
                    continue;
                }
            };
            if self.config.method_spec_descriptor(&class.name, &descriptor) != *spec_desc {
                continue;
            }
            if pending.contains(method_name, &descriptor) {
                continue;
            }
            let binding = match resolver.resolve_owner(&class.name, method_name, &descriptor)? {
                Some(binding) if binding.owner == class.name => binding,
                _ => continue,
            };
            pending.schedule(WrapperRequest {
                name: method_name.to_string(),
                descriptor: descriptor.clone(),
                visibility: flags & access::VISIBILITY,
                binding,
            });
        }
        Ok(())
    }

    /// Descriptor a wrapper for `name` on `owner` would have
    pub fn wrapper_descriptor(&self, owner: &str, descriptor: &MethodDescriptor) -> MethodDescriptor {
        self.config.wrapper_descriptor(owner, descriptor)
    }
}

impl Default for Weaver {
    fn default() -> Self {
        Self::new(WeaverConfig::default())
    }
}
