// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Name-to-constructor registries for sources and segments.
//!
//! Two registration modes feed the tables: eager registration through the
//! [`SOURCE_FACTORIES`] / [`SEGMENT_FACTORIES`] distributed slices, which
//! runs when the providing crate is linked in, and lazy registration through
//! plugin entries, whose module loader only runs when one of its names is
//! first looked up. Collisions are detected when entries are declared; a
//! module that fails to load caches its error and is never retried.
//!
//! The process-wide registry is a singleton; tests construct isolated
//! instances and hand them to the compiler instead.

use crate::config::NodeConfig;
use crate::error::{Error, FactoryKind};
use crate::segment::Segment;
use crate::source::Source;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Trait for factory types that expose a name.
pub trait NamedFactory {
    /// Returns the component name this factory registers.
    fn name(&self) -> &'static str;
}

/// A factory for creating sources.
pub struct SourceFactory {
    /// The user-facing source name (case-sensitive).
    pub name: &'static str,
    /// A function that creates a new source instance.
    pub create: fn(&NodeConfig) -> Result<Box<dyn Source>, Error>,
}

// Note: manual `Clone` keeps the factory copyable without imposing bounds on
// the constructed component type.
impl Clone for SourceFactory {
    fn clone(&self) -> Self {
        SourceFactory {
            name: self.name,
            create: self.create,
        }
    }
}

impl NamedFactory for SourceFactory {
    fn name(&self) -> &'static str {
        self.name
    }
}

/// A factory for creating segments.
#[derive(Debug)]
pub struct SegmentFactory {
    /// The user-facing segment name (case-sensitive).
    pub name: &'static str,
    /// A function that creates a new segment instance.
    pub create: fn(&NodeConfig) -> Result<Box<dyn Segment>, Error>,
}

impl Clone for SegmentFactory {
    fn clone(&self) -> Self {
        SegmentFactory {
            name: self.name,
            create: self.create,
        }
    }
}

impl NamedFactory for SegmentFactory {
    fn name(&self) -> &'static str {
        self.name
    }
}

/// Eagerly registered source factories. Several names may map to the same
/// constructor (aliases).
#[allow(unsafe_code)]
#[linkme::distributed_slice]
pub static SOURCE_FACTORIES: [SourceFactory] = [..];

/// Eagerly registered segment factories.
#[allow(unsafe_code)]
#[linkme::distributed_slice]
pub static SEGMENT_FACTORIES: [SegmentFactory] = [..];

/// The registrations a plugin module contributes once loaded.
#[derive(Default)]
pub struct ModuleRegistrations {
    /// Source factories registered by the module.
    pub sources: Vec<SourceFactory>,
    /// Segment factories registered by the module.
    pub segments: Vec<SegmentFactory>,
}

/// Loads a plugin module, running its registrations as a side effect.
///
/// Loaders must not call back into the registry they are loaded from; the
/// discover-and-load sequence is serialized behind the registry lock.
pub type ModuleLoader = fn() -> Result<ModuleRegistrations, String>;

/// One entry of a plugin manifest: a name advertised by a module that is not
/// loaded until the name is looked up.
#[derive(Clone)]
pub struct PluginEntry {
    /// The registry group the name belongs to.
    pub group: FactoryKind,
    /// The advertised component name.
    pub name: String,
    /// The providing module path, used in collision and failure reports.
    pub module: String,
    /// The module loader.
    pub load: ModuleLoader,
}

#[derive(Clone)]
struct LazyEntry {
    module: String,
    load: ModuleLoader,
}

struct FactoryTable<F> {
    eager: HashMap<String, F>,
    /// Provenance of each eager name, for collision reports.
    providers: HashMap<String, String>,
    entries: HashMap<String, LazyEntry>,
}

impl<F> Default for FactoryTable<F> {
    fn default() -> Self {
        FactoryTable {
            eager: HashMap::new(),
            providers: HashMap::new(),
            entries: HashMap::new(),
        }
    }
}

impl<F: NamedFactory + Clone> FactoryTable<F> {
    fn insert(&mut self, factory: F, provider: &str) -> Result<(), Error> {
        let name = factory.name().to_owned();
        if self.eager.contains_key(&name) {
            let first = self
                .providers
                .get(&name)
                .cloned()
                .unwrap_or_else(|| "unknown".to_owned());
            return Err(Error::NameCollision {
                name,
                providers: vec![first, provider.to_owned()],
            });
        }
        let _ = self.providers.insert(name.clone(), provider.to_owned());
        let _ = self.eager.insert(name, factory);
        Ok(())
    }

    fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .eager
            .keys()
            .chain(self.entries.keys())
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        names
    }
}

#[derive(Default)]
struct RegistryInner {
    sources: FactoryTable<SourceFactory>,
    segments: FactoryTable<SegmentFactory>,
    loaded: HashSet<String>,
    failed: HashMap<String, Error>,
}

/// Counts reported by [`Registry::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Eagerly registered (or already loaded) source names.
    pub sources: usize,
    /// Eagerly registered (or already loaded) segment names.
    pub segments: usize,
    /// Manifest names whose module has not been loaded yet.
    pub pending: usize,
    /// Modules loaded so far.
    pub loaded_modules: usize,
    /// Modules that failed to load.
    pub failed_modules: usize,
}

/// A name-to-constructor registry for sources and segments.
pub struct Registry {
    inner: Mutex<RegistryInner>,
    lazy: AtomicBool,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl Registry {
    /// Creates an empty registry in lazy mode.
    #[must_use]
    pub fn new() -> Self {
        Registry {
            inner: Mutex::new(RegistryInner::default()),
            lazy: AtomicBool::new(true),
        }
    }

    /// Creates a registry seeded with every factory registered through the
    /// distributed slices.
    ///
    /// Construction cannot fail; should two built-ins claim the same name,
    /// the first one linked wins and the duplicate is logged.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Registry::new();
        {
            let mut inner = registry.inner.lock();
            for factory in SOURCE_FACTORIES.iter() {
                if let Err(e) = inner.sources.insert(factory.clone(), "builtin") {
                    tracing::debug!(error = %e, "duplicate builtin source registration");
                }
            }
            for factory in SEGMENT_FACTORIES.iter() {
                if let Err(e) = inner.segments.insert(factory.clone(), "builtin") {
                    tracing::debug!(error = %e, "duplicate builtin segment registration");
                }
            }
        }
        registry
    }

    /// The process-wide registry, seeded from the distributed slices on
    /// first use.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::with_builtins)
    }

    /// Selects lazy (load on first lookup, the default) or eager-all mode.
    /// Switching to eager-all loads every pending module immediately; the
    /// first load failure is returned, and later lookups still observe the
    /// cached per-module errors.
    pub fn set_lazy(&self, lazy: bool) -> Result<(), Error> {
        self.lazy.store(lazy, Ordering::SeqCst);
        if lazy { Ok(()) } else { self.load_all() }
    }

    /// True while the registry defers module loading to first lookup.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.lazy.load(Ordering::SeqCst)
    }

    /// Eagerly registers one source factory.
    pub fn register_source(&self, factory: SourceFactory) -> Result<(), Error> {
        self.inner.lock().sources.insert(factory, "runtime")
    }

    /// Eagerly registers one segment factory.
    pub fn register_segment(&self, factory: SegmentFactory) -> Result<(), Error> {
        self.inner.lock().segments.insert(factory, "runtime")
    }

    /// Declares plugin manifest entries.
    ///
    /// Collision detection runs now: if two entries (from this batch, an
    /// earlier batch, or an already registered name) claim the same name
    /// within a group, the call fails with [`Error::NameCollision`] listing
    /// every provider, and none of the batch is registered.
    pub fn register_entries(&self, entries: Vec<PluginEntry>) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        // Collect every provider per (group, name) before mutating anything.
        let mut claims: HashMap<(FactoryKind, &str), Vec<&str>> = HashMap::new();
        for entry in &entries {
            claims
                .entry((entry.group, entry.name.as_str()))
                .or_default()
                .push(entry.module.as_str());
        }

        for ((group, name), mut providers) in claims {
            let table_providers = match group {
                FactoryKind::Source => (
                    inner.sources.providers.get(name),
                    inner.sources.entries.get(name),
                ),
                FactoryKind::Segment => (
                    inner.segments.providers.get(name),
                    inner.segments.entries.get(name),
                ),
            };
            if let Some(existing) = table_providers.0 {
                providers.insert(0, existing.as_str());
            }
            if let Some(existing) = table_providers.1 {
                providers.insert(0, existing.module.as_str());
            }
            if providers.len() > 1 {
                return Err(Error::NameCollision {
                    name: name.to_owned(),
                    providers: providers.iter().map(|p| (*p).to_owned()).collect(),
                });
            }
        }

        let mut modules: Vec<(String, ModuleLoader)> = Vec::new();
        for entry in entries {
            let lazy = LazyEntry {
                module: entry.module.clone(),
                load: entry.load,
            };
            if !modules.iter().any(|(m, _)| *m == entry.module) {
                modules.push((entry.module.clone(), entry.load));
            }
            let table_entries = match entry.group {
                FactoryKind::Source => &mut inner.sources.entries,
                FactoryKind::Segment => &mut inner.segments.entries,
            };
            let _ = table_entries.insert(entry.name, lazy);
        }

        if !self.is_lazy() {
            for (module, load) in modules {
                Registry::load_module(&mut inner, &module, load)?;
            }
        }
        Ok(())
    }

    fn load_module(
        inner: &mut RegistryInner,
        module: &str,
        load: ModuleLoader,
    ) -> Result<(), Error> {
        if inner.loaded.contains(module) {
            return Ok(());
        }
        if let Some(error) = inner.failed.get(module) {
            return Err(error.clone());
        }

        tracing::debug!(module, "loading plugin module");
        let registrations = match load() {
            Ok(registrations) => registrations,
            Err(error) => {
                let error = Error::ModuleLoad {
                    module: module.to_owned(),
                    error,
                };
                let _ = inner.failed.insert(module.to_owned(), error.clone());
                return Err(error);
            }
        };

        for factory in registrations.sources {
            if let Err(error) = inner.sources.insert(factory, module) {
                let _ = inner.failed.insert(module.to_owned(), error.clone());
                return Err(error);
            }
        }
        for factory in registrations.segments {
            if let Err(error) = inner.segments.insert(factory, module) {
                let _ = inner.failed.insert(module.to_owned(), error.clone());
                return Err(error);
            }
        }

        let _ = inner.loaded.insert(module.to_owned());
        Ok(())
    }

    /// Loads every pending module, stopping at the first failure.
    pub fn load_all(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let pending: Vec<(String, ModuleLoader)> = inner
            .sources
            .entries
            .values()
            .chain(inner.segments.entries.values())
            .map(|entry| (entry.module.clone(), entry.load))
            .collect();

        for (module, load) in pending {
            Registry::load_module(&mut inner, &module, load)?;
        }
        Ok(())
    }

    /// Looks up a source constructor by name, loading its providing module
    /// if needed.
    pub fn get_source(&self, name: &str) -> Result<SourceFactory, Error> {
        let mut inner = self.inner.lock();

        if let Some(factory) = inner.sources.eager.get(name) {
            return Ok(factory.clone());
        }
        if let Some(entry) = inner.sources.entries.get(name).cloned() {
            Registry::load_module(&mut inner, &entry.module, entry.load)?;
            if let Some(factory) = inner.sources.eager.get(name) {
                return Ok(factory.clone());
            }
        }
        Err(Error::NotFound {
            name: name.to_owned(),
            kind: FactoryKind::Source,
            known: inner.sources.known_names(),
        })
    }

    /// Looks up a segment constructor by name, loading its providing module
    /// if needed.
    pub fn get_segment(&self, name: &str) -> Result<SegmentFactory, Error> {
        let mut inner = self.inner.lock();

        if let Some(factory) = inner.segments.eager.get(name) {
            return Ok(factory.clone());
        }
        if let Some(entry) = inner.segments.entries.get(name).cloned() {
            Registry::load_module(&mut inner, &entry.module, entry.load)?;
            if let Some(factory) = inner.segments.eager.get(name) {
                return Ok(factory.clone());
            }
        }
        Err(Error::NotFound {
            name: name.to_owned(),
            kind: FactoryKind::Segment,
            known: inner.segments.known_names(),
        })
    }

    /// Every known source name, registered or pending, without loading
    /// anything.
    #[must_use]
    pub fn list_sources(&self) -> Vec<String> {
        self.inner.lock().sources.known_names()
    }

    /// Every known segment name, registered or pending, without loading
    /// anything.
    #[must_use]
    pub fn list_segments(&self) -> Vec<String> {
        self.inner.lock().segments.known_names()
    }

    /// Registration and load counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        let pending = inner
            .sources
            .entries
            .values()
            .chain(inner.segments.entries.values())
            .filter(|entry| {
                !inner.loaded.contains(&entry.module) && !inner.failed.contains_key(&entry.module)
            })
            .count();
        RegistryStats {
            sources: inner.sources.eager.len(),
            segments: inner.segments.eager.len(),
            pending,
            loaded_modules: inner.loaded.len(),
            failed_modules: inner.failed.len(),
        }
    }
}

/// Switches the process-wide registry between lazy and eager-all loading.
pub fn enable_lazy_mode(enabled: bool) -> Result<(), Error> {
    Registry::global().set_lazy(enabled)
}

/// Counters of the process-wide registry.
#[must_use]
pub fn get_stats() -> RegistryStats {
    Registry::global().stats()
}
