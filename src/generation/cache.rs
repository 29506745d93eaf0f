// src/generation/cache.rs
//! Proxy shape cache
//!
//! A [`ProxyScope`] owns every implementation generated in it. Lookups are
//! keyed by [`ProxyShape`]; each key gets its own build-once cell so that
//! concurrent requests for one shape observe a single build while unrelated
//! shapes build in parallel.

use crate::generation::emitter::{Implementation, ImplementationId};
use crate::generation::shape::ProxyShape;
use crate::observability::{
    CacheEvent, CacheEventSink, SilentSink, TracingSink, CACHE_BUILDS, CACHE_HITS,
};
use crate::utils::config::InterposeConfig;
use crate::utils::errors::Result;
use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

type Cell = Arc<OnceCell<Arc<Implementation>>>;

/// Build-once-per-shape implementation cache
pub struct ProxyScope {
    cells: DashMap<ProxyShape, Cell>,

    /// Every implementation built since the last reset, in build order
    arena: RwLock<Vec<Arc<Implementation>>>,

    /// Base name -> number of implementations already using it
    names: Mutex<HashMap<String, usize>>,
    next_id: AtomicU64,
    builds: AtomicUsize,
    hits: AtomicUsize,
    config: InterposeConfig,
    sink: Arc<dyn CacheEventSink>,
}

impl ProxyScope {
    pub fn new() -> Self {
        Self::with_config(InterposeConfig::default())
    }

    pub fn with_config(config: InterposeConfig) -> Self {
        let sink: Arc<dyn CacheEventSink> = if config.logging.cache_events {
            Arc::new(TracingSink)
        } else {
            Arc::new(SilentSink)
        };
        Self {
            cells: DashMap::new(),
            arena: RwLock::new(Vec::new()),
            names: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            builds: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
            config,
            sink,
        }
    }

    /// Replace the cache event sink
    pub fn with_sink(mut self, sink: Arc<dyn CacheEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &InterposeConfig {
        &self.config
    }

    /// Return the implementation for `shape`, building it at most once.
    ///
    /// `build` receives the id and unique name reserved for the new
    /// implementation. A failed build leaves the shape uncached.
    pub fn get_or_build<F>(&self, shape: &ProxyShape, build: F) -> Result<Arc<Implementation>>
    where
        F: FnOnce(ImplementationId, String) -> Result<Implementation>,
    {
        let cell: Cell = {
            let entry = self.cells.entry(shape.clone()).or_default();
            Arc::clone(entry.value())
        };

        let mut built = false;
        let implementation = cell.get_or_try_init(|| {
            built = true;
            let id = ImplementationId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let name = self.reserve_name(shape.contract.short_name());
            let implementation = Arc::new(build(id, name)?);
            self.arena.write().push(Arc::clone(&implementation));
            Ok::<_, crate::utils::errors::ProxyError>(implementation)
        })?;
        let implementation = Arc::clone(implementation);

        let event = if built {
            self.builds.fetch_add(1, Ordering::SeqCst);
            metrics::counter!(CACHE_BUILDS).increment(1);
            CacheEvent::Built {
                implementation: implementation.id(),
                name: implementation.name().to_string(),
                shape: shape.to_string(),
                at: Utc::now(),
            }
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(CACHE_HITS).increment(1);
            CacheEvent::Hit {
                implementation: implementation.id(),
                name: implementation.name().to_string(),
                shape: shape.to_string(),
                at: Utc::now(),
            }
        };
        self.sink.record(&event);

        Ok(implementation)
    }

    /// Cached implementation for `shape`, if built
    pub fn get(&self, shape: &ProxyShape) -> Option<Arc<Implementation>> {
        self.cells
            .get(shape)
            .and_then(|cell| cell.get().map(Arc::clone))
    }

    /// `"<prefix>.<Contract>Proxy"`, suffixed with `_N` when taken
    fn reserve_name(&self, contract: &str) -> String {
        let base = format!("{}.{}Proxy", self.config.generator.type_prefix, contract);
        let mut names = self.names.lock();
        let count = names.entry(base.clone()).or_insert(0);
        let name = if *count == 0 {
            base
        } else {
            format!("{}_{}", base, count)
        };
        *count += 1;
        name
    }

    /// Number of implementations built since the scope was created
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Implementations currently held, in build order
    pub fn implementations(&self) -> Vec<Arc<Implementation>> {
        self.arena.read().clone()
    }

    pub fn len(&self) -> usize {
        self.arena.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.read().is_empty()
    }

    /// Evict every cached implementation; instances already created keep theirs
    pub fn reset(&self) {
        let evicted = {
            let mut arena = self.arena.write();
            let evicted = arena.len();
            arena.clear();
            evicted
        };
        self.cells.clear();
        self.names.lock().clear();
        info!("Proxy scope reset, {} implementation(s) evicted", evicted);
    }
}

impl Default for ProxyScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::types::TypeRef;
    use crate::generation::emitter::{emit, EmitRequest};
    use crate::generation::mixin::MixinRegistry;
    use crate::generation::options::GenerationOptions;
    use crate::generation::shape::ProxyKind;
    use crate::observability::MemorySink;
    use crate::contract::descriptor::{ContractDescriptor, MemberDescriptor};
    use crate::utils::errors::ProxyError;

    fn contract() -> Arc<ContractDescriptor> {
        ContractDescriptor::interface("Tests.IFoo")
            .member(MemberDescriptor::method("Foo"))
            .shared()
    }

    fn shape_of(contract: &ContractDescriptor, options: &GenerationOptions) -> ProxyShape {
        ProxyShape::new(
            ProxyKind::InterfaceWithoutTarget,
            contract.type_ref.clone(),
            None,
            &[],
            options,
            &MixinRegistry::default(),
        )
    }

    fn build(
        contract: &Arc<ContractDescriptor>,
        shape: &ProxyShape,
        options: &GenerationOptions,
        id: ImplementationId,
        name: String,
    ) -> Result<Implementation> {
        let mixins = MixinRegistry::default();
        emit(EmitRequest {
            id,
            name,
            shape: shape.clone(),
            contract,
            additional: &[],
            mixins: &mixins,
            options,
            target: None,
        })
    }

    #[test]
    fn test_second_lookup_hits() {
        let sink = Arc::new(MemorySink::new());
        let scope = ProxyScope::new().with_sink(sink.clone());
        let contract = contract();
        let options = GenerationOptions::new();
        let shape = shape_of(&contract, &options);

        let first = scope
            .get_or_build(&shape, |id, name| build(&contract, &shape, &options, id, name))
            .unwrap();
        let second = scope
            .get_or_build(&shape, |_, _| panic!("must not rebuild"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "Interpose.Proxies.IFooProxy");
        assert_eq!(scope.build_count(), 1);
        assert_eq!(sink.builds(), 1);
        assert_eq!(sink.hits(), 1);
    }

    #[test]
    fn test_failed_build_is_retried() {
        let scope = ProxyScope::new();
        let contract = contract();
        let options = GenerationOptions::new();
        let shape = shape_of(&contract, &options);

        let failed = scope.get_or_build(&shape, |_, _| {
            Err(ProxyError::InvalidTarget("boom".to_string()))
        });
        assert!(failed.is_err());
        assert!(scope.get(&shape).is_none());

        let built = scope.get_or_build(&shape, |id, name| build(&contract, &shape, &options, id, name));
        assert!(built.is_ok());
        assert_eq!(scope.build_count(), 1);
    }

    #[test]
    fn test_reset_evicts_and_names_stay_unique() {
        let scope = ProxyScope::new();
        let contract = contract();
        let plain = GenerationOptions::new();
        let selected = GenerationOptions::new()
            .with_selector(crate::generation::selector::from_fn(|_, _, i| i.to_vec()));

        let a = shape_of(&contract, &plain);
        let b = shape_of(&contract, &selected);
        let first = scope
            .get_or_build(&a, |id, name| build(&contract, &a, &plain, id, name))
            .unwrap();
        let second = scope
            .get_or_build(&b, |id, name| build(&contract, &b, &selected, id, name))
            .unwrap();
        assert_eq!(second.name(), "Interpose.Proxies.IFooProxy_1");
        assert_ne!(first.id(), second.id());
        assert_eq!(scope.len(), 2);

        scope.reset();
        assert!(scope.is_empty());
        assert!(scope.get(&a).is_none());

        let rebuilt = scope
            .get_or_build(&a, |id, name| build(&contract, &a, &plain, id, name))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(scope.build_count(), 3);
        assert_eq!(rebuilt.type_ref(), &TypeRef::class("Interpose.Proxies.IFooProxy"));
    }

    #[test]
    fn test_concurrent_lookups_build_once() {
        let scope = Arc::new(ProxyScope::new());
        let contract = contract();
        let options = GenerationOptions::new();
        let shape = shape_of(&contract, &options);
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scope = Arc::clone(&scope);
                let contract = Arc::clone(&contract);
                let options = options.clone();
                let shape = shape.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    scope
                        .get_or_build(&shape, |id, name| {
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            build(&contract, &shape, &options, id, name)
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert_eq!(scope.build_count(), 1);
    }
}
