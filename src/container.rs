//! Service provider
//!
//! The [`ServiceProvider`] is built once from a finished [`ServiceCollection`].
//! In the default eager mode construction runs the realization pipeline:
//! singletons are created up front and every closed registration is compiled
//! into the frozen snapshot before the provider is returned.

use crate::scope::ScopeState;
use crate::{
    Accessor, CallSiteResolver, FallbackResolver, Injectable, Instance, RealizationPipeline, Result, ServiceCollection,
    ServiceKey, ServiceScope,
};
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, info};

/// How a provider turns registrations into accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderMode {
    /// Create singletons and precompile every closed registration at build
    #[default]
    Eager,
    /// Plan and compile on first use; singletons are created when first asked for
    Lazy,
}

impl ProviderMode {
    /// Get the mode name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderMode::Eager => "eager",
            ProviderMode::Lazy => "lazy",
        }
    }
}

/// Provider construction options.
///
/// # Examples
///
/// ```rust
/// use dependency_realizer::{ProviderMode, ProviderOptions};
///
/// let options = ProviderOptions::new()
///     .with_mode(ProviderMode::Eager)
///     .with_snapshot_buckets(211);
///
/// assert_eq!(options.snapshot_buckets(), 211);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderOptions {
    mode: ProviderMode,
    snapshot_buckets: usize,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Eager,
            snapshot_buckets: crate::DEFAULT_BUCKET_COUNT,
        }
    }
}

impl ProviderOptions {
    /// Eager mode with the default bucket count
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for lazy mode
    pub fn lazy() -> Self {
        Self::default().with_mode(ProviderMode::Lazy)
    }

    /// Set the provider mode
    pub fn with_mode(mut self, mode: ProviderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the snapshot bucket count; ideally a prime above the number of
    /// registrations. Zero is treated as one.
    pub fn with_snapshot_buckets(mut self, buckets: usize) -> Self {
        self.snapshot_buckets = buckets.max(1);
        self
    }

    /// The configured mode
    pub fn mode(&self) -> ProviderMode {
        self.mode
    }

    /// The configured bucket count
    pub fn snapshot_buckets(&self) -> usize {
        self.snapshot_buckets
    }
}

/// Point-in-time counters for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderDiagnostics {
    /// Mode the provider was built in
    pub mode: ProviderMode,
    /// Accessors in the frozen snapshot (always zero in lazy mode)
    pub snapshot_entries: usize,
    /// Lookups answered by the fallback resolver so far
    pub fallback_lookups: usize,
    /// Plans built so far
    pub plans_built: usize,
    /// Instances cached in the root scope
    pub root_instances: usize,
}

/// State shared by a provider and all of its scopes
pub(crate) struct ProviderCore {
    resolver: Arc<CallSiteResolver>,
    /// Set once, after the pipeline has frozen; empty in lazy mode
    pipeline: OnceCell<RealizationPipeline<CallSiteResolver>>,
    root: Arc<ScopeState>,
    options: ProviderOptions,
}

impl ProviderCore {
    #[inline]
    pub(crate) fn root_state(&self) -> &Arc<ScopeState> {
        &self.root
    }

    /// Accessor for `key`; goes straight to the resolver until a frozen
    /// pipeline has been published.
    #[inline]
    pub(crate) fn accessor(&self, key: &ServiceKey) -> Result<Accessor<ServiceScope>> {
        match self.pipeline.get() {
            Some(pipeline) => pipeline.get_accessor(key),
            None => self.resolver.get_or_create_accessor(key),
        }
    }
}

/// Resolves services from a finished registration set.
///
/// Cloning is cheap; clones share the same root scope and snapshot.
///
/// # Examples
///
/// ```rust
/// use dependency_realizer::{Service, ServiceCollection, ServiceProvider};
/// use std::sync::Arc;
///
/// struct Database { url: String }
///
/// struct UserService { db: Arc<Database> }
///
/// impl Service for UserService {
///     type Dependencies = Arc<Database>;
///
///     fn create(db: Arc<Database>) -> Self {
///         UserService { db }
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services
///     .add_instance(Database { url: "postgres://localhost".into() })
///     .add_scoped::<UserService>();
///
/// let provider = ServiceProvider::build(services).unwrap();
/// let scope = provider.create_scope();
/// let users = scope.get::<UserService>().unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct ServiceProvider {
    core: Arc<ProviderCore>,
}

impl ServiceProvider {
    /// Build an eager provider with default options
    #[inline]
    pub fn build(services: ServiceCollection) -> Result<Self> {
        Self::build_with(services, ProviderOptions::default())
    }

    /// Build a provider with explicit options.
    ///
    /// In eager mode every configuration error reachable from a closed
    /// registration (cycles, missing dependencies, failing singleton
    /// constructors) is returned here and no provider is produced.
    pub fn build_with(services: ServiceCollection, options: ProviderOptions) -> Result<Self> {
        let descriptors = services.descriptors();

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_realizer",
            registrations = descriptors.len(),
            mode = options.mode().as_str(),
            "Building service provider"
        );

        let core = Arc::new(ProviderCore {
            resolver: Arc::new(CallSiteResolver::new(descriptors)),
            pipeline: OnceCell::new(),
            root: Arc::new(ScopeState::new()),
            options,
        });

        if options.mode() == ProviderMode::Eager {
            let root = ServiceScope::root_of(Arc::clone(&core));
            let pipeline = RealizationPipeline::with_bucket_count(
                Arc::clone(&core.resolver),
                descriptors,
                &root,
                options.snapshot_buckets(),
            )?;
            // The core was created above, so the cell is still empty
            let _ = core.pipeline.set(pipeline);
        }

        let provider = Self { core };

        #[cfg(feature = "logging")]
        {
            let diagnostics = provider.diagnostics();
            info!(
                target: "dependency_realizer",
                mode = diagnostics.mode.as_str(),
                snapshot_entries = diagnostics.snapshot_entries,
                root_instances = diagnostics.root_instances,
                "Service provider ready"
            );
        }

        Ok(provider)
    }

    #[inline]
    pub(crate) fn from_core(core: Arc<ProviderCore>) -> Self {
        Self { core }
    }

    /// The root scope, which owns singletons
    #[inline]
    pub fn root_scope(&self) -> ServiceScope {
        ServiceScope::root_of(Arc::clone(&self.core))
    }

    /// Create a new child scope
    #[inline]
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope::child_of(Arc::clone(&self.core))
    }

    /// Resolve a service from the root scope
    #[inline]
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        self.root_scope().get::<T>()
    }

    /// Resolve a closing of an open generic family from the root scope
    #[inline]
    pub fn get_closed<T: Injectable>(&self, definition: &'static str) -> Result<Arc<T>> {
        self.root_scope().get_closed::<T>(definition)
    }

    /// Resolve by key from the root scope
    #[inline]
    pub fn get_key(&self, key: &ServiceKey) -> Result<Instance> {
        self.root_scope().get_key(key)
    }

    /// Try to resolve, returning None on any error
    #[inline]
    pub fn try_get<T: Injectable>(&self) -> Option<Arc<T>> {
        self.get::<T>().ok()
    }

    /// Accessor for `key`, for callers that resolve the same service many times
    #[inline]
    pub fn accessor(&self, key: &ServiceKey) -> Result<Accessor<ServiceScope>> {
        self.core.accessor(key)
    }

    /// Mode this provider was built in
    #[inline]
    pub fn mode(&self) -> ProviderMode {
        self.core.options.mode()
    }

    /// True when lookups are served from a frozen snapshot
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.core.pipeline.get().is_some_and(RealizationPipeline::is_frozen)
    }

    /// Snapshot and resolver counters
    pub fn diagnostics(&self) -> ProviderDiagnostics {
        let snapshot_entries = self
            .core
            .pipeline
            .get()
            .and_then(RealizationPipeline::snapshot)
            .map_or(0, |snapshot| snapshot.len());

        ProviderDiagnostics {
            mode: self.mode(),
            snapshot_entries,
            fallback_lookups: self.core.resolver.fallback_lookups(),
            plans_built: self.core.resolver.plans_built(),
            root_instances: self.core.root.len(),
        }
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("mode", &self.mode())
            .field("frozen", &self.is_frozen())
            .field("resolver", &self.core.resolver)
            .finish()
    }
}
