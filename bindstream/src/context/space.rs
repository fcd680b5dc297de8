//! Object namespaces shared between contexts.

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::DeviceBackend;
use crate::lifecycle::ResourceLifecycle;

/// Identifier of an object namespace.
///
/// Contexts constructed to share objects report the same namespace; a
/// resource is only valid in contexts whose namespace matches its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace(Uuid);

impl Namespace {
    /// Create a fresh, globally unique namespace.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State shared by every context in one namespace.
///
/// Holds the device connection and the namespace-wide resource lifecycle, so
/// reference counting and disposal happen once per object, not per context.
pub struct ObjectSpace {
    namespace: Namespace,
    backend: Arc<dyn DeviceBackend>,
    lifecycle: ResourceLifecycle,
}

impl ObjectSpace {
    pub(crate) fn new(backend: Arc<dyn DeviceBackend>) -> Arc<Self> {
        let namespace = Namespace::new();
        Arc::new(Self {
            namespace,
            backend,
            lifecycle: ResourceLifecycle::new(namespace),
        })
    }

    /// The namespace identifier.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// The device backend shared by all contexts of this namespace.
    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    /// The namespace-wide resource lifecycle.
    pub fn lifecycle(&self) -> &ResourceLifecycle {
        &self.lifecycle
    }
}

impl std::fmt::Debug for ObjectSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSpace")
            .field("namespace", &self.namespace)
            .field("backend", &self.backend.name())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

static_assertions::assert_impl_all!(ObjectSpace: Send, Sync);
