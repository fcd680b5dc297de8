//! Device contexts.
//!
//! A [`DeviceContext`] owns everything that mirrors per-context device state:
//! the single-slot binding records, the slot tables and the vertex streams.
//! Contexts created with [`DeviceContext::new_shared`] share an
//! [`ObjectSpace`], so resources created in one are valid in the other and
//! their reference counts are kept once for the whole namespace.
//!
//! Context-bound operations require the context to be current on the calling
//! thread; see [`DeviceContext::make_current`].

mod current;
mod space;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

pub use current::current_context;
pub use space::{Namespace, ObjectSpace};

use crate::backend::DeviceBackend;
use crate::binding::{BindingCache, SlotAllocator, SlotBinding};
use crate::error::StateError;
use crate::lifecycle::ResourceLifecycle;
use crate::resources::ResourceHandle;
use crate::streaming::VertexStreams;
use crate::types::{ContextConfig, DeviceLimits, ResourceDescriptor};

use current::OwnerRecord;

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identifier of a device context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild an id from its raw value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A logical device context.
///
/// Not thread-safe: the caches are exercised through `&mut self` and every
/// device-touching operation checks that this context is current on the
/// calling thread.
pub struct DeviceContext {
    id: ContextId,
    space: Arc<ObjectSpace>,
    limits: DeviceLimits,
    config: ContextConfig,
    owner: OwnerRecord,
    bindings: BindingCache,
    slots: SlotAllocator,
    streams: VertexStreams,
}

impl DeviceContext {
    /// Create a context with a fresh object namespace.
    pub fn new(backend: Arc<dyn DeviceBackend>, config: ContextConfig) -> Result<Self, StateError> {
        Self::with_space(ObjectSpace::new(backend), config)
    }

    /// Create a context that shares this context's object namespace.
    pub fn new_shared(&self) -> Result<Self, StateError> {
        Self::with_space(Arc::clone(&self.space), self.config.clone())
    }

    fn with_space(space: Arc<ObjectSpace>, config: ContextConfig) -> Result<Self, StateError> {
        if config.stream_increment == 0 {
            return Err(StateError::InvalidArgument(
                "stream increment must be at least one item".to_string(),
            ));
        }

        let id = ContextId::next();
        let limits = space.backend().limits();
        log::info!(
            "Creating device context {id} on {} (namespace {})",
            space.backend().name(),
            space.namespace()
        );
        log::debug!("Device limits: {limits:?}");

        Ok(Self {
            id,
            bindings: BindingCache::new(),
            slots: SlotAllocator::new(id, &limits, config.eviction_policy),
            streams: VertexStreams::new(Arc::clone(&space), &limits, config.stream_increment),
            space,
            limits,
            config,
            owner: Arc::new(Mutex::new(None)),
        })
    }

    /// The context id.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The object namespace this context belongs to.
    pub fn namespace(&self) -> Namespace {
        self.space.namespace()
    }

    /// The shared object space.
    pub fn space(&self) -> &Arc<ObjectSpace> {
        &self.space
    }

    /// The device backend.
    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        self.space.backend()
    }

    /// Limits queried from the device at construction.
    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// The construction-time configuration.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// The single-slot binding records.
    pub fn bindings(&self) -> &BindingCache {
        &self.bindings
    }

    /// The multi-slot binding tables.
    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    /// The namespace-wide resource lifecycle.
    pub fn lifecycle(&self) -> &ResourceLifecycle {
        self.space.lifecycle()
    }

    // --- Current context ---

    /// Make this context current on the calling thread.
    ///
    /// Any other context current on this thread is released. Fails with
    /// [`StateError::InvalidOperation`] if this context is current on another
    /// thread.
    pub fn make_current(&self) -> Result<(), StateError> {
        current::make_current(self.id, &self.owner, self.backend().as_ref())
    }

    /// Release this context from the calling thread.
    pub fn release_current(&self) -> Result<(), StateError> {
        current::release_current(self.id, &self.owner, self.backend().as_ref())
    }

    /// Returns `true` if this context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        current::is_current(self.id, &self.owner)
    }

    pub(crate) fn ensure_current(&self) -> Result<(), StateError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(StateError::InvalidOperation(format!(
                "context {} is not current on this thread",
                self.id
            )))
        }
    }

    fn check_resource(&self, resource: &ResourceHandle) -> Result<(), StateError> {
        if resource.namespace() != self.namespace() {
            return Err(StateError::InvalidArgument(format!(
                "resource {} belongs to namespace {}, context {} uses {}",
                resource.id(),
                resource.namespace(),
                self.id,
                self.namespace()
            )));
        }
        Ok(())
    }

    // --- Binding ---

    /// Bind `resource` to its single-slot target.
    ///
    /// Returns `true` if a device call was issued. With `force` the call is
    /// always issued.
    pub fn bind(&mut self, resource: &ResourceHandle, force: bool) -> Result<bool, StateError> {
        self.ensure_current()?;
        self.check_resource(resource)?;
        self.bindings
            .bind(self.space.backend().as_ref(), resource, force)
    }

    /// Unbind `resource`'s single-slot target.
    pub fn unbind(&mut self, resource: &ResourceHandle) -> Result<(), StateError> {
        self.ensure_current()?;
        self.check_resource(resource)?;
        self.bindings.unbind(self.space.backend().as_ref(), resource)
    }

    /// Bind a slot-bound resource to any slot of its table.
    pub fn bind_to_slot(&mut self, resource: &ResourceHandle) -> Result<SlotBinding, StateError> {
        self.ensure_current()?;
        self.check_resource(resource)?;
        self.slots
            .bind_to_slot(self.space.backend().as_ref(), resource)
    }

    /// Bind a slot-bound resource to a specific slot index.
    pub fn bind_to_slot_at(
        &mut self,
        resource: &ResourceHandle,
        index: u32,
    ) -> Result<SlotBinding, StateError> {
        self.ensure_current()?;
        self.check_resource(resource)?;
        self.slots
            .bind_to_slot_at(self.space.backend().as_ref(), resource, index)
    }

    /// Unbind a slot-bound resource from whichever slot it holds.
    ///
    /// Returns `true` if it held a slot.
    pub fn unbind_slot(&mut self, resource: &ResourceHandle) -> Result<bool, StateError> {
        self.ensure_current()?;
        self.check_resource(resource)?;
        self.slots.unbind(self.space.backend().as_ref(), resource)
    }

    /// Forget `resource`'s slot without a device call.
    pub fn release_slot(&mut self, resource: &ResourceHandle) -> bool {
        self.slots.release(resource)
    }

    /// Forget every single-slot record, e.g. after foreign code touched the
    /// device state.
    pub fn invalidate_bindings(&mut self) {
        self.bindings.clear();
    }

    // --- Streaming ---

    /// The per-shape vertex streams.
    pub fn streams(&mut self) -> Result<&mut VertexStreams, StateError> {
        self.ensure_current()?;
        Ok(&mut self.streams)
    }

    /// Rewind every vertex stream after a completed present.
    pub fn reset_frame(&mut self) -> Result<(), StateError> {
        self.ensure_current()?;
        self.streams.reset_frame();
        Ok(())
    }

    // --- Lifecycle ---

    /// Declare and create a resource in this context's namespace.
    pub fn create_resource(
        &self,
        descriptor: impl Into<ResourceDescriptor>,
    ) -> Result<ResourceHandle, StateError> {
        self.lifecycle().create(self, descriptor)
    }

    /// Declare a resource without creating its device object.
    pub fn declare_resource(&self, descriptor: impl Into<ResourceDescriptor>) -> ResourceHandle {
        self.lifecycle().declare(descriptor)
    }

    /// Add a reference to `resource`.
    pub fn inc_ref(&self, resource: &ResourceHandle) -> Result<u32, StateError> {
        self.lifecycle().inc_ref(resource)
    }

    /// Drop a reference to `resource`. Returns `true` if it was queued for disposal.
    pub fn dec_ref(&self, resource: &ResourceHandle) -> Result<bool, StateError> {
        self.lifecycle().dec_ref(resource)
    }

    /// Destroy every queued resource using this context.
    pub fn flush_disposals(&self) -> Result<usize, StateError> {
        self.lifecycle().flush_disposals(self)
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        // Unmapping needs the context, so streams go before it is released.
        self.streams.retire_all();
        if self.is_current() {
            self.backend().make_current(None);
        }
        current::forget(self.id, &self.owner);
        log::debug!("Device context {} dropped", self.id);
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("id", &self.id)
            .field("namespace", &self.namespace())
            .field("backend", &self.backend().name())
            .field("current", &self.is_current())
            .finish()
    }
}

static_assertions::assert_impl_all!(DeviceContext: Send);
static_assertions::assert_not_impl_any!(DeviceContext: Sync);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::{DeviceCall, DummyBackend};
    use crate::types::{BufferDescriptor, BufferUsage};

    fn context(backend: &Arc<DummyBackend>) -> DeviceContext {
        DeviceContext::new(backend.clone(), ContextConfig::default()).unwrap()
    }

    #[test]
    fn test_zero_increment_is_rejected() {
        let backend = Arc::new(DummyBackend::new());
        let config = ContextConfig::default().with_stream_increment(0);
        assert!(matches!(
            DeviceContext::new(backend, config),
            Err(StateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_make_current_switches_thread_slot() {
        let backend = Arc::new(DummyBackend::new());
        let a = context(&backend);
        let b = a.new_shared().unwrap();

        a.make_current().unwrap();
        assert!(a.is_current());
        assert_eq!(current_context(), Some(a.id()));

        b.make_current().unwrap();
        assert!(!a.is_current());
        assert!(b.is_current());
        assert_eq!(current_context(), Some(b.id()));

        b.release_current().unwrap();
        assert_eq!(current_context(), None);
        assert!(b.release_current().is_err());
    }

    #[test]
    fn test_context_current_on_one_thread_only() {
        let backend = Arc::new(DummyBackend::new());
        let ctx = context(&backend);
        ctx.make_current().unwrap();

        let ctx = std::thread::spawn(move || {
            assert!(!ctx.is_current());
            assert!(matches!(
                ctx.make_current(),
                Err(StateError::InvalidOperation(_))
            ));
            ctx
        })
        .join()
        .unwrap();
        assert!(ctx.is_current());
    }

    #[test]
    fn test_bind_requires_current_context() {
        let backend = Arc::new(DummyBackend::new());
        let mut ctx = context(&backend);
        ctx.make_current().unwrap();
        let buffer = ctx
            .create_resource(BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        ctx.release_current().unwrap();

        assert!(matches!(
            ctx.bind(&buffer, false),
            Err(StateError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_shared_context_sees_same_namespace() {
        let backend = Arc::new(DummyBackend::new());
        let a = context(&backend);
        let b = a.new_shared().unwrap();
        let c = context(&backend);

        assert_eq!(a.namespace(), b.namespace());
        assert_ne!(a.namespace(), c.namespace());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_drop_releases_current() {
        let backend = Arc::new(DummyBackend::new());
        let ctx = context(&backend);
        ctx.make_current().unwrap();
        drop(ctx);

        assert_eq!(current_context(), None);
        assert_eq!(
            backend.calls().last(),
            Some(&DeviceCall::MakeCurrent { context: None })
        );
    }
}
