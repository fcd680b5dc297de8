//! Resource reference counting and deferred destruction.
//!
//! Every object namespace has one [`ResourceLifecycle`]. References are
//! counted per namespace, not per context: a resource shared by several
//! contexts is queued once, when the last reference goes away, and its
//! device object is deleted when any context of the namespace flushes the
//! disposal queue.
//!
//! # Lifetime
//!
//! ```text
//! declare ──► Pending ──create──► Live ──dec_ref to 0──► Queued ──flush──► Destroyed
//!                │                                          ▲
//!                └────────────── dec_ref to 0 ──────────────┘
//! ```
//!
//! Disposal bumps the resource generation, so every binding record and
//! slot entry that still names it goes stale.

pub mod worker;

use parking_lot::Mutex;

use crate::backend::DeviceBackend;
use crate::context::{DeviceContext, Namespace};
use crate::error::StateError;
use crate::resources::{ResourceHandle, ResourceState};
use crate::types::ResourceDescriptor;

/// Resources waiting for their device objects to be deleted.
#[derive(Debug, Default)]
struct DisposalQueue {
    pending: Vec<ResourceHandle>,
}

/// Reference counting and disposal for one object namespace.
pub struct ResourceLifecycle {
    namespace: Namespace,
    queue: Mutex<DisposalQueue>,
}

impl ResourceLifecycle {
    pub(crate) fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            queue: Mutex::new(DisposalQueue::default()),
        }
    }

    /// The namespace whose resources this lifecycle tracks.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Declare a resource with one reference and no device object yet.
    ///
    /// The object is created later by [`create_declared`](Self::create_declared)
    /// or a [`CreationWorker`](worker::CreationWorker).
    pub fn declare(&self, descriptor: impl Into<ResourceDescriptor>) -> ResourceHandle {
        let resource = ResourceHandle::new(descriptor.into(), self.namespace);
        log::trace!(
            "Declared {:?} resource {} ({:?})",
            resource.kind(),
            resource.id(),
            resource.label()
        );
        resource
    }

    /// Declare a resource and create its device object in `context`.
    pub fn create(
        &self,
        context: &DeviceContext,
        descriptor: impl Into<ResourceDescriptor>,
    ) -> Result<ResourceHandle, StateError> {
        let resource = self.declare(descriptor);
        self.create_declared(context, &resource)?;
        Ok(resource)
    }

    /// Create the device object of a declared resource in `context`.
    pub fn create_declared(
        &self,
        context: &DeviceContext,
        resource: &ResourceHandle,
    ) -> Result<(), StateError> {
        context.ensure_current()?;
        self.check_context(context)?;
        self.check_namespace(resource)?;
        self.realize(context.backend().as_ref(), resource)
    }

    /// Create the device object of a `Pending` resource.
    pub(crate) fn realize(
        &self,
        backend: &dyn DeviceBackend,
        resource: &ResourceHandle,
    ) -> Result<(), StateError> {
        if resource.state() != ResourceState::Pending {
            return Err(StateError::InvalidArgument(format!(
                "resource {} is {:?}, not pending creation",
                resource.id(),
                resource.state()
            )));
        }

        let object = backend.create_object(resource.descriptor())?;
        if !resource.mark_created(object) {
            // Released or created elsewhere while the device call ran.
            backend.delete_object(resource.kind(), object);
            return Err(StateError::InvalidArgument(format!(
                "resource {} left pending state during creation",
                resource.id()
            )));
        }

        log::trace!(
            "Created {:?} resource {} as object {object}",
            resource.kind(),
            resource.id()
        );
        Ok(())
    }

    /// Add a reference. Returns the new count.
    ///
    /// Resources whose count already reached zero cannot be revived.
    pub fn inc_ref(&self, resource: &ResourceHandle) -> Result<u32, StateError> {
        self.check_namespace(resource)?;
        resource.retain().ok_or_else(|| {
            StateError::InvalidArgument(format!(
                "resource {} is {:?} and cannot gain references",
                resource.id(),
                resource.state()
            ))
        })
    }

    /// Drop a reference. Returns `true` if this call queued the resource.
    ///
    /// Extra calls after the count reached zero are ignored with a warning.
    pub fn dec_ref(&self, resource: &ResourceHandle) -> Result<bool, StateError> {
        self.check_namespace(resource)?;
        match resource.release() {
            Some(true) => {
                self.queue.lock().pending.push(resource.clone());
                log::debug!(
                    "Resource {} ({:?}) queued for disposal",
                    resource.id(),
                    resource.label()
                );
                Ok(true)
            }
            Some(false) => Ok(false),
            None => {
                log::warn!(
                    "dec_ref on resource {} with no references left; ignored",
                    resource.id()
                );
                Ok(false)
            }
        }
    }

    /// Delete the device objects of every queued resource using `context`.
    ///
    /// `context` must belong to this namespace and be current on the calling
    /// thread. Returns the number of resources disposed.
    pub fn flush_disposals(&self, context: &DeviceContext) -> Result<usize, StateError> {
        context.ensure_current()?;
        self.check_context(context)?;

        let drained = std::mem::take(&mut self.queue.lock().pending);
        let backend = context.backend();
        let mut deleted = 0;
        for resource in &drained {
            if let Some(object) = resource.mark_destroyed() {
                backend.delete_object(resource.kind(), object);
                deleted += 1;
            }
        }

        if !drained.is_empty() {
            log::debug!(
                "Disposed {} resources ({deleted} device objects) in context {}",
                drained.len(),
                context.id()
            );
        }
        Ok(drained.len())
    }

    /// Number of resources waiting for disposal.
    pub fn pending_disposals(&self) -> usize {
        self.queue.lock().pending.len()
    }

    /// Number of times `resource` appears in the disposal queue.
    pub fn queued_count(&self, resource: &ResourceHandle) -> usize {
        self.queue
            .lock()
            .pending
            .iter()
            .filter(|queued| *queued == resource)
            .count()
    }

    fn check_namespace(&self, resource: &ResourceHandle) -> Result<(), StateError> {
        if resource.namespace() != self.namespace {
            return Err(StateError::InvalidArgument(format!(
                "resource {} belongs to namespace {}, not {}",
                resource.id(),
                resource.namespace(),
                self.namespace
            )));
        }
        Ok(())
    }

    fn check_context(&self, context: &DeviceContext) -> Result<(), StateError> {
        if context.namespace() != self.namespace {
            return Err(StateError::InvalidOperation(format!(
                "context {} uses namespace {}, not {}",
                context.id(),
                context.namespace(),
                self.namespace
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResourceLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLifecycle")
            .field("namespace", &self.namespace)
            .field("pending_disposals", &self.pending_disposals())
            .finish()
    }
}

static_assertions::assert_impl_all!(ResourceLifecycle: Send, Sync);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{ContextConfig, ResourceDescriptor, TextureDescriptor};

    fn current_context(backend: &Arc<DummyBackend>) -> DeviceContext {
        let ctx = DeviceContext::new(backend.clone(), ContextConfig::default()).unwrap();
        ctx.make_current().unwrap();
        ctx
    }

    #[test]
    fn test_refcount_queues_once() {
        let backend = Arc::new(DummyBackend::new());
        let ctx = current_context(&backend);
        let lifecycle = ctx.lifecycle();
        let texture = ctx.create_resource(TextureDescriptor::new_2d(4, 4)).unwrap();

        assert_eq!(lifecycle.inc_ref(&texture).unwrap(), 2);
        assert!(!lifecycle.dec_ref(&texture).unwrap());
        assert!(lifecycle.dec_ref(&texture).unwrap());
        assert!(!lifecycle.dec_ref(&texture).unwrap());

        assert_eq!(texture.ref_count(), 0);
        assert_eq!(texture.state(), ResourceState::Queued);
        assert_eq!(lifecycle.queued_count(&texture), 1);
        assert!(matches!(
            lifecycle.inc_ref(&texture),
            Err(StateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_flush_deletes_device_objects() {
        let backend = Arc::new(DummyBackend::new());
        let ctx = current_context(&backend);
        let program = ctx.create_resource(ResourceDescriptor::program()).unwrap();
        let object = program.object().unwrap();

        ctx.dec_ref(&program).unwrap();
        assert!(backend.is_live(object));
        assert_eq!(ctx.flush_disposals().unwrap(), 1);
        assert!(!backend.is_live(object));
        assert_eq!(program.state(), ResourceState::Destroyed);
        assert_eq!(ctx.lifecycle().pending_disposals(), 0);
        assert_eq!(ctx.flush_disposals().unwrap(), 0);
    }

    #[test]
    fn test_pending_resource_disposes_without_device_call() {
        let backend = Arc::new(DummyBackend::new());
        let ctx = current_context(&backend);
        let declared = ctx.declare_resource(ResourceDescriptor::framebuffer());

        ctx.dec_ref(&declared).unwrap();
        ctx.flush_disposals().unwrap();
        assert_eq!(backend.delete_calls(), 0);
        assert!(matches!(
            ctx.lifecycle().create_declared(&ctx, &declared),
            Err(StateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_flush_requires_current_context() {
        let backend = Arc::new(DummyBackend::new());
        let ctx = current_context(&backend);
        ctx.release_current().unwrap();

        assert!(matches!(
            ctx.flush_disposals(),
            Err(StateError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_foreign_resource_is_rejected() {
        let backend = Arc::new(DummyBackend::new());
        let ctx = current_context(&backend);
        let foreign =
            ResourceLifecycle::new(Namespace::new()).declare(ResourceDescriptor::program());

        assert!(matches!(
            ctx.inc_ref(&foreign),
            Err(StateError::InvalidArgument(_))
        ));
        assert!(matches!(
            ctx.dec_ref(&foreign),
            Err(StateError::InvalidArgument(_))
        ));
    }
}
