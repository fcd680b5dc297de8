//! Shared handle to a device object.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{NULL_OBJECT, ObjectId};
use crate::context::{ContextId, Namespace};
use crate::types::{BindTarget, ResourceDescriptor, ResourceKind, SlotKind};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Packed "no slot assigned" marker.
const UNASSIGNED: u64 = u64::MAX;

fn pack_slot(context: ContextId, index: u32) -> u64 {
    (u64::from(context.raw()) << 32) | u64::from(index)
}

fn unpack_slot(packed: u64) -> Option<(ContextId, u32)> {
    (packed != UNASSIGNED).then(|| (ContextId::from_raw((packed >> 32) as u32), packed as u32))
}

/// Lifetime state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResourceState {
    /// Declared, device object not created yet.
    Pending = 0,
    /// Device object exists and the handle is referenced.
    Live = 1,
    /// Unreferenced, waiting in the disposal queue.
    Queued = 2,
    /// Device object deleted.
    Destroyed = 3,
}

impl ResourceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Live,
            2 => Self::Queued,
            _ => Self::Destroyed,
        }
    }
}

struct Lifetime {
    state: ResourceState,
    ref_count: u32,
}

struct ResourceShared {
    id: u64,
    descriptor: ResourceDescriptor,
    namespace: Namespace,
    lifetime: Mutex<Lifetime>,
    // Lock-free mirrors of `lifetime`, written only while it is held.
    state: AtomicU8,
    object: AtomicU32,
    generation: AtomicU64,
    slot: AtomicU64,
}

/// A reference to a device object owned by an object namespace.
///
/// Cloning the handle does not touch the device reference count; that count
/// is managed explicitly through [`ResourceLifecycle`](crate::ResourceLifecycle).
/// A handle is usable for binding only while it is [`ResourceState::Live`].
#[derive(Clone)]
pub struct ResourceHandle {
    shared: Arc<ResourceShared>,
}

impl ResourceHandle {
    /// Declare a resource in `namespace` with a reference count of one.
    pub(crate) fn new(descriptor: ResourceDescriptor, namespace: Namespace) -> Self {
        Self {
            shared: Arc::new(ResourceShared {
                id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
                descriptor,
                namespace,
                lifetime: Mutex::new(Lifetime {
                    state: ResourceState::Pending,
                    ref_count: 1,
                }),
                state: AtomicU8::new(ResourceState::Pending as u8),
                object: AtomicU32::new(NULL_OBJECT),
                generation: AtomicU64::new(0),
                slot: AtomicU64::new(UNASSIGNED),
            }),
        }
    }

    /// Process-unique id of this handle.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// The creation descriptor.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.shared.descriptor
    }

    /// The object kind.
    pub fn kind(&self) -> ResourceKind {
        self.shared.descriptor.kind()
    }

    /// The debug label, if set.
    pub fn label(&self) -> Option<&str> {
        self.shared.descriptor.label()
    }

    /// The namespace that owns the device object.
    pub fn namespace(&self) -> Namespace {
        self.shared.namespace
    }

    /// The single-slot binding point, [`BindTarget::None`] for slot-bound kinds.
    pub fn binding_target(&self) -> BindTarget {
        self.shared.descriptor.binding_target()
    }

    /// The slot table used by slot-bound kinds.
    pub fn slot_kind(&self) -> Option<SlotKind> {
        self.shared.descriptor.slot_kind()
    }

    /// Current lifetime state.
    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Returns `true` while the device object exists and is referenced.
    pub fn is_live(&self) -> bool {
        self.state() == ResourceState::Live
    }

    /// The device object name, if the resource is live.
    pub fn object(&self) -> Option<ObjectId> {
        if !self.is_live() {
            return None;
        }
        match self.shared.object.load(Ordering::Acquire) {
            NULL_OBJECT => None,
            object => Some(object),
        }
    }

    /// Incremented every time the device object is created or destroyed.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Current device reference count.
    pub fn ref_count(&self) -> u32 {
        self.shared.lifetime.lock().ref_count
    }

    /// Slot index assigned to this resource by `context`, if any.
    ///
    /// This is the occupant-side back reference; slot tables re-validate it
    /// before trusting it.
    pub fn assigned_slot(&self, context: ContextId) -> Option<u32> {
        unpack_slot(self.shared.slot.load(Ordering::Acquire))
            .filter(|(owner, _)| *owner == context)
            .map(|(_, index)| index)
    }

    pub(crate) fn set_slot(&self, context: ContextId, index: u32) {
        self.shared
            .slot
            .store(pack_slot(context, index), Ordering::Release);
    }

    /// Clear the slot record only if it still says `context` holds `index`.
    pub(crate) fn clear_slot_if(&self, context: ContextId, index: u32) -> bool {
        self.shared
            .slot
            .compare_exchange(
                pack_slot(context, index),
                UNASSIGNED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn downgrade(&self) -> WeakResource {
        WeakResource {
            shared: Arc::downgrade(&self.shared),
            generation: self.generation(),
        }
    }

    fn publish(&self, lifetime: &Lifetime) {
        self.shared
            .state
            .store(lifetime.state as u8, Ordering::Release);
    }

    /// Pending -> Live. Returns `false` if the resource left `Pending` first.
    pub(crate) fn mark_created(&self, object: ObjectId) -> bool {
        let mut lifetime = self.shared.lifetime.lock();
        if lifetime.state != ResourceState::Pending {
            return false;
        }
        lifetime.state = ResourceState::Live;
        self.shared.object.store(object, Ordering::Release);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.publish(&lifetime);
        true
    }

    /// Add a reference. Fails once the count has reached zero.
    pub(crate) fn retain(&self) -> Option<u32> {
        let mut lifetime = self.shared.lifetime.lock();
        if lifetime.ref_count == 0 {
            return None;
        }
        lifetime.ref_count += 1;
        Some(lifetime.ref_count)
    }

    /// Drop a reference. Returns `Some(true)` when this call moved the
    /// resource to `Queued`, `Some(false)` when references remain and `None`
    /// when the count was already zero.
    pub(crate) fn release(&self) -> Option<bool> {
        let mut lifetime = self.shared.lifetime.lock();
        if lifetime.ref_count == 0 {
            return None;
        }
        lifetime.ref_count -= 1;
        if lifetime.ref_count > 0 {
            return Some(false);
        }
        lifetime.state = ResourceState::Queued;
        self.publish(&lifetime);
        Some(true)
    }

    /// Queued -> Destroyed. Returns the device object to delete, if one was created.
    pub(crate) fn mark_destroyed(&self) -> Option<ObjectId> {
        let mut lifetime = self.shared.lifetime.lock();
        if lifetime.state == ResourceState::Destroyed {
            return None;
        }
        lifetime.state = ResourceState::Destroyed;
        let object = self.shared.object.swap(NULL_OBJECT, Ordering::AcqRel);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.slot.store(UNASSIGNED, Ordering::Release);
        self.publish(&lifetime);
        (object != NULL_OBJECT).then_some(object)
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for ResourceHandle {}

impl std::hash::Hash for ResourceHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.shared.id.hash(state);
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.shared.id)
            .field("kind", &self.kind())
            .field("label", &self.label())
            .field("state", &self.state())
            .field("object", &self.shared.object.load(Ordering::Relaxed))
            .field("generation", &self.generation())
            .finish()
    }
}

/// Non-owning reference to a resource as it was at one generation.
///
/// Used by binding records and slot tables. It never keeps the handle alive,
/// and it stops matching as soon as the device object is destroyed or
/// recreated.
#[derive(Debug, Clone)]
pub(crate) struct WeakResource {
    shared: Weak<ResourceShared>,
    generation: u64,
}

impl WeakResource {
    /// Returns `true` if this record names `resource` in its current, live generation.
    pub fn refers_to(&self, resource: &ResourceHandle) -> bool {
        self.same_handle(resource)
            && self.generation == resource.generation()
            && resource.is_live()
    }

    /// Returns `true` if this record points at `resource` in any generation.
    pub fn same_handle(&self, resource: &ResourceHandle) -> bool {
        std::ptr::eq(self.shared.as_ptr(), Arc::as_ptr(&resource.shared))
    }

    /// The referenced handle, if it is still live at the recorded generation.
    pub fn upgrade(&self) -> Option<ResourceHandle> {
        let handle = ResourceHandle {
            shared: self.shared.upgrade()?,
        };
        (handle.generation() == self.generation && handle.is_live()).then_some(handle)
    }

    /// The referenced handle in any state, if it has not been dropped.
    pub fn upgrade_any(&self) -> Option<ResourceHandle> {
        self.shared
            .upgrade()
            .map(|shared| ResourceHandle { shared })
    }
}

static_assertions::assert_impl_all!(ResourceHandle: Send, Sync);
