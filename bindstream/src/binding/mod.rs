//! Binding state caches.
//!
//! [`BindingCache`] covers targets with a single binding point (current
//! program, array buffer, framebuffer, ...). [`SlotAllocator`] covers
//! targets with many indexed slots (texture units, uniform and storage
//! buffer indices). [`Bindable`] picks the right one per resource kind.

mod cache;
mod slots;

pub use cache::BindingCache;
pub use slots::{SlotAllocator, SlotBinding, SlotTable};

use crate::context::DeviceContext;
use crate::error::StateError;
use crate::resources::ResourceHandle;
use crate::types::BindTarget;

/// Common binding capability of every resource kind.
pub trait Bindable {
    /// The single-slot target, [`BindTarget::None`] for slot-bound kinds.
    fn binding_target(&self) -> BindTarget;

    /// Bind in `context`. Returns `true` if a device call was issued.
    fn bind(&self, context: &mut DeviceContext) -> Result<bool, StateError>;

    /// Unbind in `context`.
    fn unbind(&self, context: &mut DeviceContext) -> Result<(), StateError>;

    /// Returns `true` if `context` believes this resource is bound.
    fn is_bound(&self, context: &DeviceContext) -> bool;
}

impl Bindable for ResourceHandle {
    fn binding_target(&self) -> BindTarget {
        ResourceHandle::binding_target(self)
    }

    fn bind(&self, context: &mut DeviceContext) -> Result<bool, StateError> {
        if self.slot_kind().is_some() {
            context.bind_to_slot(self).map(|binding| binding.issued)
        } else {
            context.bind(self, false)
        }
    }

    fn unbind(&self, context: &mut DeviceContext) -> Result<(), StateError> {
        if self.slot_kind().is_some() {
            context.unbind_slot(self).map(|_| ())
        } else {
            context.unbind(self)
        }
    }

    fn is_bound(&self, context: &DeviceContext) -> bool {
        if self.slot_kind().is_some() {
            context.slots().slot_of(self).is_some()
        } else {
            context.bindings().is_bound(self)
        }
    }
}
