//! Multi-slot binding tables.
//!
//! Texture units, uniform buffer indices and shader storage indices are
//! bounded sets of hardware slots. Each gets its own [`SlotTable`], sized
//! from the device limits, and logical resources are multiplexed across it.
//!
//! Two pieces of bookkeeping have to agree: the table entry (slot -> weak
//! occupant) and the occupant's own back reference (resource -> context and
//! slot). Eviction clears the evicted occupant's back reference before the
//! slot is written, and every fast-path lookup re-validates the back
//! reference against the table.

use crate::backend::{DeviceBackend, NULL_OBJECT, ObjectId};
use crate::context::ContextId;
use crate::error::StateError;
use crate::resources::{ResourceHandle, WeakResource};
use crate::types::{DeviceLimits, EvictionPolicy, SlotKind};

/// Result of a slot bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBinding {
    /// Slot index the resource occupies.
    pub index: u32,
    /// Whether a device call was issued.
    pub issued: bool,
}

/// A fixed-size table of hardware slots of one kind.
#[derive(Debug)]
pub struct SlotTable {
    kind: SlotKind,
    slots: Vec<Option<WeakResource>>,
    cursor: usize,
    evictions: u64,
}

impl SlotTable {
    fn new(kind: SlotKind, len: usize) -> Self {
        Self {
            kind,
            slots: vec![None; len],
            // The first assignment lands on slot 0.
            cursor: len - 1,
            evictions: 0,
        }
    }

    /// The slot kind.
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`; empty tables are never registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the most recently assigned slot.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of live occupants displaced so far.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// The live occupant of `index`, if any.
    pub fn occupant(&self, index: u32) -> Option<ResourceHandle> {
        self.slots
            .get(index as usize)?
            .as_ref()
            .and_then(WeakResource::upgrade)
    }

    fn holds(&self, index: usize, resource: &ResourceHandle) -> bool {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .is_some_and(|weak| weak.refers_to(resource))
    }

    fn position(&self, resource: &ResourceHandle) -> Option<usize> {
        (0..self.slots.len()).find(|&index| self.holds(index, resource))
    }

    fn next_slot(&mut self, policy: EvictionPolicy) -> usize {
        let len = self.slots.len();
        let index = match policy {
            EvictionPolicy::RoundRobin => (self.cursor + 1) % len,
            EvictionPolicy::PreferVacant => (1..=len)
                .map(|step| (self.cursor + step) % len)
                .find(|&index| {
                    self.slots[index]
                        .as_ref()
                        .is_none_or(|weak| weak.upgrade().is_none())
                })
                .unwrap_or((self.cursor + 1) % len),
        };
        self.cursor = index;
        index
    }

    /// Empty `index`, clearing the previous occupant's back reference.
    fn vacate(&mut self, context: ContextId, index: usize, incoming: &ResourceHandle) {
        let Some(previous) = self.slots[index].take() else {
            return;
        };
        if previous.same_handle(incoming) {
            return;
        }
        if let Some(occupant) = previous.upgrade_any() {
            occupant.clear_slot_if(context, index as u32);
        }
        if let Some(occupant) = previous.upgrade() {
            self.evictions += 1;
            log::debug!(
                "{:?} slot {index} evicts resource {} ({:?})",
                self.kind,
                occupant.id(),
                occupant.label()
            );
        }
    }

    fn assign(
        &mut self,
        backend: &dyn DeviceBackend,
        context: ContextId,
        index: usize,
        resource: &ResourceHandle,
        object: ObjectId,
    ) {
        self.vacate(context, index, resource);
        self.slots[index] = Some(resource.downgrade());
        resource.set_slot(context, index as u32);
        backend.bind_to_index(self.kind, index as u32, object);
        log::trace!("bind {:?}[{index}] <- {object}", self.kind);
    }
}

/// Per-context slot tables.
#[derive(Debug)]
pub struct SlotAllocator {
    context: ContextId,
    policy: EvictionPolicy,
    tables: [Option<SlotTable>; 3],
}

impl SlotAllocator {
    pub(crate) fn new(context: ContextId, limits: &DeviceLimits, policy: EvictionPolicy) -> Self {
        let tables = SlotKind::ALL.map(|kind| match limits.slot_count(kind) {
            0 => None,
            count => Some(SlotTable::new(kind, count as usize)),
        });
        Self {
            context,
            policy,
            tables,
        }
    }

    /// The eviction policy shared by every table.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// The table for `kind`, if the device supports it.
    pub fn table(&self, kind: SlotKind) -> Option<&SlotTable> {
        self.tables[kind.index()].as_ref()
    }

    /// Live occupants displaced from the `kind` table so far.
    pub fn eviction_count(&self, kind: SlotKind) -> u64 {
        self.table(kind).map_or(0, SlotTable::evictions)
    }

    /// The slot `resource` occupies in this context, if any.
    pub fn slot_of(&self, resource: &ResourceHandle) -> Option<u32> {
        let table = self.table(resource.slot_kind()?)?;
        if let Some(index) = resource.assigned_slot(self.context)
            && table.holds(index as usize, resource)
        {
            return Some(index);
        }
        table.position(resource).map(|index| index as u32)
    }

    /// Bind `resource` to a slot, reusing the one it already holds.
    pub(crate) fn bind_to_slot(
        &mut self,
        backend: &dyn DeviceBackend,
        resource: &ResourceHandle,
    ) -> Result<SlotBinding, StateError> {
        let context = self.context;
        let policy = self.policy;
        let (table, object) = self.prepare(resource)?;

        if let Some(index) = resource.assigned_slot(context)
            && table.holds(index as usize, resource)
        {
            log::trace!("bind {:?}[{index}] <- {object} elided", table.kind);
            return Ok(SlotBinding {
                index,
                issued: false,
            });
        }

        // The back reference is shared by every context of the namespace and
        // may have been overwritten or cleared by another one.
        if let Some(index) = table.position(resource) {
            resource.set_slot(context, index as u32);
            return Ok(SlotBinding {
                index: index as u32,
                issued: false,
            });
        }

        let index = table.next_slot(policy);
        table.assign(backend, context, index, resource, object);
        Ok(SlotBinding {
            index: index as u32,
            issued: true,
        })
    }

    /// Bind `resource` to the caller-chosen slot `index`.
    ///
    /// The round-robin cursor is left alone.
    pub(crate) fn bind_to_slot_at(
        &mut self,
        backend: &dyn DeviceBackend,
        resource: &ResourceHandle,
        index: u32,
    ) -> Result<SlotBinding, StateError> {
        let context = self.context;
        let (table, object) = self.prepare(resource)?;

        let slot = index as usize;
        if slot >= table.len() {
            return Err(StateError::InvalidArgument(format!(
                "{:?} slot {index} out of range (table has {} slots)",
                table.kind,
                table.len()
            )));
        }

        if table.holds(slot, resource) {
            resource.set_slot(context, index);
            return Ok(SlotBinding {
                index,
                issued: false,
            });
        }

        // At most one slot per resource.
        if let Some(other) = table.position(resource) {
            table.slots[other] = None;
            resource.clear_slot_if(context, other as u32);
        }

        table.assign(backend, context, slot, resource, object);
        Ok(SlotBinding {
            index,
            issued: true,
        })
    }

    /// Unbind `resource` from its slot. Returns `true` if it held one.
    pub(crate) fn unbind(
        &mut self,
        backend: &dyn DeviceBackend,
        resource: &ResourceHandle,
    ) -> Result<bool, StateError> {
        let kind = slot_kind(resource)?;
        let Some(index) = self.take(kind, resource)? else {
            return Ok(false);
        };
        backend.bind_to_index(kind, index, NULL_OBJECT);
        log::trace!("unbind {kind:?}[{index}]");
        Ok(true)
    }

    /// Forget `resource`'s slot without a device call.
    ///
    /// The device keeps the stale binding until the slot is reassigned.
    pub fn release(&mut self, resource: &ResourceHandle) -> bool {
        resource
            .slot_kind()
            .is_some_and(|kind| matches!(self.take(kind, resource), Ok(Some(_))))
    }

    fn take(
        &mut self,
        kind: SlotKind,
        resource: &ResourceHandle,
    ) -> Result<Option<u32>, StateError> {
        let context = self.context;
        let table = self.tables[kind.index()]
            .as_mut()
            .ok_or(StateError::UnsupportedTarget(kind))?;

        let index = (0..table.len()).find(|&index| {
            table.slots[index]
                .as_ref()
                .is_some_and(|weak| weak.same_handle(resource))
        });
        Ok(index.map(|index| {
            table.slots[index] = None;
            resource.clear_slot_if(context, index as u32);
            index as u32
        }))
    }

    fn prepare(
        &mut self,
        resource: &ResourceHandle,
    ) -> Result<(&mut SlotTable, ObjectId), StateError> {
        let kind = slot_kind(resource)?;
        let table = self.tables[kind.index()]
            .as_mut()
            .ok_or(StateError::UnsupportedTarget(kind))?;
        let object = resource.object().ok_or_else(|| {
            StateError::InvalidArgument(format!(
                "cannot bind {:?} resource {} in state {:?}",
                resource.kind(),
                resource.id(),
                resource.state()
            ))
        })?;
        Ok((table, object))
    }
}

fn slot_kind(resource: &ResourceHandle) -> Result<SlotKind, StateError> {
    resource.slot_kind().ok_or_else(|| {
        StateError::InvalidArgument(format!(
            "{:?} resource {} is not slot-bound",
            resource.kind(),
            resource.id()
        ))
    })
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::{DeviceCall, DummyBackend};
    use crate::context::Namespace;
    use crate::types::{BlockDescriptor, ResourceDescriptor, TextureDescriptor};

    const CTX: ContextId = ContextId::from_raw(1);

    fn limits(textures: u32) -> DeviceLimits {
        DeviceLimits {
            max_texture_units: textures,
            max_storage_buffer_bindings: 0,
            ..DeviceLimits::default()
        }
    }

    fn texture(object: ObjectId) -> ResourceHandle {
        let resource =
            ResourceHandle::new(TextureDescriptor::new_2d(4, 4).into(), Namespace::new());
        resource.mark_created(object);
        resource
    }

    #[test]
    fn test_round_robin_assignment_and_eviction() {
        let backend = DummyBackend::new();
        let mut slots = SlotAllocator::new(CTX, &limits(4), EvictionPolicy::RoundRobin);
        let occupants: Vec<_> = (1..=5).map(texture).collect();

        let indices: Vec<u32> = occupants
            .iter()
            .map(|res| slots.bind_to_slot(&backend, res).unwrap().index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 0]);
        assert_eq!(slots.eviction_count(SlotKind::TextureUnit), 1);
        assert_eq!(occupants[0].assigned_slot(CTX), None);
        assert_eq!(occupants[4].assigned_slot(CTX), Some(0));

        let again = slots.bind_to_slot(&backend, &occupants[0]).unwrap();
        assert_eq!(
            again,
            SlotBinding {
                index: 1,
                issued: true
            }
        );
        assert_eq!(occupants[1].assigned_slot(CTX), None);
    }

    #[test]
    fn test_rebind_of_occupant_is_elided() {
        let backend = DummyBackend::new();
        let mut slots = SlotAllocator::new(CTX, &limits(4), EvictionPolicy::RoundRobin);
        let res = texture(1);

        assert!(slots.bind_to_slot(&backend, &res).unwrap().issued);
        assert!(!slots.bind_to_slot(&backend, &res).unwrap().issued);
        assert_eq!(backend.indexed_bind_calls(), 1);
    }

    #[test]
    fn test_prefer_vacant_skips_live_occupants() {
        let backend = DummyBackend::new();
        let mut slots = SlotAllocator::new(CTX, &limits(3), EvictionPolicy::PreferVacant);
        let a = texture(1);
        let b = texture(2);
        slots.bind_to_slot(&backend, &a).unwrap();
        slots.bind_to_slot(&backend, &b).unwrap();

        // Destroying `a` leaves slot 0 stale; the cursor passes slot 2 first.
        a.release();
        a.mark_destroyed();
        let c = texture(3);
        let d = texture(4);
        assert_eq!(slots.bind_to_slot(&backend, &c).unwrap().index, 2);
        assert_eq!(slots.bind_to_slot(&backend, &d).unwrap().index, 0);
        assert_eq!(slots.eviction_count(SlotKind::TextureUnit), 0);
    }

    #[test]
    fn test_explicit_index_moves_occupant() {
        let backend = DummyBackend::new();
        let mut slots = SlotAllocator::new(CTX, &limits(4), EvictionPolicy::RoundRobin);
        let a = texture(1);
        let b = texture(2);

        slots.bind_to_slot(&backend, &a).unwrap();
        slots.bind_to_slot_at(&backend, &b, 0).unwrap();
        assert_eq!(a.assigned_slot(CTX), None);
        assert_eq!(b.assigned_slot(CTX), Some(0));

        slots.bind_to_slot_at(&backend, &b, 3).unwrap();
        let table = slots.table(SlotKind::TextureUnit).unwrap();
        assert_eq!(table.occupant(0), None);
        assert_eq!(table.occupant(3), Some(b.clone()));
        assert_eq!(table.cursor(), 0);

        assert!(matches!(
            slots.bind_to_slot_at(&backend, &b, 4),
            Err(StateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unsupported_table() {
        let backend = DummyBackend::new();
        let mut slots = SlotAllocator::new(CTX, &limits(4), EvictionPolicy::RoundRobin);
        let block = ResourceHandle::new(BlockDescriptor::storage(64).into(), Namespace::new());
        block.mark_created(1);

        assert!(matches!(
            slots.bind_to_slot(&backend, &block),
            Err(StateError::UnsupportedTarget(SlotKind::ShaderStorage))
        ));
    }

    #[test]
    fn test_single_target_kind_is_rejected() {
        let backend = DummyBackend::new();
        let mut slots = SlotAllocator::new(CTX, &limits(4), EvictionPolicy::RoundRobin);
        let program = ResourceHandle::new(ResourceDescriptor::program(), Namespace::new());
        program.mark_created(1);

        assert!(matches!(
            slots.bind_to_slot(&backend, &program),
            Err(StateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unbind_and_release() {
        let backend = DummyBackend::new();
        let mut slots = SlotAllocator::new(CTX, &limits(4), EvictionPolicy::RoundRobin);
        let a = texture(1);
        let b = texture(2);
        slots.bind_to_slot(&backend, &a).unwrap();
        slots.bind_to_slot(&backend, &b).unwrap();

        assert!(slots.unbind(&backend, &a).unwrap());
        assert!(!slots.unbind(&backend, &a).unwrap());
        assert_eq!(
            backend.calls().last(),
            Some(&DeviceCall::BindToIndex {
                kind: SlotKind::TextureUnit,
                index: 0,
                object: NULL_OBJECT
            })
        );

        assert!(slots.release(&b));
        assert_eq!(slots.slot_of(&b), None);
        assert_eq!(backend.indexed_bind_calls(), 3);
    }
}
