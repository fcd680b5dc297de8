//! Single-slot binding records.

use crate::backend::{DeviceBackend, NULL_OBJECT, ObjectId};
use crate::error::StateError;
use crate::resources::{ResourceHandle, WeakResource};
use crate::types::BindTarget;

/// What each single-slot target of one context is believed to hold.
///
/// Records never keep a resource alive. A record whose resource was dropped,
/// destroyed or recreated stops matching, which forces the next bind through
/// to the device.
#[derive(Debug)]
pub struct BindingCache {
    records: [Option<WeakResource>; BindTarget::COUNT],
    hits: u64,
    misses: u64,
}

impl BindingCache {
    pub(crate) fn new() -> Self {
        Self {
            records: std::array::from_fn(|_| None),
            hits: 0,
            misses: 0,
        }
    }

    /// Bind `resource` to its target unless the record says it is already bound.
    ///
    /// Returns `true` if the device call was issued.
    pub(crate) fn bind(
        &mut self,
        backend: &dyn DeviceBackend,
        resource: &ResourceHandle,
        force: bool,
    ) -> Result<bool, StateError> {
        let target = cached_target(resource)?;
        let object = resource.object().ok_or_else(|| {
            StateError::InvalidArgument(format!(
                "cannot bind {:?} resource {} in state {:?}",
                resource.kind(),
                resource.id(),
                resource.state()
            ))
        })?;

        let record = &mut self.records[target.index()];
        if !force && record.as_ref().is_some_and(|weak| weak.refers_to(resource)) {
            self.hits += 1;
            log::trace!("bind {target:?} <- {object} elided");
            return Ok(false);
        }

        backend.bind(target, object);
        *record = Some(resource.downgrade());
        self.misses += 1;
        log::trace!("bind {target:?} <- {object}");
        Ok(true)
    }

    /// Unbind `resource`'s target.
    ///
    /// The device call is always issued. Since the target holds nothing
    /// afterwards, the record is cleared even if it named another resource.
    pub(crate) fn unbind(
        &mut self,
        backend: &dyn DeviceBackend,
        resource: &ResourceHandle,
    ) -> Result<(), StateError> {
        let target = cached_target(resource)?;
        backend.bind(target, NULL_OBJECT);
        self.records[target.index()] = None;
        log::trace!("unbind {target:?}");
        Ok(())
    }

    /// Returns `true` if the record for `resource`'s target names it.
    pub fn is_bound(&self, resource: &ResourceHandle) -> bool {
        let target = resource.binding_target();
        !target.is_none()
            && self.records[target.index()]
                .as_ref()
                .is_some_and(|weak| weak.refers_to(resource))
    }

    /// The resource believed bound to `target`, if it is still live.
    pub fn bound(&self, target: BindTarget) -> Option<ResourceHandle> {
        self.records[target.index()]
            .as_ref()
            .and_then(WeakResource::upgrade)
    }

    /// The device object believed bound to `target`.
    pub fn bound_object(&self, target: BindTarget) -> Option<ObjectId> {
        self.bound(target).and_then(|resource| resource.object())
    }

    /// Forget the record for `target`, forcing the next bind through.
    ///
    /// Use after binding through the device behind the cache's back.
    pub fn invalidate(&mut self, target: BindTarget) {
        self.records[target.index()] = None;
    }

    /// Forget every record.
    pub fn clear(&mut self) {
        self.records.iter_mut().for_each(|record| *record = None);
    }

    /// Number of binds elided so far.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of binds issued so far.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

fn cached_target(resource: &ResourceHandle) -> Result<BindTarget, StateError> {
    let target = resource.binding_target();
    if target.is_none() {
        return Err(StateError::InvalidArgument(format!(
            "{:?} resource {} has no single binding target",
            resource.kind(),
            resource.id()
        )));
    }
    Ok(target)
}
