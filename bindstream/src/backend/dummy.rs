//! Dummy device backend for testing and development.
//!
//! This backend doesn't drive a GPU. It hands out object names, keeps host
//! storage for buffers so mapped writes can be read back, and records every
//! call it receives so tests can count exactly which device calls the caches
//! issued.

use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::context::ContextId;
use crate::types::{BindTarget, DeviceLimits, ResourceDescriptor, ResourceKind, SlotKind};

use super::{BackendError, DeviceBackend, MappedMemory, ObjectId};

/// A device call received by the [`DummyBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCall {
    /// An object was created.
    Create { kind: ResourceKind, object: ObjectId },
    /// An object was deleted.
    Delete { kind: ResourceKind, object: ObjectId },
    /// A single-slot target was (un)bound.
    Bind { target: BindTarget, object: ObjectId },
    /// An indexed slot was bound.
    BindToIndex {
        kind: SlotKind,
        index: u32,
        object: ObjectId,
    },
    /// A buffer range was mapped.
    Map { object: ObjectId, offset: u64, len: u64 },
    /// A buffer was unmapped.
    Unmap { object: ObjectId },
    /// The current context changed.
    MakeCurrent { context: Option<ContextId> },
}

/// Host storage standing in for buffer memory.
///
/// Only accessed through the raw pointer so mapped writes never alias a
/// live reference.
struct HostStorage {
    ptr: NonNull<u8>,
    len: usize,
}

impl HostStorage {
    fn zeroed(len: usize) -> Self {
        let boxed = vec![0u8; len].into_boxed_slice();
        let raw = Box::into_raw(boxed) as *mut u8;
        Self {
            // SAFETY: Box::into_raw never returns null.
            ptr: unsafe { NonNull::new_unchecked(raw) },
            len,
        }
    }

    fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let end = offset.saturating_add(len).min(self.len);
        let start = offset.min(end);
        // SAFETY: [start, end) lies within the allocation.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(start), end - start).to_vec() }
    }
}

impl Drop for HostStorage {
    fn drop(&mut self) {
        // SAFETY: ptr/len came from Box::into_raw of a boxed slice of this length.
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len,
            )));
        }
    }
}

#[derive(Default)]
struct DummyState {
    calls: Vec<DeviceCall>,
    live: HashMap<ObjectId, ResourceKind>,
    storage: HashMap<ObjectId, HostStorage>,
    mapped: HashSet<ObjectId>,
    failing_labels: HashSet<String>,
}

/// Dummy device backend.
pub struct DummyBackend {
    limits: DeviceLimits,
    next_object: AtomicU32,
    state: Mutex<DummyState>,
}

// SAFETY: HostStorage pointers are owned allocations only touched under the
// state mutex or through MappedMemory handed to a single writer.
unsafe impl Send for DummyBackend {}
unsafe impl Sync for DummyBackend {}

impl DummyBackend {
    /// Create a dummy backend with default limits.
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    /// Create a dummy backend reporting the given limits.
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            next_object: AtomicU32::new(1),
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Make creation of every resource with this label fail.
    pub fn fail_creation_of(&self, label: impl Into<String>) {
        self.state.lock().failing_labels.insert(label.into());
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of single-slot bind calls (including unbinds).
    pub fn bind_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, DeviceCall::Bind { .. }))
    }

    /// Number of indexed bind calls.
    pub fn indexed_bind_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, DeviceCall::BindToIndex { .. }))
    }

    /// Number of map calls.
    pub fn map_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, DeviceCall::Map { .. }))
    }

    /// Number of delete calls.
    pub fn delete_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, DeviceCall::Delete { .. }))
    }

    /// Whether `object` names a live object.
    pub fn is_live(&self, object: ObjectId) -> bool {
        self.state.lock().live.contains_key(&object)
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Whether a buffer is currently mapped.
    pub fn is_mapped(&self, object: ObjectId) -> bool {
        self.state.lock().mapped.contains(&object)
    }

    /// Read back buffer storage.
    pub fn read_buffer(&self, object: ObjectId, offset: u64, len: u64) -> Vec<u8> {
        log::trace!("DummyBackend: read_buffer {object} offset={offset} len={len}");
        self.state
            .lock()
            .storage
            .get(&object)
            .map(|s| s.read(offset as usize, len as usize))
            .unwrap_or_default()
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DummyBackend")
            .field("limits", &self.limits)
            .field("live_objects", &state.live.len())
            .field("recorded_calls", &state.calls.len())
            .finish()
    }
}

impl DeviceBackend for DummyBackend {
    fn name(&self) -> &str {
        "Dummy Backend"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_object(&self, descriptor: &ResourceDescriptor) -> Result<ObjectId, BackendError> {
        let mut state = self.state.lock();
        if let Some(label) = descriptor.label()
            && state.failing_labels.contains(label)
        {
            return Err(BackendError::ResourceCreationFailed(format!(
                "creation of {label:?} rejected"
            )));
        }

        let storage_size = match descriptor {
            ResourceDescriptor::Buffer(desc) => Some(desc.size),
            ResourceDescriptor::UniformBlock(desc) => Some(desc.size),
            _ => None,
        };
        if let Some(size) = storage_size
            && size > self.limits.max_buffer_size
        {
            return Err(BackendError::OutOfMemory);
        }

        let object = self.next_object.fetch_add(1, Ordering::Relaxed);
        let kind = descriptor.kind();
        log::trace!(
            "DummyBackend: creating {kind:?} {:?} -> {object}",
            descriptor.label()
        );

        state.live.insert(object, kind);
        if let Some(size) = storage_size {
            state.storage.insert(object, HostStorage::zeroed(size as usize));
        }
        state.calls.push(DeviceCall::Create { kind, object });
        Ok(object)
    }

    fn delete_object(&self, kind: ResourceKind, object: ObjectId) {
        log::trace!("DummyBackend: deleting {kind:?} {object}");
        let mut state = self.state.lock();
        if state.mapped.remove(&object) {
            log::warn!("DummyBackend: deleting buffer {object} while mapped");
        }
        state.live.remove(&object);
        state.storage.remove(&object);
        state.calls.push(DeviceCall::Delete { kind, object });
    }

    fn bind(&self, target: BindTarget, object: ObjectId) {
        log::trace!("DummyBackend: bind {target:?} <- {object}");
        self.state.lock().calls.push(DeviceCall::Bind { target, object });
    }

    fn bind_to_index(&self, kind: SlotKind, index: u32, object: ObjectId) {
        log::trace!("DummyBackend: bind {kind:?}[{index}] <- {object}");
        self.state
            .lock()
            .calls
            .push(DeviceCall::BindToIndex { kind, index, object });
    }

    fn map_buffer(
        &self,
        object: ObjectId,
        offset: u64,
        len: u64,
    ) -> Result<MappedMemory, BackendError> {
        let mut state = self.state.lock();
        let storage = state
            .storage
            .get(&object)
            .ok_or(BackendError::InvalidObject(object))?;
        if offset.saturating_add(len) > storage.len as u64 {
            return Err(BackendError::MapFailed(format!(
                "range {offset}+{len} exceeds buffer size {}",
                storage.len
            )));
        }

        // SAFETY: the range was checked against the allocation, which lives
        // until the buffer is deleted.
        let mapped = unsafe {
            let ptr = NonNull::new_unchecked(storage.ptr.as_ptr().add(offset as usize));
            MappedMemory::from_raw_parts(ptr, len as usize)
        };

        log::trace!("DummyBackend: map {object} offset={offset} len={len}");
        state.mapped.insert(object);
        state.calls.push(DeviceCall::Map { object, offset, len });
        Ok(mapped)
    }

    fn unmap_buffer(&self, object: ObjectId) {
        log::trace!("DummyBackend: unmap {object}");
        let mut state = self.state.lock();
        state.mapped.remove(&object);
        state.calls.push(DeviceCall::Unmap { object });
    }

    fn make_current(&self, context: Option<ContextId>) {
        log::trace!("DummyBackend: make_current {context:?}");
        self.state
            .lock()
            .calls
            .push(DeviceCall::MakeCurrent { context });
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor};

    #[test]
    fn test_dummy_backend_name() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }

    #[test]
    fn test_object_ids_are_unique_and_nonzero() {
        let backend = DummyBackend::new();
        let a = backend
            .create_object(&TextureDescriptor::new_2d(4, 4).into())
            .unwrap();
        let b = backend.create_object(&ResourceDescriptor::program()).unwrap();
        assert_ne!(a, 0);
        assert_ne!(a, b);
        assert_eq!(backend.live_count(), 2);
    }

    #[test]
    fn test_mapped_write_is_visible() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_object(&BufferDescriptor::new(16, BufferUsage::VERTEX).into())
            .unwrap();

        let mut mapped = backend.map_buffer(buffer, 4, 8).unwrap();
        mapped.write(0, &[7, 7, 7, 7]).unwrap();
        backend.unmap_buffer(buffer);

        assert_eq!(backend.read_buffer(buffer, 0, 8), vec![0, 0, 0, 0, 7, 7, 7, 7]);
        assert!(!backend.is_mapped(buffer));
    }

    #[test]
    fn test_map_out_of_range() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_object(&BufferDescriptor::new(16, BufferUsage::VERTEX).into())
            .unwrap();
        assert!(backend.map_buffer(buffer, 8, 16).is_err());
        assert!(backend.map_buffer(999, 0, 4).is_err());
    }

    #[test]
    fn test_failing_label() {
        let backend = DummyBackend::new();
        backend.fail_creation_of("broken");
        let result = backend.create_object(&ResourceDescriptor::program().with_label("broken"));
        assert!(matches!(
            result,
            Err(BackendError::ResourceCreationFailed(_))
        ));
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_delete_records_call() {
        let backend = DummyBackend::new();
        let program = backend.create_object(&ResourceDescriptor::program()).unwrap();
        backend.delete_object(ResourceKind::Program, program);
        assert!(!backend.is_live(program));
        assert_eq!(backend.delete_calls(), 1);
    }
}
