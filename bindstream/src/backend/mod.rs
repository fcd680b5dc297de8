//! Device API abstraction layer.
//!
//! The binding layer never talks to a driver directly. Everything it needs
//! from the device goes through the narrow [`DeviceBackend`] trait, which a
//! real renderer implements on top of its graphics API bindings.
//!
//! # Available Backends
//!
//! - `dummy` (default feature): software backend that records every call,
//!   used for testing and development without a GPU.
//!
//! # Call Model
//!
//! Every trait method maps to exactly one device call. The caches in this
//! crate decide *whether* to call; backends only execute.

#[cfg(feature = "dummy")]
pub mod dummy;
mod error;

use std::ptr::NonNull;

pub use error::BackendError;

use crate::context::ContextId;
use crate::types::{BindTarget, DeviceLimits, ResourceDescriptor, ResourceKind, SlotKind};

/// Device-side object name. `0` is the null object.
pub type ObjectId = u32;

/// The null object, used to unbind a target.
pub const NULL_OBJECT: ObjectId = 0;

/// The subset of a stateful device API used by the binding layer.
///
/// Implementations are shared by every context of an object space, so they
/// must be `Send + Sync`; the device itself serialises calls per context.
pub trait DeviceBackend: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Query the device limits.
    fn limits(&self) -> DeviceLimits;

    /// Create a device object and return its name.
    fn create_object(&self, descriptor: &ResourceDescriptor) -> Result<ObjectId, BackendError>;

    /// Delete a device object.
    fn delete_object(&self, kind: ResourceKind, object: ObjectId);

    /// Bind `object` to a single-slot target. [`NULL_OBJECT`] unbinds.
    fn bind(&self, target: BindTarget, object: ObjectId);

    /// Bind `object` to an indexed slot.
    fn bind_to_index(&self, kind: SlotKind, index: u32, object: ObjectId);

    /// Map a byte range of a buffer for writing.
    fn map_buffer(
        &self,
        object: ObjectId,
        offset: u64,
        len: u64,
    ) -> Result<MappedMemory, BackendError>;

    /// Unmap a previously mapped buffer.
    fn unmap_buffer(&self, object: ObjectId);

    /// Make the given context current on the calling thread, or release it.
    fn make_current(&self, context: Option<ContextId>);
}

/// A mapped range of buffer storage.
///
/// The range stays valid until the owning buffer is unmapped. Writes are
/// bounds-checked against the mapped length.
#[derive(Debug)]
pub struct MappedMemory {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: MappedMemory is a plain address range; the device allows writes
// from whichever thread has the owning context current.
unsafe impl Send for MappedMemory {}

impl MappedMemory {
    /// Wrap a raw mapped range.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `len` bytes until the buffer that
    /// produced it is unmapped or deleted, and nothing else may write the
    /// range concurrently.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Length of the mapped range in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the mapped range is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `data` into the mapped range at `offset` bytes.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), BackendError> {
        let end = offset
            .checked_add(data.len())
            .ok_or_else(|| BackendError::MapFailed("write range overflows".to_string()))?;
        if end > self.len {
            return Err(BackendError::MapFailed(format!(
                "write of {} bytes at offset {offset} exceeds mapped length {}",
                data.len(),
                self.len
            )));
        }

        // SAFETY: the range [offset, end) was bounds-checked above and the
        // constructor contract guarantees the mapping is writable.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len());
        }
        Ok(())
    }
}
