//! Growable streaming buffer for per-frame vertex data.
//!
//! The allocator hands out contiguous item ranges inside one device buffer.
//! When a reservation does not fit, the buffer is replaced by a larger one
//! and the write cursor restarts at zero. The replaced buffer goes through
//! the namespace disposal queue, so draw calls already recorded against it
//! stay valid until the next disposal flush.
//!
//! # Example
//!
//! ```ignore
//! let streams = context.streams()?;
//! let range = streams.vec2f().push(&[Vertex2f::new(0.0, 0.0), Vertex2f::new(1.0, 0.0)])?;
//! // Draw `range.count` items starting at `range.offset` from `range.object`.
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use crate::backend::{MappedMemory, NULL_OBJECT, ObjectId};
use crate::context::ObjectSpace;
use crate::error::StateError;
use crate::resources::ResourceHandle;
use crate::types::{BufferDescriptor, BufferUsage, DeviceLimits, StreamVertex};

/// Items written by one append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamRange {
    /// Device buffer the items live in.
    pub object: ObjectId,
    /// Buffer generation the range belongs to.
    pub generation: u64,
    /// First item, in items.
    pub offset: u64,
    /// Number of items.
    pub count: u64,
    /// Size of one item in bytes.
    pub item_size: u64,
}

impl StreamRange {
    /// Offset of the first item in bytes.
    pub fn byte_offset(&self) -> u64 {
        self.offset * self.item_size
    }

    /// Length of the range in bytes.
    pub fn byte_len(&self) -> u64 {
        self.count * self.item_size
    }
}

#[derive(Debug, Clone, Copy)]
struct Reservation {
    offset: u64,
    count: u64,
}

struct StreamingBuffer {
    resource: ResourceHandle,
    object: ObjectId,
    capacity: u64,
    write_cursor: u64,
    mapping: Option<MappedMemory>,
    generation: u64,
}

/// Append-only item allocator over one growable device buffer.
///
/// Offsets and counts are in items of `V`. The buffer is created lazily on
/// the first reservation and kept persistently mapped when the device
/// supports it; otherwise every append maps, copies and unmaps.
///
/// # Caller contract
///
/// Draw calls recorded against the buffer must have been consumed by the
/// device before [`reset_frame`](Self::reset_frame) rewinds the cursor, and
/// each [`reserve`](Self::reserve) should be followed by its
/// [`append`](Self::append) before the next reservation.
pub struct StreamingBufferAllocator<V: StreamVertex> {
    space: Arc<ObjectSpace>,
    increment: u64,
    persistent: bool,
    max_buffer_size: u64,
    current: Option<StreamingBuffer>,
    pending: Option<Reservation>,
    generation: u64,
    grow_count: u64,
    _marker: PhantomData<fn() -> V>,
}

impl<V: StreamVertex> StreamingBufferAllocator<V> {
    /// Create an allocator growing in steps of `increment` items.
    pub fn new(space: Arc<ObjectSpace>, limits: &DeviceLimits, increment: u64) -> Self {
        Self {
            space,
            increment: increment.max(1),
            persistent: limits.persistent_mapping,
            max_buffer_size: limits.max_buffer_size,
            current: None,
            pending: None,
            generation: 0,
            grow_count: 0,
            _marker: PhantomData,
        }
    }

    /// Capacity of the current buffer in items, `0` before the first reservation.
    pub fn capacity(&self) -> u64 {
        self.current.as_ref().map_or(0, |buffer| buffer.capacity)
    }

    /// Items written since the buffer was created or the frame was reset.
    pub fn write_cursor(&self) -> u64 {
        self.current.as_ref().map_or(0, |buffer| buffer.write_cursor)
    }

    /// Items left before the next reservation grows the buffer.
    pub fn remaining(&self) -> u64 {
        self.capacity() - self.write_cursor()
    }

    /// Generation of the current buffer, `0` before the first reservation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of times the buffer was replaced by a larger one.
    pub fn grow_count(&self) -> u64 {
        self.grow_count
    }

    /// Growth step in items.
    pub fn increment(&self) -> u64 {
        self.increment
    }

    /// Whether the buffer stays mapped for its whole lifetime.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// The current device buffer.
    pub fn buffer(&self) -> Option<&ResourceHandle> {
        self.current.as_ref().map(|buffer| &buffer.resource)
    }

    /// Reserve `count` items and return the offset of the first one.
    ///
    /// Grows the buffer when the reservation does not fit. Growing restarts
    /// the cursor, so the returned offset is then `0`.
    pub fn reserve(&mut self, count: u64) -> Result<u64, StateError> {
        if count == 0 {
            return Ok(self.write_cursor());
        }
        if self.pending.is_some() {
            log::debug!("{} stream: previous reservation abandoned", V::NAME);
        }

        let fits = self
            .current
            .as_ref()
            .is_some_and(|buffer| buffer.capacity - buffer.write_cursor >= count);
        if !fits {
            let capacity = self.capacity();
            let target = capacity
                .checked_add(self.increment)
                .map(|next| next.max(round_up(count, self.increment)))
                .ok_or_else(|| self.exhausted(u64::MAX))?;
            if self.current.is_some() {
                log::warn!(
                    "{} stream exhausted: {} + {count} items exceeds capacity {capacity}, growing to {target}",
                    V::NAME,
                    self.write_cursor()
                );
            }
            self.replace_buffer(target)?;
        }

        let buffer = self
            .current
            .as_mut()
            .ok_or_else(|| StateError::InvalidOperation("stream buffer missing".to_string()))?;
        let offset = buffer.write_cursor;
        buffer.write_cursor += count;
        self.pending = Some(Reservation { offset, count });
        Ok(offset)
    }

    /// Replace the buffer with one holding at least `capacity` items.
    ///
    /// Fails with [`StateError::InvalidOperation`] while a reservation is
    /// outstanding, since its offset would point into the old buffer.
    pub fn grow(&mut self, capacity: u64) -> Result<(), StateError> {
        if self.pending.is_some() {
            return Err(StateError::InvalidOperation(format!(
                "cannot grow {} stream while a reservation is outstanding",
                V::NAME
            )));
        }
        if capacity <= self.capacity() {
            return Ok(());
        }
        self.replace_buffer(round_up(capacity, self.increment))
    }

    /// Write `items` into the outstanding reservation.
    ///
    /// Without an outstanding reservation the items are reserved first.
    /// Fails with [`StateError::InvalidArgument`] if `items` is longer than
    /// the reservation.
    pub fn append(&mut self, items: &[V]) -> Result<StreamRange, StateError> {
        let count = items.len() as u64;
        if count == 0 {
            return Ok(self.range(self.write_cursor(), 0));
        }

        let reservation = match self.pending.take() {
            Some(reservation) if count > reservation.count => {
                self.pending = Some(reservation);
                return Err(StateError::InvalidArgument(format!(
                    "append of {count} items exceeds reservation of {}",
                    reservation.count
                )));
            }
            Some(reservation) => reservation,
            None => {
                let offset = self.reserve(count)?;
                self.pending = None;
                Reservation { offset, count }
            }
        };

        let backend = self.space.backend();
        let buffer = self
            .current
            .as_mut()
            .ok_or_else(|| StateError::InvalidOperation("stream buffer missing".to_string()))?;
        let bytes: &[u8] = bytemuck::cast_slice(items);
        let byte_offset = reservation.offset * V::SIZE;

        match buffer.mapping.as_mut() {
            Some(mapping) => mapping.write(byte_offset as usize, bytes)?,
            None => {
                let mut mapping =
                    backend.map_buffer(buffer.object, byte_offset, bytes.len() as u64)?;
                let written = mapping.write(0, bytes);
                drop(mapping);
                backend.unmap_buffer(buffer.object);
                written?;
            }
        }

        log::trace!(
            "{} stream: {count} items at {} (generation {})",
            V::NAME,
            reservation.offset,
            buffer.generation
        );
        Ok(self.range(reservation.offset, count))
    }

    /// Reserve and write `items` in one step.
    pub fn push(&mut self, items: &[V]) -> Result<StreamRange, StateError> {
        self.pending = None;
        self.append(items)
    }

    /// Rewind the write cursor after a completed present.
    ///
    /// The buffer is kept.
    pub fn reset_frame(&mut self) {
        self.pending = None;
        if let Some(buffer) = self.current.as_mut() {
            buffer.write_cursor = 0;
        }
    }

    fn range(&self, offset: u64, count: u64) -> StreamRange {
        StreamRange {
            object: self
                .current
                .as_ref()
                .map_or(NULL_OBJECT, |buffer| buffer.object),
            generation: self.generation,
            offset,
            count,
            item_size: V::SIZE,
        }
    }

    fn exhausted(&self, capacity: u64) -> StateError {
        StateError::ResourceExhausted(format!(
            "{} stream of {capacity} items exceeds the device buffer size limit of {} bytes",
            V::NAME,
            self.max_buffer_size
        ))
    }

    /// Create the new buffer first, then retire the old one.
    fn replace_buffer(&mut self, capacity: u64) -> Result<(), StateError> {
        let size = capacity
            .checked_mul(V::SIZE)
            .filter(|&size| size <= self.max_buffer_size)
            .ok_or_else(|| self.exhausted(capacity))?;

        let mut usage = BufferUsage::VERTEX | BufferUsage::STREAM;
        if self.persistent {
            usage |= BufferUsage::PERSISTENT;
        }
        let descriptor =
            BufferDescriptor::new(size, usage).with_label(format!("{}_stream", V::NAME));

        let backend = self.space.backend();
        let lifecycle = self.space.lifecycle();
        let resource = lifecycle.declare(descriptor);
        if let Err(e) = lifecycle.realize(backend.as_ref(), &resource) {
            lifecycle.dec_ref(&resource)?;
            return Err(e);
        }
        let object = resource.object().ok_or_else(|| {
            StateError::InvalidOperation(format!("{} stream buffer was not created", V::NAME))
        })?;

        let mapping = if self.persistent {
            match backend.map_buffer(object, 0, size) {
                Ok(mapping) => Some(mapping),
                Err(e) => {
                    lifecycle.dec_ref(&resource)?;
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let replaced = self.current.replace(StreamingBuffer {
            resource,
            object,
            capacity,
            write_cursor: 0,
            mapping,
            generation: self.generation + 1,
        });
        self.generation += 1;
        if let Some(old) = replaced {
            self.grow_count += 1;
            self.retire(old);
        }
        log::debug!(
            "{} stream buffer {object}: {capacity} items, generation {}",
            V::NAME,
            self.generation
        );
        Ok(())
    }

    /// Unmap the current buffer and hand it to the disposal queue.
    ///
    /// The next reservation allocates a fresh buffer.
    pub(crate) fn retire_current(&mut self) {
        self.pending = None;
        if let Some(buffer) = self.current.take() {
            self.retire(buffer);
        }
    }

    /// Unmap and hand a buffer to the disposal queue.
    fn retire(&self, mut buffer: StreamingBuffer) {
        if buffer.mapping.take().is_some() {
            self.space.backend().unmap_buffer(buffer.object);
        }
        if let Err(e) = self.space.lifecycle().dec_ref(&buffer.resource) {
            log::error!("Failed to release {} stream buffer: {e}", V::NAME);
        }
    }
}

impl<V: StreamVertex> Drop for StreamingBufferAllocator<V> {
    fn drop(&mut self) {
        self.retire_current();
    }
}

impl<V: StreamVertex> std::fmt::Debug for StreamingBufferAllocator<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingBufferAllocator")
            .field("item", &V::NAME)
            .field("capacity", &self.capacity())
            .field("write_cursor", &self.write_cursor())
            .field("generation", &self.generation)
            .field("persistent", &self.persistent)
            .finish()
    }
}

/// Round `count` up to a multiple of `step`.
fn round_up(count: u64, step: u64) -> u64 {
    count.div_ceil(step).saturating_mul(step)
}
