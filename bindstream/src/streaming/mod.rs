//! Per-frame vertex streaming.
//!
//! Each vertex shape gets its own [`StreamingBufferAllocator`]. Double
//! precision items fall back to the single precision stream on devices
//! without double precision vertex attributes.

mod allocator;

use std::sync::Arc;

pub use allocator::{StreamRange, StreamingBufferAllocator};

use crate::context::ObjectSpace;
use crate::error::StateError;
use crate::types::{DeviceLimits, Vertex2d, Vertex2f, Vertex3f};

/// The vertex streams of one context.
#[derive(Debug)]
pub struct VertexStreams {
    vec2f: StreamingBufferAllocator<Vertex2f>,
    vec3f: StreamingBufferAllocator<Vertex3f>,
    vec2d: Option<StreamingBufferAllocator<Vertex2d>>,
}

impl VertexStreams {
    pub(crate) fn new(space: Arc<ObjectSpace>, limits: &DeviceLimits, increment: u64) -> Self {
        Self {
            vec2f: StreamingBufferAllocator::new(Arc::clone(&space), limits, increment),
            vec3f: StreamingBufferAllocator::new(Arc::clone(&space), limits, increment),
            vec2d: limits
                .double_vertex_attributes
                .then(|| StreamingBufferAllocator::new(space, limits, increment)),
        }
    }

    /// Whether double precision items are streamed without narrowing.
    pub fn supports_double(&self) -> bool {
        self.vec2d.is_some()
    }

    pub fn vec2f(&mut self) -> &mut StreamingBufferAllocator<Vertex2f> {
        &mut self.vec2f
    }

    pub fn vec3f(&mut self) -> &mut StreamingBufferAllocator<Vertex3f> {
        &mut self.vec3f
    }

    /// The double precision stream, if the device supports it.
    pub fn vec2d(&mut self) -> Option<&mut StreamingBufferAllocator<Vertex2d>> {
        self.vec2d.as_mut()
    }

    pub fn append_2f(&mut self, items: &[Vertex2f]) -> Result<StreamRange, StateError> {
        self.vec2f.append(items)
    }

    pub fn append_3f(&mut self, items: &[Vertex3f]) -> Result<StreamRange, StateError> {
        self.vec3f.append(items)
    }

    /// Append double precision items.
    ///
    /// Without device support the items are narrowed to single precision and
    /// land in the `vec2f` stream; the returned range then has an item size
    /// of 8 bytes.
    pub fn append_2d(&mut self, items: &[Vertex2d]) -> Result<StreamRange, StateError> {
        match self.vec2d.as_mut() {
            Some(stream) => stream.append(items),
            None => {
                let narrowed: Vec<Vertex2f> = items.iter().map(|item| item.narrow()).collect();
                self.vec2f.append(&narrowed)
            }
        }
    }

    /// Release every stream buffer. Must run while the owning context is current.
    pub(crate) fn retire_all(&mut self) {
        self.vec2f.retire_current();
        self.vec3f.retire_current();
        if let Some(stream) = self.vec2d.as_mut() {
            stream.retire_current();
        }
    }

    /// Rewind every stream.
    pub fn reset_frame(&mut self) {
        self.vec2f.reset_frame();
        self.vec3f.reset_frame();
        if let Some(stream) = self.vec2d.as_mut() {
            stream.reset_frame();
        }
    }
}
