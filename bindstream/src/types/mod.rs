//! Common types and descriptors for device resources.
//!
//! This module contains binding target enums, usage flags, descriptor structs,
//! vertex item layouts and the configuration surface used throughout the crate.

mod limits;
mod resource;
mod target;
mod vertex;

pub use limits::{ContextConfig, DeviceLimits, EvictionPolicy};
pub use resource::{
    BlockDescriptor, BufferDescriptor, BufferUsage, ResourceDescriptor, ResourceKind,
    TextureDescriptor,
};
pub use target::{BindTarget, SlotKind};
pub use vertex::{StreamVertex, Vertex2d, Vertex2f, Vertex3f};
