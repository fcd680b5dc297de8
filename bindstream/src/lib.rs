//! # bindstream
//!
//! State caching and vertex streaming layer for stateful graphics device APIs.
//!
//! ## Overview
//!
//! Stateful device APIs expose a handful of global binding points and make
//! every draw re-establish them. This crate sits between drawing code and
//! the device and removes the redundant calls:
//!
//! - [`BindingCache`] - elides binds of single-slot targets that already hold
//!   the requested resource
//! - [`SlotAllocator`] - multiplexes textures and uniform blocks over the
//!   bounded texture units and buffer binding indices
//! - [`StreamingBufferAllocator`] - growable, optionally persistently mapped
//!   buffers for per-frame vertex data
//! - [`ResourceLifecycle`] - namespace-wide reference counting, deferred
//!   disposal and background creation via [`CreationWorker`]
//!
//! The device itself is reached through the [`DeviceBackend`] trait. The
//! `dummy` feature (on by default) provides [`DummyBackend`], which records
//! every call for tests.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bindstream::{Bindable, ContextConfig, DeviceContext, DummyBackend, ResourceDescriptor};
//!
//! let mut context = DeviceContext::new(Arc::new(DummyBackend::new()), ContextConfig::default())?;
//! context.make_current()?;
//!
//! let program = context.create_resource(ResourceDescriptor::program())?;
//! program.bind(&mut context)?; // issues the device call
//! program.bind(&mut context)?; // elided
//!
//! context.dec_ref(&program)?;
//! context.flush_disposals()?;
//! ```

pub mod backend;
pub mod binding;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod resources;
pub mod streaming;
pub mod types;

// Re-export main types for convenience
#[cfg(feature = "dummy")]
pub use backend::dummy::{DeviceCall, DummyBackend};
pub use backend::{BackendError, DeviceBackend, MappedMemory, NULL_OBJECT, ObjectId};
pub use binding::{Bindable, BindingCache, SlotAllocator, SlotBinding, SlotTable};
pub use context::{ContextId, DeviceContext, Namespace, ObjectSpace, current_context};
pub use error::StateError;
pub use lifecycle::ResourceLifecycle;
pub use lifecycle::worker::{CreationTicket, CreationWorker, WorkerTimeout};
pub use resources::{ResourceHandle, ResourceState};
pub use streaming::{StreamRange, StreamingBufferAllocator, VertexStreams};
pub use types::{
    BindTarget, BlockDescriptor, BufferDescriptor, BufferUsage, ContextConfig, DeviceLimits,
    EvictionPolicy, ResourceDescriptor, ResourceKind, SlotKind, StreamVertex, TextureDescriptor,
    Vertex2d, Vertex2f, Vertex3f,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version.
pub fn init() {
    log::info!("bindstream v{} initialized", VERSION);
}
