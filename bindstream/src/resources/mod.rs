//! Device resource handles.
//!
//! A [`ResourceHandle`] names one device object (buffer, texture, program,
//! framebuffer or uniform block) inside an object [`Namespace`]. Handles are
//! cheap to clone and never own device state directly: the device object is
//! created and deleted by [`ResourceLifecycle`], and binding caches only keep
//! non-owning, generation-checked references to them.
//!
//! [`Namespace`]: crate::Namespace
//! [`ResourceLifecycle`]: crate::ResourceLifecycle

mod handle;

pub use handle::{ResourceHandle, ResourceState};
pub(crate) use handle::WeakResource;
