//! Backend error types.

/// Errors reported by a device backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Failed to create a device object.
    ResourceCreationFailed(String),
    /// Failed to map buffer storage.
    MapFailed(String),
    /// Out of device memory.
    OutOfMemory,
    /// The object id does not name a live object of the expected kind.
    InvalidObject(u32),
    /// Internal backend error.
    Internal(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::MapFailed(msg) => write!(f, "buffer map failed: {msg}"),
            Self::OutOfMemory => write!(f, "out of device memory"),
            Self::InvalidObject(id) => write!(f, "invalid device object {id}"),
            Self::Internal(msg) => write!(f, "internal backend error: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}
