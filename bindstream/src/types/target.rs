//! Binding points exposed by the device.

/// A single-slot binding point.
///
/// Each target holds at most one bound object at a time. [`BindTarget::None`]
/// is the sentinel for resources that are bound through an indexed slot
/// instead (textures, uniform blocks) and is never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BindTarget {
    /// No single binding point.
    None = 0,
    /// Vertex attribute source buffer.
    ArrayBuffer = 1,
    /// Index buffer.
    ElementArrayBuffer = 2,
    /// Generic (non-indexed) uniform buffer binding point.
    UniformBuffer = 3,
    /// Generic (non-indexed) shader storage binding point.
    ShaderStorageBuffer = 4,
    /// Currently used program.
    Program = 5,
    /// Currently bound framebuffer.
    Framebuffer = 6,
}

impl BindTarget {
    /// Number of targets, including the sentinel.
    pub const COUNT: usize = 7;

    /// Numeric target id. `0` means "no target".
    pub const fn id(self) -> u32 {
        self as u32
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Returns `true` for the "no target" sentinel.
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

/// An indexed binding table kind.
///
/// Each kind is tracked in its own slot table sized by the matching
/// [`DeviceLimits`](crate::DeviceLimits) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Combined texture image units.
    TextureUnit,
    /// Indexed uniform buffer bindings.
    UniformBuffer,
    /// Indexed shader storage buffer bindings.
    ShaderStorage,
}

impl SlotKind {
    /// All slot kinds.
    pub const ALL: [SlotKind; 3] = [Self::TextureUnit, Self::UniformBuffer, Self::ShaderStorage];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::TextureUnit => 0,
            Self::UniformBuffer => 1,
            Self::ShaderStorage => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_target() {
        assert_eq!(BindTarget::None.id(), 0);
        assert!(BindTarget::None.is_none());
        assert!(!BindTarget::Program.is_none());
    }

    #[test]
    fn test_target_indices_in_range() {
        for target in [
            BindTarget::None,
            BindTarget::ArrayBuffer,
            BindTarget::ElementArrayBuffer,
            BindTarget::UniformBuffer,
            BindTarget::ShaderStorageBuffer,
            BindTarget::Program,
            BindTarget::Framebuffer,
        ] {
            assert!(target.index() < BindTarget::COUNT);
        }
    }
}
