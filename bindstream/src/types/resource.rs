//! Resource kinds and creation descriptors.

use bitflags::bitflags;

use super::target::{BindTarget, SlotKind};

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer is rewritten every frame.
        const STREAM = 1 << 4;
        /// Buffer storage stays mapped for its whole lifetime.
        const PERSISTENT = 1 << 5;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// The closed set of device object kinds managed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A device buffer.
    Buffer,
    /// A texture image.
    Texture,
    /// A linked shader program.
    Program,
    /// A framebuffer object.
    Framebuffer,
    /// A uniform or storage block backed by a buffer and bound by index.
    UniformBlock,
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The single-slot binding point this buffer is bound through.
    pub fn binding_target(&self) -> BindTarget {
        if self.usage.contains(BufferUsage::INDEX) {
            BindTarget::ElementArrayBuffer
        } else if self.usage.contains(BufferUsage::UNIFORM) {
            BindTarget::UniformBuffer
        } else if self.usage.contains(BufferUsage::STORAGE) {
            BindTarget::ShaderStorageBuffer
        } else {
            BindTarget::ArrayBuffer
        }
    }
}

/// Descriptor for creating a 2D texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            label: None,
            width,
            height,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Descriptor for an indexed uniform or storage block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BlockDescriptor {
    /// Debug label for the block.
    pub label: Option<String>,
    /// Size of the backing buffer in bytes.
    pub size: u64,
    /// Bind through the shader storage table instead of the uniform table.
    pub storage: bool,
}

impl BlockDescriptor {
    /// Create a uniform block descriptor.
    pub fn uniform(size: u64) -> Self {
        Self {
            label: None,
            size,
            storage: false,
        }
    }

    /// Create a shader storage block descriptor.
    pub fn storage(size: u64) -> Self {
        Self {
            label: None,
            size,
            storage: true,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The slot table this block is bound through.
    pub fn slot_kind(&self) -> SlotKind {
        if self.storage {
            SlotKind::ShaderStorage
        } else {
            SlotKind::UniformBuffer
        }
    }
}

/// Everything needed to create one device object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceDescriptor {
    /// A buffer.
    Buffer(BufferDescriptor),
    /// A texture.
    Texture(TextureDescriptor),
    /// A program. Compilation and linking happen outside this crate.
    Program {
        /// Debug label.
        label: Option<String>,
    },
    /// A framebuffer. Attachment bookkeeping happens outside this crate.
    Framebuffer {
        /// Debug label.
        label: Option<String>,
    },
    /// An indexed uniform or storage block.
    UniformBlock(BlockDescriptor),
}

impl ResourceDescriptor {
    /// Descriptor for an unlabelled program.
    pub fn program() -> Self {
        Self::Program { label: None }
    }

    /// Descriptor for an unlabelled framebuffer.
    pub fn framebuffer() -> Self {
        Self::Framebuffer { label: None }
    }

    /// Set the debug label.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        match self {
            Self::Buffer(desc) => Self::Buffer(desc.with_label(label)),
            Self::Texture(desc) => Self::Texture(desc.with_label(label)),
            Self::Program { .. } => Self::Program {
                label: Some(label.into()),
            },
            Self::Framebuffer { .. } => Self::Framebuffer {
                label: Some(label.into()),
            },
            Self::UniformBlock(desc) => Self::UniformBlock(desc.with_label(label)),
        }
    }

    /// The kind of object this descriptor creates.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Buffer(_) => ResourceKind::Buffer,
            Self::Texture(_) => ResourceKind::Texture,
            Self::Program { .. } => ResourceKind::Program,
            Self::Framebuffer { .. } => ResourceKind::Framebuffer,
            Self::UniformBlock(_) => ResourceKind::UniformBlock,
        }
    }

    /// The debug label, if set.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Buffer(desc) => desc.label.as_deref(),
            Self::Texture(desc) => desc.label.as_deref(),
            Self::Program { label } | Self::Framebuffer { label } => label.as_deref(),
            Self::UniformBlock(desc) => desc.label.as_deref(),
        }
    }

    /// The single-slot binding point, or [`BindTarget::None`] for slot-bound kinds.
    pub fn binding_target(&self) -> BindTarget {
        match self {
            Self::Buffer(desc) => desc.binding_target(),
            Self::Program { .. } => BindTarget::Program,
            Self::Framebuffer { .. } => BindTarget::Framebuffer,
            Self::Texture(_) | Self::UniformBlock(_) => BindTarget::None,
        }
    }

    /// The slot table used by slot-bound kinds.
    pub fn slot_kind(&self) -> Option<SlotKind> {
        match self {
            Self::Texture(_) => Some(SlotKind::TextureUnit),
            Self::UniformBlock(desc) => Some(desc.slot_kind()),
            _ => None,
        }
    }
}

impl From<BufferDescriptor> for ResourceDescriptor {
    fn from(desc: BufferDescriptor) -> Self {
        Self::Buffer(desc)
    }
}

impl From<TextureDescriptor> for ResourceDescriptor {
    fn from(desc: TextureDescriptor) -> Self {
        Self::Texture(desc)
    }
}

impl From<BlockDescriptor> for ResourceDescriptor {
    fn from(desc: BlockDescriptor) -> Self {
        Self::UniformBlock(desc)
    }
}
