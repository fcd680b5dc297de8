//! Vertex item layouts for the immediate-mode streams.

use bytemuck::{Pod, Zeroable};

/// An item type that can be appended to a streaming buffer.
///
/// Items are copied byte-for-byte into mapped device memory, so they must be
/// plain old data.
pub trait StreamVertex: Pod + Send + Sync + 'static {
    /// Short name used in buffer labels and log messages.
    const NAME: &'static str;

    /// Size of one item in bytes.
    const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// A 2D single precision position.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex2f {
    pub x: f32,
    pub y: f32,
}

/// A 3D single precision position.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A 2D double precision position.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex2d {
    pub x: f64,
    pub y: f64,
}

impl Vertex2f {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Vertex3f {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Vertex2d {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Narrow to single precision.
    pub fn narrow(self) -> Vertex2f {
        Vertex2f::new(self.x as f32, self.y as f32)
    }
}

impl StreamVertex for Vertex2f {
    const NAME: &'static str = "vec2f";
}

impl StreamVertex for Vertex3f {
    const NAME: &'static str = "vec3f";
}

impl StreamVertex for Vertex2d {
    const NAME: &'static str = "vec2d";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_sizes() {
        assert_eq!(Vertex2f::SIZE, 8);
        assert_eq!(Vertex3f::SIZE, 12);
        assert_eq!(Vertex2d::SIZE, 16);
    }

    #[test]
    fn test_narrowing() {
        let v = Vertex2d::new(1.5, -2.25).narrow();
        assert_eq!(v, Vertex2f::new(1.5, -2.25));
    }
}
