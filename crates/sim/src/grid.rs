//! Grid mesh helpers for uploading a height field.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex layout of the dynamic wave vertex buffer.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes)
/// - Offset 12: normal (12 bytes)
/// - Offset 24: texture coordinate (8 bytes)
/// - Total size: 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct WaveVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

impl WaveVertex {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// Triangle-list indices for a `rows` x `cols` vertex grid.
///
/// Each cell contributes two triangles. With `a` the cell's top-left vertex,
/// `b` its right neighbour, `c` the vertex below and `d` the one diagonally
/// across, the triangles are `(a, b, c)` and `(c, b, d)`.
///
/// # Panics
///
/// Panics if the grid has fewer than two rows or columns.
pub fn grid_indices(rows: usize, cols: usize) -> Vec<u32> {
    assert!(rows >= 2 && cols >= 2, "grid needs at least 2x2 vertices");

    let mut indices = Vec::with_capacity((rows - 1) * (cols - 1) * 6);
    for i in 0..rows - 1 {
        for j in 0..cols - 1 {
            let a = (i * cols + j) as u32;
            let b = a + 1;
            let c = a + cols as u32;
            let d = c + 1;
            indices.extend_from_slice(&[a, b, c, c, b, d]);
        }
    }
    indices
}
