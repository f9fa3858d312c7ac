/// 演示三角形使用的顶点定义
///
/// 位置与颜色交错存放，内存布局与 GPU 输入布局一致。

use bytemuck::{Pod, Zeroable};

use crate::gfx::pipeline::{VertexElement, VertexFormat};

/// 带颜色的顶点
///
/// # 内存布局
///
/// - position: 12 bytes (3 * f32)
/// - color: 16 bytes (4 * f32)
/// - **总计**: 28 bytes
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// 裁剪空间坐标 (x, y, z)
    pub position: [f32; 3],

    /// 顶点颜色 (r, g, b, a)
    pub color: [f32; 4],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    pub fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }

    /// 与结构体字段对应的输入布局
    pub fn layout() -> Vec<VertexElement> {
        vec![
            VertexElement::new("POSITION", VertexFormat::Float32x3, 0),
            VertexElement::new("COLOR", VertexFormat::Float32x4, 12),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(Vertex::STRIDE, 28);
        assert_eq!(std::mem::align_of::<Vertex>(), 4);
    }

    #[test]
    fn test_layout_covers_the_vertex() {
        let layout = Vertex::layout();
        let end = layout
            .iter()
            .map(|element| element.offset + element.format.size())
            .max()
            .unwrap();
        assert_eq!(end, Vertex::STRIDE);
    }
}
