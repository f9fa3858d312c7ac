/// 演示几何体
///
/// 提供一个按宽高比校正的彩色三角形，并把它打包成后端可用的管线资产。
/// 顶点数据通过 `bytemuck` 转换为不透明的字节块。

pub mod vertex;

pub use vertex::Vertex;

use crate::gfx::pipeline::PipelineAssets;

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

/// 创建演示三角形
///
/// # 参数
///
/// * `aspect_ratio` - 表面宽高比，用于拉伸 y 坐标使三角形在屏幕上保持比例
pub fn triangle(aspect_ratio: f32) -> [Vertex; 3] {
    [
        Vertex::new([0.0, 0.25 * aspect_ratio, 0.0], RED),
        Vertex::new([0.25, -0.25 * aspect_ratio, 0.0], GREEN),
        Vertex::new([-0.25, -0.25 * aspect_ratio, 0.0], BLUE),
    ]
}

/// 用已编译的着色器和演示三角形组装管线资产
///
/// 根签名留空，后端会使用允许输入装配布局的空根签名。
pub fn demo_assets(vertex_shader: Vec<u8>, pixel_shader: Vec<u8>, aspect_ratio: f32) -> PipelineAssets {
    let vertices = triangle(aspect_ratio);
    PipelineAssets {
        vertex_shader,
        pixel_shader,
        root_signature: None,
        input_layout: Vertex::layout(),
        vertex_data: bytemuck::cast_slice(&vertices).to_vec(),
        vertex_stride: Vertex::STRIDE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_scales_with_aspect() {
        let vertices = triangle(2.0);
        assert_eq!(vertices[0].position, [0.0, 0.5, 0.0]);
        assert_eq!(vertices[1].position, [0.25, -0.5, 0.0]);
        assert_eq!(vertices[2].color, BLUE);
    }

    #[test]
    fn test_demo_assets() {
        let assets = demo_assets(b"vs".to_vec(), b"ps".to_vec(), 16.0 / 9.0);
        assert_eq!(assets.vertex_count(), 3);
        assert_eq!(assets.vertex_data.len(), 84);
        assert!(assets.validate().is_ok());

        let first: Vertex = bytemuck::pod_read_unaligned(&assets.vertex_data[..28]);
        assert_eq!(first, triangle(16.0 / 9.0)[0]);
    }
}
