//! 管线资产
//!
//! 着色器字节码、输入布局与顶点数据对帧管线来说是不透明的，
//! 由应用层准备后交给后端创建管线。

use crate::core::error::{GpuObject, GraphicsError, Result};

/// 顶点属性格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    /// R32G32B32_FLOAT
    Float32x3,
    /// R32G32B32A32_FLOAT
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u32 {
        match self {
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// 输入布局中的单个元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexElement {
    /// HLSL 语义名
    pub semantic: String,
    pub format: VertexFormat,
    /// 在顶点内的字节偏移
    pub offset: u32,
}

impl VertexElement {
    pub fn new(semantic: &str, format: VertexFormat, offset: u32) -> Self {
        Self {
            semantic: semantic.to_string(),
            format,
            offset,
        }
    }
}

/// 创建图形管线所需的全部数据
#[derive(Debug, Clone)]
pub struct PipelineAssets {
    pub vertex_shader: Vec<u8>,
    pub pixel_shader: Vec<u8>,
    /// 序列化的根签名；`None` 时使用允许输入装配布局的空根签名
    pub root_signature: Option<Vec<u8>>,
    pub input_layout: Vec<VertexElement>,
    pub vertex_data: Vec<u8>,
    pub vertex_stride: u32,
}

impl PipelineAssets {
    pub fn vertex_count(&self) -> u32 {
        if self.vertex_stride == 0 {
            return 0;
        }
        (self.vertex_data.len() / self.vertex_stride as usize) as u32
    }

    /// 检查资产是否自洽
    pub fn validate(&self) -> Result<()> {
        let fail = |object: GpuObject, reason: String| -> Result<()> {
            Err(GraphicsError::creation(object, reason).into())
        };

        if self.vertex_shader.is_empty() || self.pixel_shader.is_empty() {
            return fail(GpuObject::Shader, "shader bytecode is empty".to_string());
        }
        if self.vertex_stride == 0 || self.vertex_data.is_empty() {
            return fail(GpuObject::VertexBuffer, "vertex data is empty".to_string());
        }
        if self.vertex_data.len() % self.vertex_stride as usize != 0 {
            return fail(
                GpuObject::VertexBuffer,
                format!(
                    "{} bytes is not a multiple of the {}-byte stride",
                    self.vertex_data.len(),
                    self.vertex_stride
                ),
            );
        }
        for element in &self.input_layout {
            if element.offset + element.format.size() > self.vertex_stride {
                return fail(
                    GpuObject::PipelineState,
                    format!("input element {} overruns the vertex stride", element.semantic),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets(stride: u32, bytes: usize) -> PipelineAssets {
        PipelineAssets {
            vertex_shader: vec![1],
            pixel_shader: vec![2],
            root_signature: None,
            input_layout: vec![
                VertexElement::new("POSITION", VertexFormat::Float32x3, 0),
                VertexElement::new("COLOR", VertexFormat::Float32x4, 12),
            ],
            vertex_data: vec![0; bytes],
            vertex_stride: stride,
        }
    }

    #[test]
    fn test_vertex_count() {
        assert_eq!(assets(28, 84).vertex_count(), 3);
        assert!(assets(28, 84).validate().is_ok());
    }

    #[test]
    fn test_rejects_ragged_vertex_data() {
        assert!(assets(28, 85).validate().is_err());
    }

    #[test]
    fn test_rejects_overrunning_layout() {
        assert!(assets(24, 48).validate().is_err());
    }

    #[test]
    fn test_rejects_empty_shader() {
        let mut a = assets(28, 84);
        a.pixel_shader.clear();
        assert!(a.validate().is_err());
    }
}
