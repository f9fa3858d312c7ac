//! HLSL 运行时编译
//!
//! 着色器源码在编译期嵌入，运行时通过 D3DCompile 编译为字节码。

use windows::core::{s, PCSTR};
use windows::Win32::Graphics::Direct3D::Fxc::*;
use windows::Win32::Graphics::Direct3D::ID3DBlob;

use crate::core::error::{GpuObject, GraphicsError, Result};

const DEMO_SHADER: &str = include_str!("shaders/shader.hlsl");

fn compile(source: &str, entry_point: PCSTR, target: PCSTR, stage: &str) -> Result<Vec<u8>> {
    let flags = if cfg!(debug_assertions) {
        D3DCOMPILE_DEBUG | D3DCOMPILE_SKIP_OPTIMIZATION
    } else {
        0
    };

    let mut code: Option<ID3DBlob> = None;
    let mut error: Option<ID3DBlob> = None;
    unsafe {
        let result = D3DCompile(
            source.as_ptr() as _,
            source.len(),
            None,
            None,
            None,
            entry_point,
            target,
            flags,
            0,
            &mut code,
            Some(&mut error),
        );

        if let Err(e) = result {
            let message = match error {
                Some(error) => String::from_utf8_lossy(std::slice::from_raw_parts(
                    error.GetBufferPointer() as *const u8,
                    error.GetBufferSize(),
                ))
                .into_owned(),
                None => e.message().to_string(),
            };
            return Err(GraphicsError::creation(GpuObject::Shader, format!("{} compile error: {}", stage, message)).into());
        }

        let code = code.ok_or_else(|| GraphicsError::creation(GpuObject::Shader, format!("{} produced no bytecode", stage)))?;
        Ok(std::slice::from_raw_parts(code.GetBufferPointer() as *const u8, code.GetBufferSize()).to_vec())
    }
}

/// 编译演示三角形的顶点和像素着色器
///
/// # 返回值
///
/// `(vertex_shader, pixel_shader)` 字节码
pub fn compile_demo_shaders() -> Result<(Vec<u8>, Vec<u8>)> {
    let vertex = compile(DEMO_SHADER, s!("VSMain"), s!("vs_5_1"), "vertex shader")?;
    let pixel = compile(DEMO_SHADER, s!("PSMain"), s!("ps_5_1"), "pixel shader")?;
    Ok((vertex, pixel))
}
