//! DX12 图形管线
//!
//! 根签名、管线状态对象和上传堆中的顶点缓冲。

use std::ffi::{c_void, CString};

use tracing::debug;
use windows::core::PCSTR;
use windows::Win32::Graphics::Direct3D::ID3DBlob;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::core::error::{GpuObject, GraphicsError, Result};
use crate::gfx::pipeline::{PipelineAssets, VertexFormat};

use super::creation_error;

pub struct Dx12Pipeline {
    root_signature: ID3D12RootSignature,
    pso: ID3D12PipelineState,
    // 视图引用该资源的 GPU 地址，必须与管线同生命周期
    _vertex_buffer: ID3D12Resource,
    vertex_buffer_view: D3D12_VERTEX_BUFFER_VIEW,
    vertex_count: u32,
}

fn vertex_format(format: VertexFormat) -> DXGI_FORMAT {
    match format {
        VertexFormat::Float32x3 => DXGI_FORMAT_R32G32B32_FLOAT,
        VertexFormat::Float32x4 => DXGI_FORMAT_R32G32B32A32_FLOAT,
    }
}

fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize()) }
}

fn bytecode(code: &[u8]) -> D3D12_SHADER_BYTECODE {
    D3D12_SHADER_BYTECODE {
        pShaderBytecode: code.as_ptr() as *const c_void,
        BytecodeLength: code.len(),
    }
}

/// 序列化允许输入装配布局的空根签名
fn serialize_empty_root_signature() -> Result<Vec<u8>> {
    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: 0,
        pParameters: std::ptr::null(),
        NumStaticSamplers: 0,
        pStaticSamplers: std::ptr::null(),
        Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
    };

    let mut signature: Option<ID3DBlob> = None;
    let mut error: Option<ID3DBlob> = None;
    unsafe { D3D12SerializeRootSignature(&desc, D3D_ROOT_SIGNATURE_VERSION_1, &mut signature, Some(&mut error)) }
        .map_err(|e| {
            let detail = error
                .as_ref()
                .map(|blob| String::from_utf8_lossy(blob_bytes(blob)).into_owned())
                .unwrap_or_else(|| e.message().to_string());
            GraphicsError::creation(GpuObject::RootSignature, detail)
        })?;

    let signature = signature
        .ok_or_else(|| GraphicsError::creation(GpuObject::RootSignature, "serializer returned no blob"))?;
    Ok(blob_bytes(&signature).to_vec())
}

impl Dx12Pipeline {
    pub(super) fn create(device: &ID3D12Device, assets: &PipelineAssets) -> Result<Self> {
        assets.validate()?;

        let signature = match &assets.root_signature {
            Some(bytes) => bytes.clone(),
            None => serialize_empty_root_signature()?,
        };
        let root_signature: ID3D12RootSignature = unsafe { device.CreateRootSignature(0, &signature) }
            .map_err(|e| creation_error(GpuObject::RootSignature, &e))?;

        let semantics = assets
            .input_layout
            .iter()
            .map(|element| CString::new(element.semantic.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| GraphicsError::creation(GpuObject::PipelineState, format!("invalid semantic name: {}", e)))?;

        let input_element_descs: Vec<D3D12_INPUT_ELEMENT_DESC> = assets
            .input_layout
            .iter()
            .zip(&semantics)
            .map(|(element, semantic)| D3D12_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(semantic.as_ptr() as *const u8),
                SemanticIndex: 0,
                Format: vertex_format(element.format),
                InputSlot: 0,
                AlignedByteOffset: element.offset,
                InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            })
            .collect();

        let mut pso_desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC::default();
        pso_desc.pRootSignature = unsafe { std::mem::transmute_copy(&root_signature) };
        pso_desc.VS = bytecode(&assets.vertex_shader);
        pso_desc.PS = bytecode(&assets.pixel_shader);
        pso_desc.BlendState = D3D12_BLEND_DESC {
            AlphaToCoverageEnable: false.into(),
            IndependentBlendEnable: false.into(),
            RenderTarget: [
                D3D12_RENDER_TARGET_BLEND_DESC {
                    BlendEnable: false.into(),
                    LogicOpEnable: false.into(),
                    SrcBlend: D3D12_BLEND_ONE,
                    DestBlend: D3D12_BLEND_ZERO,
                    BlendOp: D3D12_BLEND_OP_ADD,
                    SrcBlendAlpha: D3D12_BLEND_ONE,
                    DestBlendAlpha: D3D12_BLEND_ZERO,
                    BlendOpAlpha: D3D12_BLEND_OP_ADD,
                    LogicOp: D3D12_LOGIC_OP_NOOP,
                    RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
                },
                D3D12_RENDER_TARGET_BLEND_DESC::default(),
                D3D12_RENDER_TARGET_BLEND_DESC::default(),
                D3D12_RENDER_TARGET_BLEND_DESC::default(),
                D3D12_RENDER_TARGET_BLEND_DESC::default(),
                D3D12_RENDER_TARGET_BLEND_DESC::default(),
                D3D12_RENDER_TARGET_BLEND_DESC::default(),
                D3D12_RENDER_TARGET_BLEND_DESC::default(),
            ],
        };
        pso_desc.RasterizerState = D3D12_RASTERIZER_DESC {
            FillMode: D3D12_FILL_MODE_SOLID,
            CullMode: D3D12_CULL_MODE_NONE,
            FrontCounterClockwise: false.into(),
            DepthBias: D3D12_DEFAULT_DEPTH_BIAS as i32,
            DepthBiasClamp: D3D12_DEFAULT_DEPTH_BIAS_CLAMP,
            SlopeScaledDepthBias: D3D12_DEFAULT_SLOPE_SCALED_DEPTH_BIAS,
            DepthClipEnable: true.into(),
            ..Default::default()
        };
        pso_desc.DepthStencilState = D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: false.into(),
            StencilEnable: false.into(),
            ..Default::default()
        };
        pso_desc.SampleMask = u32::MAX;
        pso_desc.InputLayout = D3D12_INPUT_LAYOUT_DESC {
            pInputElementDescs: input_element_descs.as_ptr(),
            NumElements: input_element_descs.len() as u32,
        };
        pso_desc.PrimitiveTopologyType = D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE;
        pso_desc.NumRenderTargets = 1;
        pso_desc.RTVFormats[0] = DXGI_FORMAT_R8G8B8A8_UNORM;
        pso_desc.SampleDesc.Count = 1;

        let pso: ID3D12PipelineState = unsafe { device.CreateGraphicsPipelineState(&pso_desc) }
            .map_err(|e| creation_error(GpuObject::PipelineState, &e))?;

        let (vertex_buffer, vertex_buffer_view) = Self::upload_vertices(device, assets)?;
        let vertex_count = assets.vertex_count();
        debug!(vertex_count, stride = assets.vertex_stride, "Pipeline created");

        Ok(Self {
            root_signature,
            pso,
            _vertex_buffer: vertex_buffer,
            vertex_buffer_view,
            vertex_count,
        })
    }

    /// 在上传堆中创建顶点缓冲并写入数据
    fn upload_vertices(
        device: &ID3D12Device,
        assets: &PipelineAssets,
    ) -> Result<(ID3D12Resource, D3D12_VERTEX_BUFFER_VIEW)> {
        let size = assets.vertex_data.len() as u64;
        let heap_props = D3D12_HEAP_PROPERTIES {
            Type: D3D12_HEAP_TYPE_UPLOAD,
            ..Default::default()
        };
        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Width: size,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            ..Default::default()
        };

        unsafe {
            let mut vertex_buffer: Option<ID3D12Resource> = None;
            device
                .CreateCommittedResource(
                    &heap_props,
                    D3D12_HEAP_FLAG_NONE,
                    &resource_desc,
                    D3D12_RESOURCE_STATE_GENERIC_READ,
                    None,
                    &mut vertex_buffer,
                )
                .map_err(|e| creation_error(GpuObject::VertexBuffer, &e))?;
            let vertex_buffer = vertex_buffer
                .ok_or_else(|| GraphicsError::creation(GpuObject::VertexBuffer, "no resource returned"))?;

            // CPU 不读取该缓冲
            let read_range = D3D12_RANGE { Begin: 0, End: 0 };
            let mut data = std::ptr::null_mut();
            vertex_buffer
                .Map(0, Some(&read_range), Some(&mut data))
                .map_err(|e| creation_error(GpuObject::VertexBuffer, &e))?;
            std::ptr::copy_nonoverlapping(assets.vertex_data.as_ptr(), data as *mut u8, assets.vertex_data.len());
            vertex_buffer.Unmap(0, None);

            let view = D3D12_VERTEX_BUFFER_VIEW {
                BufferLocation: vertex_buffer.GetGPUVirtualAddress(),
                SizeInBytes: size as u32,
                StrideInBytes: assets.vertex_stride,
            };
            Ok((vertex_buffer, view))
        }
    }

    pub(super) fn state(&self) -> &ID3D12PipelineState {
        &self.pso
    }

    pub(super) fn root_signature(&self) -> &ID3D12RootSignature {
        &self.root_signature
    }

    pub(super) fn vertex_buffer_view(&self) -> D3D12_VERTEX_BUFFER_VIEW {
        self.vertex_buffer_view
    }

    pub(super) fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}
