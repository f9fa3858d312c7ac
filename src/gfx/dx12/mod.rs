//! DirectX 12 图形后端实现
//!
//! 基于 `windows` crate 实现 `gfx::backend` 中的全部 trait。
//! 后端对象持有 DXGI 工厂，负责调试层、适配器枚举、设备和交换链的创建。
//!
//! # 子模块
//!
//! - `device`：设备、命令队列、栅栏、描述符堆、命令分配器
//! - `command`：图形命令列表
//! - `swapchain`：翻转丢弃模型交换链
//! - `pipeline`：根签名、管线状态对象与顶点缓冲
//! - `shader`：运行时编译 HLSL

mod command;
mod device;
mod pipeline;
mod shader;
mod swapchain;

use std::ffi::c_void;

use raw_window_handle::RawWindowHandle;
use tracing::{debug, info, warn};
use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::core::config::FeatureLevel;
use crate::core::error::{GpuObject, GraphicsError, Result};
use crate::gfx::backend::{AdapterCandidate, AdapterInfo, GraphicsBackend, SurfaceDesc, SurfaceFormat, WindowTarget};

pub use command::Dx12CommandList;
pub use device::{Dx12Allocator, Dx12Device, Dx12Fence, Dx12Queue, Dx12ViewHeap};
pub use pipeline::Dx12Pipeline;
pub use shader::compile_demo_shaders;
pub use swapchain::Dx12SwapChain;

/// DirectX 12 后端
pub struct Dx12Backend {
    factory: IDXGIFactory4,
}

impl Dx12Backend {
    /// 创建 DXGI 工厂
    ///
    /// # 参数
    ///
    /// * `debug` - 是否以调试标志创建工厂（需要安装 Graphics Tools）
    pub fn new(debug: bool) -> Result<Self> {
        let flags = if debug { DXGI_CREATE_FACTORY_DEBUG } else { DXGI_CREATE_FACTORY_FLAGS(0) };
        let factory: IDXGIFactory4 = unsafe { CreateDXGIFactory2(flags) }
            .map_err(|e| creation_error(GpuObject::Factory, &e))?;
        debug!(debug, "DXGI factory created");
        Ok(Self { factory })
    }

    fn describe(adapter: &IDXGIAdapter1, index: u32) -> Result<AdapterInfo> {
        let desc = unsafe { adapter.GetDesc1() }.map_err(|e| native_error("IDXGIAdapter1::GetDesc1", &e))?;
        let len = desc.Description.iter().position(|&c| c == 0).unwrap_or(desc.Description.len());
        Ok(AdapterInfo {
            index,
            name: String::from_utf16_lossy(&desc.Description[..len]),
            dedicated_video_memory: desc.DedicatedVideoMemory as u64,
            software: desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0,
        })
    }
}

impl GraphicsBackend for Dx12Backend {
    type Adapter = IDXGIAdapter1;
    type Device = Dx12Device;
    type Queue = Dx12Queue;
    type Fence = Dx12Fence;
    type SwapChain = Dx12SwapChain;
    type Buffer = ID3D12Resource;
    type ViewHeap = Dx12ViewHeap;
    type Allocator = Dx12Allocator;
    type CommandList = Dx12CommandList;
    type Pipeline = Dx12Pipeline;

    fn backend_name(&self) -> &'static str {
        "DirectX 12"
    }

    fn enable_validation(&self) -> Result<()> {
        unsafe {
            let mut debug: Option<ID3D12Debug> = None;
            match D3D12GetDebugInterface(&mut debug) {
                Ok(()) => {
                    if let Some(debug) = debug {
                        debug.EnableDebugLayer();
                        info!("DX12 debug layer enabled");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to enable DX12 debug layer"),
            }
        }
        Ok(())
    }

    fn enumerate_adapters(&self) -> Result<Vec<AdapterCandidate<IDXGIAdapter1>>> {
        let mut candidates = Vec::new();
        for index in 0.. {
            let adapter = match unsafe { self.factory.EnumAdapters1(index) } {
                Ok(adapter) => adapter,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => return Err(native_error("IDXGIFactory1::EnumAdapters1", &e).into()),
            };
            let info = Self::describe(&adapter, index)?;
            debug!(
                index,
                name = %info.name,
                dedicated_video_memory_mb = info.dedicated_video_memory >> 20,
                software = info.software,
                "Adapter found"
            );
            candidates.push(AdapterCandidate { info, adapter });
        }
        Ok(candidates)
    }

    fn software_adapter(&self) -> Result<AdapterCandidate<IDXGIAdapter1>> {
        let adapter: IDXGIAdapter1 = unsafe { self.factory.EnumWarpAdapter() }
            .map_err(|e| GraphicsError::AdapterUnavailable(format!("WARP adapter unavailable: {}", e.message())))?;
        let mut info = Self::describe(&adapter, 0)?;
        info.software = true;
        Ok(AdapterCandidate { info, adapter })
    }

    fn supports_feature_level(&self, adapter: &IDXGIAdapter1, level: FeatureLevel) -> bool {
        unsafe {
            D3D12CreateDevice(adapter, d3d_feature_level(level), std::ptr::null_mut::<Option<ID3D12Device>>())
                .is_ok()
        }
    }

    fn create_device(&self, adapter: &IDXGIAdapter1, level: FeatureLevel) -> Result<Dx12Device> {
        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(adapter, d3d_feature_level(level), &mut device) }
            .map_err(|e| creation_error(GpuObject::Device, &e))?;
        let device = device.ok_or_else(|| GraphicsError::creation(GpuObject::Device, "D3D12CreateDevice returned no device"))?;
        Ok(Dx12Device::new(device))
    }

    fn supports_tearing(&self) -> bool {
        let Ok(factory) = self.factory.cast::<IDXGIFactory5>() else {
            return false;
        };
        let mut allow_tearing: i32 = 0;
        let supported = unsafe {
            factory.CheckFeatureSupport(
                DXGI_FEATURE_PRESENT_ALLOW_TEARING,
                &mut allow_tearing as *mut i32 as *mut c_void,
                std::mem::size_of::<i32>() as u32,
            )
        };
        supported.is_ok() && allow_tearing != 0
    }

    fn create_swap_chain(&self, queue: &Dx12Queue, target: &WindowTarget, desc: &SurfaceDesc) -> Result<Dx12SwapChain> {
        let hwnd = match target.handle() {
            Some(RawWindowHandle::Win32(handle)) => HWND(handle.hwnd.get() as *mut c_void),
            _ => {
                return Err(GraphicsError::creation(GpuObject::SwapChain, "a Win32 window handle is required").into());
            }
        };

        let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.width,
            Height: desc.height,
            Format: dxgi_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: desc.buffer_count,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            Flags: swap_chain_flags(desc),
            ..Default::default()
        };

        unsafe {
            let swap_chain: IDXGISwapChain1 = self
                .factory
                .CreateSwapChainForHwnd(queue.raw(), hwnd, &swap_chain_desc, None, None)
                .map_err(|e| creation_error(GpuObject::SwapChain, &e))?;

            // 全屏切换由应用自己处理
            self.factory
                .MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER)
                .map_err(|e| native_error("IDXGIFactory::MakeWindowAssociation", &e))?;

            let swap_chain: IDXGISwapChain3 = swap_chain
                .cast()
                .map_err(|e| creation_error(GpuObject::SwapChain, &e))?;
            Ok(Dx12SwapChain::new(swap_chain))
        }
    }
}

pub(crate) fn d3d_feature_level(level: FeatureLevel) -> D3D_FEATURE_LEVEL {
    match level {
        FeatureLevel::Level11_0 => D3D_FEATURE_LEVEL_11_0,
        FeatureLevel::Level11_1 => D3D_FEATURE_LEVEL_11_1,
        FeatureLevel::Level12_0 => D3D_FEATURE_LEVEL_12_0,
        FeatureLevel::Level12_1 => D3D_FEATURE_LEVEL_12_1,
    }
}

pub(crate) fn dxgi_format(format: SurfaceFormat) -> DXGI_FORMAT {
    match format {
        SurfaceFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
    }
}

pub(crate) fn swap_chain_flags(desc: &SurfaceDesc) -> u32 {
    if desc.allow_tearing {
        DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32
    } else {
        0
    }
}

/// 原生调用失败；设备移除类返回码转换为 `DeviceLost`
pub(crate) fn native_error(call: &'static str, error: &windows::core::Error) -> GraphicsError {
    let code = error.code().0;
    if GraphicsError::is_device_lost_code(code) {
        GraphicsError::DeviceLost {
            code,
            reason: format!("{} failed: {}", call, error.message()),
        }
    } else {
        GraphicsError::native(call, code)
    }
}

pub(crate) fn creation_error(object: GpuObject, error: &windows::core::Error) -> GraphicsError {
    GraphicsError::creation(object, format!("{} (0x{:08X})", error.message(), error.code().0 as u32))
}
