//! DX12 翻转丢弃模型交换链

use windows::Win32::Graphics::Direct3D12::ID3D12Resource;
use windows::Win32::Graphics::Dxgi::*;

use crate::core::error::Result;
use crate::gfx::backend::{PresentParams, SurfaceDesc, SwapChain};

use super::{dxgi_format, native_error, swap_chain_flags, Dx12Backend};

pub struct Dx12SwapChain {
    swap_chain: IDXGISwapChain3,
}

impl Dx12SwapChain {
    pub(super) fn new(swap_chain: IDXGISwapChain3) -> Self {
        Self { swap_chain }
    }
}

impl SwapChain<Dx12Backend> for Dx12SwapChain {
    fn current_back_buffer_index(&self) -> u32 {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() }
    }

    fn get_buffer(&self, index: u32) -> Result<ID3D12Resource> {
        let buffer = unsafe { self.swap_chain.GetBuffer(index) }
            .map_err(|e| native_error("IDXGISwapChain::GetBuffer", &e))?;
        Ok(buffer)
    }

    fn present(&self, params: PresentParams) -> Result<()> {
        let flags = if params.allow_tearing { DXGI_PRESENT_ALLOW_TEARING } else { DXGI_PRESENT(0) };
        unsafe { self.swap_chain.Present(params.sync_interval, flags) }
            .ok()
            .map_err(|e| native_error("IDXGISwapChain::Present", &e))?;
        Ok(())
    }

    fn resize_buffers(&self, desc: &SurfaceDesc) -> Result<()> {
        unsafe {
            self.swap_chain.ResizeBuffers(
                desc.buffer_count,
                desc.width,
                desc.height,
                dxgi_format(desc.format),
                DXGI_SWAP_CHAIN_FLAG(swap_chain_flags(desc) as i32),
            )
        }
        .map_err(|e| native_error("IDXGISwapChain::ResizeBuffers", &e))?;
        Ok(())
    }
}
