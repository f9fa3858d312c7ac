//! DX12 图形命令列表

use std::mem::ManuallyDrop;

use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST;
use windows::Win32::Graphics::Direct3D12::*;

use crate::core::error::Result;
use crate::gfx::backend::{CpuDescriptorHandle, GraphicsCommandList, ResourceState, ScissorRect, Viewport};

use super::{native_error, Dx12Allocator, Dx12Backend, Dx12Pipeline};

pub struct Dx12CommandList {
    list: ID3D12GraphicsCommandList,
}

impl Dx12CommandList {
    pub(super) fn new(list: ID3D12GraphicsCommandList) -> Self {
        Self { list }
    }

    pub(super) fn raw(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }
}

fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
    }
}

/// 整个资源的状态转换屏障
///
/// 屏障只借用资源指针，不增加引用计数，否则调整交换链尺寸时缓冲仍被引用。
fn transition_barrier(
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }
}

fn cpu_handle(handle: CpuDescriptorHandle) -> D3D12_CPU_DESCRIPTOR_HANDLE {
    D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr }
}

impl GraphicsCommandList<Dx12Backend> for Dx12CommandList {
    fn reset(&self, allocator: &Dx12Allocator, pipeline: &Dx12Pipeline) -> Result<()> {
        unsafe { self.list.Reset(allocator.raw(), pipeline.state()) }
            .map_err(|e| native_error("ID3D12GraphicsCommandList::Reset", &e))?;
        Ok(())
    }

    fn transition(&self, buffer: &ID3D12Resource, before: ResourceState, after: ResourceState) {
        let barrier = transition_barrier(buffer, resource_state(before), resource_state(after));
        unsafe { self.list.ResourceBarrier(&[barrier]) };
    }

    fn set_render_target(&self, view: CpuDescriptorHandle) {
        let handle = cpu_handle(view);
        unsafe { self.list.OMSetRenderTargets(1, Some(&handle), false, None) };
    }

    fn clear_render_target(&self, view: CpuDescriptorHandle, color: [f32; 4]) {
        unsafe { self.list.ClearRenderTargetView(cpu_handle(view), &color, None) };
    }

    fn draw(&self, pipeline: &Dx12Pipeline, viewport: &Viewport, scissor: &ScissorRect) {
        let viewport = D3D12_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        };
        let scissor_rect = RECT {
            left: scissor.left,
            top: scissor.top,
            right: scissor.right,
            bottom: scissor.bottom,
        };

        unsafe {
            self.list.SetGraphicsRootSignature(pipeline.root_signature());
            self.list.RSSetViewports(&[viewport]);
            self.list.RSSetScissorRects(&[scissor_rect]);
            self.list.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            self.list.IASetVertexBuffers(0, Some(&[pipeline.vertex_buffer_view()]));
            self.list.DrawInstanced(pipeline.vertex_count(), 1, 0, 0);
        }
    }

    fn close(&self) -> Result<()> {
        unsafe { self.list.Close() }.map_err(|e| native_error("ID3D12GraphicsCommandList::Close", &e))?;
        Ok(())
    }
}
