//! DX12 设备与设备创建的对象

use std::time::{Duration, Instant};

use tracing::{debug, info};
use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use crate::core::error::{GpuObject, GraphicsError, Result};
use crate::gfx::backend::{
    CommandAllocator, CommandQueue, CpuDescriptorHandle, GpuDevice, GpuFence, KnownMessage,
    MessageSeverity, ValidationFilter, ViewHeap,
};
use crate::gfx::pipeline::PipelineAssets;

use super::{creation_error, native_error, Dx12Backend, Dx12CommandList, Dx12Pipeline};

pub struct Dx12Device {
    device: ID3D12Device,
    rtv_stride: u32,
}

pub struct Dx12Queue {
    queue: ID3D12CommandQueue,
}

/// 栅栏及其完成通知事件
pub struct Dx12Fence {
    fence: ID3D12Fence,
    event: HANDLE,
}

// 事件句柄只在拥有栅栏的线程上等待
unsafe impl Send for Dx12Fence {}

pub struct Dx12ViewHeap {
    heap: ID3D12DescriptorHeap,
    capacity: u32,
}

pub struct Dx12Allocator {
    allocator: ID3D12CommandAllocator,
}

impl Dx12Device {
    pub(super) fn new(device: ID3D12Device) -> Self {
        let rtv_stride = unsafe { device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) };
        Self { device, rtv_stride }
    }

    pub fn raw(&self) -> &ID3D12Device {
        &self.device
    }
}

impl Dx12Queue {
    pub fn raw(&self) -> &ID3D12CommandQueue {
        &self.queue
    }
}

impl Dx12Allocator {
    pub(super) fn raw(&self) -> &ID3D12CommandAllocator {
        &self.allocator
    }
}

fn message_severity(severity: MessageSeverity) -> D3D12_MESSAGE_SEVERITY {
    match severity {
        MessageSeverity::Corruption => D3D12_MESSAGE_SEVERITY_CORRUPTION,
        MessageSeverity::Error => D3D12_MESSAGE_SEVERITY_ERROR,
        MessageSeverity::Warning => D3D12_MESSAGE_SEVERITY_WARNING,
        MessageSeverity::Info => D3D12_MESSAGE_SEVERITY_INFO,
        MessageSeverity::Message => D3D12_MESSAGE_SEVERITY_MESSAGE,
    }
}

fn message_id(message: KnownMessage) -> D3D12_MESSAGE_ID {
    match message {
        KnownMessage::ClearRenderTargetViewMismatchingClearValue => {
            D3D12_MESSAGE_ID_CLEARRENDERTARGETVIEW_MISMATCHINGCLEARVALUE
        }
        KnownMessage::MapInvalidNullRange => D3D12_MESSAGE_ID_MAP_INVALID_NULLRANGE,
        KnownMessage::UnmapInvalidNullRange => D3D12_MESSAGE_ID_UNMAP_INVALID_NULLRANGE,
    }
}

impl GpuDevice<Dx12Backend> for Dx12Device {
    fn install_validation_filter(&self, filter: &ValidationFilter) -> Result<()> {
        let info_queue: ID3D12InfoQueue = self
            .device
            .cast()
            .map_err(|e| native_error("ID3D12Device::QueryInterface(ID3D12InfoQueue)", &e))?;

        let mut severities: Vec<D3D12_MESSAGE_SEVERITY> =
            filter.deny_severities.iter().map(|s| message_severity(*s)).collect();
        let mut ids: Vec<D3D12_MESSAGE_ID> = filter.deny_messages.iter().map(|m| message_id(*m)).collect();

        unsafe {
            for severity in &filter.break_on {
                info_queue
                    .SetBreakOnSeverity(message_severity(*severity), true)
                    .map_err(|e| native_error("ID3D12InfoQueue::SetBreakOnSeverity", &e))?;
            }

            let storage_filter = D3D12_INFO_QUEUE_FILTER {
                AllowList: D3D12_INFO_QUEUE_FILTER_DESC::default(),
                DenyList: D3D12_INFO_QUEUE_FILTER_DESC {
                    NumCategories: 0,
                    pCategoryList: std::ptr::null_mut(),
                    NumSeverities: severities.len() as u32,
                    pSeverityList: severities.as_mut_ptr(),
                    NumIDs: ids.len() as u32,
                    pIDList: ids.as_mut_ptr(),
                },
            };
            info_queue
                .PushStorageFilter(&storage_filter)
                .map_err(|e| native_error("ID3D12InfoQueue::PushStorageFilter", &e))?;
        }

        info!(denied_messages = ids.len(), "Validation message filter installed");
        Ok(())
    }

    fn create_command_queue(&self) -> Result<Dx12Queue> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            Priority: D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };
        let queue: ID3D12CommandQueue = unsafe { self.device.CreateCommandQueue(&desc) }
            .map_err(|e| creation_error(GpuObject::CommandQueue, &e))?;
        Ok(Dx12Queue { queue })
    }

    fn create_fence(&self, initial_value: u64) -> Result<Dx12Fence> {
        unsafe {
            let fence: ID3D12Fence = self
                .device
                .CreateFence(initial_value, D3D12_FENCE_FLAG_NONE)
                .map_err(|e| creation_error(GpuObject::Fence, &e))?;
            let event = CreateEventA(None, false, false, None).map_err(|e| creation_error(GpuObject::FenceEvent, &e))?;
            debug!(initial_value, "Fence created");
            Ok(Dx12Fence { fence, event })
        }
    }

    fn create_view_heap(&self, capacity: u32) -> Result<Dx12ViewHeap> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
            NumDescriptors: capacity,
            Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
            NodeMask: 0,
        };
        let heap: ID3D12DescriptorHeap = unsafe { self.device.CreateDescriptorHeap(&desc) }
            .map_err(|e| creation_error(GpuObject::DescriptorHeap, &e))?;
        Ok(Dx12ViewHeap { heap, capacity })
    }

    fn view_stride(&self) -> u32 {
        self.rtv_stride
    }

    fn create_render_target_view(&self, buffer: &ID3D12Resource, handle: CpuDescriptorHandle) {
        unsafe {
            self.device
                .CreateRenderTargetView(buffer, None, D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr });
        }
    }

    fn create_command_allocator(&self) -> Result<Dx12Allocator> {
        let allocator: ID3D12CommandAllocator =
            unsafe { self.device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT) }
                .map_err(|e| creation_error(GpuObject::CommandAllocator, &e))?;
        Ok(Dx12Allocator { allocator })
    }

    fn create_command_list(&self, allocator: &Dx12Allocator, pipeline: &Dx12Pipeline) -> Result<Dx12CommandList> {
        let list: ID3D12GraphicsCommandList = unsafe {
            self.device
                .CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, allocator.raw(), pipeline.state())
        }
        .map_err(|e| creation_error(GpuObject::CommandList, &e))?;
        Ok(Dx12CommandList::new(list))
    }

    fn create_pipeline(&self, assets: &PipelineAssets) -> Result<Dx12Pipeline> {
        Dx12Pipeline::create(&self.device, assets)
    }
}

impl CommandQueue<Dx12Backend> for Dx12Queue {
    fn execute(&self, list: &Dx12CommandList) {
        let command_lists = [Some(list.raw().clone().into())];
        unsafe { self.queue.ExecuteCommandLists(&command_lists) };
    }

    fn signal(&self, fence: &Dx12Fence, value: u64) -> Result<()> {
        unsafe { self.queue.Signal(&fence.fence, value) }
            .map_err(|e| native_error("ID3D12CommandQueue::Signal", &e))?;
        Ok(())
    }
}

impl GpuFence for Dx12Fence {
    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);

        // 自动重置事件可能残留一次先前超时等待的通知，唤醒后必须重新读取完成值
        while self.completed_value() < value {
            let millis = match deadline {
                None => INFINITE,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(false);
                    }
                    remaining.as_millis().clamp(1, u128::from(INFINITE - 1)) as u32
                }
            };

            unsafe {
                self.fence
                    .SetEventOnCompletion(value, self.event)
                    .map_err(|e| native_error("ID3D12Fence::SetEventOnCompletion", &e))?;

                let status = WaitForSingleObject(self.event, millis);
                if status == WAIT_TIMEOUT {
                    return Ok(self.completed_value() >= value);
                } else if status != WAIT_OBJECT_0 {
                    return Err(GraphicsError::native("WaitForSingleObject", status.0 as i32).into());
                }
            }
        }
        Ok(true)
    }
}

impl Drop for Dx12Fence {
    fn drop(&mut self) {
        // 调用方已在此之前排空 GPU
        if let Err(e) = unsafe { CloseHandle(self.event) } {
            tracing::error!(error = %e, "Failed to close fence event");
        }
    }
}

impl ViewHeap for Dx12ViewHeap {
    fn cpu_start(&self) -> CpuDescriptorHandle {
        let start = unsafe { self.heap.GetCPUDescriptorHandleForHeapStart() };
        CpuDescriptorHandle::new(start.ptr, 0)
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl CommandAllocator for Dx12Allocator {
    fn reset(&self) -> Result<()> {
        unsafe { self.allocator.Reset() }.map_err(|e| native_error("ID3D12CommandAllocator::Reset", &e))?;
        Ok(())
    }
}
