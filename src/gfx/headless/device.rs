//! 模拟设备、命令队列、栅栏、描述符堆、分配器与命令列表

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::core::error::{GraphicsError, Result, NATIVE_INVALID_CALL};
use crate::gfx::backend::{
    CommandAllocator, CommandQueue, CpuDescriptorHandle, GpuDevice, GpuFence,
    GraphicsCommandList, ResourceState, ScissorRect, ValidationFilter, ViewHeap, Viewport,
};
use crate::gfx::pipeline::PipelineAssets;

use super::swapchain::HeadlessBuffer;
use super::timeline::{Command, GpuEvent, GpuTimeline};
use super::HeadlessBackend;

/// 模拟描述符堆的起始地址
const VIEW_HEAP_BASE: usize = 0x1000;

pub struct HeadlessDevice {
    pub(super) timeline: Arc<GpuTimeline>,
    pub(super) view_stride: u32,
}

pub struct HeadlessQueue {
    timeline: Arc<GpuTimeline>,
}

pub struct HeadlessFence {
    timeline: Arc<GpuTimeline>,
    id: usize,
}

pub struct HeadlessViewHeap {
    start: CpuDescriptorHandle,
    capacity: u32,
}

pub struct HeadlessAllocator {
    timeline: Arc<GpuTimeline>,
    id: usize,
}

pub struct HeadlessPipeline {
    vertex_count: u32,
}

struct ListState {
    allocator: usize,
    open: bool,
    commands: Vec<Command>,
}

pub struct HeadlessCommandList {
    timeline: Arc<GpuTimeline>,
    state: Mutex<ListState>,
}

impl HeadlessPipeline {
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

impl GpuDevice<HeadlessBackend> for HeadlessDevice {
    fn install_validation_filter(&self, filter: &ValidationFilter) -> Result<()> {
        self.timeline.record(GpuEvent::ValidationFilterInstalled {
            denied_messages: filter.deny_messages.len(),
        });
        Ok(())
    }

    fn create_command_queue(&self) -> Result<HeadlessQueue> {
        self.timeline.record(GpuEvent::QueueCreated);
        Ok(HeadlessQueue { timeline: Arc::clone(&self.timeline) })
    }

    fn create_fence(&self, initial_value: u64) -> Result<HeadlessFence> {
        let id = self.timeline.register_fence(initial_value);
        Ok(HeadlessFence { timeline: Arc::clone(&self.timeline), id })
    }

    fn create_view_heap(&self, capacity: u32) -> Result<HeadlessViewHeap> {
        Ok(HeadlessViewHeap {
            start: CpuDescriptorHandle::new(VIEW_HEAP_BASE, 0),
            capacity,
        })
    }

    fn view_stride(&self) -> u32 {
        self.view_stride
    }

    fn create_render_target_view(&self, buffer: &HeadlessBuffer, handle: CpuDescriptorHandle) {
        self.timeline.record(GpuEvent::ViewCreated { buffer: buffer.index(), handle });
    }

    fn create_command_allocator(&self) -> Result<HeadlessAllocator> {
        let id = self.timeline.register_allocator();
        Ok(HeadlessAllocator { timeline: Arc::clone(&self.timeline), id })
    }

    fn create_command_list(
        &self,
        allocator: &HeadlessAllocator,
        _pipeline: &HeadlessPipeline,
    ) -> Result<HeadlessCommandList> {
        Ok(HeadlessCommandList {
            timeline: Arc::clone(&self.timeline),
            state: Mutex::new(ListState {
                allocator: allocator.id,
                open: true,
                commands: Vec::new(),
            }),
        })
    }

    fn create_pipeline(&self, assets: &PipelineAssets) -> Result<HeadlessPipeline> {
        assets.validate()?;
        let vertex_count = assets.vertex_count();
        self.timeline.record(GpuEvent::PipelineCreated { vertex_count });
        debug!(vertex_count, "Headless pipeline created");
        Ok(HeadlessPipeline { vertex_count })
    }
}

impl CommandQueue<HeadlessBackend> for HeadlessQueue {
    fn execute(&self, list: &HeadlessCommandList) {
        let state = list.lock();
        if state.open {
            self.timeline.violation("executed a command list that was not closed".to_string());
        }
        self.timeline.execute(state.allocator, &state.commands);
    }

    fn signal(&self, fence: &HeadlessFence, value: u64) -> Result<()> {
        self.timeline.signal(fence.id, value)
    }
}

impl GpuFence for HeadlessFence {
    fn completed_value(&self) -> u64 {
        self.timeline.completed_value(self.id)
    }

    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> Result<bool> {
        Ok(self.timeline.wait_for(self.id, value, timeout))
    }
}

impl ViewHeap for HeadlessViewHeap {
    fn cpu_start(&self) -> CpuDescriptorHandle {
        self.start
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl CommandAllocator for HeadlessAllocator {
    fn reset(&self) -> Result<()> {
        self.timeline.reset_allocator(self.id);
        Ok(())
    }
}

impl HeadlessCommandList {
    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, command: Command) {
        let mut state = self.lock();
        if !state.open {
            drop(state);
            self.timeline.violation(format!("recorded {:?} into a closed command list", command));
            return;
        }
        state.commands.push(command);
    }
}

impl GraphicsCommandList<HeadlessBackend> for HeadlessCommandList {
    fn reset(&self, allocator: &HeadlessAllocator, _pipeline: &HeadlessPipeline) -> Result<()> {
        let mut state = self.lock();
        if state.open {
            return Err(GraphicsError::native("ID3D12GraphicsCommandList::Reset", NATIVE_INVALID_CALL).into());
        }
        state.allocator = allocator.id;
        state.open = true;
        state.commands.clear();
        drop(state);

        self.timeline.record(GpuEvent::ListReset { allocator: allocator.id });
        Ok(())
    }

    fn transition(&self, buffer: &HeadlessBuffer, before: ResourceState, after: ResourceState) {
        self.push(Command::Transition { buffer: buffer.index(), before, after });
    }

    fn set_render_target(&self, view: CpuDescriptorHandle) {
        self.push(Command::SetRenderTarget(view));
    }

    fn clear_render_target(&self, view: CpuDescriptorHandle, color: [f32; 4]) {
        self.push(Command::Clear(view, color));
    }

    fn draw(&self, pipeline: &HeadlessPipeline, viewport: &Viewport, _scissor: &ScissorRect) {
        self.push(Command::Draw {
            vertex_count: pipeline.vertex_count,
            width: viewport.width,
            height: viewport.height,
        });
    }

    fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if !state.open {
            return Err(GraphicsError::native("ID3D12GraphicsCommandList::Close", NATIVE_INVALID_CALL).into());
        }
        state.open = false;
        drop(state);

        self.timeline.record(GpuEvent::ListClosed);
        Ok(())
    }
}
