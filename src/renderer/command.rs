//! 命令录制模块
//!
//! 一个命令列表在所有帧之间复用，每帧使用对应帧槽的分配器重新录制。
//!
//! 每帧录制内容固定：
//!
//! 1. 缓冲从 Present 转换到 RenderTarget
//! 2. 绑定并清除渲染目标
//! 3. 绘制
//! 4. 缓冲转换回 Present
//!
//! 调用方负责在录制前等待帧槽的退役值完成。

use crate::core::error::{DxFrameError, Result};
use crate::gfx::backend::{
    CommandAllocator, CpuDescriptorHandle, GpuDevice, GraphicsBackend, GraphicsCommandList,
    ResourceState, ScissorRect, Viewport,
};

use super::frame::FrameSlot;
use super::sync::FenceValue;

/// 默认清屏颜色
pub const CLEAR_COLOR: [f32; 4] = [0.8, 0.2, 0.4, 1.0];

/// 命令列表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// 刚创建，处于录制中但尚未使用
    Initial,
    /// 正在录制
    Recording,
    /// 已关闭，可提交
    Closed,
}

/// 帧循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// 帧之间，可以调整尺寸
    Idle,
    Recording,
    Submitted,
    Presented,
}

pub struct CommandRecorder<B: GraphicsBackend> {
    list: B::CommandList,
    state: RecorderState,
    clear_color: [f32; 4],
}

impl<B: GraphicsBackend> CommandRecorder<B> {
    /// 创建命令列表并立即关闭，第一帧录制前由 `record_frame` 重置
    pub fn new(
        device: &B::Device,
        allocator: &B::Allocator,
        pipeline: &B::Pipeline,
        clear_color: [f32; 4],
    ) -> Result<Self> {
        let list = device.create_command_list(allocator, pipeline)?;
        let mut recorder = Self {
            list,
            state: RecorderState::Initial,
            clear_color,
        };
        recorder.finish()?;
        Ok(recorder)
    }

    /// 录制一帧
    ///
    /// # 参数
    ///
    /// * `slot` - 当前后台缓冲对应的帧槽
    /// * `completed` - GPU 当前完成值，必须不小于帧槽的退役值
    /// * `view` - 当前缓冲的渲染目标视图
    pub fn record_frame(
        &mut self,
        slot: &FrameSlot<B>,
        completed: FenceValue,
        view: CpuDescriptorHandle,
        pipeline: &B::Pipeline,
        viewport: &Viewport,
        scissor: &ScissorRect,
    ) -> Result<()> {
        debug_assert!(
            completed >= slot.retire_value(),
            "frame slot reused before its retire value completed"
        );

        let buffer = slot.buffer().ok_or_else(|| {
            DxFrameError::Runtime("frame slot has no back buffer".to_string())
        })?;

        self.begin(slot.allocator(), pipeline)?;

        self.list.transition(buffer, ResourceState::Present, ResourceState::RenderTarget);
        self.list.set_render_target(view);
        self.list.clear_render_target(view, self.clear_color);
        self.list.draw(pipeline, viewport, scissor);
        self.list.transition(buffer, ResourceState::RenderTarget, ResourceState::Present);

        self.finish()
    }

    fn begin(&mut self, allocator: &B::Allocator, pipeline: &B::Pipeline) -> Result<()> {
        debug_assert_eq!(self.state, RecorderState::Closed, "command list reset while open");
        allocator.reset()?;
        self.list.reset(allocator, pipeline)?;
        self.state = RecorderState::Recording;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        debug_assert_ne!(self.state, RecorderState::Closed, "command list closed twice");
        self.list.close()?;
        self.state = RecorderState::Closed;
        Ok(())
    }

    pub fn list(&self) -> &B::CommandList {
        &self.list
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::{CommandQueue, WindowTarget};
    use crate::gfx::headless::{GpuCompletion, GpuEvent, HeadlessBackend};
    use crate::renderer::descriptor::ViewTable;
    use crate::renderer::frame::SlotArena;
    use crate::renderer::surface::PresentationSurface;
    use crate::renderer::testing;

    #[test]
    fn test_records_transitions_around_clear_and_draw() {
        let backend = testing::backend(GpuCompletion::Immediate);
        let (device, queue) = testing::device_and_queue(&backend);
        let surface =
            PresentationSurface::create(&backend, &queue, &WindowTarget::detached(320, 200), 2).unwrap();
        let slots = SlotArena::new(&device, &surface).unwrap();
        let views = ViewTable::new(&device, &slots).unwrap();
        let pipeline = device.create_pipeline(&testing::assets()).unwrap();

        let mut recorder = CommandRecorder::<HeadlessBackend>::new(
            &device,
            slots.get(0).unwrap().allocator(),
            &pipeline,
            CLEAR_COLOR,
        )
        .unwrap();
        assert_eq!(recorder.state(), RecorderState::Closed);

        backend.timeline().clear_journal();
        let view = views.view(1).unwrap();
        recorder
            .record_frame(
                slots.get(1).unwrap(),
                FenceValue::ZERO,
                view,
                &pipeline,
                &Viewport::full(320, 200),
                &ScissorRect::full(320, 200),
            )
            .unwrap();
        queue.execute(recorder.list());

        let executed: Vec<GpuEvent> = backend
            .timeline()
            .journal()
            .into_iter()
            .filter(|event| {
                matches!(
                    event,
                    GpuEvent::Transition { .. }
                        | GpuEvent::RenderTargetBound { .. }
                        | GpuEvent::Cleared { .. }
                        | GpuEvent::Draw { .. }
                )
            })
            .collect();

        assert_eq!(
            executed,
            vec![
                GpuEvent::Transition {
                    buffer: 1,
                    before: ResourceState::Present,
                    after: ResourceState::RenderTarget,
                },
                GpuEvent::RenderTargetBound { handle: view },
                GpuEvent::Cleared { handle: view, color: CLEAR_COLOR },
                GpuEvent::Draw { vertex_count: 3, width: 320.0, height: 200.0 },
                GpuEvent::Transition {
                    buffer: 1,
                    before: ResourceState::RenderTarget,
                    after: ResourceState::Present,
                },
            ]
        );
        assert!(backend.timeline().violations().is_empty());
    }
}
