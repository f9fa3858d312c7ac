//! 渲染器模块
//!
//! 帧同步呈现管线。`Renderer` 对任意 `GraphicsBackend` 泛型，
//! 负责初始化、逐帧录制/提交/呈现、调整尺寸与退出前排空 GPU。
//!
//! # 每帧流程
//!
//! 1. 取当前后台缓冲索引对应的帧槽，等待其退役值完成
//! 2. 重置该槽的分配器并录制命令
//! 3. 提交、呈现
//! 4. 发出新信号，写入帧槽的退役值
//! 5. 重新查询后台缓冲索引
//!
//! 同时在途的帧数不超过缓冲数量。

use tracing::{debug, error, info, trace};

use crate::core::config::GraphicsConfig;
use crate::core::error::Result;
use crate::gfx::backend::{CommandQueue, GpuDevice, GraphicsBackend, ScissorRect, Viewport, WindowTarget};
use crate::gfx::pipeline::PipelineAssets;

pub mod adapter;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod frame;
pub mod resize;
pub mod surface;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::AdapterSelector;
pub use command::{CommandRecorder, FrameState, RecorderState, CLEAR_COLOR};
pub use descriptor::ViewTable;
pub use device::DeviceContext;
pub use frame::{FrameSlot, SlotArena};
pub use surface::PresentationSurface;
pub use sync::{FenceValue, FrameSynchronizer};

/// 帧同步渲染器
///
/// 字段按释放顺序排列：先释放命令对象与缓冲引用，再释放交换链、设备，最后是后端。
pub struct Renderer<B: GraphicsBackend> {
    recorder: CommandRecorder<B>,
    pipeline: B::Pipeline,
    views: ViewTable<B>,
    slots: SlotArena<B>,
    sync: FrameSynchronizer<B>,
    surface: PresentationSurface<B>,
    context: DeviceContext<B>,
    backend: B,
    viewport: Viewport,
    scissor: ScissorRect,
    vsync: bool,
    allow_tearing: bool,
    frame_state: FrameState,
    frame_count: u64,
}

impl<B: GraphicsBackend> Renderer<B> {
    /// 初始化整个管线
    ///
    /// # 参数
    ///
    /// * `backend` - 图形后端
    /// * `target` - 窗口目标
    /// * `config` - 图形配置
    /// * `assets` - 着色器与顶点数据
    pub fn new(
        backend: B,
        target: &WindowTarget,
        config: &GraphicsConfig,
        assets: &PipelineAssets,
    ) -> Result<Self> {
        info!(backend = backend.backend_name(), "Initializing renderer");

        if config.debug_validation {
            backend.enable_validation()?;
            debug!("Debug validation enabled");
        }

        let adapter = AdapterSelector::from_config(config).select(&backend)?;
        let context = DeviceContext::create(&backend, adapter, config)?;
        let surface = PresentationSurface::create(&backend, context.queue(), target, config.buffer_count)?;
        let slots = SlotArena::new(context.device(), &surface)?;
        let views = ViewTable::new(context.device(), &slots)?;
        let sync = FrameSynchronizer::new(context.device(), config.frame_wait_timeout())?;
        let pipeline = context.device().create_pipeline(assets)?;
        let recorder = CommandRecorder::new(
            context.device(),
            slots.get(surface.current_index())?.allocator(),
            &pipeline,
            CLEAR_COLOR,
        )?;

        // 顶点数据上传完成后才进入帧循环
        sync.flush(context.queue())?;

        let (width, height) = (surface.width(), surface.height());
        info!(width, height, buffers = surface.buffer_count(), "Renderer ready");

        Ok(Self {
            recorder,
            pipeline,
            views,
            slots,
            sync,
            surface,
            context,
            backend,
            viewport: Viewport::full(width, height),
            scissor: ScissorRect::full(width, height),
            vsync: config.vsync,
            allow_tearing: config.allow_tearing,
            frame_state: FrameState::Idle,
            frame_count: 0,
        })
    }

    /// 渲染一帧
    pub fn draw(&mut self) -> Result<()> {
        debug_assert_eq!(self.frame_state, FrameState::Idle);

        let index = self.surface.current_index();
        let slot = self.slots.get(index)?;

        // 等待本槽上一次提交完成，之后才能重置其分配器
        self.sync.wait_for_frame(slot.retire_value())?;

        self.frame_state = FrameState::Recording;
        let view = self.views.view(index)?;
        self.recorder.record_frame(
            slot,
            self.sync.completed_value(),
            view,
            &self.pipeline,
            &self.viewport,
            &self.scissor,
        )?;

        self.context.queue().execute(self.recorder.list());
        self.frame_state = FrameState::Submitted;

        self.surface.present(self.vsync, self.allow_tearing)?;
        self.frame_state = FrameState::Presented;

        let retire = self.sync.signal(self.context.queue())?;
        self.slots.get_mut(index)?.retire_at(retire);

        let next = self.surface.refresh_index();
        self.frame_count += 1;
        self.frame_state = FrameState::Idle;

        trace!(
            frame = self.frame_count,
            buffer = index,
            retire = retire.value(),
            next_buffer = next,
            "Frame presented"
        );
        Ok(())
    }

    /// 排空 GPU：发出信号并等待完成
    pub fn flush(&self) -> Result<FenceValue> {
        self.sync.flush(self.context.queue())
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        if self.vsync != vsync {
            info!(vsync, "V-Sync changed");
        }
        self.vsync = vsync;
    }

    /// 切换垂直同步，返回新状态
    pub fn toggle_vsync(&mut self) -> bool {
        self.set_vsync(!self.vsync);
        self.vsync
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn size(&self) -> (u32, u32) {
        (self.surface.width(), self.surface.height())
    }

    pub fn buffer_count(&self) -> u32 {
        self.surface.buffer_count()
    }

    pub fn current_back_buffer_index(&self) -> u32 {
        self.surface.current_index()
    }

    /// 已呈现的帧数
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame_state
    }

    /// 最后一次发出的栅栏值
    pub fn last_signaled(&self) -> FenceValue {
        self.sync.last_signaled()
    }

    pub fn completed_value(&self) -> FenceValue {
        self.sync.completed_value()
    }

    pub fn tearing_supported(&self) -> bool {
        self.surface.tearing_supported()
    }

    pub fn adapter_name(&self) -> &str {
        &self.context.adapter().name
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: GraphicsBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        // 释放任何 GPU 对象之前必须等 GPU 空闲
        match self.sync.flush(self.context.queue()) {
            Ok(value) => debug!(fence = value.value(), frames = self.frame_count, "GPU drained before shutdown"),
            Err(e) => error!("Failed to drain GPU before shutdown: {}", e),
        }
    }
}
