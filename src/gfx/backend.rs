//! 图形后端的统一抽象接口
//!
//! 本模块定义了帧管线依赖的全部 GPU 能力：适配器枚举、设备、命令队列、
//! 栅栏、交换链、描述符堆、命令分配器与命令列表。
//!
//! 上层管线（`renderer` 模块）只通过这些 trait 与 GPU 交互，因此同一套帧循环
//! 既可以驱动 DirectX 12，也可以驱动 `headless` 模拟后端。
//!
//! 接口形状贴近 D3D12：方法接收 `&self`，对象之间通过关联类型关联。

use std::time::Duration;

use raw_window_handle::RawWindowHandle;

use crate::core::config::FeatureLevel;
use crate::core::error::Result;
use super::pipeline::PipelineAssets;

/// 图形后端的统一接口
///
/// 后端对象本身相当于 DXGI 工厂：负责调试层、适配器枚举、设备创建和交换链创建。
pub trait GraphicsBackend: Sized {
    /// 可用于创建设备的适配器
    type Adapter;
    type Device: GpuDevice<Self>;
    type Queue: CommandQueue<Self>;
    type Fence: GpuFence;
    type SwapChain: SwapChain<Self>;
    /// 交换链缓冲资源的引用，丢弃即释放
    type Buffer;
    type ViewHeap: ViewHeap;
    type Allocator: CommandAllocator;
    type CommandList: GraphicsCommandList<Self>;
    type Pipeline;

    /// 后端名称，用于日志输出
    fn backend_name(&self) -> &'static str;

    /// 启用调试层，必须在创建设备之前调用
    fn enable_validation(&self) -> Result<()>;

    /// 枚举全部适配器（包含软件适配器，由调用方过滤）
    fn enumerate_adapters(&self) -> Result<Vec<AdapterCandidate<Self::Adapter>>>;

    /// 获取软件光栅化适配器
    fn software_adapter(&self) -> Result<AdapterCandidate<Self::Adapter>>;

    /// 探测适配器能否以给定特性等级创建设备（不保留设备）
    fn supports_feature_level(&self, adapter: &Self::Adapter, level: FeatureLevel) -> bool;

    fn create_device(&self, adapter: &Self::Adapter, level: FeatureLevel) -> Result<Self::Device>;

    /// 显示系统是否支持撕裂呈现（可变刷新率）
    fn supports_tearing(&self) -> bool;

    /// 为窗口创建翻转丢弃模型交换链，并禁用系统的 Alt+Enter 处理
    fn create_swap_chain(
        &self,
        queue: &Self::Queue,
        target: &WindowTarget,
        desc: &SurfaceDesc,
    ) -> Result<Self::SwapChain>;
}

/// 逻辑设备
pub trait GpuDevice<B: GraphicsBackend> {
    /// 安装调试消息过滤器（仅在调试层启用时调用）
    fn install_validation_filter(&self, filter: &ValidationFilter) -> Result<()>;

    /// 创建普通优先级的直接命令队列
    fn create_command_queue(&self) -> Result<B::Queue>;

    fn create_fence(&self, initial_value: u64) -> Result<B::Fence>;

    /// 创建不可被着色器访问的 RTV 描述符堆
    fn create_view_heap(&self, capacity: u32) -> Result<B::ViewHeap>;

    /// RTV 描述符之间的字节间隔
    fn view_stride(&self) -> u32;

    fn create_render_target_view(&self, buffer: &B::Buffer, handle: CpuDescriptorHandle);

    fn create_command_allocator(&self) -> Result<B::Allocator>;

    /// 创建命令列表，新列表处于录制状态
    fn create_command_list(&self, allocator: &B::Allocator, pipeline: &B::Pipeline) -> Result<B::CommandList>;

    /// 根据着色器、输入布局和顶点数据创建图形管线
    fn create_pipeline(&self, assets: &PipelineAssets) -> Result<B::Pipeline>;
}

/// 直接命令队列
pub trait CommandQueue<B: GraphicsBackend> {
    /// 提交已关闭的命令列表
    fn execute(&self, list: &B::CommandList);

    /// 在队列中插入信号：GPU 执行到此处时栅栏完成值变为 `value`
    fn signal(&self, fence: &B::Fence, value: u64) -> Result<()>;
}

/// GPU 栅栏
pub trait GpuFence {
    /// GPU 已完成的最大栅栏值
    fn completed_value(&self) -> u64;

    /// 阻塞直到完成值达到 `value`
    ///
    /// # 返回值
    ///
    /// 到达返回 `Ok(true)`，超时返回 `Ok(false)`。`timeout` 为 `None` 时无限等待。
    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> Result<bool>;
}

/// 交换链
pub trait SwapChain<B: GraphicsBackend> {
    /// 当前可供渲染的后台缓冲索引（翻转模型下不一定按顺序轮转）
    fn current_back_buffer_index(&self) -> u32;

    fn get_buffer(&self, index: u32) -> Result<B::Buffer>;

    fn present(&self, params: PresentParams) -> Result<()>;

    /// 调整缓冲尺寸；调用前必须释放所有缓冲引用
    fn resize_buffers(&self, desc: &SurfaceDesc) -> Result<()>;
}

pub trait ViewHeap {
    /// 堆起始处的 CPU 句柄
    fn cpu_start(&self) -> CpuDescriptorHandle;
    fn capacity(&self) -> u32;
}

pub trait CommandAllocator {
    /// 回收分配器内存。调用方保证 GPU 已执行完该分配器上的所有命令。
    fn reset(&self) -> Result<()>;
}

/// 图形命令列表
pub trait GraphicsCommandList<B: GraphicsBackend> {
    fn reset(&self, allocator: &B::Allocator, pipeline: &B::Pipeline) -> Result<()>;
    fn transition(&self, buffer: &B::Buffer, before: ResourceState, after: ResourceState);
    fn set_render_target(&self, view: CpuDescriptorHandle);
    fn clear_render_target(&self, view: CpuDescriptorHandle, color: [f32; 4]);
    /// 绑定管线、视口、裁剪矩形与顶点缓冲并绘制
    fn draw(&self, pipeline: &B::Pipeline, viewport: &Viewport, scissor: &ScissorRect);
    fn close(&self) -> Result<()>;
}

/// 适配器描述信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// 枚举序号
    pub index: u32,
    pub name: String,
    /// 独占显存（字节）
    pub dedicated_video_memory: u64,
    /// 是否为软件适配器
    pub software: bool,
}

/// 枚举得到的适配器及其描述
#[derive(Debug, Clone)]
pub struct AdapterCandidate<A> {
    pub info: AdapterInfo,
    pub adapter: A,
}

/// 交换链缓冲的资源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Present,
    RenderTarget,
}

/// 交换链缓冲格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFormat {
    /// R8G8B8A8_UNORM
    Rgba8Unorm,
}

/// 交换链描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: SurfaceFormat,
    /// 创建时带上允许撕裂标志，之后每次调整尺寸必须保持一致
    pub allow_tearing: bool,
}

/// 呈现参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentParams {
    /// 0 立即呈现，1 等待垂直同步
    pub sync_interval: u32,
    pub allow_tearing: bool,
}

impl PresentParams {
    /// 撕裂只在关闭垂直同步且表面支持时生效
    pub fn new(vsync: bool, tearing_available: bool) -> Self {
        let sync_interval = if vsync { 1 } else { 0 };
        Self {
            sync_interval,
            allow_tearing: sync_interval == 0 && tearing_available,
        }
    }
}

/// 窗口目标：原生窗口句柄与客户区尺寸
#[derive(Debug, Clone, Copy)]
pub struct WindowTarget {
    handle: Option<RawWindowHandle>,
    pub width: u32,
    pub height: u32,
}

impl WindowTarget {
    pub fn new(handle: RawWindowHandle, width: u32, height: u32) -> Self {
        Self { handle: Some(handle), width, height }
    }

    /// 不关联任何窗口，供模拟后端使用
    pub fn detached(width: u32, height: u32) -> Self {
        Self { handle: None, width, height }
    }

    pub fn handle(&self) -> Option<RawWindowHandle> {
        self.handle
    }
}

/// CPU 描述符句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: usize,
    /// 描述符索引
    pub index: u32,
}

impl CpuDescriptorHandle {
    pub fn new(ptr: usize, index: u32) -> Self {
        Self { ptr, index }
    }

    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + count as usize * increment_size as usize,
            index: self.index + count,
        }
    }
}

/// 视口
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// 覆盖整个表面
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 裁剪矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }
}

/// 调试消息严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Corruption,
    Error,
    Warning,
    Info,
    Message,
}

/// 需要屏蔽的已知调试消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownMessage {
    /// 清屏颜色与资源优化清除值不一致
    ClearRenderTargetViewMismatchingClearValue,
    /// 以空范围 Map
    MapInvalidNullRange,
    /// 以空范围 Unmap
    UnmapInvalidNullRange,
}

/// 调试层消息过滤器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFilter {
    /// 出现这些级别的消息时中断调试器
    pub break_on: Vec<MessageSeverity>,
    /// 按级别屏蔽
    pub deny_severities: Vec<MessageSeverity>,
    /// 按消息屏蔽
    pub deny_messages: Vec<KnownMessage>,
}

impl ValidationFilter {
    /// 默认过滤器：严重错误中断，屏蔽信息级消息和三条已知噪声消息
    pub fn standard() -> Self {
        Self {
            break_on: vec![
                MessageSeverity::Corruption,
                MessageSeverity::Error,
                MessageSeverity::Warning,
            ],
            deny_severities: vec![MessageSeverity::Info],
            deny_messages: vec![
                KnownMessage::ClearRenderTargetViewMismatchingClearValue,
                KnownMessage::MapInvalidNullRange,
                KnownMessage::UnmapInvalidNullRange,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_offset() {
        let start = CpuDescriptorHandle::new(0x1000, 0);
        let third = start.offset(2, 32);
        assert_eq!(third.ptr, 0x1040);
        assert_eq!(third.index, 2);
    }

    #[test]
    fn test_present_params() {
        assert_eq!(
            PresentParams::new(true, true),
            PresentParams { sync_interval: 1, allow_tearing: false }
        );
        assert_eq!(
            PresentParams::new(false, true),
            PresentParams { sync_interval: 0, allow_tearing: true }
        );
        assert_eq!(
            PresentParams::new(false, false),
            PresentParams { sync_interval: 0, allow_tearing: false }
        );
    }

    #[test]
    fn test_standard_filter() {
        let filter = ValidationFilter::standard();
        assert_eq!(filter.break_on.len(), 3);
        assert_eq!(filter.deny_severities, vec![MessageSeverity::Info]);
        assert_eq!(filter.deny_messages.len(), 3);
    }

    #[test]
    fn test_full_viewport() {
        let viewport = Viewport::full(1280, 720);
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(ScissorRect::full(1280, 720).bottom, 720);
    }
}
