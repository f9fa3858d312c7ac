//! 模拟 GPU 后端
//!
//! 不依赖任何图形驱动，用 CPU 上的时间线模拟 D3D12 的提交、栅栏与翻转模型交换链。
//! 用途：
//!
//! - 在非 Windows 平台上运行完整的帧循环
//! - 测试中验证帧管线的同步性质（见 `GpuTimeline::journal`，需打开 `record_journal`）

mod device;
mod swapchain;
mod timeline;

use std::sync::Arc;

use tracing::info;

use crate::core::config::FeatureLevel;
use crate::core::error::{GpuObject, GraphicsError, Result};
use crate::gfx::backend::{AdapterCandidate, AdapterInfo, GraphicsBackend, SurfaceDesc, WindowTarget};

pub use device::{
    HeadlessAllocator, HeadlessCommandList, HeadlessDevice, HeadlessFence, HeadlessPipeline,
    HeadlessQueue, HeadlessViewHeap,
};
pub use swapchain::{HeadlessBuffer, HeadlessSwapChain};
pub use timeline::{GpuCompletion, GpuEvent, GpuTimeline};

/// 模拟适配器
#[derive(Debug, Clone)]
pub struct HeadlessAdapter {
    pub info: AdapterInfo,
    /// 支持的最高特性等级
    pub max_feature_level: FeatureLevel,
}

impl HeadlessAdapter {
    pub fn hardware(index: u32, name: &str, dedicated_video_memory: u64, max_feature_level: FeatureLevel) -> Self {
        Self {
            info: AdapterInfo {
                index,
                name: name.to_string(),
                dedicated_video_memory,
                software: false,
            },
            max_feature_level,
        }
    }

    pub fn software(index: u32, name: &str) -> Self {
        Self {
            info: AdapterInfo {
                index,
                name: name.to_string(),
                dedicated_video_memory: 0,
                software: true,
            },
            max_feature_level: FeatureLevel::Level12_1,
        }
    }
}

/// 模拟后端选项
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub adapters: Vec<HeadlessAdapter>,
    pub tearing_supported: bool,
    pub completion: GpuCompletion,
    /// RTV 描述符间隔
    pub view_stride: u32,
    /// 记录完整事件日志；长时间运行时应关闭
    pub record_journal: bool,
    /// 呈现后交换链给出的缓冲索引序列，循环使用并对缓冲数量取模。
    /// 为空时按 0, 1, .., N-1 轮转
    pub flip_order: Vec<u32>,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            adapters: vec![
                HeadlessAdapter::hardware(0, "Headless Integrated GPU", 512 << 20, FeatureLevel::Level12_0),
                HeadlessAdapter::hardware(1, "Headless Discrete GPU", 8 << 30, FeatureLevel::Level12_1),
                HeadlessAdapter::software(2, "Headless Basic Render Driver"),
            ],
            tearing_supported: true,
            completion: GpuCompletion::Immediate,
            view_stride: 32,
            record_journal: false,
            flip_order: Vec::new(),
        }
    }
}

pub struct HeadlessBackend {
    options: HeadlessOptions,
    timeline: Arc<GpuTimeline>,
}

impl HeadlessBackend {
    pub fn new(options: HeadlessOptions) -> Result<Self> {
        let timeline = Arc::new(GpuTimeline::new(&options)?);
        info!(
            adapters = options.adapters.len(),
            completion = ?options.completion,
            record_journal = options.record_journal,
            "Headless GPU created"
        );
        Ok(Self { options, timeline })
    }

    /// 共享时间线，用于推进模拟 GPU 和检查事件日志
    pub fn timeline(&self) -> &Arc<GpuTimeline> {
        &self.timeline
    }
}

impl GraphicsBackend for HeadlessBackend {
    type Adapter = HeadlessAdapter;
    type Device = HeadlessDevice;
    type Queue = HeadlessQueue;
    type Fence = HeadlessFence;
    type SwapChain = HeadlessSwapChain;
    type Buffer = HeadlessBuffer;
    type ViewHeap = HeadlessViewHeap;
    type Allocator = HeadlessAllocator;
    type CommandList = HeadlessCommandList;
    type Pipeline = HeadlessPipeline;

    fn backend_name(&self) -> &'static str {
        "Headless"
    }

    fn enable_validation(&self) -> Result<()> {
        self.timeline.record(GpuEvent::ValidationEnabled);
        Ok(())
    }

    fn enumerate_adapters(&self) -> Result<Vec<AdapterCandidate<HeadlessAdapter>>> {
        Ok(self
            .options
            .adapters
            .iter()
            .map(|adapter| AdapterCandidate {
                info: adapter.info.clone(),
                adapter: adapter.clone(),
            })
            .collect())
    }

    fn software_adapter(&self) -> Result<AdapterCandidate<HeadlessAdapter>> {
        self.options
            .adapters
            .iter()
            .find(|adapter| adapter.info.software)
            .map(|adapter| AdapterCandidate {
                info: adapter.info.clone(),
                adapter: adapter.clone(),
            })
            .ok_or_else(|| GraphicsError::AdapterUnavailable("no software adapter present".to_string()).into())
    }

    fn supports_feature_level(&self, adapter: &HeadlessAdapter, level: FeatureLevel) -> bool {
        adapter.max_feature_level >= level
    }

    fn create_device(&self, adapter: &HeadlessAdapter, level: FeatureLevel) -> Result<HeadlessDevice> {
        if adapter.max_feature_level < level {
            return Err(GraphicsError::creation(
                GpuObject::Device,
                format!("{} does not support feature level {}", adapter.info.name, level),
            )
            .into());
        }

        self.timeline.record(GpuEvent::DeviceCreated {
            adapter: adapter.info.index,
            feature_level: level,
        });
        Ok(HeadlessDevice {
            timeline: Arc::clone(&self.timeline),
            view_stride: self.options.view_stride,
        })
    }

    fn supports_tearing(&self) -> bool {
        self.options.tearing_supported
    }

    fn create_swap_chain(
        &self,
        _queue: &HeadlessQueue,
        target: &WindowTarget,
        desc: &SurfaceDesc,
    ) -> Result<HeadlessSwapChain> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GraphicsError::creation(
                GpuObject::SwapChain,
                format!("{}x{} is not a valid surface size", target.width, target.height),
            )
            .into());
        }
        Ok(HeadlessSwapChain::new(Arc::clone(&self.timeline), desc))
    }
}
