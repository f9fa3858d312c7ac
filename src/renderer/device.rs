//! 设备上下文：设备、直接命令队列与所选适配器信息

use tracing::info;

use crate::core::config::{FeatureLevel, GraphicsConfig};
use crate::core::error::Result;
use crate::gfx::backend::{AdapterCandidate, AdapterInfo, GpuDevice, GraphicsBackend, ValidationFilter};

pub struct DeviceContext<B: GraphicsBackend> {
    queue: B::Queue,
    device: B::Device,
    adapter: AdapterInfo,
    feature_level: FeatureLevel,
}

impl<B: GraphicsBackend> DeviceContext<B> {
    /// 在所选适配器上创建设备和命令队列
    ///
    /// 启用调试层时同时安装标准消息过滤器。
    pub fn create(
        backend: &B,
        adapter: AdapterCandidate<B::Adapter>,
        config: &GraphicsConfig,
    ) -> Result<Self> {
        let feature_level = config.min_feature_level;
        let device = backend.create_device(&adapter.adapter, feature_level)?;

        if config.debug_validation {
            device.install_validation_filter(&ValidationFilter::standard())?;
        }

        let queue = device.create_command_queue()?;

        info!(
            backend = backend.backend_name(),
            adapter = %adapter.info.name,
            feature_level = %feature_level,
            "Device created"
        );

        Ok(Self {
            queue,
            device,
            adapter: adapter.info,
            feature_level,
        })
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn queue(&self) -> &B::Queue {
        &self.queue
    }

    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }
}
