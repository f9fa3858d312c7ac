//! 测试辅助：基于模拟后端构造管线组件

use crate::core::config::GraphicsConfig;
use crate::core::BackendKind;
use crate::geometry;
use crate::gfx::backend::{GpuDevice, GraphicsBackend};
use crate::gfx::headless::{GpuCompletion, HeadlessBackend, HeadlessDevice, HeadlessOptions, HeadlessQueue};
use crate::gfx::pipeline::PipelineAssets;

/// 打开事件日志的模拟后端选项
pub fn options(completion: GpuCompletion) -> HeadlessOptions {
    HeadlessOptions {
        completion,
        record_journal: true,
        ..HeadlessOptions::default()
    }
}

pub fn backend(completion: GpuCompletion) -> HeadlessBackend {
    HeadlessBackend::new(options(completion)).unwrap()
}

pub fn device_and_queue(backend: &HeadlessBackend) -> (HeadlessDevice, HeadlessQueue) {
    let adapter = backend.enumerate_adapters().unwrap().remove(0);
    let device = backend
        .create_device(&adapter.adapter, crate::core::FeatureLevel::Level11_0)
        .unwrap();
    let queue = device.create_command_queue().unwrap();
    (device, queue)
}

pub fn config(buffer_count: u32) -> GraphicsConfig {
    GraphicsConfig {
        backend: BackendKind::Headless,
        buffer_count,
        debug_validation: true,
        frame_wait_timeout_ms: 2000,
        ..GraphicsConfig::default()
    }
}

pub fn assets() -> PipelineAssets {
    geometry::demo_assets(b"vs".to_vec(), b"ps".to_vec(), 1280.0 / 720.0)
}
