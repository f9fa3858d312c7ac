//! 呈现表面
//!
//! 封装交换链：创建时探测撕裂支持，并把探测结果固定在交换链标志里，
//! 之后每次调整尺寸都使用同样的标志。

use tracing::{debug, info};

use crate::core::error::{DxFrameError, Result};
use crate::gfx::backend::{
    GraphicsBackend, PresentParams, SurfaceDesc, SurfaceFormat, SwapChain, WindowTarget,
};

pub struct PresentationSurface<B: GraphicsBackend> {
    swap_chain: B::SwapChain,
    desc: SurfaceDesc,
    current_index: u32,
}

impl<B: GraphicsBackend> PresentationSurface<B> {
    /// 创建交换链
    ///
    /// # 参数
    ///
    /// * `backend` - 图形后端（工厂）
    /// * `queue` - 呈现所用的直接命令队列
    /// * `target` - 窗口句柄与客户区尺寸，0 尺寸会被钳制为 1
    /// * `buffer_count` - 缓冲数量
    pub fn create(
        backend: &B,
        queue: &B::Queue,
        target: &WindowTarget,
        buffer_count: u32,
    ) -> Result<Self> {
        if buffer_count < 2 {
            return Err(DxFrameError::Initialization(format!(
                "flip-model swap chains need at least 2 buffers, got {}",
                buffer_count
            )));
        }

        let desc = SurfaceDesc {
            width: target.width.max(1),
            height: target.height.max(1),
            buffer_count,
            format: SurfaceFormat::Rgba8Unorm,
            allow_tearing: backend.supports_tearing(),
        };

        let swap_chain = backend.create_swap_chain(queue, target, &desc)?;
        let current_index = swap_chain.current_back_buffer_index();

        info!(
            width = desc.width,
            height = desc.height,
            buffers = buffer_count,
            tearing = desc.allow_tearing,
            "Swap chain created"
        );

        Ok(Self { swap_chain, desc, current_index })
    }

    /// 获取一个缓冲引用
    pub fn acquire_buffer(&self, index: u32) -> Result<B::Buffer> {
        self.swap_chain.get_buffer(index)
    }

    /// 呈现当前缓冲
    ///
    /// 只有在关闭垂直同步、调用方允许、且表面支持时才带撕裂标志。
    pub fn present(&self, vsync: bool, allow_tearing: bool) -> Result<()> {
        let params = PresentParams::new(vsync, allow_tearing && self.desc.allow_tearing);
        self.swap_chain.present(params)
    }

    /// 重新查询当前后台缓冲索引
    pub fn refresh_index(&mut self) -> u32 {
        self.current_index = self.swap_chain.current_back_buffer_index();
        self.current_index
    }

    /// 调整缓冲尺寸，缓冲数量与标志保持不变
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let desc = SurfaceDesc { width, height, ..self.desc };
        self.swap_chain.resize_buffers(&desc)?;
        self.desc = desc;
        debug!(width, height, "Swap chain buffers resized");
        Ok(())
    }

    pub fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn buffer_count(&self) -> u32 {
        self.desc.buffer_count
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    pub fn tearing_supported(&self) -> bool {
        self.desc.allow_tearing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{GpuCompletion, GpuEvent, HeadlessBackend, HeadlessOptions};
    use crate::renderer::testing;

    #[test]
    fn test_zero_size_window_is_clamped() {
        let backend = testing::backend(GpuCompletion::Immediate);
        let (_device, queue) = testing::device_and_queue(&backend);
        let surface =
            PresentationSurface::create(&backend, &queue, &WindowTarget::detached(0, 0), 3).unwrap();

        assert_eq!((surface.width(), surface.height()), (1, 1));
        assert_eq!(surface.current_index(), 0);
    }

    #[test]
    fn test_swap_chain_disables_alt_enter_and_records_tearing() {
        let backend = HeadlessBackend::new(HeadlessOptions {
            tearing_supported: false,
            ..testing::options(GpuCompletion::Immediate)
        })
        .unwrap();
        let (_device, queue) = testing::device_and_queue(&backend);
        let surface =
            PresentationSurface::create(&backend, &queue, &WindowTarget::detached(800, 600), 2).unwrap();

        assert!(!surface.tearing_supported());
        assert!(backend.timeline().journal().contains(&GpuEvent::SwapChainCreated {
            width: 800,
            height: 600,
            buffer_count: 2,
            allow_tearing: false,
            alt_enter_disabled: true,
        }));
    }

    #[test]
    fn test_tearing_only_without_vsync() {
        let backend = testing::backend(GpuCompletion::Immediate);
        let (_device, queue) = testing::device_and_queue(&backend);
        let mut surface =
            PresentationSurface::create(&backend, &queue, &WindowTarget::detached(64, 64), 2).unwrap();

        surface.present(true, true).unwrap();
        assert_eq!(surface.refresh_index(), 1);
        surface.present(false, true).unwrap();
        assert_eq!(surface.refresh_index(), 0);

        let presents: Vec<(u32, bool)> = backend
            .timeline()
            .journal()
            .into_iter()
            .filter_map(|event| match event {
                GpuEvent::Presented { sync_interval, allow_tearing, .. } => Some((sync_interval, allow_tearing)),
                _ => None,
            })
            .collect();
        assert_eq!(presents, vec![(1, false), (0, true)]);
    }

    #[test]
    fn test_single_buffer_rejected() {
        let backend = testing::backend(GpuCompletion::Immediate);
        let (_device, queue) = testing::device_and_queue(&backend);
        assert!(PresentationSurface::create(&backend, &queue, &WindowTarget::detached(64, 64), 1).is_err());
    }
}
