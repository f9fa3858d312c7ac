//! 窗口尺寸变化处理
//!
//! 调整交换链前必须：
//!
//! 1. 排空 GPU（一次 flush）
//! 2. 释放所有缓冲引用
//! 3. 把最新的栅栏值写入所有帧槽
//!
//! 之后调整缓冲尺寸、重新查询后台缓冲索引、重新获取缓冲并原位重建视图。

use tracing::{debug, info};

use crate::core::error::Result;
use crate::gfx::backend::{GraphicsBackend, ScissorRect, Viewport};

use super::command::FrameState;
use super::Renderer;

/// 交换链缓冲不能为 0 尺寸，最小化窗口按 1x1 处理
pub fn clamp_extent(width: u32, height: u32) -> (u32, u32) {
    (width.max(1), height.max(1))
}

impl<B: GraphicsBackend> Renderer<B> {
    /// 调整表面尺寸
    ///
    /// # 返回值
    ///
    /// 尺寸变化并完成重建返回 `Ok(true)`；尺寸未变返回 `Ok(false)`，不做任何 GPU 操作
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        debug_assert_eq!(self.frame_state, FrameState::Idle, "resize during a frame");

        let (width, height) = clamp_extent(width, height);
        if (width, height) == self.size() {
            debug!(width, height, "Resize to the current size ignored");
            return Ok(false);
        }

        let drained = self.sync.flush(self.context.queue())?;
        let released = self.slots.release_buffers();
        self.slots.carry_forward(drained);

        self.surface.resize(width, height)?;
        let index = self.surface.refresh_index();

        self.slots.acquire_buffers(&self.surface)?;
        self.views.rebuild(self.context.device(), &self.slots)?;

        self.viewport = Viewport::full(width, height);
        self.scissor = ScissorRect::full(width, height);

        info!(
            width,
            height,
            released,
            fence = drained.value(),
            back_buffer = index,
            "Swap chain resized"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::WindowTarget;
    use crate::gfx::headless::{GpuCompletion, GpuEvent, HeadlessBackend};
    use crate::renderer::testing;
    use std::time::Duration;

    fn renderer(completion: GpuCompletion, buffer_count: u32) -> Renderer<HeadlessBackend> {
        Renderer::new(
            testing::backend(completion),
            &WindowTarget::detached(1280, 720),
            &testing::config(buffer_count),
            &testing::assets(),
        )
        .unwrap()
    }

    fn count(events: &[GpuEvent], predicate: impl Fn(&GpuEvent) -> bool) -> usize {
        events.iter().filter(|event| predicate(event)).count()
    }

    #[test]
    fn test_clamp_extent() {
        assert_eq!(clamp_extent(0, 0), (1, 1));
        assert_eq!(clamp_extent(0, 600), (1, 600));
        assert_eq!(clamp_extent(800, 600), (800, 600));
    }

    #[test]
    fn test_resize_flushes_once_and_rebuilds_views() {
        let mut renderer = renderer(GpuCompletion::Immediate, 2);
        let timeline = renderer.backend().timeline().clone();
        timeline.clear_journal();

        assert!(renderer.resize(1920, 1080).unwrap());
        assert_eq!(renderer.size(), (1920, 1080));

        let events = timeline.journal();
        assert_eq!(count(&events, |e| matches!(e, GpuEvent::Signaled { .. })), 1);
        assert_eq!(count(&events, |e| matches!(e, GpuEvent::BufferReleased { .. })), 2);
        assert_eq!(count(&events, |e| matches!(e, GpuEvent::ViewCreated { .. })), 2);
        assert!(events.contains(&GpuEvent::BuffersResized {
            width: 1920,
            height: 1080,
            buffer_count: 2,
        }));

        // 释放必须发生在调整之前
        let resized_at = events
            .iter()
            .position(|e| matches!(e, GpuEvent::BuffersResized { .. }))
            .unwrap();
        let last_release = events
            .iter()
            .rposition(|e| matches!(e, GpuEvent::BufferReleased { .. }))
            .unwrap();
        assert!(last_release < resized_at);
        assert!(timeline.violations().is_empty());
    }

    #[test]
    fn test_same_size_is_a_no_op() {
        let mut renderer = renderer(GpuCompletion::Immediate, 3);
        let timeline = renderer.backend().timeline().clone();
        timeline.clear_journal();

        assert!(!renderer.resize(1280, 720).unwrap());
        assert!(timeline.journal().is_empty());
    }

    #[test]
    fn test_minimized_window_clamps_to_one_pixel() {
        let mut renderer = renderer(GpuCompletion::Immediate, 2);
        assert!(renderer.resize(0, 0).unwrap());
        assert_eq!(renderer.size(), (1, 1));
        renderer.draw().unwrap();

        let draws: Vec<(f32, f32)> = renderer
            .backend()
            .timeline()
            .journal()
            .into_iter()
            .filter_map(|event| match event {
                GpuEvent::Draw { width, height, .. } => Some((width, height)),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![(1.0, 1.0)]);
        assert!(renderer.backend().timeline().violations().is_empty());
    }

    #[test]
    fn test_frames_continue_after_resize() {
        let mut renderer = renderer(GpuCompletion::Deferred(Duration::from_millis(1)), 3);
        for _ in 0..4 {
            renderer.draw().unwrap();
        }
        renderer.resize(800, 600).unwrap();
        assert_eq!(renderer.current_back_buffer_index(), 0);

        for _ in 0..4 {
            renderer.draw().unwrap();
        }
        renderer.resize(1024, 768).unwrap();
        renderer.draw().unwrap();

        let timeline = renderer.backend().timeline();
        assert!(timeline.violations().is_empty());
        assert_eq!(renderer.frame_count(), 9);

        let last_draw = timeline
            .journal()
            .into_iter()
            .filter_map(|event| match event {
                GpuEvent::Draw { width, height, .. } => Some((width, height)),
                _ => None,
            })
            .last();
        assert_eq!(last_draw, Some((1024.0, 768.0)));
    }
}
