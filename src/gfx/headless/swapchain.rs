//! 模拟交换链
//!
//! 翻转模型：每次呈现后当前索引按 `HeadlessOptions::flip_order` 前进，调整尺寸后回到序列开头。
//! 缓冲引用计数记录在时间线上，仍有引用时调整尺寸会失败。

use std::sync::{Arc, Mutex, PoisonError};

use crate::core::error::Result;
use crate::gfx::backend::{PresentParams, SurfaceDesc, SwapChain};

use super::timeline::{GpuEvent, GpuTimeline};
use super::HeadlessBackend;

pub struct HeadlessSwapChain {
    timeline: Arc<GpuTimeline>,
    desc: Mutex<SurfaceDesc>,
}

/// 交换链缓冲的引用，丢弃时释放
pub struct HeadlessBuffer {
    timeline: Arc<GpuTimeline>,
    index: u32,
}

impl HeadlessBuffer {
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Drop for HeadlessBuffer {
    fn drop(&mut self) {
        self.timeline.release_buffer(self.index);
    }
}

impl HeadlessSwapChain {
    pub(super) fn new(timeline: Arc<GpuTimeline>, desc: &SurfaceDesc) -> Self {
        timeline.init_swap_chain(desc.buffer_count);
        timeline.record(GpuEvent::SwapChainCreated {
            width: desc.width,
            height: desc.height,
            buffer_count: desc.buffer_count,
            allow_tearing: desc.allow_tearing,
            alt_enter_disabled: true,
        });
        Self {
            timeline,
            desc: Mutex::new(*desc),
        }
    }

    fn desc(&self) -> SurfaceDesc {
        *self.desc.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SwapChain<HeadlessBackend> for HeadlessSwapChain {
    fn current_back_buffer_index(&self) -> u32 {
        self.timeline.current_buffer()
    }

    fn get_buffer(&self, index: u32) -> Result<HeadlessBuffer> {
        self.timeline.acquire_buffer(index)?;
        Ok(HeadlessBuffer {
            timeline: Arc::clone(&self.timeline),
            index,
        })
    }

    fn present(&self, params: PresentParams) -> Result<()> {
        let desc = self.desc();
        if params.allow_tearing && !desc.allow_tearing {
            self.timeline
                .violation("tearing requested on a swap chain created without it".to_string());
        }
        self.timeline
            .present(params.sync_interval, params.allow_tearing, desc.buffer_count);
        Ok(())
    }

    fn resize_buffers(&self, desc: &SurfaceDesc) -> Result<()> {
        let current = self.desc();
        if desc.allow_tearing != current.allow_tearing {
            self.timeline
                .violation("swap chain flags changed across a resize".to_string());
        }

        self.timeline.resize(desc.width, desc.height, desc.buffer_count)?;
        *self.desc.lock().unwrap_or_else(PoisonError::into_inner) = *desc;
        Ok(())
    }
}
