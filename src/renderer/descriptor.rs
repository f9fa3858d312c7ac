//! 渲染目标视图表
//!
//! 一个 RTV 描述符堆，每个交换链缓冲占一个连续槽位：
//! 第 i 个视图位于 `堆起始 + i * 描述符间隔`。
//! 交换链调整尺寸后原位重建。

use tracing::debug;

use crate::core::error::{DxFrameError, GpuObject, GraphicsError, Result};
use crate::gfx::backend::{CpuDescriptorHandle, GpuDevice, GraphicsBackend, ViewHeap};

use super::frame::SlotArena;

pub struct ViewTable<B: GraphicsBackend> {
    heap: B::ViewHeap,
    /// 描述符间隔（字节），来自设备查询
    stride: u32,
    views: Vec<CpuDescriptorHandle>,
}

impl<B: GraphicsBackend> ViewTable<B> {
    /// 创建与帧槽数量相同的描述符堆，并为每个缓冲写入视图
    pub fn new(device: &B::Device, slots: &SlotArena<B>) -> Result<Self> {
        let heap = device.create_view_heap(slots.len() as u32)?;
        let mut table = Self {
            heap,
            stride: device.view_stride(),
            views: Vec::with_capacity(slots.len()),
        };
        table.rebuild(device, slots)?;
        Ok(table)
    }

    /// 为当前的缓冲重写全部视图
    pub fn rebuild(&mut self, device: &B::Device, slots: &SlotArena<B>) -> Result<()> {
        if slots.len() as u32 > self.heap.capacity() {
            return Err(GraphicsError::creation(
                GpuObject::RenderTargetView,
                format!(
                    "{} buffers do not fit in a heap of {} descriptors",
                    slots.len(),
                    self.heap.capacity()
                ),
            )
            .into());
        }

        let start = self.heap.cpu_start();
        self.views.clear();
        for (index, slot) in slots.iter().enumerate() {
            let buffer = slot.buffer().ok_or_else(|| {
                DxFrameError::Runtime(format!("frame slot {} has no buffer to view", index))
            })?;
            let handle = start.offset(index as u32, self.stride);
            device.create_render_target_view(buffer, handle);
            self.views.push(handle);
        }

        debug!(views = self.views.len(), stride = self.stride, "Render target views written");
        Ok(())
    }

    /// 第 `index` 个缓冲的视图
    pub fn view(&self, index: u32) -> Result<CpuDescriptorHandle> {
        self.views.get(index as usize).copied().ok_or_else(|| {
            DxFrameError::Runtime(format!("no render target view for buffer {}", index))
        })
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::WindowTarget;
    use crate::gfx::headless::{GpuCompletion, GpuEvent};
    use crate::renderer::surface::PresentationSurface;
    use crate::renderer::testing;

    #[test]
    fn test_views_are_contiguous() {
        let backend = testing::backend(GpuCompletion::Immediate);
        let (device, queue) = testing::device_and_queue(&backend);
        let surface =
            PresentationSurface::create(&backend, &queue, &WindowTarget::detached(64, 64), 3).unwrap();
        let slots = SlotArena::new(&device, &surface).unwrap();
        let table = ViewTable::new(&device, &slots).unwrap();

        let first = table.view(0).unwrap();
        for index in 0..3u32 {
            let view = table.view(index).unwrap();
            assert_eq!(view.ptr, first.ptr + (index * table.stride()) as usize);
            assert_eq!(view.index, index);
        }
        assert!(table.view(3).is_err());

        let created: Vec<u32> = backend
            .timeline()
            .journal()
            .into_iter()
            .filter_map(|event| match event {
                GpuEvent::ViewCreated { buffer, .. } => Some(buffer),
                _ => None,
            })
            .collect();
        assert_eq!(created, vec![0, 1, 2]);
    }

    #[test]
    fn test_rebuild_requires_buffers() {
        let backend = testing::backend(GpuCompletion::Immediate);
        let (device, queue) = testing::device_and_queue(&backend);
        let surface =
            PresentationSurface::create(&backend, &queue, &WindowTarget::detached(64, 64), 2).unwrap();
        let mut slots = SlotArena::new(&device, &surface).unwrap();
        let mut table = ViewTable::new(&device, &slots).unwrap();

        slots.release_buffers();
        assert!(table.rebuild(&device, &slots).is_err());
    }
}
