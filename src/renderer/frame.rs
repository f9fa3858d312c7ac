//! 帧槽
//!
//! 每个交换链缓冲对应一个帧槽，槽内捆绑：缓冲引用、命令分配器、退役栅栏值。
//! 帧槽按后台缓冲索引访问，索引来自交换链而不是自增计数。

use tracing::debug;

use crate::core::error::{DxFrameError, Result};
use crate::gfx::backend::{GpuDevice, GraphicsBackend};

use super::surface::PresentationSurface;
use super::sync::FenceValue;

/// 单个帧槽
pub struct FrameSlot<B: GraphicsBackend> {
    buffer: Option<B::Buffer>,
    allocator: B::Allocator,
    /// 最后一次使用本槽的提交所对应的栅栏值
    retire: FenceValue,
}

impl<B: GraphicsBackend> FrameSlot<B> {
    pub fn buffer(&self) -> Option<&B::Buffer> {
        self.buffer.as_ref()
    }

    pub fn allocator(&self) -> &B::Allocator {
        &self.allocator
    }

    pub fn retire_value(&self) -> FenceValue {
        self.retire
    }

    pub fn retire_at(&mut self, value: FenceValue) {
        self.retire = value;
    }
}

/// 帧槽数组
pub struct SlotArena<B: GraphicsBackend> {
    slots: Vec<FrameSlot<B>>,
}

impl<B: GraphicsBackend> SlotArena<B> {
    /// 为交换链的每个缓冲创建一个帧槽，退役值全部为 0
    pub fn new(device: &B::Device, surface: &PresentationSurface<B>) -> Result<Self> {
        let slots = (0..surface.buffer_count())
            .map(|index| -> Result<FrameSlot<B>> {
                Ok(FrameSlot {
                    buffer: Some(surface.acquire_buffer(index)?),
                    allocator: device.create_command_allocator()?,
                    retire: FenceValue::ZERO,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(slots = slots.len(), "Frame slots created");
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: u32) -> Result<&FrameSlot<B>> {
        let count = self.slots.len();
        self.slots
            .get(index as usize)
            .ok_or_else(|| out_of_range(index, count))
    }

    pub fn get_mut(&mut self, index: u32) -> Result<&mut FrameSlot<B>> {
        let count = self.slots.len();
        self.slots
            .get_mut(index as usize)
            .ok_or_else(|| out_of_range(index, count))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot<B>> {
        self.slots.iter()
    }

    /// 释放所有缓冲引用，返回释放的数量
    pub fn release_buffers(&mut self) -> usize {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.buffer.take())
            .count()
    }

    /// 从交换链重新获取所有缓冲
    pub fn acquire_buffers(&mut self, surface: &PresentationSurface<B>) -> Result<()> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.buffer = Some(surface.acquire_buffer(index as u32)?);
        }
        Ok(())
    }

    /// 把同一个退役值写入所有帧槽
    pub fn carry_forward(&mut self, value: FenceValue) {
        for slot in &mut self.slots {
            slot.retire = value;
        }
    }
}

fn out_of_range(index: u32, count: usize) -> DxFrameError {
    DxFrameError::Runtime(format!(
        "back buffer index {} out of range for {} frame slots",
        index, count
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::WindowTarget;
    use crate::gfx::headless::{GpuCompletion, GpuEvent, HeadlessBackend};
    use crate::renderer::testing;

    fn arena(count: u32) -> (HeadlessBackend, PresentationSurface<HeadlessBackend>, SlotArena<HeadlessBackend>) {
        let backend = testing::backend(GpuCompletion::Immediate);
        let (device, queue) = testing::device_and_queue(&backend);
        let surface =
            PresentationSurface::create(&backend, &queue, &WindowTarget::detached(64, 64), count).unwrap();
        let slots = SlotArena::new(&device, &surface).unwrap();
        (backend, surface, slots)
    }

    #[test]
    fn test_one_slot_per_buffer() {
        let (_backend, _surface, slots) = arena(3);
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|slot| slot.buffer().is_some()));
        assert!(slots.iter().all(|slot| slot.retire_value() == FenceValue::ZERO));
        assert!(slots.get(3).is_err());
    }

    #[test]
    fn test_release_and_reacquire() {
        let (backend, surface, mut slots) = arena(2);
        backend.timeline().clear_journal();

        assert_eq!(slots.release_buffers(), 2);
        assert_eq!(slots.release_buffers(), 0);
        let released = backend
            .timeline()
            .journal()
            .iter()
            .filter(|event| matches!(event, GpuEvent::BufferReleased { .. }))
            .count();
        assert_eq!(released, 2);

        slots.acquire_buffers(&surface).unwrap();
        assert!(slots.iter().all(|slot| slot.buffer().is_some()));
    }

    #[test]
    fn test_carry_forward() {
        let (_backend, _surface, mut slots) = arena(3);
        slots.get_mut(1).unwrap().retire_at(FenceValue::new(4));
        assert_eq!(slots.get(1).unwrap().retire_value(), FenceValue::new(4));

        slots.carry_forward(FenceValue::new(7));
        assert!(slots.iter().all(|slot| slot.retire_value() == FenceValue::new(7)));
    }
}
