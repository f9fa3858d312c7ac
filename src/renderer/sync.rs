//! GPU 同步机制模块
//!
//! 用单个单调递增的栅栏计数器协调 CPU 与 GPU：
//!
//! - `signal`：计数器加一，并在队列中插入该值的信号
//! - `wait`：阻塞直到 GPU 完成值达到目标
//! - `flush`：`signal` 后立即 `wait`，用于调整尺寸和退出前排空队列
//!
//! 每个帧槽记录自己最后一次提交对应的栅栏值（退役值），
//! 重用帧槽前只需等待该值完成。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::trace;

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{CommandQueue, GpuDevice, GpuFence, GraphicsBackend};

/// Fence 值
///
/// 用于CPU-GPU同步的单调递增值。0 表示"没有提交过任何工作"，总是已完成。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 尚未提交任何工作
    pub const ZERO: FenceValue = FenceValue(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// 帧同步器
///
/// 持有栅栏与 CPU 侧计数器。计数器只在 `signal` 中递增，因此信号值严格递增。
pub struct FrameSynchronizer<B: GraphicsBackend> {
    fence: B::Fence,
    /// 最后一次发出的信号值
    last_signaled: AtomicU64,
    /// 帧内等待的默认超时，`None` 为无限
    wait_timeout: Option<Duration>,
}

impl<B: GraphicsBackend> FrameSynchronizer<B> {
    /// 创建初始值为 0 的栅栏
    pub fn new(device: &B::Device, wait_timeout: Option<Duration>) -> Result<Self> {
        let fence = device.create_fence(0)?;
        Ok(Self {
            fence,
            last_signaled: AtomicU64::new(0),
            wait_timeout,
        })
    }

    /// 递增计数器并在队列中插入信号
    ///
    /// # 返回值
    ///
    /// 本次信号使用的栅栏值，GPU 执行完此前提交的全部工作后完成值将达到它
    pub fn signal(&self, queue: &B::Queue) -> Result<FenceValue> {
        let value = FenceValue::new(self.last_signaled.fetch_add(1, Ordering::AcqRel) + 1);
        queue.signal(&self.fence, value.value())?;
        trace!(fence = value.value(), "signal");
        Ok(value)
    }

    /// 阻塞直到 GPU 完成值达到 `value`
    ///
    /// 已完成时立即返回。超时返回 `GraphicsError::WaitTimeout`。
    pub fn wait(&self, value: FenceValue, timeout: Option<Duration>) -> Result<()> {
        if self.is_completed(value) {
            return Ok(());
        }

        trace!(fence = value.value(), completed = self.fence.completed_value(), "waiting for GPU");
        if self.fence.wait_for(value.value(), timeout)? {
            Ok(())
        } else {
            Err(GraphicsError::WaitTimeout {
                target: value.value(),
                completed: self.fence.completed_value(),
            }
            .into())
        }
    }

    /// 使用默认超时等待
    pub fn wait_for_frame(&self, value: FenceValue) -> Result<()> {
        self.wait(value, self.wait_timeout)
    }

    /// 排空队列：发出新信号并等待其完成
    pub fn flush(&self, queue: &B::Queue) -> Result<FenceValue> {
        let value = self.signal(queue)?;
        self.wait(value, self.wait_timeout)?;
        Ok(value)
    }

    /// 获取已完成的Fence值
    pub fn completed_value(&self) -> FenceValue {
        FenceValue::new(self.fence.completed_value())
    }

    /// 最后一次发出的信号值
    pub fn last_signaled(&self) -> FenceValue {
        FenceValue::new(self.last_signaled.load(Ordering::Acquire))
    }

    /// 检查特定Fence值是否已完成
    pub fn is_completed(&self, value: FenceValue) -> bool {
        self.completed_value() >= value
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DxFrameError;
    use crate::gfx::headless::{GpuCompletion, HeadlessBackend, HeadlessQueue};
    use crate::renderer::testing;
    use std::sync::Arc;
    use std::thread;

    fn synchronizer(
        completion: GpuCompletion,
        timeout: Duration,
    ) -> (HeadlessBackend, FrameSynchronizer<HeadlessBackend>, HeadlessQueue) {
        let backend = testing::backend(completion);
        let (device, queue) = testing::device_and_queue(&backend);
        let sync = FrameSynchronizer::<HeadlessBackend>::new(&device, Some(timeout)).unwrap();
        (backend, sync, queue)
    }

    #[test]
    fn test_fence_value() {
        assert_eq!(FenceValue::ZERO.next(), FenceValue::new(1));
        assert!(FenceValue::new(3) > FenceValue::new(2));
    }

    #[test]
    fn test_signals_are_strictly_increasing() {
        let (_backend, sync, queue) = synchronizer(GpuCompletion::Immediate, Duration::from_millis(20));
        let values: Vec<u64> = (0..5).map(|_| sync.signal(&queue).unwrap().value()).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
        assert_eq!(sync.last_signaled(), FenceValue::new(5));
    }

    #[test]
    fn test_wait_on_zero_returns_immediately() {
        let (_backend, sync, _queue) = synchronizer(GpuCompletion::Manual, Duration::from_millis(20));
        assert!(sync.wait(FenceValue::ZERO, Some(Duration::ZERO)).is_ok());
    }

    #[test]
    fn test_wait_times_out_until_completed() {
        let (backend, sync, queue) = synchronizer(GpuCompletion::Manual, Duration::from_millis(20));
        for _ in 0..3 {
            sync.signal(&queue).unwrap();
        }

        let err = sync.wait(FenceValue::new(2), Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(
            err,
            DxFrameError::Graphics(GraphicsError::WaitTimeout { target: 2, completed: 0 })
        ));

        backend.timeline().complete_next();
        assert!(sync.wait_for_frame(FenceValue::new(2)).is_err());

        backend.timeline().complete_next();
        assert!(sync.wait_for_frame(FenceValue::new(2)).is_ok());
        assert!(!sync.is_completed(FenceValue::new(3)));
    }

    #[test]
    fn test_wait_blocks_until_gpu_catches_up() {
        let (backend, sync, queue) = synchronizer(GpuCompletion::Manual, Duration::from_millis(20));
        let value = sync.signal(&queue).unwrap();

        let timeline = Arc::clone(backend.timeline());
        let gpu = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            timeline.complete_all();
        });

        sync.wait(value, None).unwrap();
        assert!(sync.completed_value() >= value);
        gpu.join().unwrap();
    }

    #[test]
    fn test_flush_after_timed_out_gate_waits_for_its_own_value() {
        let (backend, sync, queue) = synchronizer(GpuCompletion::Manual, Duration::from_secs(5));
        for _ in 0..3 {
            sync.signal(&queue).unwrap();
        }
        assert!(sync.wait(FenceValue::new(2), Some(Duration::ZERO)).is_err());

        // 超时的目标值随后才完成
        backend.timeline().complete_through(2);

        let timeline = Arc::clone(backend.timeline());
        let gpu = thread::spawn(move || {
            while timeline.pending_signals() < 2 {
                thread::sleep(Duration::from_millis(1));
            }
            timeline.complete_next();
            thread::sleep(Duration::from_millis(10));
            timeline.complete_next();
        });

        let drained = sync.flush(&queue).unwrap();
        assert_eq!(drained, FenceValue::new(4));
        assert_eq!(sync.completed_value(), drained);
        gpu.join().unwrap();
    }

    #[test]
    fn test_flush_drains_queue() {
        let (_backend, sync, queue) = synchronizer(GpuCompletion::Deferred(Duration::from_millis(1)), Duration::from_secs(5));
        sync.signal(&queue).unwrap();
        sync.signal(&queue).unwrap();

        let drained = sync.flush(&queue).unwrap();
        assert_eq!(drained, FenceValue::new(3));
        assert_eq!(sync.completed_value(), drained);
    }
}
