//! 模拟 GPU 时间线
//!
//! 所有模拟对象共享一条时间线：栅栏完成值、交换链缓冲状态、分配器占用情况，
//! 以及一份按执行顺序记录的事件日志。测试通过日志检查帧管线的同步性质。
//! 日志只在 `HeadlessOptions::record_journal` 打开时记录。
//!
//! 违反 D3D12 使用规则的操作（在 GPU 仍使用时重置分配器、资源状态不匹配、
//! 在缓冲仍被引用时调整交换链）总会计入违规记录，与日志开关无关。

use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::core::config::FeatureLevel;
use crate::core::error::{DxFrameError, GraphicsError, Result, NATIVE_INVALID_CALL};
use crate::gfx::backend::{CpuDescriptorHandle, ResourceState};

use super::HeadlessOptions;

/// 保留的违规消息条数上限，超出部分只计数
const MAX_KEPT_VIOLATIONS: usize = 64;

/// 模拟 GPU 完成提交的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuCompletion {
    /// 信号一入队即完成
    Immediate,
    /// 启动即暂停，由调用方显式推进；`resume` 之后等同于 `Immediate`
    Manual,
    /// 后台线程在固定延迟后完成
    Deferred(Duration),
}

/// 日志事件
#[derive(Debug, Clone, PartialEq)]
pub enum GpuEvent {
    ValidationEnabled,
    ValidationFilterInstalled { denied_messages: usize },
    DeviceCreated { adapter: u32, feature_level: FeatureLevel },
    QueueCreated,
    FenceCreated { fence: usize, initial: u64 },
    SwapChainCreated { width: u32, height: u32, buffer_count: u32, allow_tearing: bool, alt_enter_disabled: bool },
    ViewCreated { buffer: u32, handle: CpuDescriptorHandle },
    PipelineCreated { vertex_count: u32 },
    AllocatorReset { allocator: usize, completed: u64 },
    ListReset { allocator: usize },
    Transition { buffer: u32, before: ResourceState, after: ResourceState },
    RenderTargetBound { handle: CpuDescriptorHandle },
    Cleared { handle: CpuDescriptorHandle, color: [f32; 4] },
    Draw { vertex_count: u32, width: f32, height: f32 },
    ListClosed,
    Executed { allocator: usize, commands: usize },
    Signaled { fence: usize, value: u64 },
    Completed { fence: usize, value: u64 },
    Presented { buffer: u32, sync_interval: u32, allow_tearing: bool },
    BufferReleased { buffer: u32 },
    BuffersResized { width: u32, height: u32, buffer_count: u32 },
    Violation(String),
}

/// 命令列表中录制的命令
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Command {
    Transition { buffer: u32, before: ResourceState, after: ResourceState },
    SetRenderTarget(CpuDescriptorHandle),
    Clear(CpuDescriptorHandle, [f32; 4]),
    Draw { vertex_count: u32, width: f32, height: f32 },
}

#[derive(Default)]
struct TimelineState {
    record_journal: bool,
    journal: Vec<GpuEvent>,
    violations: Vec<String>,
    violation_count: usize,
    /// 每个栅栏的完成值
    fences: Vec<u64>,
    /// 手动模式下尚未完成的信号
    pending: VecDeque<(usize, u64)>,
    /// 上次信号之后执行过的分配器
    unsignaled: Vec<usize>,
    /// 分配器 -> (栅栏, 该栅栏达到此值后可重置)
    allocator_busy: Vec<Option<(usize, u64)>>,
    /// 暂停时信号进入 `pending`，等待显式推进
    paused: bool,
    buffer_states: Vec<ResourceState>,
    /// 每个缓冲在外的引用数
    outstanding: Vec<u32>,
    current_buffer: u32,
    /// 呈现后的缓冲索引序列，空表示依次轮转
    flip_order: Vec<u32>,
    flip_cursor: usize,
}

impl TimelineState {
    fn push(&mut self, event: GpuEvent) {
        if self.record_journal {
            self.journal.push(event);
        }
    }

    fn violation(&mut self, message: String) {
        warn!(target: "dxframe::headless", "{}", message);
        self.violation_count += 1;
        if self.violations.len() < MAX_KEPT_VIOLATIONS {
            self.violations.push(message.clone());
        }
        self.push(GpuEvent::Violation(message));
    }

    /// 按翻转序列得到游标处的缓冲索引
    fn flip_index(&self, buffer_count: u32) -> u32 {
        let count = buffer_count.max(1);
        match self.flip_order.len() {
            0 => (self.flip_cursor % count as usize) as u32,
            len => self.flip_order[self.flip_cursor % len] % count,
        }
    }

    fn reset_flip(&mut self, buffer_count: u32) {
        self.flip_cursor = 0;
        self.current_buffer = self.flip_index(buffer_count);
    }

    fn complete(&mut self, fence: usize, value: u64) {
        if let Some(completed) = self.fences.get_mut(fence) {
            if value > *completed {
                *completed = value;
            }
        }
        self.push(GpuEvent::Completed { fence, value });
    }
}

struct TimelineCore {
    state: Mutex<TimelineState>,
    progress: Condvar,
}

impl TimelineCore {
    fn lock(&self) -> MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, fence: usize, value: u64) {
        self.lock().complete(fence, value);
        self.progress.notify_all();
    }
}

/// 模拟 GPU 的共享时间线
pub struct GpuTimeline {
    core: Arc<TimelineCore>,
    completion: GpuCompletion,
    worker: Option<mpsc::Sender<(usize, u64)>>,
}

impl GpuTimeline {
    pub(super) fn new(options: &HeadlessOptions) -> Result<Self> {
        let completion = options.completion;
        let core = Arc::new(TimelineCore {
            state: Mutex::new(TimelineState {
                record_journal: options.record_journal,
                paused: completion == GpuCompletion::Manual,
                flip_order: options.flip_order.clone(),
                ..TimelineState::default()
            }),
            progress: Condvar::new(),
        });

        let worker = match completion {
            GpuCompletion::Deferred(latency) => Some(spawn_worker(Arc::clone(&core), latency)?),
            _ => None,
        };

        Ok(Self { core, completion, worker })
    }

    pub fn completion(&self) -> GpuCompletion {
        self.completion
    }

    /// 日志快照，未打开记录时为空
    pub fn journal(&self) -> Vec<GpuEvent> {
        self.core.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.core.lock().journal.clear();
    }

    /// 最早记录的违规消息，最多保留 64 条
    pub fn violations(&self) -> Vec<String> {
        self.core.lock().violations.clone()
    }

    /// 违规总数
    pub fn violation_count(&self) -> usize {
        self.core.lock().violation_count
    }

    pub fn completed_value(&self, fence: usize) -> u64 {
        self.core.lock().fences.get(fence).copied().unwrap_or(0)
    }

    /// 暂停模拟 GPU：之后的信号只入队，不完成
    pub fn pause(&self) {
        self.core.lock().paused = true;
    }

    /// 恢复模拟 GPU，并完成所有挂起信号
    pub fn resume(&self) {
        let mut state = self.core.lock();
        state.paused = false;
        while let Some((fence, value)) = state.pending.pop_front() {
            state.complete(fence, value);
        }
        drop(state);
        self.core.progress.notify_all();
    }

    /// 暂停期间尚未完成的信号数量
    pub fn pending_signals(&self) -> usize {
        self.core.lock().pending.len()
    }

    /// 完成最早的一个挂起信号，返回其栅栏值
    pub fn complete_next(&self) -> Option<u64> {
        let mut state = self.core.lock();
        let (fence, value) = state.pending.pop_front()?;
        state.complete(fence, value);
        drop(state);
        self.core.progress.notify_all();
        Some(value)
    }

    /// 完成所有值不超过 `value` 的挂起信号
    pub fn complete_through(&self, value: u64) {
        let mut state = self.core.lock();
        while let Some(&(fence, next)) = state.pending.front() {
            if next > value {
                break;
            }
            state.pending.pop_front();
            state.complete(fence, next);
        }
        drop(state);
        self.core.progress.notify_all();
    }

    /// 完成全部挂起信号
    pub fn complete_all(&self) {
        let mut state = self.core.lock();
        while let Some((fence, value)) = state.pending.pop_front() {
            state.complete(fence, value);
        }
        drop(state);
        self.core.progress.notify_all();
    }

    pub(super) fn record(&self, event: GpuEvent) {
        self.core.lock().push(event);
    }

    pub(super) fn violation(&self, message: String) {
        self.core.lock().violation(message);
    }

    pub(super) fn register_fence(&self, initial: u64) -> usize {
        let mut state = self.core.lock();
        state.fences.push(initial);
        let fence = state.fences.len() - 1;
        state.push(GpuEvent::FenceCreated { fence, initial });
        fence
    }

    pub(super) fn register_allocator(&self) -> usize {
        let mut state = self.core.lock();
        state.allocator_busy.push(None);
        state.allocator_busy.len() - 1
    }

    pub(super) fn signal(&self, fence: usize, value: u64) -> Result<()> {
        let mut state = self.core.lock();
        if fence >= state.fences.len() {
            return Err(GraphicsError::native("ID3D12CommandQueue::Signal", NATIVE_INVALID_CALL).into());
        }

        let covered: Vec<usize> = state.unsignaled.drain(..).collect();
        for allocator in covered {
            state.allocator_busy[allocator] = Some((fence, value));
        }
        state.push(GpuEvent::Signaled { fence, value });
        trace!(target: "dxframe::headless", fence, value, "signal queued");

        if state.paused {
            state.pending.push_back((fence, value));
            return Ok(());
        }

        match self.completion {
            GpuCompletion::Immediate | GpuCompletion::Manual => {
                state.complete(fence, value);
                drop(state);
                self.core.progress.notify_all();
            }
            GpuCompletion::Deferred(_) => {
                drop(state);
                let sender = self.worker.as_ref().ok_or_else(|| {
                    DxFrameError::Runtime("headless GPU worker is not running".to_string())
                })?;
                sender.send((fence, value)).map_err(|_| {
                    DxFrameError::Runtime("headless GPU worker stopped".to_string())
                })?;
            }
        }
        Ok(())
    }

    /// 阻塞直到栅栏完成值达到 `value`；超时返回 `false`
    pub(super) fn wait_for(&self, fence: usize, value: u64, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.core.lock();

        loop {
            let completed = state.fences.get(fence).copied().unwrap_or(0);
            if completed >= value {
                return true;
            }

            match deadline {
                None => {
                    state = self
                        .core
                        .progress
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    state = self
                        .core
                        .progress
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    pub(super) fn reset_allocator(&self, allocator: usize) {
        let mut state = self.core.lock();
        let completed = state.fences.first().copied().unwrap_or(0);

        if state.unsignaled.contains(&allocator) {
            state.violation(format!(
                "allocator {} reset while its commands have no covering signal",
                allocator
            ));
        }
        if let Some((fence, retire)) = state.allocator_busy[allocator] {
            let done = state.fences[fence];
            if done < retire {
                state.violation(format!(
                    "allocator {} reset while GPU is still executing (completed {} < {})",
                    allocator, done, retire
                ));
            } else {
                state.allocator_busy[allocator] = None;
            }
        }

        state.push(GpuEvent::AllocatorReset { allocator, completed });
    }

    /// 按提交顺序执行命令列表
    pub(super) fn execute(&self, allocator: usize, commands: &[Command]) {
        let mut state = self.core.lock();

        for command in commands {
            match *command {
                Command::Transition { buffer, before, after } => {
                    match state.buffer_states.get(buffer as usize).copied() {
                        Some(actual) if actual == before => {
                            state.buffer_states[buffer as usize] = after;
                        }
                        Some(actual) => state.violation(format!(
                            "buffer {} transitioned from {:?} but is in {:?}",
                            buffer, before, actual
                        )),
                        None => state.violation(format!("transition of unknown buffer {}", buffer)),
                    }
                    state.push(GpuEvent::Transition { buffer, before, after });
                }
                Command::SetRenderTarget(handle) => {
                    state.push(GpuEvent::RenderTargetBound { handle });
                }
                Command::Clear(handle, color) => {
                    state.push(GpuEvent::Cleared { handle, color });
                }
                Command::Draw { vertex_count, width, height } => {
                    state.push(GpuEvent::Draw { vertex_count, width, height });
                }
            }
        }

        if !state.unsignaled.contains(&allocator) {
            state.unsignaled.push(allocator);
        }
        state.push(GpuEvent::Executed { allocator, commands: commands.len() });
    }

    pub(super) fn init_swap_chain(&self, buffer_count: u32) {
        let mut state = self.core.lock();
        state.buffer_states = vec![ResourceState::Present; buffer_count as usize];
        state.outstanding = vec![0; buffer_count as usize];
        state.reset_flip(buffer_count);
    }

    pub(super) fn current_buffer(&self) -> u32 {
        self.core.lock().current_buffer
    }

    pub(super) fn acquire_buffer(&self, index: u32) -> Result<()> {
        let mut state = self.core.lock();
        match state.outstanding.get_mut(index as usize) {
            Some(count) => {
                *count += 1;
                Ok(())
            }
            None => Err(GraphicsError::native("IDXGISwapChain::GetBuffer", NATIVE_INVALID_CALL).into()),
        }
    }

    pub(super) fn release_buffer(&self, index: u32) {
        let mut state = self.core.lock();
        if let Some(count) = state.outstanding.get_mut(index as usize) {
            *count = count.saturating_sub(1);
        }
        state.push(GpuEvent::BufferReleased { buffer: index });
    }

    pub(super) fn present(&self, sync_interval: u32, allow_tearing: bool, buffer_count: u32) {
        let mut state = self.core.lock();
        let buffer = state.current_buffer;

        if state.buffer_states.get(buffer as usize) != Some(&ResourceState::Present) {
            state.violation(format!("buffer {} presented outside of the present state", buffer));
        }
        if allow_tearing && sync_interval != 0 {
            state.violation("tearing requested with a non-zero sync interval".to_string());
        }

        state.push(GpuEvent::Presented { buffer, sync_interval, allow_tearing });
        state.flip_cursor += 1;
        state.current_buffer = state.flip_index(buffer_count);
    }

    pub(super) fn resize(&self, width: u32, height: u32, buffer_count: u32) -> Result<()> {
        let mut state = self.core.lock();

        if state.outstanding.iter().any(|&count| count > 0) {
            state.violation("swap chain resized while buffers are still referenced".to_string());
            return Err(GraphicsError::native("IDXGISwapChain::ResizeBuffers", NATIVE_INVALID_CALL).into());
        }
        if width == 0 || height == 0 {
            state.violation(format!("swap chain resized to {}x{}", width, height));
        }

        state.buffer_states = vec![ResourceState::Present; buffer_count as usize];
        state.outstanding = vec![0; buffer_count as usize];
        state.reset_flip(buffer_count);
        state.push(GpuEvent::BuffersResized { width, height, buffer_count });
        Ok(())
    }
}

fn spawn_worker(core: Arc<TimelineCore>, latency: Duration) -> Result<mpsc::Sender<(usize, u64)>> {
    let (sender, receiver) = mpsc::channel::<(usize, u64)>();

    thread::Builder::new()
        .name("headless-gpu".to_string())
        .spawn(move || {
            // 发送端全部丢弃后退出
            for (fence, value) in receiver {
                thread::sleep(latency);
                core.complete(fence, value);
            }
        })?;

    Ok(sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(completion: GpuCompletion) -> HeadlessOptions {
        HeadlessOptions {
            completion,
            record_journal: true,
            ..HeadlessOptions::default()
        }
    }

    #[test]
    fn test_immediate_signal_completes() {
        let timeline = GpuTimeline::new(&options(GpuCompletion::Immediate)).unwrap();
        let fence = timeline.register_fence(0);
        timeline.signal(fence, 3).unwrap();
        assert_eq!(timeline.completed_value(fence), 3);
        assert!(timeline.wait_for(fence, 3, Some(Duration::ZERO)));
    }

    #[test]
    fn test_manual_completion_in_order() {
        let timeline = GpuTimeline::new(&options(GpuCompletion::Manual)).unwrap();
        let fence = timeline.register_fence(0);
        for value in 1..=3 {
            timeline.signal(fence, value).unwrap();
        }

        assert_eq!(timeline.pending_signals(), 3);
        assert!(!timeline.wait_for(fence, 1, Some(Duration::from_millis(5))));

        assert_eq!(timeline.complete_next(), Some(1));
        assert_eq!(timeline.completed_value(fence), 1);

        timeline.complete_through(2);
        assert_eq!(timeline.completed_value(fence), 2);
        assert_eq!(timeline.pending_signals(), 1);

        timeline.complete_all();
        assert_eq!(timeline.completed_value(fence), 3);
    }

    #[test]
    fn test_pause_and_resume() {
        let timeline = GpuTimeline::new(&options(GpuCompletion::Immediate)).unwrap();
        let fence = timeline.register_fence(0);
        timeline.pause();
        timeline.signal(fence, 1).unwrap();
        timeline.signal(fence, 2).unwrap();
        assert_eq!(timeline.completed_value(fence), 0);

        timeline.resume();
        assert_eq!(timeline.completed_value(fence), 2);
        timeline.signal(fence, 3).unwrap();
        assert_eq!(timeline.completed_value(fence), 3);
    }

    #[test]
    fn test_deferred_worker_completes() {
        let timeline = GpuTimeline::new(&options(GpuCompletion::Deferred(Duration::from_millis(1)))).unwrap();
        let fence = timeline.register_fence(0);
        timeline.signal(fence, 1).unwrap();
        assert!(timeline.wait_for(fence, 1, None));
    }

    #[test]
    fn test_busy_allocator_reset_is_a_violation() {
        let timeline = GpuTimeline::new(&options(GpuCompletion::Manual)).unwrap();
        let fence = timeline.register_fence(0);
        let allocator = timeline.register_allocator();

        timeline.execute(allocator, &[]);
        timeline.signal(fence, 1).unwrap();
        timeline.reset_allocator(allocator);
        assert_eq!(timeline.violations().len(), 1);

        timeline.complete_all();
        timeline.reset_allocator(allocator);
        assert_eq!(timeline.violations().len(), 1);
    }

    #[test]
    fn test_state_mismatch_is_a_violation() {
        let timeline = GpuTimeline::new(&options(GpuCompletion::Immediate)).unwrap();
        timeline.init_swap_chain(2);
        timeline.execute(0, &[Command::Transition {
            buffer: 0,
            before: ResourceState::RenderTarget,
            after: ResourceState::Present,
        }]);
        assert_eq!(timeline.violations().len(), 1);
    }

    #[test]
    fn test_resize_with_outstanding_buffer_fails() {
        let timeline = GpuTimeline::new(&options(GpuCompletion::Immediate)).unwrap();
        timeline.init_swap_chain(2);
        timeline.acquire_buffer(1).unwrap();
        assert!(timeline.resize(640, 480, 2).is_err());

        timeline.release_buffer(1);
        assert!(timeline.resize(640, 480, 2).is_ok());
    }

    #[test]
    fn test_completion_of_an_earlier_value_does_not_end_wait() {
        let timeline = Arc::new(GpuTimeline::new(&options(GpuCompletion::Manual)).unwrap());
        let fence = timeline.register_fence(0);
        timeline.signal(fence, 1).unwrap();
        timeline.signal(fence, 2).unwrap();

        let waiter = {
            let timeline = Arc::clone(&timeline);
            thread::spawn(move || {
                let reached = timeline.wait_for(fence, 2, Some(Duration::from_secs(5)));
                (reached, timeline.completed_value(fence))
            })
        };

        // 唤醒等待者，但目标值尚未达到
        thread::sleep(Duration::from_millis(10));
        timeline.complete_next();
        thread::sleep(Duration::from_millis(10));
        assert!(!waiter.is_finished());

        timeline.complete_next();
        assert_eq!(waiter.join().unwrap(), (true, 2));
    }

    #[test]
    fn test_violations_counted_without_journal() {
        let timeline = GpuTimeline::new(&HeadlessOptions {
            completion: GpuCompletion::Manual,
            ..HeadlessOptions::default()
        })
        .unwrap();
        let fence = timeline.register_fence(0);
        let allocator = timeline.register_allocator();

        for value in 1..=100 {
            timeline.execute(allocator, &[]);
            timeline.signal(fence, value).unwrap();
            timeline.reset_allocator(allocator);
        }

        assert!(timeline.journal().is_empty());
        assert_eq!(timeline.violation_count(), 100);
        assert_eq!(timeline.violations().len(), MAX_KEPT_VIOLATIONS);
    }

    #[test]
    fn test_scripted_flip_order() {
        let timeline = GpuTimeline::new(&HeadlessOptions {
            flip_order: vec![0, 2, 1],
            ..options(GpuCompletion::Immediate)
        })
        .unwrap();
        timeline.init_swap_chain(3);

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(timeline.current_buffer());
            timeline.present(1, false, 3);
        }
        assert_eq!(seen, vec![0, 2, 1, 0, 2]);

        timeline.resize(640, 480, 2).unwrap();
        // 超出缓冲数量的索引取模
        assert_eq!(timeline.current_buffer(), 0);
        timeline.present(1, false, 2);
        assert_eq!(timeline.current_buffer(), 0);
        timeline.present(1, false, 2);
        assert_eq!(timeline.current_buffer(), 1);
    }
}
