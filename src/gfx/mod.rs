//! 图形后端模块
//!
//! 本模块封装了图形 API 的底层实现，包括：
//! - DirectX 12：Windows 平台的真实后端
//! - headless：不依赖驱动的模拟后端，用于非 Windows 平台与测试
//!
//! 所有后端都实现了统一的 `GraphicsBackend` trait，
//! 帧管线只依赖该 trait。

pub mod backend;
pub mod pipeline;
pub mod headless;
#[cfg(target_os = "windows")]
pub mod dx12;

pub use backend::GraphicsBackend;
pub use headless::HeadlessBackend;
#[cfg(target_os = "windows")]
pub use dx12::Dx12Backend;
