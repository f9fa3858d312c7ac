//! dxframe - 帧同步呈现管线
//!
//! 多缓冲交换链上的 CPU/GPU 帧同步：每个后台缓冲拥有独立的命令分配器和退役栅栏值，
//! 同时在途的帧数不超过缓冲数量；调整尺寸前排空 GPU 并释放全部缓冲引用。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（日志、配置、错误处理）
//! - `geometry`: 演示三角形的顶点数据
//! - `gfx`: 图形后端抽象层（DirectX 12 与模拟后端）
//! - `renderer`: 与后端无关的帧管线
//!
//! # 使用示例
//!
//! ```no_run
//! use dxframe::core::Config;
//! use dxframe::geometry;
//! use dxframe::gfx::backend::WindowTarget;
//! use dxframe::gfx::headless::{HeadlessBackend, HeadlessOptions};
//! use dxframe::renderer::Renderer;
//!
//! let config = Config::default();
//! let backend = HeadlessBackend::new(HeadlessOptions::default())?;
//! let assets = geometry::demo_assets(b"vs".to_vec(), b"ps".to_vec(), 16.0 / 9.0);
//! let mut renderer = Renderer::new(backend, &WindowTarget::detached(1280, 720), &config.graphics, &assets)?;
//!
//! renderer.draw()?;
//! renderer.resize(1920, 1080)?;
//! # Ok::<(), dxframe::core::DxFrameError>(())
//! ```

pub mod core;
pub mod geometry;
pub mod gfx;
pub mod renderer;
