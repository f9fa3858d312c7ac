//! dxframe - 帧同步呈现演示程序
//!
//! 在多缓冲交换链上渲染一个彩色三角形。可以通过配置文件或命令行参数选择后端：
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 模拟 GPU，无需窗口（任何平台）
//! cargo run -- --headless --frames 240
//!
//! # DirectX 12，软件适配器，关闭垂直同步
//! cargo run -- --dx12 --warp --no-vsync
//! ```
//!
//! # 按键
//!
//! - `V`：切换垂直同步
//! - `F11` / `Alt+Enter`：切换无边框全屏
//! - `Esc`：退出

use std::time::Instant;

use anyhow::{bail, Context};
use tracing::{error, info};

use dxframe::core::config::Config;
use dxframe::core::{log, BackendKind};
use dxframe::geometry;
use dxframe::gfx::backend::WindowTarget;
use dxframe::gfx::headless::{GpuCompletion, HeadlessBackend, HeadlessOptions};
use dxframe::renderer::Renderer;

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（config.toml）
/// 2. 应用命令行参数覆盖
/// 3. 验证配置
/// 4. 初始化日志系统
/// 5. 按后端运行帧循环
fn main() -> anyhow::Result<()> {
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());
    config.validate().context("Invalid configuration")?;

    let log_file = if config.logging.file_output {
        Some(config.logging.log_file.as_str())
    } else {
        None
    };
    log::init_logger(config.logging.level, config.logging.file_output, log_file)
        .context("Failed to initialize logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "dxframe starting...");
    info!(
        backend = config.graphics.backend.name(),
        width = config.window.width,
        height = config.window.height,
        buffers = config.graphics.buffer_count,
        vsync = config.graphics.vsync,
        "Graphics configuration"
    );

    let result = match config.graphics.backend {
        BackendKind::Headless => run_headless(&config),
        BackendKind::Dx12 => run_windowed(&config),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

/// 在模拟 GPU 上渲染固定帧数，中途调整一次尺寸
fn run_headless(config: &Config) -> anyhow::Result<()> {
    let latency = config.headless.gpu_latency();
    let completion = if latency.is_zero() {
        GpuCompletion::Immediate
    } else {
        GpuCompletion::Deferred(latency)
    };

    let backend = HeadlessBackend::new(HeadlessOptions {
        completion,
        ..HeadlessOptions::default()
    })
    .context("Failed to create headless backend")?;
    let timeline = backend.timeline().clone();

    let (width, height) = (config.window.width, config.window.height);
    let assets = geometry::demo_assets(
        b"headless-vs".to_vec(),
        b"headless-ps".to_vec(),
        width as f32 / height as f32,
    );
    let mut renderer = Renderer::new(backend, &WindowTarget::detached(width, height), &config.graphics, &assets)
        .context("Failed to initialize renderer")?;
    info!(adapter = renderer.adapter_name(), "Renderer initialized successfully");

    let frames = config.headless.frames;
    let start = Instant::now();
    for frame in 0..frames {
        if frame > 0 && frame == frames / 2 {
            renderer
                .resize(width / 2, height / 2)
                .context("Resize failed")?;
        }
        renderer
            .draw()
            .with_context(|| format!("Frame {} failed", frame))?;
    }
    let drained = renderer.flush().context("Failed to drain GPU")?;
    let elapsed = start.elapsed();

    info!(
        frames = renderer.frame_count(),
        elapsed_ms = elapsed.as_millis() as u64,
        fence = drained.value(),
        "Headless run complete"
    );

    let count = timeline.violation_count();
    for violation in timeline.violations() {
        error!(%violation, "Synchronization violation");
    }
    if count > 0 {
        bail!("{} synchronization violation(s) detected", count);
    }
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn run_windowed(_config: &Config) -> anyhow::Result<()> {
    bail!("The DirectX 12 backend is only available on Windows; run with --headless")
}

#[cfg(target_os = "windows")]
fn run_windowed(config: &Config) -> anyhow::Result<()> {
    use std::cell::Cell;
    use std::rc::Rc;

    use dxframe::gfx::dx12::{compile_demo_shaders, Dx12Backend};
    use winit::dpi::LogicalSize;
    use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
    use winit::event_loop::EventLoop;
    use winit::keyboard::{Key, ModifiersState, NamedKey};
    use winit::raw_window_handle::HasWindowHandle;
    use winit::window::{Fullscreen, Window, WindowBuilder};

    fn toggle_fullscreen(window: &Window) {
        let fullscreen = if window.fullscreen().is_some() {
            None
        } else {
            Some(Fullscreen::Borderless(None))
        };
        info!(fullscreen = fullscreen.is_some(), "Toggling fullscreen");
        window.set_fullscreen(fullscreen);
    }

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let window = WindowBuilder::new()
        .with_title(format!("{} [{}]", config.window.title, config.graphics.backend.name()))
        .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
        .with_resizable(config.window.resizable)
        .build(&event_loop)
        .context("Failed to create window")?;

    let size = window.inner_size();
    let handle = window
        .window_handle()
        .context("Failed to get window handle")?
        .as_raw();
    let target = WindowTarget::new(handle, size.width, size.height);

    let (vertex_shader, pixel_shader) = compile_demo_shaders().context("Failed to compile shaders")?;
    let assets = geometry::demo_assets(
        vertex_shader,
        pixel_shader,
        size.width.max(1) as f32 / size.height.max(1) as f32,
    );
    let backend = Dx12Backend::new(config.graphics.debug_validation)
        .context("Failed to create DXGI factory")?;
    let renderer = Renderer::new(backend, &target, &config.graphics, &assets)
        .context("Failed to initialize renderer")?;
    info!(
        adapter = renderer.adapter_name(),
        tearing = renderer.tearing_supported(),
        "Renderer initialized successfully"
    );
    info!("Entering main loop...");

    let failed = Rc::new(Cell::new(false));
    let loop_failed = failed.clone();
    let mut renderer = Some(renderer);
    let mut modifiers = ModifiersState::empty();

    event_loop
        .run(move |event, elwt| {
            let Some(active) = renderer.as_mut() else {
                return;
            };
            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => {
                        info!("Close requested, shutting down...");
                        elwt.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        if let Err(e) = active.resize(new_size.width, new_size.height) {
                            error!("Resize failed: {}", e);
                            loop_failed.set(true);
                            elwt.exit();
                        }
                    }
                    WindowEvent::ModifiersChanged(state) => modifiers = state.state(),
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                logical_key,
                                state: ElementState::Pressed,
                                repeat: false,
                                ..
                            },
                        ..
                    } => match logical_key {
                        Key::Character(ref c) if c.as_str().eq_ignore_ascii_case("v") => {
                            active.toggle_vsync();
                        }
                        Key::Named(NamedKey::F11) => toggle_fullscreen(&window),
                        Key::Named(NamedKey::Enter) if modifiers.alt_key() => toggle_fullscreen(&window),
                        Key::Named(NamedKey::Escape) => elwt.exit(),
                        _ => {}
                    },
                    WindowEvent::RedrawRequested => {
                        if let Err(e) = active.draw() {
                            error!("Draw failed: {}", e);
                            loop_failed.set(true);
                            elwt.exit();
                        }
                    }
                    _ => {}
                },
                Event::AboutToWait => window.request_redraw(),
                // 窗口销毁前排空 GPU 并释放交换链
                Event::LoopExiting => drop(renderer.take()),
                _ => {}
            }
        })
        .context("Event loop error")?;

    if failed.get() {
        bail!("Renderer stopped after a fatal error");
    }
    Ok(())
}
