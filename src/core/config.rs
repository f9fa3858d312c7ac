//! 配置管理模块
//!
//! 提供帧管线配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "dxframe"
//! resizable = true
//!
//! [graphics]
//! backend = "dx12"            # 或 "headless"
//! buffer_count = 3            # 2..=4
//! min_feature_level = "11_0"  # 11_0, 11_1, 12_0, 12_1
//! prefer_software_adapter = false
//! vsync = true
//! allow_tearing = true
//! debug_validation = true
//! frame_wait_timeout_ms = 5000  # 0 表示无限等待
//!
//! [headless]
//! frames = 120
//! gpu_latency_us = 500
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! log_file = "dxframe.log"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use super::error::{ConfigError, Result};

/// 交换链缓冲数量下限
pub const MIN_BUFFER_COUNT: u32 = 2;
/// 交换链缓冲数量上限
pub const MAX_BUFFER_COUNT: u32 = 4;

/// 完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 模拟后端配置
    #[serde(default)]
    pub headless: HeadlessConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 是否可调整大小
    #[serde(default = "default_resizable")]
    pub resizable: bool,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// 交换链缓冲数量，同时也是在途帧的上限
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,

    /// 设备创建所需的最低特性等级
    #[serde(default = "default_feature_level")]
    pub min_feature_level: FeatureLevel,

    /// 使用软件光栅化适配器（WARP）
    #[serde(default)]
    pub prefer_software_adapter: bool,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// 关闭垂直同步时允许撕裂
    #[serde(default = "default_allow_tearing")]
    pub allow_tearing: bool,

    /// 启用调试层与消息过滤
    #[serde(default = "default_debug_validation")]
    pub debug_validation: bool,

    /// 单帧等待 GPU 的超时（毫秒），0 为无限
    #[serde(default = "default_frame_wait_timeout_ms")]
    pub frame_wait_timeout_ms: u64,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// DirectX 12 后端（仅 Windows）
    Dx12,
    /// 模拟 GPU，无需窗口
    Headless,
}

/// 设备特性等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureLevel {
    #[serde(rename = "11_0")]
    Level11_0,
    #[serde(rename = "11_1")]
    Level11_1,
    #[serde(rename = "12_0")]
    Level12_0,
    #[serde(rename = "12_1")]
    Level12_1,
}

/// 模拟后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessConfig {
    /// 渲染帧数
    #[serde(default = "default_headless_frames")]
    pub frames: u32,

    /// 模拟 GPU 完成一次提交的延迟（微秒），0 为立即完成
    #[serde(default = "default_gpu_latency_us")]
    pub gpu_latency_us: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "dxframe".to_string() }
fn default_resizable() -> bool { true }
fn default_backend() -> BackendKind {
    if cfg!(target_os = "windows") {
        BackendKind::Dx12
    } else {
        BackendKind::Headless
    }
}
fn default_buffer_count() -> u32 { 3 }
fn default_feature_level() -> FeatureLevel { FeatureLevel::Level11_0 }
fn default_vsync() -> bool { true }
fn default_allow_tearing() -> bool { true }
fn default_debug_validation() -> bool { cfg!(debug_assertions) }
fn default_frame_wait_timeout_ms() -> u64 { 5000 }
fn default_headless_frames() -> u32 { 120 }
fn default_gpu_latency_us() -> u64 { 500 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "dxframe.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            resizable: default_resizable(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            buffer_count: default_buffer_count(),
            min_feature_level: default_feature_level(),
            prefer_software_adapter: false,
            vsync: default_vsync(),
            allow_tearing: default_allow_tearing(),
            debug_validation: default_debug_validation(),
            frame_wait_timeout_ms: default_frame_wait_timeout_ms(),
        }
    }
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frames: default_headless_frames(),
            gpu_latency_us: default_gpu_latency_us(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl GraphicsConfig {
    /// 单帧等待超时，`None` 表示无限等待
    pub fn frame_wait_timeout(&self) -> Option<Duration> {
        if self.frame_wait_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.frame_wait_timeout_ms))
        }
    }
}

impl HeadlessConfig {
    pub fn gpu_latency(&self) -> Duration {
        Duration::from_micros(self.gpu_latency_us)
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 成功返回 `Config` 实例，失败返回错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 从命令行参数覆盖配置
    ///
    /// # 说明
    ///
    /// 支持的参数：
    /// - `--dx12` / `--headless`: 选择后端
    /// - `--warp`: 使用软件适配器
    /// - `--no-vsync`: 关闭垂直同步
    /// - `--no-tearing`: 禁止撕裂
    /// - `--no-validation`: 关闭调试层
    /// - `--buffers <n>`: 交换链缓冲数量
    /// - `--frames <n>`: 模拟后端渲染帧数
    /// - `--width <value>` / `--height <value>`: 窗口尺寸
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        let has = |flag: &str| args.iter().any(|a| a == flag);

        if has("--dx12") {
            self.graphics.backend = BackendKind::Dx12;
        }
        if has("--headless") {
            self.graphics.backend = BackendKind::Headless;
        }
        if has("--warp") {
            self.graphics.prefer_software_adapter = true;
        }
        if has("--no-vsync") {
            self.graphics.vsync = false;
        }
        if has("--no-tearing") {
            self.graphics.allow_tearing = false;
        }
        if has("--no-validation") {
            self.graphics.debug_validation = false;
        }

        if let Some(count) = parse_value(&args, "--buffers") {
            self.graphics.buffer_count = count;
        }
        if let Some(frames) = parse_value(&args, "--frames") {
            self.headless.frames = frames;
        }
        if let Some(width) = parse_value(&args, "--width") {
            self.window.width = width;
        }
        if let Some(height) = parse_value(&args, "--height") {
            self.window.height = height;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }.into());
        }

        if !(MIN_BUFFER_COUNT..=MAX_BUFFER_COUNT).contains(&self.graphics.buffer_count) {
            return Err(ConfigError::InvalidValue {
                field: "graphics.buffer_count".to_string(),
                reason: format!(
                    "Buffer count must be between {} and {}",
                    MIN_BUFFER_COUNT, MAX_BUFFER_COUNT
                ),
            }.into());
        }

        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

impl BackendKind {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Dx12 => "DirectX 12",
            BackendKind::Headless => "Headless",
        }
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FeatureLevel::Level11_0 => "11_0",
            FeatureLevel::Level11_1 => "11_1",
            FeatureLevel::Level12_0 => "12_0",
            FeatureLevel::Level12_1 => "12_1",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.buffer_count, 3);
        assert_eq!(config.graphics.min_feature_level, FeatureLevel::Level11_0);
        assert_eq!(config.graphics.frame_wait_timeout(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.window.width = 0;
        assert!(config.validate().is_err());

        config.window.width = 640;
        config.graphics.buffer_count = 1;
        assert!(config.validate().is_err());

        config.graphics.buffer_count = 5;
        assert!(config.validate().is_err());

        config.graphics.buffer_count = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args([
            "dxframe", "--headless", "--warp", "--no-vsync", "--buffers", "2", "--width", "640",
            "--height", "abc",
        ]);

        assert_eq!(config.graphics.backend, BackendKind::Headless);
        assert!(config.graphics.prefer_software_adapter);
        assert!(!config.graphics.vsync);
        assert_eq!(config.graphics.buffer_count, 2);
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            backend = "headless"
            min_feature_level = "12_0"
            frame_wait_timeout_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.backend, BackendKind::Headless);
        assert_eq!(config.graphics.min_feature_level, FeatureLevel::Level12_0);
        assert_eq!(config.graphics.frame_wait_timeout(), None);
        assert_eq!(config.window.title, "dxframe");
        assert_eq!(config.logging.log_file, "dxframe.log");
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml_str("[graphics]\nmin_feature_level = \"9_1\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_feature_level_order() {
        assert!(FeatureLevel::Level12_1 > FeatureLevel::Level11_0);
        assert_eq!(FeatureLevel::Level11_1.to_string(), "11_1");
    }
}
