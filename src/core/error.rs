//! 错误处理模块
//!
//! 定义了帧管线中使用的统一错误类型。
//!
//! # 设计原则
//!
//! - 手写 `Display` 与 `Error` 实现，不依赖派生宏
//! - 原生 API 失败时保留调用名与返回码，便于定位
//! - 图形错误全部视为致命错误，不做设备恢复

use std::fmt;

/// 统一的 Result 类型
pub type Result<T> = std::result::Result<T, DxFrameError>;

/// dxframe 的顶层错误类型
#[derive(Debug)]
pub enum DxFrameError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误
    Graphics(GraphicsError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),

    /// 初始化错误
    Initialization(String),

    /// 运行时错误
    Runtime(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 创建失败时涉及的 GPU 对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuObject {
    Factory,
    Device,
    CommandQueue,
    SwapChain,
    DescriptorHeap,
    RenderTargetView,
    Fence,
    FenceEvent,
    CommandAllocator,
    CommandList,
    RootSignature,
    Shader,
    PipelineState,
    VertexBuffer,
}

impl GpuObject {
    pub fn name(&self) -> &'static str {
        match self {
            GpuObject::Factory => "DXGI factory",
            GpuObject::Device => "device",
            GpuObject::CommandQueue => "command queue",
            GpuObject::SwapChain => "swap chain",
            GpuObject::DescriptorHeap => "descriptor heap",
            GpuObject::RenderTargetView => "render target view",
            GpuObject::Fence => "fence",
            GpuObject::FenceEvent => "fence event",
            GpuObject::CommandAllocator => "command allocator",
            GpuObject::CommandList => "command list",
            GpuObject::RootSignature => "root signature",
            GpuObject::Shader => "shader",
            GpuObject::PipelineState => "pipeline state",
            GpuObject::VertexBuffer => "vertex buffer",
        }
    }
}

/// 图形 API 相关的错误
///
/// 所有变体都是致命的：调用方只负责记录日志并终止进程。
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicsError {
    /// 没有满足要求的适配器
    AdapterUnavailable(String),

    /// GPU 对象创建失败
    CreationFailed { object: GpuObject, reason: String },

    /// 原生调用返回失败码
    NativeCall { call: &'static str, code: i32, message: String },

    /// 设备被移除或挂起
    DeviceLost { code: i32, reason: String },

    /// 等待栅栏超时
    WaitTimeout { target: u64, completed: u64 },
}

impl GraphicsError {
    /// 由原生返回码构造错误，附带已知返回码的说明
    pub fn native(call: &'static str, code: i32) -> Self {
        GraphicsError::NativeCall {
            call,
            code,
            message: describe_native_code(code).to_string(),
        }
    }

    pub fn creation(object: GpuObject, reason: impl Into<String>) -> Self {
        GraphicsError::CreationFailed {
            object,
            reason: reason.into(),
        }
    }

    /// 原生返回码是否表示设备丢失
    pub fn is_device_lost_code(code: i32) -> bool {
        matches!(
            code as u32,
            DXGI_ERROR_DEVICE_REMOVED | DXGI_ERROR_DEVICE_HUNG | DXGI_ERROR_DEVICE_RESET
        )
    }
}

const S_FALSE: u32 = 0x0000_0001;
const E_NOTIMPL: u32 = 0x8000_4001;
const E_NOINTERFACE: u32 = 0x8000_4002;
const E_POINTER: u32 = 0x8000_4003;
const E_FAIL: u32 = 0x8000_4005;
const E_ACCESSDENIED: u32 = 0x8007_0005;
const E_OUTOFMEMORY: u32 = 0x8007_000E;
const E_INVALIDARG: u32 = 0x8007_0057;
const DXGI_ERROR_INVALID_CALL: u32 = 0x887A_0001;
const DXGI_ERROR_NOT_FOUND: u32 = 0x887A_0002;
const DXGI_ERROR_UNSUPPORTED: u32 = 0x887A_0004;
const DXGI_ERROR_DEVICE_REMOVED: u32 = 0x887A_0005;
const DXGI_ERROR_DEVICE_HUNG: u32 = 0x887A_0006;
const DXGI_ERROR_DEVICE_RESET: u32 = 0x887A_0007;
const DXGI_ERROR_WAS_STILL_DRAWING: u32 = 0x887A_000A;
const DXGI_ERROR_DRIVER_INTERNAL_ERROR: u32 = 0x887A_0020;
const D3D12_ERROR_ADAPTER_NOT_FOUND: u32 = 0x887E_0001;
const D3D12_ERROR_DRIVER_VERSION_MISMATCH: u32 = 0x887E_0002;

/// 原生返回码 `DXGI_ERROR_INVALID_CALL`，模拟后端也会使用
pub const NATIVE_INVALID_CALL: i32 = DXGI_ERROR_INVALID_CALL as i32;

/// 常见原生返回码的说明表
pub fn describe_native_code(code: i32) -> &'static str {
    match code as u32 {
        0 => "The operation completed successfully.",
        S_FALSE => "The operation succeeded but returned a non-standard completion.",
        E_NOTIMPL => "The requested method is not implemented.",
        E_NOINTERFACE => "The requested interface is not supported.",
        E_POINTER => "An invalid pointer was passed.",
        E_FAIL => "An unspecified failure occurred. The debug layer may have more detail.",
        E_ACCESSDENIED => "Access to the resource was denied.",
        E_OUTOFMEMORY => "Out of memory.",
        E_INVALIDARG => "One or more arguments are invalid.",
        DXGI_ERROR_INVALID_CALL => "The call was invalid for the object's current state.",
        DXGI_ERROR_NOT_FOUND => "The requested item was not found.",
        DXGI_ERROR_UNSUPPORTED => "The requested functionality is not supported by the device or driver.",
        DXGI_ERROR_DEVICE_REMOVED => "The GPU device was removed.",
        DXGI_ERROR_DEVICE_HUNG => "The GPU device stopped responding.",
        DXGI_ERROR_DEVICE_RESET => "The GPU device was reset.",
        DXGI_ERROR_WAS_STILL_DRAWING => "The GPU was still busy with the previous operation.",
        DXGI_ERROR_DRIVER_INTERNAL_ERROR => "The driver reported an internal error.",
        D3D12_ERROR_ADAPTER_NOT_FOUND => "The cached adapter is not present on this system.",
        D3D12_ERROR_DRIVER_VERSION_MISMATCH => "The driver version does not match the cached pipeline.",
        _ => "Unknown error code.",
    }
}

impl fmt::Display for DxFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DxFrameError::Config(e) => write!(f, "Configuration error: {}", e),
            DxFrameError::Graphics(e) => write!(f, "Graphics error: {}", e),
            DxFrameError::Io(e) => write!(f, "IO error: {}", e),
            DxFrameError::Log(msg) => write!(f, "Log error: {}", msg),
            DxFrameError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
            DxFrameError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::AdapterUnavailable(msg) => write!(f, "No usable adapter: {}", msg),
            GraphicsError::CreationFailed { object, reason } => {
                write!(f, "Failed to create {}: {}", object.name(), reason)
            }
            GraphicsError::NativeCall { call, code, message } => {
                write!(f, "{} failed with 0x{:08X}: {}", call, *code as u32, message)
            }
            GraphicsError::DeviceLost { code, reason } => {
                write!(f, "Device lost (0x{:08X}): {}", *code as u32, reason)
            }
            GraphicsError::WaitTimeout { target, completed } => write!(
                f,
                "Timed out waiting for fence value {} (completed {})",
                target, completed
            ),
        }
    }
}

impl std::error::Error for DxFrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DxFrameError::Io(e) => Some(e),
            DxFrameError::Config(e) => Some(e),
            DxFrameError::Graphics(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}

// 实现 From trait 以便于错误转换
impl From<std::io::Error> for DxFrameError {
    fn from(err: std::io::Error) -> Self {
        DxFrameError::Io(err)
    }
}

impl From<ConfigError> for DxFrameError {
    fn from(err: ConfigError) -> Self {
        DxFrameError::Config(err)
    }
}

impl From<GraphicsError> for DxFrameError {
    fn from(err: GraphicsError) -> Self {
        DxFrameError::Graphics(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_carries_description() {
        let err = GraphicsError::native("IDXGISwapChain::Present", 0x887A_0005u32 as i32);
        let text = err.to_string();
        assert!(text.contains("IDXGISwapChain::Present"));
        assert!(text.contains("0x887A0005"));
        assert!(text.contains("removed"));
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(describe_native_code(0x1234), "Unknown error code.");
        assert_eq!(describe_native_code(0x8007_000Eu32 as i32), "Out of memory.");
    }

    #[test]
    fn test_device_lost_codes() {
        assert!(GraphicsError::is_device_lost_code(0x887A_0006u32 as i32));
        assert!(!GraphicsError::is_device_lost_code(NATIVE_INVALID_CALL));
    }

    #[test]
    fn test_wrapping_into_top_level() {
        let err: DxFrameError = GraphicsError::WaitTimeout { target: 7, completed: 5 }.into();
        assert!(matches!(
            err,
            DxFrameError::Graphics(GraphicsError::WaitTimeout { target: 7, completed: 5 })
        ));
        assert_eq!(
            err.to_string(),
            "Graphics error: Timed out waiting for fence value 7 (completed 5)"
        );
    }

    #[test]
    fn test_creation_failed_display() {
        let err = GraphicsError::creation(GpuObject::Fence, "out of handles");
        assert_eq!(err.to_string(), "Failed to create fence: out of handles");
    }
}
