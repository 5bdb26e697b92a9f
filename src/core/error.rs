//! 错误处理模块
//!
//! 定义了渲染器中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - `ConfigError`：配置文件读取、解析、校验失败
//! - `GraphicsError`：设备/资源创建失败、着色器编译失败、设备丢失、表面不可用
//! - `FrameError`：每帧状态机被违反（未绑定就绘制、帧外写入动态缓冲等）
//! - `AssetError`：纹理图像解码失败
//!
//! 所有错误都在出错的调用点被检测并向上传播，启动阶段的任何失败都会终止进程，
//! 不做局部恢复，也不做重试。

use std::path::PathBuf;

use thiserror::Error;

use crate::renderer::state::{BindingCategory, FrameEvent, FrameState};

/// 渲染器统一的 Result 类型
pub type Result<T> = std::result::Result<T, RenderError>;

/// 顶层错误类型
#[derive(Debug, Error)]
pub enum RenderError {
    /// 配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 图形 API 错误
    #[error(transparent)]
    Graphics(#[from] GraphicsError),

    /// 帧状态机错误
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// 资源文件错误
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// IO 错误
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug, Error)]
pub enum GraphicsError {
    /// 设备或资源创建失败
    #[error("Failed to create {what}: {reason}")]
    CreationFailed { what: String, reason: String },

    /// 着色器编译失败，附带编译器诊断输出
    #[error("Shader compilation failed for entry point '{entry_point}': {log}")]
    CompileFailed { entry_point: String, log: String },

    /// 设备丢失（驱动重置、表面失效等），对本次运行是致命的
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// 窗口或表面不可用
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// 资源使用方式不合法（例如改写不可变缓冲区）
    #[error("Invalid resource usage: {0}")]
    InvalidUsage(String),

    /// 后端不支持的操作
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// 每帧状态机相关的错误
#[derive(Debug, Error)]
pub enum FrameError {
    /// 非法的状态转换
    #[error("Illegal frame transition: {event:?} while {from:?}")]
    InvalidTransition { from: FrameState, event: FrameEvent },

    /// 绘制前尚有绑定类别未满足
    #[error("Draw issued before all bindings were set, missing: {0:?}")]
    MissingBindings(Vec<BindingCategory>),

    /// 绑定的图元拓扑与管线声明不一致
    #[error("Bound topology {bound} does not match pipeline topology {expected}")]
    TopologyMismatch { bound: String, expected: String },

    /// 顶点缓冲步长与输入布局不一致
    #[error("Vertex stride {bound} does not match input layout stride {expected}")]
    StrideMismatch { bound: u32, expected: u32 },

    /// 索引绘制时没有绑定索引缓冲
    #[error("Indexed draw issued without an index buffer")]
    IndexBufferMissing,

    /// 索引范围超出索引缓冲
    #[error("Index range {first}..{end} exceeds index buffer of {available} indices")]
    IndexOutOfRange { first: u32, end: u32, available: u32 },

    /// 颜色视图与深度视图的尺寸或采样数不匹配
    #[error("Render target and depth target do not match: {0}")]
    TargetMismatch(String),

    /// 资源绑定到了错误的槽位类型
    #[error("Resource bound to the wrong slot: {0}")]
    WrongBinding(String),

    /// 在帧之外执行了仅帧内允许的操作
    #[error("Operation '{0}' is only allowed inside a frame")]
    OutsideFrame(&'static str),
}

/// 资源文件相关的错误
#[derive(Debug, Error)]
pub enum AssetError {
    /// 文件不存在
    #[error("Asset file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// 图像解码失败
    #[error("Failed to decode image '{}': {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// 解码结果不满足纹理要求
    #[error("Decoded image is not usable as a texture: {0}")]
    InvalidImage(String),
}

impl RenderError {
    /// 进程退出码
    ///
    /// 启动失败时，进程以最后一个失败调用所属类别的非零退出码结束。
    pub fn exit_code(&self) -> i32 {
        match self {
            RenderError::Config(_) => 1,
            RenderError::Graphics(GraphicsError::CreationFailed { .. }) => 2,
            RenderError::Graphics(GraphicsError::CompileFailed { .. }) => 3,
            RenderError::Graphics(GraphicsError::DeviceLost(_)) => 4,
            RenderError::Graphics(GraphicsError::SurfaceUnavailable(_)) => 5,
            RenderError::Graphics(_) => 2,
            RenderError::Asset(_) => 6,
            RenderError::Frame(_) => 7,
            RenderError::Io(_) => 8,
        }
    }

    /// 是否为设备丢失
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RenderError::Graphics(GraphicsError::DeviceLost(_)))
    }
}

impl GraphicsError {
    /// 构造创建失败错误的便捷函数
    pub fn creation(what: impl Into<String>, reason: impl Into<String>) -> Self {
        GraphicsError::CreationFailed {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_nonzero_and_distinct_per_category() {
        let creation: RenderError = GraphicsError::creation("buffer", "out of memory").into();
        let compile: RenderError = GraphicsError::CompileFailed {
            entry_point: "vs_main".into(),
            log: "error".into(),
        }
        .into();
        let lost: RenderError = GraphicsError::DeviceLost("reset".into()).into();
        let surface: RenderError = GraphicsError::SurfaceUnavailable("no window".into()).into();

        assert_eq!(creation.exit_code(), 2);
        assert_eq!(compile.exit_code(), 3);
        assert_eq!(lost.exit_code(), 4);
        assert_eq!(surface.exit_code(), 5);
        assert!(lost.is_device_lost());
        assert!(!creation.is_device_lost());
    }

    #[test]
    fn test_context_chain_names_the_cause_once() {
        let err: RenderError = AssetError::FileNotFound(PathBuf::from("/x.png")).into();
        let chained = format!("{:#}", anyhow::Error::from(err).context("creating scene"));
        assert_eq!(chained.matches("/x.png").count(), 1);
        assert!(chained.starts_with("creating scene: "));
    }

    #[test]
    fn test_compile_error_carries_log() {
        let err: RenderError = GraphicsError::CompileFailed {
            entry_point: "ps_main".into(),
            log: "unknown identifier `colr`".into(),
        }
        .into();
        let message = err.to_string();
        assert!(message.contains("ps_main"));
        assert!(message.contains("unknown identifier"));
    }
}
