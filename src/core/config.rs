//! 配置管理模块
//!
//! 提供运行配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 640
//! height = 480
//! title = "render_scratch"
//! resizable = false
//!
//! [graphics]
//! backend = "wgpu"    # 或 "software"
//! vsync = true
//! buffer_count = 2
//! debug = false
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//!
//! [run]
//! max_frames = 600    # 可选，省略则一直运行到窗口关闭
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};
use crate::renderer::swapchain::PresentInterval;

/// 软件后端在未指定帧数上限时默认渲染的帧数
pub const DEFAULT_SOFTWARE_FRAMES: u64 = 120;

/// 运行配置
///
/// 包含了渲染器运行所需的所有配置项。
/// 可以从配置文件加载，也可以通过代码构建。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,

    /// 运行控制
    #[serde(default)]
    pub run: RunConfig,
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

    /// 是否可调整大小（尺寸变化不会重建交换链）
    #[serde(default = "default_resizable")]
    pub resizable: bool,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 垂直同步，对应呈现间隔 1（开）或 0（关）
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// 交换链缓冲数量，至少为 2
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,

    /// 是否请求调试设备
    #[serde(default)]
    pub debug: bool,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// wgpu 后端（窗口 + GPU）
    Wgpu,
    /// 软件后端（无窗口，内存中执行并记录所有调用）
    Software,
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

/// 运行控制配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// 渲染帧数上限，达到后像关闭窗口一样退出
    #[serde(default)]
    pub max_frames: Option<u64>,
}

// 默认值函数
fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_title() -> String { "render_scratch".to_string() }
fn default_resizable() -> bool { false }
fn default_backend() -> GraphicsBackend { GraphicsBackend::Wgpu }
fn default_vsync() -> bool { true }
fn default_buffer_count() -> u32 { 2 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "render_scratch.log".to_string() }

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
            vsync: default_vsync(),
            buffer_count: default_buffer_count(),
            debug: false,
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
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载
    ///
    /// 文件不存在时使用默认配置；文件存在但无法解析时返回错误，
    /// 避免错误的配置被悄悄忽略。
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--software`: 使用软件后端
    /// - `--wgpu`: 使用 wgpu 后端
    /// - `--width <value>` / `--height <value>`: 设置窗口尺寸
    /// - `--no-vsync`: 关闭垂直同步（呈现间隔 0）
    /// - `--frames <value>`: 渲染指定帧数后退出
    /// - `--debug`: 请求调试设备
    ///
    /// 无法解析的数值会被记录为 `ConfigError`。
    pub fn apply_args<I>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--software") {
            self.graphics.backend = GraphicsBackend::Software;
        }

        if args.iter().any(|a| a == "--wgpu") {
            self.graphics.backend = GraphicsBackend::Wgpu;
        }

        if args.iter().any(|a| a == "--no-vsync") {
            self.graphics.vsync = false;
        }

        if args.iter().any(|a| a == "--debug") {
            self.graphics.debug = true;
        }

        if let Some(width) = parse_flag_value::<u32>(&args, "--width")? {
            self.window.width = width;
        }

        if let Some(height) = parse_flag_value::<u32>(&args, "--height")? {
            self.window.height = height;
        }

        if let Some(frames) = parse_flag_value::<u64>(&args, "--frames")? {
            self.run.max_frames = Some(frames);
        }

        Ok(())
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }
            .into());
        }

        if self.graphics.buffer_count < 2 {
            return Err(ConfigError::InvalidValue {
                field: "graphics.buffer_count".to_string(),
                reason: "A presentation chain needs at least 2 buffers".to_string(),
            }
            .into());
        }

        if self.run.max_frames == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "run.max_frames".to_string(),
                reason: "Frame budget must be at least 1".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// 配置对应的呈现间隔
    pub fn present_interval(&self) -> PresentInterval {
        PresentInterval::from_vsync(self.graphics.vsync)
    }

    /// 实际使用的帧数上限
    ///
    /// 软件后端没有窗口可以关闭，未配置时使用 `DEFAULT_SOFTWARE_FRAMES`。
    pub fn frame_budget(&self) -> Option<u64> {
        match (self.run.max_frames, self.graphics.backend) {
            (Some(frames), _) => Some(frames),
            (None, GraphicsBackend::Software) => Some(DEFAULT_SOFTWARE_FRAMES),
            (None, GraphicsBackend::Wgpu) => None,
        }
    }
}

/// 查找 `flag` 后面紧跟的值并解析
///
/// 命令行参数 `flag` 不存在时返回 `Ok(None)`。
pub(crate) fn parse_flag_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    let Some(idx) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };

    let raw = args.get(idx + 1).ok_or_else(|| ConfigError::InvalidValue {
        field: flag.to_string(),
        reason: "missing value".to_string(),
    })?;

    raw.parse().map(Some).map_err(|_| {
        ConfigError::InvalidValue {
            field: flag.to_string(),
            reason: format!("cannot parse '{}'", raw),
        }
        .into()
    })
}

impl GraphicsBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Wgpu => "wgpu",
            GraphicsBackend::Software => "software",
        }
    }
}
