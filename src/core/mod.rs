//! 核心功能模块
//!
//! 本模块提供了渲染器的基础功能，包括数学库、日志系统、配置管理和错误处理。
//! 这些模块独立于具体的图形 API，可以在任何渲染后端中使用。
//!
//! # 模块组织
//!
//! - `math`：数学库，提供向量、矩阵、颜色类型
//! - `log`：日志系统，提供结构化的日志记录功能
//! - `config`：运行配置，支持从配置文件和命令行加载
//! - `scene`：场景配置，选择演示场景并提供动画与投影参数
//! - `error`：错误处理，定义统一的错误类型

pub mod math;
pub mod log;
pub mod config;
pub mod scene;
pub mod error;

// 重新导出常用类型，方便使用
pub use math::{Color, Matrix4, Vector2, Vector3, Vector4};
pub use error::{RenderError, Result};
pub use config::Config;
pub use scene::SceneConfig;
