//! 图形后端模块
//!
//! 本模块提供 `Device` trait 的两个实现：
//! - wgpu：窗口 + GPU，跨平台（Vulkan、Metal、DX12、OpenGL）
//! - software：无窗口的内存实现，执行清屏和光栅化并记录所有调用，用于测试和无 GPU 环境
//!
//! 渲染核心只依赖 `renderer::device::Device`，两个后端可以互换。

pub mod software;
pub mod wgpu;

pub use self::software::SoftwareDevice;
pub use self::wgpu::{WgpuContext, WgpuDevice, WinitSurface};
