//! wgpu 后端
//!
//! - `WinitSurface`：winit 窗口，非阻塞轮询关闭和尺寸变化
//! - `WgpuContext`：实例、适配器、设备、队列和表面
//! - `WgpuDevice`：在 wgpu 上实现 `Device`，帧内命令先录制、呈现时回放

pub mod context;
pub mod device;
mod frame;
pub mod surface;

pub use context::WgpuContext;
pub use device::WgpuDevice;
pub use surface::WinitSurface;
