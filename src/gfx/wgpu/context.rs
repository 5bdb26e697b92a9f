//! wgpu 设备上下文
//!
//! 负责 wgpu 图形设备的初始化：
//! - 创建 wgpu 实例
//! - 在窗口上创建表面
//! - 选择适配器并创建逻辑设备和命令队列
//! - 生成表面配置（交换链在 `create_swap_chain` 时才真正配置）

use std::sync::Arc;

use tracing::{debug, error, info};
use winit::window::Window;

use crate::core::config::Config;
use crate::core::error::{GraphicsError, Result};
use crate::renderer::resource::Extent2d;

/// wgpu 设备上下文
///
/// 持有窗口引用，保证表面在窗口之前销毁。
pub struct WgpuContext {
    pub instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// 表面配置，尺寸取自创建时的窗口
    pub surface_config: wgpu::SurfaceConfiguration,
    pub debug: bool,
    window: Arc<Window>,
}

impl WgpuContext {
    /// 在窗口上创建 wgpu 设备
    ///
    /// 任何一步失败都返回 `CreationFailed`，窗口尺寸为 0 时返回 `SurfaceUnavailable`。
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        info!("Initializing wgpu backend");

        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(GraphicsError::SurfaceUnavailable("window has a zero-sized client area".to_string()).into());
        }

        debug!("Creating wgpu instance");
        let flags = if config.graphics.debug {
            wgpu::InstanceFlags::debugging()
        } else {
            wgpu::InstanceFlags::default()
        };
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            dx12_shader_compiler: Default::default(),
            flags,
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });

        debug!("Creating surface");
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| GraphicsError::creation("surface", e.to_string()))?;

        debug!("Requesting adapter");
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| GraphicsError::creation("adapter", "no adapter is compatible with the window surface"))?;

        let adapter_info = adapter.get_info();
        info!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "Selected GPU"
        );

        debug!("Creating logical device and queue");
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("render_scratch device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| GraphicsError::creation("device", e.to_string()))?;

        // 默认处理器会直接 panic，这里只记录；调用点的错误作用域负责上报
        device.on_uncaptured_error(Box::new(|e| {
            error!(error = %e, "Uncaptured wgpu error");
        }));

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| matches!(f, wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Bgra8Unorm))
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| GraphicsError::creation("surface", "adapter reports no surface formats"))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let present_mode = if config.graphics.vsync {
            wgpu::PresentMode::Fifo
        } else {
            wgpu::PresentMode::Immediate
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        info!(
            format = ?surface_config.format,
            width = size.width,
            height = size.height,
            "wgpu backend initialized"
        );

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            debug: config.graphics.debug,
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// 创建时的表面尺寸
    pub fn surface_extent(&self) -> Extent2d {
        Extent2d::new(self.surface_config.width, self.surface_config.height)
    }

    /// 按当前 `surface_config` 重新配置表面
    pub fn configure_surface(&self) {
        self.surface.configure(&self.device, &self.surface_config);
    }
}
