//! winit 窗口表面
//!
//! 用 `pump_events` 非阻塞地处理窗口事件，渲染循环因此保持在调用方手里。

use std::sync::Arc;
use std::time::Duration;

use raw_window_handle::HasWindowHandle;
use tracing::{debug, info, warn};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowBuilder};

use crate::core::config::WindowConfig;
use crate::core::error::{GraphicsError, Result};
use crate::renderer::resource::Extent2d;
use crate::renderer::surface::{SurfaceHandle, SurfaceProvider};

/// 窗口表面
pub struct WinitSurface {
    event_loop: EventLoop<()>,
    window: Arc<Window>,
    close_requested: bool,
    pending_resize: Option<Extent2d>,
}

impl WinitSurface {
    /// 创建事件循环和窗口
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new()
            .map_err(|e| GraphicsError::SurfaceUnavailable(format!("failed to create event loop: {}", e)))?;

        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .with_resizable(config.resizable)
            .build(&event_loop)
            .map_err(|e| GraphicsError::SurfaceUnavailable(format!("failed to create window: {}", e)))?;

        let size = window.inner_size();
        info!(
            title = %config.title,
            width = size.width,
            height = size.height,
            "Window created"
        );

        Ok(Self {
            event_loop,
            window: Arc::new(window),
            close_requested: false,
            pending_resize: None,
        })
    }

    /// 窗口的共享引用，用于创建 wgpu 表面
    pub fn window(&self) -> Arc<Window> {
        self.window.clone()
    }

    fn pump(&mut self) {
        let window_id = self.window.id();
        let close_requested = &mut self.close_requested;
        let pending_resize = &mut self.pending_resize;

        let status = self.event_loop.pump_events(Some(Duration::ZERO), |event, _target| {
            let Event::WindowEvent { window_id: id, event } = event else {
                return;
            };
            if id != window_id {
                return;
            }

            match event {
                WindowEvent::CloseRequested => {
                    debug!("Close requested by window system");
                    *close_requested = true;
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            logical_key: Key::Named(NamedKey::Escape),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => {
                    debug!("Escape pressed");
                    *close_requested = true;
                }
                WindowEvent::Resized(size) => {
                    *pending_resize = Some(Extent2d::new(size.width, size.height));
                }
                _ => {}
            }
        });

        if let PumpStatus::Exit(code) = status {
            warn!(code, "Event loop exited");
            self.close_requested = true;
        }
    }
}

impl SurfaceProvider for WinitSurface {
    fn surface_handle(&self) -> SurfaceHandle {
        match self.window.window_handle() {
            Ok(_) => SurfaceHandle::Window {
                id: u64::from(self.window.id()),
            },
            Err(e) => {
                warn!(error = %e, "Native window handle is unavailable");
                SurfaceHandle::Unavailable
            }
        }
    }

    fn drawable_extent(&self) -> Extent2d {
        let size = self.window.inner_size();
        Extent2d::new(size.width, size.height)
    }

    fn poll_close_requested(&mut self) -> bool {
        if !self.close_requested {
            self.pump();
        }
        self.close_requested
    }

    fn poll_resize(&mut self) -> Option<Extent2d> {
        self.pending_resize.take()
    }
}
