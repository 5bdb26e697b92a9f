//! 呈现表面
//!
//! 窗口系统对渲染核心只暴露三件事：可绘制的表面句柄、表面尺寸、
//! 以及非阻塞地轮询关闭与尺寸变化事件。

use tracing::debug;

use crate::core::error::{GraphicsError, Result};
use crate::renderer::resource::Extent2d;

/// 表面句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceHandle {
    /// 操作系统窗口（raw-window-handle 提供的原生句柄是否可用）
    Window { id: u64 },
    /// 无窗口的内存表面
    Headless { id: u64 },
    /// 窗口已销毁或尚未创建
    Unavailable,
}

impl SurfaceHandle {
    pub fn is_available(&self) -> bool {
        !matches!(self, SurfaceHandle::Unavailable)
    }

    /// 不可用时返回 `SurfaceUnavailable`
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(GraphicsError::SurfaceUnavailable("no drawable surface handle".to_string()).into())
        }
    }
}

/// 表面提供者
pub trait SurfaceProvider {
    fn surface_handle(&self) -> SurfaceHandle;

    /// 当前可绘制区域尺寸
    fn drawable_extent(&self) -> Extent2d;

    /// 是否收到关闭请求（非阻塞）
    fn poll_close_requested(&mut self) -> bool;

    /// 自上次轮询以来的尺寸变化（非阻塞）
    fn poll_resize(&mut self) -> Option<Extent2d>;
}

/// 无窗口表面
///
/// 尺寸固定，在轮询次数达到帧预算后请求关闭。
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    id: u64,
    extent: Extent2d,
    frame_budget: Option<u64>,
    polls: u64,
    pending_resize: Option<Extent2d>,
}

impl HeadlessSurface {
    pub fn new(extent: Extent2d, frame_budget: Option<u64>) -> Self {
        Self {
            id: 1,
            extent,
            frame_budget,
            polls: 0,
            pending_resize: None,
        }
    }

    /// 模拟一次窗口尺寸变化
    pub fn simulate_resize(&mut self, extent: Extent2d) {
        self.pending_resize = Some(extent);
    }

    /// 已轮询次数
    pub fn polls(&self) -> u64 {
        self.polls
    }
}

impl SurfaceProvider for HeadlessSurface {
    fn surface_handle(&self) -> SurfaceHandle {
        SurfaceHandle::Headless { id: self.id }
    }

    fn drawable_extent(&self) -> Extent2d {
        self.extent
    }

    fn poll_close_requested(&mut self) -> bool {
        let close = self.frame_budget.map_or(false, |budget| self.polls >= budget);
        if close {
            debug!(polls = self.polls, "Headless surface reached its frame budget");
        }
        self.polls += 1;
        close
    }

    fn poll_resize(&mut self) -> Option<Extent2d> {
        self.pending_resize.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_closes_after_budget() {
        let mut surface = HeadlessSurface::new(Extent2d::new(8, 8), Some(2));
        assert!(!surface.poll_close_requested());
        assert!(!surface.poll_close_requested());
        assert!(surface.poll_close_requested());
    }

    #[test]
    fn test_resize_is_reported_once() {
        let mut surface = HeadlessSurface::new(Extent2d::new(8, 8), None);
        surface.simulate_resize(Extent2d::new(16, 16));
        assert_eq!(surface.poll_resize(), Some(Extent2d::new(16, 16)));
        assert_eq!(surface.poll_resize(), None);
        assert_eq!(surface.drawable_extent(), Extent2d::new(8, 8));
    }

    #[test]
    fn test_unavailable_handle() {
        assert!(SurfaceHandle::Unavailable.ensure_available().is_err());
        assert!(SurfaceHandle::Headless { id: 1 }.ensure_available().is_ok());
    }
}
