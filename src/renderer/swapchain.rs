//! 呈现链模块
//!
//! 管理交换链的后备缓冲环。每次呈现后当前可写的后备缓冲前进一格，
//! 获取目标时总是返回当前可写的那一个。
//!
//! 尺寸在创建时固定，窗口尺寸变化只记录日志，不重建交换链。
//! 设备丢失后呈现链被标记为失效，之后的获取与呈现都返回 `DeviceLost`。

use tracing::{debug, error, trace};

use crate::core::error::{ConfigError, GraphicsError, Result};
use crate::renderer::device::{Device, SwapChainInfo};
use crate::renderer::resource::{Extent2d, RenderTargetView, ResourceId, TextureFormat};
use crate::renderer::tracker::{ResourceKind, ResourceTracker};

/// 呈现间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentInterval {
    /// 不等待垂直同步
    Immediate = 0,
    /// 每次呈现等待一个垂直同步
    VSync = 1,
}

impl PresentInterval {
    pub fn from_vsync(vsync: bool) -> Self {
        if vsync {
            PresentInterval::VSync
        } else {
            PresentInterval::Immediate
        }
    }

    /// 同步间隔的数值
    pub fn sync_interval(&self) -> u32 {
        *self as u32
    }
}

/// 交换链描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub buffer_count: u32,
    pub present_interval: PresentInterval,
}

impl SwapChainDescriptor {
    pub fn new(extent: Extent2d, buffer_count: u32, present_interval: PresentInterval) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
            format: TextureFormat::Rgba8Unorm,
            buffer_count,
            present_interval,
        }
    }

    pub fn extent(&self) -> Extent2d {
        Extent2d::new(self.width, self.height)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_count < 2 {
            return Err(ConfigError::InvalidValue {
                field: "buffer_count".to_string(),
                reason: "A presentation chain needs at least 2 buffers".to_string(),
            }
            .into());
        }

        if self.width == 0 || self.height == 0 {
            return Err(GraphicsError::creation("swap chain", "surface extent is zero").into());
        }

        if self.format.is_depth() {
            return Err(GraphicsError::creation("swap chain", "depth formats cannot be presented").into());
        }

        Ok(())
    }
}

/// 单个后备缓冲的使用记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackBufferSlot {
    pub index: u32,
    /// 该缓冲被呈现的次数
    pub presents: u64,
}

/// 后备缓冲环
///
/// 管理多个后备缓冲的循环使用，当前索引指向 CPU 可写的那一个。
#[derive(Debug)]
pub struct BackBufferRing {
    slots: Vec<BackBufferSlot>,
    current_index: usize,
}

impl BackBufferRing {
    pub fn new(count: u32) -> Self {
        let slots = (0..count.max(2))
            .map(|index| BackBufferSlot { index, presents: 0 })
            .collect();

        Self {
            slots,
            current_index: 0,
        }
    }

    pub fn current(&self) -> &BackBufferSlot {
        &self.slots[self.current_index]
    }

    pub fn current_index(&self) -> u32 {
        self.current_index as u32
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> Option<&BackBufferSlot> {
        self.slots.get(index)
    }

    /// 当前缓冲已呈现，移动到下一个
    pub fn advance(&mut self) -> &BackBufferSlot {
        self.slots[self.current_index].presents += 1;
        self.current_index = (self.current_index + 1) % self.slots.len();
        self.current()
    }
}

/// 呈现链
#[derive(Debug)]
pub struct PresentationChain {
    info: SwapChainInfo,
    ring: BackBufferRing,
    interval: PresentInterval,
    present_count: u64,
    lost: bool,
}

impl PresentationChain {
    /// 在设备绑定的表面上创建呈现链并登记到追踪器
    pub fn create<D: Device + ?Sized>(device: &mut D, tracker: &mut ResourceTracker, desc: &SwapChainDescriptor) -> Result<Self> {
        desc.validate()?;

        let info = device.create_swap_chain(desc)?;
        tracker.record(info.id, ResourceKind::SwapChain, "swap chain", None);

        debug!(
            extent = %info.extent,
            format = ?info.format,
            buffers = info.buffer_count,
            interval = desc.present_interval.sync_interval(),
            "Presentation chain created"
        );

        Ok(Self {
            info,
            ring: BackBufferRing::new(info.buffer_count),
            interval: desc.present_interval,
            present_count: 0,
            lost: false,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.info.id
    }

    pub fn extent(&self) -> Extent2d {
        self.info.extent
    }

    pub fn format(&self) -> TextureFormat {
        self.info.format
    }

    pub fn buffer_count(&self) -> u32 {
        self.ring.len() as u32
    }

    /// 当前可写的后备缓冲索引
    pub fn current_index(&self) -> u32 {
        self.ring.current_index()
    }

    pub fn present_count(&self) -> u64 {
        self.present_count
    }

    pub fn interval(&self) -> PresentInterval {
        self.interval
    }

    pub fn ring(&self) -> &BackBufferRing {
        &self.ring
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// 获取当前可写后备缓冲的渲染目标视图
    pub fn acquire_current_target<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<RenderTargetView> {
        self.ensure_alive()?;

        let image_index = self.ring.current_index();
        let view = device
            .acquire_back_buffer(image_index)
            .map_err(|e| self.observe(e))?;
        trace!(image_index, view = %view.id, "Back buffer acquired");
        Ok(view)
    }

    /// 呈现当前后备缓冲，成功后环前进一格
    pub fn present<D: Device + ?Sized>(&mut self, device: &mut D, interval: PresentInterval) -> Result<u32> {
        self.ensure_alive()?;

        let image_index = self.ring.current_index();
        device
            .present(interval, image_index)
            .map_err(|e| self.observe(e))?;

        self.ring.advance();
        self.present_count += 1;
        self.interval = interval;
        trace!(image_index, presents = self.present_count, "Presented");
        Ok(image_index)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.lost {
            return Err(GraphicsError::DeviceLost("presentation chain was lost earlier".to_string()).into());
        }
        Ok(())
    }

    fn observe(&mut self, err: crate::core::error::RenderError) -> crate::core::error::RenderError {
        if err.is_device_lost() {
            error!(error = %err, "Presentation chain lost");
            self.lost = true;
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::software::SoftwareDevice;

    fn chain(buffers: u32) -> (SoftwareDevice, ResourceTracker, PresentationChain) {
        let mut device = SoftwareDevice::new(Extent2d::new(32, 32));
        let mut tracker = ResourceTracker::new();
        let desc = SwapChainDescriptor::new(Extent2d::new(32, 32), buffers, PresentInterval::VSync);
        let chain = PresentationChain::create(&mut device, &mut tracker, &desc).unwrap();
        (device, tracker, chain)
    }

    #[test]
    fn test_ring_advances_exactly_once_per_present() {
        let (mut device, mut tracker, mut chain) = chain(3);

        for expected in [0, 1, 2, 0, 1] {
            assert_eq!(chain.current_index(), expected);
            let target = chain.acquire_current_target(&mut device).unwrap();
            assert_eq!(target.extent, Extent2d::new(32, 32));
            assert_eq!(chain.present(&mut device, PresentInterval::VSync).unwrap(), expected);
        }

        assert_eq!(chain.present_count(), 5);
        assert_eq!(chain.ring().get(0).map(|s| s.presents), Some(2));
        tracker.release_all(&mut device).unwrap();
    }

    #[test]
    fn test_buffer_count_below_two_rejected() {
        let mut device = SoftwareDevice::new(Extent2d::new(32, 32));
        let mut tracker = ResourceTracker::new();
        let desc = SwapChainDescriptor::new(Extent2d::new(32, 32), 1, PresentInterval::VSync);
        assert!(PresentationChain::create(&mut device, &mut tracker, &desc).is_err());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_device_lost_marks_chain_lost() {
        let (mut device, mut tracker, mut chain) = chain(2);

        device.lose_device("driver reset");
        let err = chain.present(&mut device, PresentInterval::VSync).unwrap_err();
        assert!(err.is_device_lost());
        assert!(chain.is_lost());
        assert_eq!(chain.present_count(), 0);

        let err = chain.acquire_current_target(&mut device).unwrap_err();
        assert!(err.is_device_lost());
        tracker.release_all(&mut device).unwrap();
    }

    #[test]
    fn test_present_interval_values() {
        assert_eq!(PresentInterval::from_vsync(true).sync_interval(), 1);
        assert_eq!(PresentInterval::from_vsync(false).sync_interval(), 0);
    }
}
