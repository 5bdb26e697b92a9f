//! 资源生命周期追踪
//!
//! `ResourceTracker` 按创建顺序记录所有设备对象，释放时严格逆序进行：
//! 视图先于其资源，管线先于交换链，交换链最后，设备本身在追踪器清空之后才被丢弃。
//!
//! `ResourceBuilder` 是场景在启动阶段使用的创建入口：先校验描述符，
//! 再调用设备，成功后登记到追踪器。任何一步失败都会立即返回错误。

use tracing::{debug, error, warn};

use crate::core::error::{GraphicsError, Result};
use crate::renderer::device::{Device, DeviceInfo};
use crate::renderer::pipeline::{
    DepthStencilDescriptor, DepthStencilStateHandle, PipelineDescriptor, PipelineHandle,
};
use crate::renderer::resource::{
    BufferBind, BufferDescriptor, BufferHandle, BufferUsage, DepthStencilView, Extent2d,
    RenderTargetView, ResourceId, SamplerDescriptor, SamplerHandle, ShaderResourceView,
    TextureData, TextureDescriptor, TextureHandle,
};

/// 被追踪对象的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    SwapChain,
    Buffer,
    Texture,
    RenderTargetView,
    DepthStencilView,
    ShaderResourceView,
    Sampler,
    DepthStencilState,
    Pipeline,
}

/// 追踪记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedResource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub label: String,
    /// 视图所观察的资源
    pub parent: Option<ResourceId>,
}

/// 资源追踪器
#[derive(Debug, Default)]
pub struct ResourceTracker {
    entries: Vec<TrackedResource>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新创建的对象
    pub fn record(&mut self, id: ResourceId, kind: ResourceKind, label: impl Into<String>, parent: Option<ResourceId>) {
        let label = label.into();
        debug!(%id, ?kind, label = %label, parent = ?parent, "Resource created");
        self.entries.push(TrackedResource { id, kind, label, parent });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// 按创建顺序的全部记录
    pub fn entries(&self) -> &[TrackedResource] {
        &self.entries
    }

    /// 仍然存活的、观察 `id` 的视图数量
    pub fn live_views_of(&self, id: ResourceId) -> usize {
        self.entries.iter().filter(|e| e.parent == Some(id)).count()
    }

    /// 释放单个对象
    ///
    /// 仍有视图观察该资源时拒绝释放。
    pub fn release<D: Device + ?Sized>(&mut self, device: &mut D, id: ResourceId) -> Result<()> {
        let position = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| GraphicsError::InvalidUsage(format!("resource {} is not tracked", id)))?;

        let views = self.live_views_of(id);
        if views > 0 {
            return Err(GraphicsError::InvalidUsage(format!(
                "resource {} still has {} live view(s)",
                id, views
            ))
            .into());
        }

        device.release(id)?;
        let entry = self.entries.remove(position);
        debug!(id = %entry.id, kind = ?entry.kind, label = %entry.label, "Resource released");
        Ok(())
    }

    /// 按创建的逆序释放全部对象
    ///
    /// 某个对象释放失败时继续释放其余对象，最后返回第一个错误。
    pub fn release_all<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        let mut first_error = None;

        while let Some(entry) = self.entries.pop() {
            match device.release(entry.id) {
                Ok(()) => {
                    debug!(id = %entry.id, kind = ?entry.kind, label = %entry.label, "Resource released");
                }
                Err(e) => {
                    error!(id = %entry.id, kind = ?entry.kind, error = %e, "Failed to release resource");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(count = self.entries.len(), "Resource tracker dropped with live resources");
        }
    }
}

/// 校验后创建并登记资源
pub struct ResourceBuilder<'a, D: Device + ?Sized> {
    device: &'a mut D,
    tracker: &'a mut ResourceTracker,
}

impl<'a, D: Device + ?Sized> ResourceBuilder<'a, D> {
    pub fn new(device: &'a mut D, tracker: &'a mut ResourceTracker) -> Self {
        Self { device, tracker }
    }

    pub fn device_info(&self) -> &DeviceInfo {
        self.device.info()
    }

    /// 创建缓冲区
    pub fn buffer(&mut self, desc: &BufferDescriptor, initial: Option<&[u8]>) -> Result<BufferHandle> {
        desc.validate(initial)?;
        let handle = self.device.create_buffer(desc, initial)?;
        self.tracker
            .record(handle.id, ResourceKind::Buffer, desc.label_or_default(), None);
        Ok(handle)
    }

    /// 用 POD 数据创建不可变缓冲区
    pub fn immutable_buffer<T: bytemuck::Pod>(&mut self, bind: BufferBind, data: &[T], label: &str) -> Result<BufferHandle> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let desc = BufferDescriptor::new(bytes.len() as u64, bind, BufferUsage::Immutable).with_label(label);
        self.buffer(&desc, Some(bytes))
    }

    /// 创建不带初始数据的动态缓冲区
    pub fn dynamic_buffer(&mut self, bind: BufferBind, size: u64, label: &str) -> Result<BufferHandle> {
        let desc = BufferDescriptor::new(size, bind, BufferUsage::Dynamic).with_label(label);
        self.buffer(&desc, None)
    }

    /// 创建二维纹理
    pub fn texture2d(&mut self, desc: &TextureDescriptor, initial: Option<&TextureData>) -> Result<TextureHandle> {
        desc.validate(initial, self.device.info().max_texture_dimension)?;
        let handle = self.device.create_texture2d(desc, initial)?;
        self.tracker
            .record(handle.id, ResourceKind::Texture, desc.label_or_default(), None);
        Ok(handle)
    }

    pub fn render_target_view(&mut self, texture: &TextureHandle) -> Result<RenderTargetView> {
        let view = self.device.create_render_target_view(texture)?;
        self.tracker
            .record(view.id, ResourceKind::RenderTargetView, "render target view", Some(texture.id));
        Ok(view)
    }

    pub fn depth_stencil_view(&mut self, texture: &TextureHandle) -> Result<DepthStencilView> {
        let view = self.device.create_depth_stencil_view(texture)?;
        self.tracker
            .record(view.id, ResourceKind::DepthStencilView, "depth stencil view", Some(texture.id));
        Ok(view)
    }

    pub fn shader_resource_view(&mut self, texture: &TextureHandle) -> Result<ShaderResourceView> {
        let view = self.device.create_shader_resource_view(texture)?;
        self.tracker
            .record(view.id, ResourceKind::ShaderResourceView, "shader resource view", Some(texture.id));
        Ok(view)
    }

    pub fn sampler(&mut self, desc: &SamplerDescriptor) -> Result<SamplerHandle> {
        let sampler = self.device.create_sampler(desc)?;
        self.tracker
            .record(sampler.id, ResourceKind::Sampler, format!("{:?} sampler", desc.filter), None);
        Ok(sampler)
    }

    pub fn depth_stencil_state(&mut self, desc: &DepthStencilDescriptor) -> Result<DepthStencilStateHandle> {
        let state = self.device.create_depth_stencil_state(desc)?;
        self.tracker.record(
            state.id,
            ResourceKind::DepthStencilState,
            format!("depth {:?}", desc.compare),
            None,
        );
        Ok(state)
    }

    /// 创建管线
    pub fn pipeline(&mut self, desc: &PipelineDescriptor) -> Result<PipelineHandle> {
        desc.validate()?;
        let pipeline = self.device.create_pipeline(desc)?;
        self.tracker
            .record(pipeline.id, ResourceKind::Pipeline, desc.label.clone(), None);
        Ok(pipeline)
    }

    /// 与颜色目标等尺寸、等采样数的深度目标
    pub fn depth_target(&mut self, extent: Extent2d, sample_count: u32) -> Result<(TextureHandle, DepthStencilView)> {
        let desc = TextureDescriptor::depth_stencil(extent, sample_count).with_label("depth buffer");
        let texture = self.texture2d(&desc, None)?;
        let view = self.depth_stencil_view(&texture)?;
        Ok((texture, view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::software::SoftwareDevice;
    use crate::renderer::resource::TextureFormat;

    fn device() -> SoftwareDevice {
        SoftwareDevice::new(Extent2d::new(64, 48))
    }

    #[test]
    fn test_release_all_is_reverse_creation_order() {
        let mut device = device();
        let mut tracker = ResourceTracker::new();

        let created = {
            let mut builder = ResourceBuilder::new(&mut device, &mut tracker);
            let vb = builder.immutable_buffer(BufferBind::Vertex, &[0.0f32; 6], "vb").unwrap();
            let cb = builder.dynamic_buffer(BufferBind::Constant, 64, "cb").unwrap();
            let (depth, dsv) = builder.depth_target(Extent2d::new(64, 48), 1).unwrap();
            vec![vb.id, cb.id, depth.id, dsv.id]
        };

        tracker.release_all(&mut device).unwrap();
        assert!(tracker.is_empty());

        let mut expected = created;
        expected.reverse();
        assert_eq!(device.released(), expected.as_slice());
    }

    #[test]
    fn test_view_blocks_release_of_its_resource() {
        let mut device = device();
        let mut tracker = ResourceTracker::new();

        let (texture, view) = ResourceBuilder::new(&mut device, &mut tracker)
            .depth_target(Extent2d::new(64, 48), 1)
            .unwrap();
        assert_eq!(tracker.live_views_of(texture.id), 1);
        assert_eq!(view.format, TextureFormat::Depth32Float);

        assert!(tracker.release(&mut device, texture.id).is_err());
        assert!(device.released().is_empty());

        tracker.release(&mut device, view.id).unwrap();
        tracker.release(&mut device, texture.id).unwrap();
        assert_eq!(device.released(), &[view.id, texture.id]);
    }

    #[test]
    fn test_invalid_descriptor_never_reaches_device() {
        let mut device = device();
        let mut tracker = ResourceTracker::new();
        let mut builder = ResourceBuilder::new(&mut device, &mut tracker);

        let desc = BufferDescriptor::new(48, BufferBind::Vertex, BufferUsage::Immutable);
        let err = builder.buffer(&desc, None).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        assert!(tracker.is_empty());
        assert!(device.created().is_empty());
    }

    #[test]
    fn test_failed_creation_is_not_tracked() {
        let mut device = device();
        let mut tracker = ResourceTracker::new();

        device.fail_next_creation("simulated out of memory");
        let result = ResourceBuilder::new(&mut device, &mut tracker)
            .dynamic_buffer(BufferBind::Constant, 64, "transform");

        assert!(result.is_err());
        assert!(tracker.is_empty());
    }
}
