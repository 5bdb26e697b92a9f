//! 设备能力接口
//!
//! 本模块定义了所有后端（wgpu、软件）都必须实现的设备 trait。
//! 上层的资源管理、帧状态机和场景代码只依赖这个 trait，
//! 因此软件后端可以在没有 GPU 的情况下校验调用顺序与生命周期。
//!
//! # 设计理念
//!
//! - **同步创建**：所有创建调用都是同步的，失败立即返回，不重试
//! - **句柄不拥有资源**：创建返回 `Copy` 句柄，释放通过 `release(id)` 显式进行
//! - **绘制包**：每次绘制把已解析的完整绑定状态一次性交给后端

use crate::core::error::Result;
use crate::core::math::Color;
use crate::renderer::pipeline::{
    DepthStencilDescriptor, DepthStencilStateHandle, IndexFormat, PipelineDescriptor,
    PipelineHandle, PrimitiveTopology, ResourceBinding, Viewport,
};
use crate::renderer::resource::{
    BufferDescriptor, BufferHandle, DepthStencilView, Extent2d, RenderTargetView, ResourceId,
    SamplerDescriptor, SamplerHandle, ShaderResourceView, TextureData, TextureDescriptor,
    TextureFormat, TextureHandle,
};
use crate::renderer::swapchain::{PresentInterval, SwapChainDescriptor};

/// 设备信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// 后端名称（"wgpu"、"software"）
    pub backend_name: String,
    /// 适配器名称
    pub adapter_name: String,
    /// 是否为调试设备
    pub debug: bool,
    /// 二维纹理最大边长
    pub max_texture_dimension: u32,
}

/// 交换链创建结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainInfo {
    pub id: ResourceId,
    pub extent: Extent2d,
    pub format: TextureFormat,
    pub buffer_count: u32,
}

/// 绑定的顶点缓冲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub buffer: BufferHandle,
    pub stride: u32,
    pub offset: u64,
}

/// 绑定的索引缓冲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferBinding {
    pub buffer: BufferHandle,
    pub format: IndexFormat,
    pub offset: u64,
}

impl IndexBufferBinding {
    /// 缓冲区中可用的索引数量
    pub fn available_indices(&self) -> u64 {
        self.buffer.size.saturating_sub(self.offset) / self.format.size()
    }
}

/// 按管线声明顺序解析出的资源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundResource {
    ConstantBuffer(BufferHandle),
    Texture(ShaderResourceView),
    Sampler(SamplerHandle),
}

impl BoundResource {
    pub fn id(&self) -> ResourceId {
        match self {
            BoundResource::ConstantBuffer(buffer) => buffer.id,
            BoundResource::Texture(view) => view.id,
            BoundResource::Sampler(sampler) => sampler.id,
        }
    }
}

/// 绘制调用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCall {
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    },
}

impl DrawCall {
    /// 本次调用处理的顶点（或索引）数量
    pub fn element_count(&self) -> u32 {
        match self {
            DrawCall::Draw { vertex_count, .. } => *vertex_count,
            DrawCall::DrawIndexed { index_count, .. } => *index_count,
        }
    }
}

/// 绘制包：一次绘制所需的全部已解析状态
///
/// `bindings` 与 `pipeline.info().bindings` 等长且顺序一致。
#[derive(Debug, Clone)]
pub struct DrawPacket {
    pub pipeline: PipelineHandle,
    pub vertex_buffer: VertexBufferBinding,
    pub index_buffer: Option<IndexBufferBinding>,
    pub topology: PrimitiveTopology,
    pub bindings: Vec<BoundResource>,
    pub viewport: Viewport,
    pub render_target: RenderTargetView,
    pub depth_target: Option<DepthStencilView>,
    /// `None` 表示使用默认深度状态
    pub depth_state: Option<DepthStencilStateHandle>,
    pub call: DrawCall,
}

impl DrawPacket {
    /// 实际生效的深度状态
    pub fn effective_depth_state(&self) -> DepthStencilDescriptor {
        self.depth_state.map(|s| s.desc).unwrap_or_default()
    }

    /// 声明与解析结果成对迭代
    pub fn declared_bindings(&self) -> impl Iterator<Item = (&ResourceBinding, &BoundResource)> {
        self.pipeline.info().bindings.iter().zip(self.bindings.iter())
    }
}

/// 设备接口
///
/// 后端在构造时已经绑定到自己的表面（窗口或无头目标），
/// 交换链通过 `create_swap_chain` 在该表面上创建。
pub trait Device {
    /// 设备信息
    fn info(&self) -> &DeviceInfo;

    /// 在绑定的表面上创建交换链
    fn create_swap_chain(&mut self, desc: &SwapChainDescriptor) -> Result<SwapChainInfo>;

    /// 获取指定后备缓冲的渲染目标视图
    fn acquire_back_buffer(&mut self, image_index: u32) -> Result<RenderTargetView>;

    /// 创建缓冲区，不可变缓冲必须带初始数据
    fn create_buffer(&mut self, desc: &BufferDescriptor, initial: Option<&[u8]>) -> Result<BufferHandle>;

    /// 整块覆盖写入动态缓冲区
    fn update_buffer(&mut self, buffer: &BufferHandle, data: &[u8]) -> Result<()>;

    /// 读回缓冲区内容
    fn read_buffer(&mut self, buffer: &BufferHandle) -> Result<Vec<u8>>;

    /// 创建二维纹理
    fn create_texture2d(&mut self, desc: &TextureDescriptor, initial: Option<&TextureData>) -> Result<TextureHandle>;

    fn create_render_target_view(&mut self, texture: &TextureHandle) -> Result<RenderTargetView>;

    fn create_depth_stencil_view(&mut self, texture: &TextureHandle) -> Result<DepthStencilView>;

    fn create_shader_resource_view(&mut self, texture: &TextureHandle) -> Result<ShaderResourceView>;

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> Result<SamplerHandle>;

    fn create_depth_stencil_state(&mut self, desc: &DepthStencilDescriptor) -> Result<DepthStencilStateHandle>;

    /// 创建管线
    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> Result<PipelineHandle>;

    fn clear_render_target(&mut self, view: &RenderTargetView, color: Color) -> Result<()>;

    fn clear_depth(&mut self, view: &DepthStencilView, depth: f32) -> Result<()>;

    /// 提交一次绘制
    fn submit_draw(&mut self, packet: &DrawPacket) -> Result<()>;

    /// 呈现指定后备缓冲，表面失效时返回 `DeviceLost`
    fn present(&mut self, interval: PresentInterval, image_index: u32) -> Result<()>;

    /// 释放对象
    fn release(&mut self, id: ResourceId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::resource::{BufferBind, BufferUsage};

    #[test]
    fn test_index_binding_capacity() {
        let desc = BufferDescriptor::new(72, BufferBind::Index, BufferUsage::Immutable);
        let binding = IndexBufferBinding {
            buffer: BufferHandle::new(ResourceId::from_raw(1), &desc),
            format: IndexFormat::Uint16,
            offset: 0,
        };
        assert_eq!(binding.available_indices(), 36);

        let offset = IndexBufferBinding { offset: 12, ..binding };
        assert_eq!(offset.available_indices(), 30);
    }

    #[test]
    fn test_draw_call_element_count() {
        let call = DrawCall::DrawIndexed {
            index_count: 36,
            first_index: 0,
            base_vertex: 0,
        };
        assert_eq!(call.element_count(), 36);
    }
}
