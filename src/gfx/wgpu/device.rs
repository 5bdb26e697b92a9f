//! wgpu 设备
//!
//! 把 `Device` 的即时模式调用映射到 wgpu：
//! - 缓冲区、纹理、视图和采样器按 id 存放在各自的表中
//! - 清屏和绘制先录制（见 `frame`），呈现时合并成渲染通道一次提交；
//!   常量缓冲在录制时复制进上传环，顶点和索引缓冲被改写前先回放已录制的命令
//! - 交换链图像在本帧第一次被使用时才从表面获取，呈现时交还
//! - wgpu 管线把颜色格式和深度状态编进管线对象，
//!   所以每个 `PipelineHandle` 按 (颜色格式, 深度状态) 懒创建变体
//!
//! 创建调用包在错误作用域里，验证错误和内存不足都转成 `CreationFailed`。

use std::collections::HashMap;

use tracing::{debug, error, info, trace, warn};
use wgpu::util::DeviceExt;

use crate::core::error::{GraphicsError, RenderError, Result};
use crate::core::math::Color;
use crate::gfx::wgpu::context::WgpuContext;
use crate::gfx::wgpu::frame::{plan_passes, Recorded, RecordedBinding, RecordedDraw, UploadRing, VariantKey};
use crate::renderer::device::{BoundResource, Device, DeviceInfo, DrawCall, DrawPacket, SwapChainInfo};
use crate::renderer::pipeline::{
    CompareFunction, CullMode, DepthStencilDescriptor, DepthStencilStateHandle, FrontFace,
    IndexFormat, InputLayout, PipelineDescriptor, PipelineHandle, PrimitiveTopology, RasterState,
    ResourceBinding, ShaderStage, VertexFormat,
};
use crate::renderer::resource::{
    check_view_bind, AddressMode, BufferBind, BufferDescriptor, BufferHandle, BufferUsage,
    DepthStencilView, Extent2d, FilterMode, IdAllocator, RenderTargetView, ResourceId,
    SamplerDescriptor, SamplerHandle, ShaderResourceView, TextureBind, TextureData,
    TextureDescriptor, TextureFormat, TextureHandle,
};
use crate::renderer::swapchain::{PresentInterval, SwapChainDescriptor};

struct BufferEntry {
    handle: BufferHandle,
    /// 常量缓冲只有 CPU 副本，绘制时经上传环送到 GPU
    buffer: Option<wgpu::Buffer>,
    /// CPU 侧副本，`read_buffer` 从这里读
    shadow: Vec<u8>,
}

struct TextureEntry {
    handle: TextureHandle,
    texture: wgpu::Texture,
}

struct ViewEntry {
    texture: ResourceId,
    format: wgpu::TextureFormat,
    view: wgpu::TextureView,
}

struct PipelineEntry {
    label: String,
    vertex: wgpu::ShaderModule,
    vertex_entry: String,
    pixel: wgpu::ShaderModule,
    pixel_entry: String,
    layout: InputLayout,
    topology: PrimitiveTopology,
    raster: RasterState,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    variants: HashMap<VariantKey, wgpu::RenderPipeline>,
}

struct AcquiredFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

struct SwapChainEntry {
    id: ResourceId,
    extent: Extent2d,
    format: TextureFormat,
    /// 每个后备缓冲对应的渲染目标视图 id
    views: Vec<ResourceId>,
    writable: u32,
    frame: Option<AcquiredFrame>,
}

/// wgpu 设备
pub struct WgpuDevice {
    context: WgpuContext,
    info: DeviceInfo,
    ids: IdAllocator,
    swap_chain: Option<SwapChainEntry>,
    buffers: HashMap<ResourceId, BufferEntry>,
    textures: HashMap<ResourceId, TextureEntry>,
    views: HashMap<ResourceId, ViewEntry>,
    samplers: HashMap<ResourceId, wgpu::Sampler>,
    depth_states: HashMap<ResourceId, DepthStencilDescriptor>,
    pipelines: HashMap<ResourceId, PipelineEntry>,
    /// 本帧已录制、尚未回放的命令
    commands: Vec<Recorded>,
    ring: UploadRing,
    lost: Option<String>,
}

impl WgpuDevice {
    pub fn new(context: WgpuContext) -> Self {
        let adapter = context.adapter.get_info();
        let info = DeviceInfo {
            backend_name: "wgpu".to_string(),
            adapter_name: format!("{} ({:?})", adapter.name, adapter.backend),
            debug: context.debug,
            max_texture_dimension: context.device.limits().max_texture_dimension_2d,
        };

        Self {
            context,
            info,
            ids: IdAllocator::default(),
            swap_chain: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            samplers: HashMap::new(),
            depth_states: HashMap::new(),
            pipelines: HashMap::new(),
            commands: Vec::new(),
            ring: UploadRing::default(),
            lost: None,
        }
    }

    pub fn context(&self) -> &WgpuContext {
        &self.context
    }

    /// 仍未释放的对象数量（含交换链）
    pub fn live_objects(&self) -> usize {
        self.swap_chain.iter().count()
            + self.buffers.len()
            + self.textures.len()
            + self.views.len()
            + self.samplers.len()
            + self.depth_states.len()
            + self.pipelines.len()
    }

    fn check_alive(&self) -> Result<()> {
        match &self.lost {
            Some(reason) => Err(GraphicsError::DeviceLost(reason.clone()).into()),
            None => Ok(()),
        }
    }

    fn mark_lost(&mut self, reason: String) -> RenderError {
        error!(reason = %reason, "wgpu device lost");
        self.lost = Some(reason.clone());
        GraphicsError::DeviceLost(reason).into()
    }

    /// 在验证和内存错误作用域中执行 `f`
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = f(device);
        let oom = pollster::block_on(device.pop_error_scope());
        let validation = pollster::block_on(device.pop_error_scope());
        (value, oom.or(validation))
    }

    fn create_scoped<T>(&self, what: &str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        match self.scoped(f) {
            (value, None) => Ok(value),
            (_, Some(e)) => {
                error!(what, error = %e, "wgpu rejected creation");
                Err(GraphicsError::creation(what, e.to_string()).into())
            }
        }
    }

    fn live_texture(&self, texture: &TextureHandle) -> Result<&TextureEntry> {
        self.textures.get(&texture.id).ok_or_else(|| stale(texture.id))
    }

    fn buffer(&self, id: ResourceId) -> Result<&BufferEntry> {
        self.buffers.get(&id).ok_or_else(|| stale(id))
    }

    /// 确保本帧的交换链图像已经获取
    fn ensure_frame(&mut self) -> Result<()> {
        let acquired = match &self.swap_chain {
            Some(chain) => chain.frame.is_some(),
            None => return Err(GraphicsError::InvalidUsage("no swap chain has been created".to_string()).into()),
        };
        if acquired {
            return Ok(());
        }

        let texture = match self.context.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated) => {
                // 窗口尺寸变化后表面过期，按原尺寸重新配置
                debug!("Surface outdated, reconfiguring at the original size");
                self.context.configure_surface();
                self.context
                    .surface
                    .get_current_texture()
                    .map_err(|e| self.mark_lost(format!("failed to acquire surface texture: {}", e)))?
            }
            Err(e) => return Err(self.mark_lost(format!("failed to acquire surface texture: {}", e))),
        };

        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
        if let Some(chain) = self.swap_chain.as_mut() {
            chain.frame = Some(AcquiredFrame { texture, view });
        }
        Ok(())
    }

    fn is_swap_chain_view(&self, id: ResourceId) -> bool {
        self.swap_chain.as_ref().map_or(false, |chain| chain.views.contains(&id))
    }

    /// 颜色目标的 wgpu 格式
    fn color_format(&self, view: &RenderTargetView) -> Result<wgpu::TextureFormat> {
        if self.is_swap_chain_view(view.id) {
            return Ok(self.context.surface_config.format);
        }
        Ok(self.views.get(&view.id).ok_or_else(|| stale(view.id))?.format)
    }

    /// 按 id 解析附件视图；交换链视图需先 `ensure_frame`
    fn target_view(&self, id: ResourceId) -> Result<&wgpu::TextureView> {
        if let Some(chain) = self.swap_chain.as_ref().filter(|c| c.views.contains(&id)) {
            let frame = chain
                .frame
                .as_ref()
                .ok_or_else(|| GraphicsError::InvalidUsage("back buffer has not been acquired".to_string()))?;
            return Ok(&frame.view);
        }
        Ok(&self.views.get(&id).ok_or_else(|| stale(id))?.view)
    }

    fn gpu_buffer(&self, id: ResourceId) -> Result<&wgpu::Buffer> {
        self.buffer(id)?
            .buffer
            .as_ref()
            .ok_or_else(|| GraphicsError::InvalidUsage(format!("buffer {} cannot be bound as geometry", id)).into())
    }

    fn create_view(&mut self, texture: &TextureHandle) -> Result<ResourceId> {
        let entry = self.live_texture(texture)?;
        let format = entry.texture.format();
        let view = entry.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.ids.allocate();
        self.views.insert(
            id,
            ViewEntry {
                texture: texture.id,
                format,
                view,
            },
        );
        Ok(id)
    }

    /// 取得（必要时创建）管线变体
    fn ensure_variant(&mut self, pipeline: &PipelineHandle, key: VariantKey) -> Result<()> {
        let entry = self.pipelines.get(&pipeline.id).ok_or_else(|| stale(pipeline.id))?;
        if entry.variants.contains_key(&key) {
            return Ok(());
        }

        debug!(pipeline = %entry.label, color = ?key.color, depth = ?key.depth, "Creating pipeline variant");
        let attributes = vertex_attributes(&entry.layout);
        let what = format!("pipeline '{}'", entry.label);
        let render_pipeline = self.create_scoped(&what, |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(entry.label.as_str()),
                layout: Some(&entry.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &entry.vertex,
                    entry_point: &entry.vertex_entry,
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: entry.layout.stride as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &entry.pixel,
                    entry_point: &entry.pixel_entry,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.color,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: primitive_state(entry.topology, entry.raster),
                depth_stencil: key.depth.map(depth_stencil_state),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })?;

        if let Some(entry) = self.pipelines.get_mut(&pipeline.id) {
            entry.variants.insert(key, render_pipeline);
        }
        Ok(())
    }

    fn bind_group(&self, draw: &RecordedDraw) -> Result<Option<wgpu::BindGroup>> {
        let entry = self.pipelines.get(&draw.pipeline).ok_or_else(|| stale(draw.pipeline))?;
        let Some(layout) = &entry.bind_group_layout else {
            return Ok(None);
        };

        let mut entries = Vec::with_capacity(draw.bindings.len());
        for (binding, recorded) in draw.bindings.iter().enumerate() {
            let resource = match recorded {
                RecordedBinding::Constant { offset, size } => {
                    let ring = self
                        .ring
                        .buffer()
                        .ok_or_else(|| GraphicsError::InvalidUsage("constant upload ring is empty".to_string()))?;
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: ring,
                        offset: *offset,
                        size: wgpu::BufferSize::new(*size),
                    })
                }
                RecordedBinding::Texture(id) => {
                    wgpu::BindingResource::TextureView(&self.views.get(id).ok_or_else(|| stale(*id))?.view)
                }
                RecordedBinding::Sampler(id) => {
                    wgpu::BindingResource::Sampler(self.samplers.get(id).ok_or_else(|| stale(*id))?)
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            });
        }

        Ok(Some(self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(entry.label.as_str()),
            layout,
            entries: &entries,
        })))
    }

    fn encode_draw<'a>(
        &'a self,
        pass: &mut wgpu::RenderPass<'a>,
        draw: &RecordedDraw,
        group: Option<&'a wgpu::BindGroup>,
    ) -> Result<()> {
        let entry = self.pipelines.get(&draw.pipeline).ok_or_else(|| stale(draw.pipeline))?;
        let pipeline = entry
            .variants
            .get(&draw.key)
            .ok_or_else(|| GraphicsError::InvalidUsage(format!("pipeline {} has no variant", draw.pipeline)))?;

        pass.set_pipeline(pipeline);
        if let Some(group) = group {
            pass.set_bind_group(0, group, &[]);
        }
        let viewport = draw.viewport;
        pass.set_viewport(
            viewport.top_left_x,
            viewport.top_left_y,
            viewport.width,
            viewport.height,
            viewport.min_depth,
            viewport.max_depth,
        );
        let (vertices, offset) = draw.vertex;
        pass.set_vertex_buffer(0, self.gpu_buffer(vertices)?.slice(offset..));

        match (draw.call, draw.index) {
            (DrawCall::Draw { vertex_count, first_vertex }, _) => {
                pass.draw(first_vertex..first_vertex + vertex_count, 0..1);
            }
            (
                DrawCall::DrawIndexed {
                    index_count,
                    first_index,
                    base_vertex,
                },
                Some((indices, format, offset)),
            ) => {
                pass.set_index_buffer(self.gpu_buffer(indices)?.slice(offset..), format);
                pass.draw_indexed(first_index..first_index + index_count, base_vertex, 0..1);
            }
            (DrawCall::DrawIndexed { .. }, None) => {
                return Err(GraphicsError::InvalidUsage("indexed draw without an index buffer".to_string()).into());
            }
        }
        Ok(())
    }

    /// 回放本帧已录制的命令并提交
    fn flush(&mut self) -> Result<()> {
        if self.commands.is_empty() {
            return Ok(());
        }

        let commands = std::mem::take(&mut self.commands);
        self.ring.upload(&self.context.device, &self.context.queue);
        let result = self.replay(&commands);
        self.ring.reset();
        result
    }

    fn replay(&self, commands: &[Recorded]) -> Result<()> {
        let mut groups = Vec::with_capacity(commands.len());
        for command in commands {
            groups.push(match command {
                Recorded::Draw(draw) => self.bind_group(draw)?,
                _ => None,
            });
        }

        let plans = plan_passes(commands);
        trace!(commands = commands.len(), passes = plans.len(), "Replaying frame");

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame") });
        for plan in &plans {
            let color_attachment = match plan.color {
                Some((id, clear)) => Some(wgpu::RenderPassColorAttachment {
                    view: self.target_view(id)?,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: clear.map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(to_wgpu_color(c))),
                        store: wgpu::StoreOp::Store,
                    },
                }),
                None => None,
            };
            let depth_attachment = match plan.depth {
                Some((id, clear)) => Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.target_view(id)?,
                    depth_ops: Some(wgpu::Operations {
                        load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                None => None,
            };

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame pass"),
                color_attachments: &[color_attachment],
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            for &index in &plan.draws {
                if let Recorded::Draw(draw) = &commands[index] {
                    self.encode_draw(&mut pass, draw, groups[index].as_ref())?;
                }
            }
        }

        let ((), failure) = self.scoped(|_| {
            self.context.queue.submit(Some(encoder.finish()));
        });
        if let Some(e) = failure {
            error!(error = %e, "Frame rejected by wgpu");
            return Err(GraphicsError::InvalidUsage(format!("frame rejected: {}", e)).into());
        }
        Ok(())
    }
}

fn stale(id: ResourceId) -> RenderError {
    GraphicsError::InvalidUsage(format!("object {} is unknown or already released", id)).into()
}

fn to_wgpu_color(color: Color) -> wgpu::Color {
    wgpu::Color {
        r: color.r as f64,
        g: color.g as f64,
        b: color.b as f64,
        a: color.a as f64,
    }
}

fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

/// 表面格式对应的交换链格式
fn surface_format(format: wgpu::TextureFormat) -> TextureFormat {
    match format {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8Unorm,
        _ => TextureFormat::Rgba8Unorm,
    }
}

fn vertex_attributes(layout: &InputLayout) -> Vec<wgpu::VertexAttribute> {
    layout
        .attributes
        .iter()
        .enumerate()
        .map(|(location, attribute)| wgpu::VertexAttribute {
            offset: attribute.offset as wgpu::BufferAddress,
            shader_location: location as u32,
            format: match attribute.format {
                VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
                VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
                VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
            },
        })
        .collect()
}

fn primitive_state(topology: PrimitiveTopology, raster: RasterState) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: match topology {
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
            PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
        },
        strip_index_format: None,
        front_face: match raster.front_face {
            FrontFace::Clockwise => wgpu::FrontFace::Cw,
            FrontFace::CounterClockwise => wgpu::FrontFace::Ccw,
        },
        cull_mode: match raster.cull {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        },
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

fn depth_stencil_state(desc: DepthStencilDescriptor) -> wgpu::DepthStencilState {
    let compare = if desc.depth_enable {
        match desc.compare {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    } else {
        wgpu::CompareFunction::Always
    };

    wgpu::DepthStencilState {
        format: wgpu::TextureFormat::Depth32Float,
        depth_write_enabled: desc.depth_enable && desc.depth_write,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

fn bind_group_layout_entries(bindings: &[ResourceBinding]) -> Vec<wgpu::BindGroupLayoutEntry> {
    bindings
        .iter()
        .enumerate()
        .map(|(binding, declared)| {
            let (visibility, ty) = match declared {
                ResourceBinding::ConstantBuffer { stage, size, .. } => (
                    match stage {
                        ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
                        ShaderStage::Pixel => wgpu::ShaderStages::FRAGMENT,
                    },
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(*size),
                    },
                ),
                ResourceBinding::Texture { .. } => (
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                ),
                ResourceBinding::Sampler { .. } => (
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                ),
            };
            wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility,
                ty,
                count: None,
            }
        })
        .collect()
}

/// wgpu 要求缓冲区大小是 4 的倍数
fn padded(size: u64) -> u64 {
    (size + wgpu::COPY_BUFFER_ALIGNMENT - 1) & !(wgpu::COPY_BUFFER_ALIGNMENT - 1)
}

impl Device for WgpuDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_swap_chain(&mut self, desc: &SwapChainDescriptor) -> Result<SwapChainInfo> {
        self.check_alive()?;
        desc.validate()?;

        if self.swap_chain.is_some() {
            return Err(GraphicsError::InvalidUsage("the surface already has a swap chain".to_string()).into());
        }
        let surface_extent = self.context.surface_extent();
        if desc.extent() != surface_extent {
            return Err(GraphicsError::creation(
                "swap chain",
                format!("{} does not match the surface extent {}", desc.extent(), surface_extent),
            )
            .into());
        }

        self.context.surface_config.present_mode = present_mode(desc.present_interval);
        self.context.surface_config.desired_maximum_frame_latency = desc.buffer_count.saturating_sub(1).max(1);
        let (_, failure) = self.scoped(|_| self.context.configure_surface());
        if let Some(e) = failure {
            return Err(GraphicsError::creation("swap chain", e.to_string()).into());
        }

        let id = self.ids.allocate();
        let views = (0..desc.buffer_count).map(|_| self.ids.allocate()).collect();
        let format = surface_format(self.context.surface_config.format);
        self.swap_chain = Some(SwapChainEntry {
            id,
            extent: desc.extent(),
            format,
            views,
            writable: 0,
            frame: None,
        });

        info!(
            extent = %desc.extent(),
            buffers = desc.buffer_count,
            present_mode = ?self.context.surface_config.present_mode,
            "Swap chain configured"
        );

        Ok(SwapChainInfo {
            id,
            extent: desc.extent(),
            format,
            buffer_count: desc.buffer_count,
        })
    }

    fn acquire_back_buffer(&mut self, image_index: u32) -> Result<RenderTargetView> {
        self.check_alive()?;
        let chain = self
            .swap_chain
            .as_ref()
            .ok_or_else(|| GraphicsError::InvalidUsage("no swap chain has been created".to_string()))?;

        if image_index != chain.writable {
            return Err(GraphicsError::InvalidUsage(format!(
                "back buffer {} is not writable, the current one is {}",
                image_index, chain.writable
            ))
            .into());
        }

        Ok(RenderTargetView {
            id: chain.views[image_index as usize],
            resource: chain.id,
            format: chain.format,
            extent: chain.extent,
            sample_count: 1,
        })
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor, initial: Option<&[u8]>) -> Result<BufferHandle> {
        self.check_alive()?;
        desc.validate(initial)?;

        let shadow = match initial {
            Some(data) => data.to_vec(),
            None => vec![0; desc.size as usize],
        };

        let label = desc.label_or_default();
        let buffer = match desc.bind {
            BufferBind::Constant => None,
            BufferBind::Vertex | BufferBind::Index => {
                let usage = if desc.bind == BufferBind::Vertex {
                    wgpu::BufferUsages::VERTEX
                } else {
                    wgpu::BufferUsages::INDEX
                } | wgpu::BufferUsages::COPY_DST;
                let mut contents = shadow.clone();
                contents.resize(padded(desc.size) as usize, 0);

                Some(self.create_scoped(label, |device| {
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(label),
                        contents: &contents,
                        usage,
                    })
                })?)
            }
        };

        let id = self.ids.allocate();
        let handle = BufferHandle::new(id, desc);
        trace!(id = %id, label, size = desc.size, staged = buffer.is_none(), "Buffer created");
        self.buffers.insert(id, BufferEntry { handle, buffer, shadow });
        Ok(handle)
    }

    fn update_buffer(&mut self, buffer: &BufferHandle, data: &[u8]) -> Result<()> {
        self.check_alive()?;
        {
            let entry = self.buffer(buffer.id)?;
            if entry.handle.usage == BufferUsage::Immutable {
                return Err(GraphicsError::InvalidUsage(format!("buffer {} is immutable", buffer.id)).into());
            }
            if data.len() != entry.shadow.len() {
                return Err(GraphicsError::InvalidUsage(format!(
                    "update of {} bytes does not cover buffer {} of {} bytes",
                    data.len(),
                    buffer.id,
                    entry.shadow.len()
                ))
                .into());
            }
        }

        // 已录制的绘制要看到改写前的几何数据
        let pending = self
            .commands
            .iter()
            .any(|command| matches!(command, Recorded::Draw(draw) if draw.reads_geometry(buffer.id)));
        if pending {
            debug!(buffer = %buffer.id, "Geometry rewritten mid-frame, replaying recorded commands first");
            self.flush()?;
        }

        let entry = self.buffers.get_mut(&buffer.id).ok_or_else(|| stale(buffer.id))?;
        entry.shadow.copy_from_slice(data);
        if let Some(gpu) = &entry.buffer {
            let mut upload = data.to_vec();
            upload.resize(padded(data.len() as u64) as usize, 0);
            self.context.queue.write_buffer(gpu, 0, &upload);
        }
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &BufferHandle) -> Result<Vec<u8>> {
        self.check_alive()?;
        Ok(self.buffer(buffer.id)?.shadow.clone())
    }

    fn create_texture2d(&mut self, desc: &TextureDescriptor, initial: Option<&TextureData>) -> Result<TextureHandle> {
        self.check_alive()?;
        desc.validate(initial, self.info.max_texture_dimension)?;

        let usage = match desc.bind {
            TextureBind::ShaderResource => wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            TextureBind::RenderTarget => wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            TextureBind::DepthStencil => wgpu::TextureUsages::RENDER_ATTACHMENT,
        };
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };

        let label = desc.label_or_default();
        let texture = self.create_scoped(label, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: desc.mip_levels,
                sample_count: desc.sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(desc.format),
                usage,
                view_formats: &[],
            })
        })?;

        if let Some(data) = initial {
            self.context.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &data.bytes,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(data.row_stride),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }

        let id = self.ids.allocate();
        let handle = TextureHandle::new(id, desc);
        debug!(id = %id, label, extent = %desc.extent(), format = ?desc.format, "Texture created");
        self.textures.insert(id, TextureEntry { handle, texture });
        Ok(handle)
    }

    fn create_render_target_view(&mut self, texture: &TextureHandle) -> Result<RenderTargetView> {
        self.check_alive()?;
        check_view_bind(texture, TextureBind::RenderTarget, "render target view")?;
        let id = self.create_view(texture)?;
        Ok(RenderTargetView {
            id,
            resource: texture.id,
            format: texture.format,
            extent: texture.extent,
            sample_count: texture.sample_count,
        })
    }

    fn create_depth_stencil_view(&mut self, texture: &TextureHandle) -> Result<DepthStencilView> {
        self.check_alive()?;
        check_view_bind(texture, TextureBind::DepthStencil, "depth stencil view")?;
        let id = self.create_view(texture)?;
        Ok(DepthStencilView {
            id,
            resource: texture.id,
            format: texture.format,
            extent: texture.extent,
            sample_count: texture.sample_count,
        })
    }

    fn create_shader_resource_view(&mut self, texture: &TextureHandle) -> Result<ShaderResourceView> {
        self.check_alive()?;
        check_view_bind(texture, TextureBind::ShaderResource, "shader resource view")?;
        let id = self.create_view(texture)?;
        Ok(ShaderResourceView {
            id,
            resource: texture.id,
            format: texture.format,
            extent: texture.extent,
        })
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> Result<SamplerHandle> {
        self.check_alive()?;

        let filter = match desc.filter {
            FilterMode::Point => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        };
        let address = |mode: AddressMode| match mode {
            AddressMode::Wrap => wgpu::AddressMode::Repeat,
            AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
            AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
        };

        let sampler = self.create_scoped("sampler", |device| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("sampler"),
                address_mode_u: address(desc.address_u),
                address_mode_v: address(desc.address_v),
                address_mode_w: address(desc.address_w),
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: filter,
                ..Default::default()
            })
        })?;

        let id = self.ids.allocate();
        self.samplers.insert(id, sampler);
        Ok(SamplerHandle { id, desc: *desc })
    }

    fn create_depth_stencil_state(&mut self, desc: &DepthStencilDescriptor) -> Result<DepthStencilStateHandle> {
        self.check_alive()?;
        // wgpu 的深度状态属于管线，这里只登记描述，绘制时选择管线变体
        let id = self.ids.allocate();
        self.depth_states.insert(id, *desc);
        Ok(DepthStencilStateHandle { id, desc: *desc })
    }

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> Result<PipelineHandle> {
        self.check_alive()?;
        desc.validate()?;

        let what = format!("pipeline '{}'", desc.label);
        let vertex_source = desc.vertex.source_text()?;
        let pixel_source = desc.pixel.source_text()?;

        let compile = |device: &wgpu::Device, label: &str, source: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        };
        let (vertex, failure) = self.scoped(|device| compile(device, &desc.vertex.entry_point, vertex_source));
        if let Some(e) = failure {
            return Err(GraphicsError::CompileFailed {
                entry_point: desc.vertex.entry_point.clone(),
                log: e.to_string(),
            }
            .into());
        }
        let (pixel, failure) = self.scoped(|device| compile(device, &desc.pixel.entry_point, pixel_source));
        if let Some(e) = failure {
            return Err(GraphicsError::CompileFailed {
                entry_point: desc.pixel.entry_point.clone(),
                log: e.to_string(),
            }
            .into());
        }

        let (bind_group_layout, pipeline_layout) = self.create_scoped(&what, |device| {
            let bind_group_layout = (!desc.bindings.is_empty()).then(|| {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(desc.label.as_str()),
                    entries: &bind_group_layout_entries(&desc.bindings),
                })
            });
            let layouts: Vec<&wgpu::BindGroupLayout> = bind_group_layout.iter().collect();
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label.as_str()),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });
            (bind_group_layout, pipeline_layout)
        })?;

        let id = self.ids.allocate();
        let handle = PipelineHandle::new(id, desc);
        self.pipelines.insert(
            id,
            PipelineEntry {
                label: desc.label.clone(),
                vertex,
                vertex_entry: desc.vertex.entry_point.clone(),
                pixel,
                pixel_entry: desc.pixel.entry_point.clone(),
                layout: desc.layout.clone(),
                topology: desc.topology,
                raster: desc.raster,
                bind_group_layout,
                pipeline_layout,
                variants: HashMap::new(),
            },
        );

        // 交换链格式的变体在创建时就编译，着色器错误不会拖到第一帧
        if self.swap_chain.is_some() {
            let key = VariantKey {
                color: self.context.surface_config.format,
                depth: None,
            };
            if let Err(e) = self.ensure_variant(&handle, key) {
                self.pipelines.remove(&id);
                return Err(e);
            }
        }

        info!(id = %id, label = %desc.label, bindings = desc.bindings.len(), "Pipeline created");
        Ok(handle)
    }

    fn clear_render_target(&mut self, view: &RenderTargetView, color: Color) -> Result<()> {
        self.check_alive()?;
        if self.is_swap_chain_view(view.id) {
            self.ensure_frame()?;
        }
        self.color_format(view)?;
        self.commands.push(Recorded::ClearColor { target: view.id, color });
        Ok(())
    }

    fn clear_depth(&mut self, view: &DepthStencilView, depth: f32) -> Result<()> {
        self.check_alive()?;
        if !self.views.contains_key(&view.id) {
            return Err(stale(view.id));
        }
        self.commands.push(Recorded::ClearDepth { target: view.id, depth });
        Ok(())
    }

    fn submit_draw(&mut self, packet: &DrawPacket) -> Result<()> {
        self.check_alive()?;
        if self.is_swap_chain_view(packet.render_target.id) {
            self.ensure_frame()?;
        }

        let key = VariantKey {
            color: self.color_format(&packet.render_target)?,
            depth: packet.depth_target.map(|_| packet.effective_depth_state()),
        };
        self.ensure_variant(&packet.pipeline, key)?;

        if let Some(view) = &packet.depth_target {
            if !self.views.contains_key(&view.id) {
                return Err(stale(view.id));
            }
        }
        self.gpu_buffer(packet.vertex_buffer.buffer.id)?;
        let index = match &packet.index_buffer {
            Some(binding) => {
                self.gpu_buffer(binding.buffer.id)?;
                let format = match binding.format {
                    IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
                    IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
                };
                Some((binding.buffer.id, format, binding.offset))
            }
            None => None,
        };
        if matches!(packet.call, DrawCall::DrawIndexed { .. }) && index.is_none() {
            return Err(GraphicsError::InvalidUsage("indexed draw without an index buffer".to_string()).into());
        }

        let mut bindings = Vec::with_capacity(packet.bindings.len());
        for resource in &packet.bindings {
            bindings.push(match resource {
                BoundResource::ConstantBuffer(buffer) => {
                    let shadow = &self.buffers.get(&buffer.id).ok_or_else(|| stale(buffer.id))?.shadow;
                    RecordedBinding::Constant {
                        offset: self.ring.push(shadow),
                        size: shadow.len() as u64,
                    }
                }
                BoundResource::Texture(view) => {
                    if !self.views.contains_key(&view.id) {
                        return Err(stale(view.id));
                    }
                    RecordedBinding::Texture(view.id)
                }
                BoundResource::Sampler(sampler) => {
                    if !self.samplers.contains_key(&sampler.id) {
                        return Err(stale(sampler.id));
                    }
                    RecordedBinding::Sampler(sampler.id)
                }
            });
        }

        trace!(pipeline = %packet.pipeline.id, call = ?packet.call, "Draw recorded");
        self.commands.push(Recorded::Draw(RecordedDraw {
            pipeline: packet.pipeline.id,
            key,
            color: packet.render_target.id,
            depth: packet.depth_target.map(|view| view.id),
            vertex: (packet.vertex_buffer.buffer.id, packet.vertex_buffer.offset),
            index,
            bindings,
            viewport: packet.viewport,
            call: packet.call,
        }));
        Ok(())
    }

    fn present(&mut self, interval: PresentInterval, image_index: u32) -> Result<()> {
        self.check_alive()?;
        let writable = self
            .swap_chain
            .as_ref()
            .map(|chain| chain.writable)
            .ok_or_else(|| GraphicsError::InvalidUsage("no swap chain has been created".to_string()))?;

        if image_index != writable {
            return Err(GraphicsError::InvalidUsage(format!(
                "presenting back buffer {} but {} is current",
                image_index, writable
            ))
            .into());
        }

        // 本帧没有任何写入时也要交出一张图像
        self.ensure_frame()?;
        self.flush()?;

        let Some(chain) = self.swap_chain.as_mut() else {
            return Err(GraphicsError::InvalidUsage("no swap chain has been created".to_string()).into());
        };
        if let Some(frame) = chain.frame.take() {
            drop(frame.view);
            frame.texture.present();
        }
        chain.writable = (chain.writable + 1) % chain.views.len() as u32;

        let mode = present_mode(interval);
        if mode != self.context.surface_config.present_mode {
            debug!(?mode, "Present interval changed, reconfiguring surface");
            self.context.surface_config.present_mode = mode;
            self.context.configure_surface();
        }
        Ok(())
    }

    fn release(&mut self, id: ResourceId) -> Result<()> {
        if !self.commands.is_empty() {
            warn!(commands = self.commands.len(), "Discarding commands recorded for an unfinished frame");
            self.commands.clear();
            self.ring.reset();
        }
        if let Some(entry) = self.views.get(&id) {
            trace!(id = %id, texture = %entry.texture, "Releasing view");
        }

        let found = if self.swap_chain.as_ref().map(|c| c.id) == Some(id) {
            self.swap_chain = None;
            true
        } else if let Some(entry) = self.buffers.remove(&id) {
            if let Some(buffer) = entry.buffer {
                buffer.destroy();
            }
            true
        } else if let Some(entry) = self.textures.remove(&id) {
            trace!(id = %id, extent = %entry.handle.extent, "Releasing texture");
            entry.texture.destroy();
            true
        } else {
            self.views.remove(&id).is_some()
                || self.samplers.remove(&id).is_some()
                || self.depth_states.remove(&id).is_some()
                || self.pipelines.remove(&id).is_some()
        };

        if !found {
            return Err(stale(id));
        }
        Ok(())
    }
}

fn present_mode(interval: PresentInterval) -> wgpu::PresentMode {
    match interval {
        PresentInterval::VSync => wgpu::PresentMode::Fifo,
        PresentInterval::Immediate => wgpu::PresentMode::Immediate,
    }
}

impl Drop for WgpuDevice {
    fn drop(&mut self) {
        let live = self.live_objects();
        if live > 0 {
            warn!(live, "wgpu device dropped with live objects");
        }
    }
}
