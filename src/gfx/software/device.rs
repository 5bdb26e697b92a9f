//! 软件设备
//!
//! 在内存中实现 `Device`：缓冲区保存字节，纹理和交换链图像保存像素，
//! 清屏和绘制真正写入像素。每次绘制与呈现都记入日志，
//! 使调用顺序、动态缓冲更新和资源释放顺序都可以在没有 GPU 的情况下检查。
//!
//! 使用已释放或未知的对象一律返回 `InvalidUsage`。
//! 设备丢失后除 `release` 以外的调用都返回 `DeviceLost`。

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::core::error::{FrameError, GraphicsError, RenderError, Result};
use crate::core::math::{matrix, Color, Matrix4, Vector2, Vector3, Vector4};
use crate::gfx::software::raster::{
    rasterize, ColorImage, DepthImage, PixelShading, ProcessedVertex, RasterTargets,
};
use crate::renderer::device::{BoundResource, Device, DeviceInfo, DrawCall, DrawPacket, SwapChainInfo};
use crate::renderer::pipeline::{
    DepthStencilDescriptor, DepthStencilStateHandle, IndexFormat, PipelineDescriptor,
    PipelineHandle, ResourceBinding, ShaderStage, VertexAttribute,
};
use crate::renderer::resource::{
    check_view_bind, BufferDescriptor, BufferHandle, BufferUsage, DepthStencilView, Extent2d,
    IdAllocator, RenderTargetView, ResourceId, SamplerDescriptor, SamplerHandle,
    ShaderResourceView, TextureBind, TextureData, TextureDescriptor, TextureFormat, TextureHandle,
};
use crate::renderer::swapchain::{PresentInterval, SwapChainDescriptor};
use crate::renderer::transform::clip_to_screen;

/// 软件设备支持的最大纹理边长
pub const SOFTWARE_MAX_TEXTURE_DIMENSION: u32 = 16384;

/// 绘制和呈现日志保留的最近记录数
///
/// 日志达到两倍容量时丢弃较早的一半，所以长时间运行时内存有上限。
pub const JOURNAL_CAPACITY: usize = 1024;

fn push_bounded<T>(journal: &mut Vec<T>, record: T) {
    if journal.len() >= 2 * JOURNAL_CAPACITY {
        journal.drain(..JOURNAL_CAPACITY);
    }
    journal.push(record);
}

/// 绘制时某个常量缓冲的内容快照
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantSnapshot {
    pub stage: ShaderStage,
    pub slot: u32,
    pub buffer: ResourceId,
    pub bytes: Vec<u8>,
}

/// 一次绘制的日志
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    /// 此前已完成的呈现次数
    pub frame: u64,
    /// 设备内全局递增的命令序号
    pub sequence: u64,
    pub pipeline: ResourceId,
    pub call: DrawCall,
    /// 按管线声明顺序的常量缓冲快照
    pub constants: Vec<ConstantSnapshot>,
    /// 每个被处理顶点的屏幕坐标，观察者身后的顶点记为 NaN
    pub screen_positions: Vec<Vector3>,
    /// 渲染目标视图
    pub target: ResourceId,
    pub pixels_written: u32,
}

/// 一次呈现的日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentRecord {
    pub sequence: u64,
    pub image_index: u32,
    pub interval: PresentInterval,
    /// 累计等待的虚拟垂直同步次数
    pub vblank: u64,
    /// 被呈现图像左上角像素
    pub marker: [u8; 4],
}

#[derive(Debug)]
struct BufferStore {
    handle: BufferHandle,
    bytes: Vec<u8>,
}

#[derive(Debug)]
enum TextureImage {
    Color(ColorImage),
    Depth(DepthImage),
}

#[derive(Debug)]
struct TextureStore {
    image: TextureImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewKind {
    RenderTarget,
    DepthStencil,
    ShaderResource,
}

#[derive(Debug, Clone, Copy)]
struct ViewStore {
    kind: ViewKind,
    texture: ResourceId,
}

#[derive(Debug)]
struct SwapChainStore {
    id: ResourceId,
    extent: Extent2d,
    format: TextureFormat,
    images: Vec<ColorImage>,
    views: Vec<ResourceId>,
    /// 当前可写的图像
    writable: u32,
}

/// 软件设备
#[derive(Debug)]
pub struct SoftwareDevice {
    info: DeviceInfo,
    surface_extent: Extent2d,
    ids: IdAllocator,

    swap_chain: Option<SwapChainStore>,
    buffers: HashMap<ResourceId, BufferStore>,
    textures: HashMap<ResourceId, TextureStore>,
    views: HashMap<ResourceId, ViewStore>,
    samplers: HashMap<ResourceId, SamplerHandle>,
    depth_states: HashMap<ResourceId, DepthStencilStateHandle>,
    pipelines: HashMap<ResourceId, PipelineHandle>,

    sequence: u64,
    vblank: u64,
    presents_done: u64,
    lost: Option<String>,
    fail_next: Option<String>,

    created: Vec<ResourceId>,
    released: Vec<ResourceId>,
    draws: Vec<DrawRecord>,
    presents: Vec<PresentRecord>,
}

impl SoftwareDevice {
    /// 绑定到指定尺寸无头表面的设备
    pub fn new(surface_extent: Extent2d) -> Self {
        Self::with_debug(surface_extent, false)
    }

    pub fn with_debug(surface_extent: Extent2d, debug_layer: bool) -> Self {
        debug!(extent = %surface_extent, debug = debug_layer, "Software device created");
        Self {
            info: DeviceInfo {
                backend_name: "software".to_string(),
                adapter_name: "in-memory rasterizer".to_string(),
                debug: debug_layer,
                max_texture_dimension: SOFTWARE_MAX_TEXTURE_DIMENSION,
            },
            surface_extent,
            ids: IdAllocator::default(),
            swap_chain: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            samplers: HashMap::new(),
            depth_states: HashMap::new(),
            pipelines: HashMap::new(),
            sequence: 0,
            vblank: 0,
            presents_done: 0,
            lost: None,
            fail_next: None,
            created: Vec::new(),
            released: Vec::new(),
            draws: Vec::new(),
            presents: Vec::new(),
        }
    }

    pub fn surface_extent(&self) -> Extent2d {
        self.surface_extent
    }

    /// 下一次创建调用失败
    pub fn fail_next_creation(&mut self, reason: impl Into<String>) {
        self.fail_next = Some(reason.into());
    }

    /// 模拟设备丢失
    pub fn lose_device(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Software device lost");
        self.lost = Some(reason);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.is_some()
    }

    /// 按创建顺序的对象 id
    pub fn created(&self) -> &[ResourceId] {
        &self.created
    }

    /// 按释放顺序的对象 id
    pub fn released(&self) -> &[ResourceId] {
        &self.released
    }

    /// 最近的绘制记录，最多保留 `2 * JOURNAL_CAPACITY` 条
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// 最近的呈现记录，容量同 `draws`
    pub fn presents(&self) -> &[PresentRecord] {
        &self.presents
    }

    /// 仍然存活的对象数量（交换链算一个）
    pub fn live_objects(&self) -> usize {
        self.swap_chain.iter().count()
            + self.buffers.len()
            + self.textures.len()
            + self.views.len()
            + self.samplers.len()
            + self.depth_states.len()
            + self.pipelines.len()
    }

    /// 交换链图像的像素
    pub fn back_buffer_pixel(&self, image_index: u32, x: u32, y: u32) -> Option<[u8; 4]> {
        let chain = self.swap_chain.as_ref()?;
        chain.images.get(image_index as usize)?.get(x, y)
    }

    /// 颜色纹理的像素
    pub fn texture_pixel(&self, texture: ResourceId, x: u32, y: u32) -> Option<[u8; 4]> {
        match &self.textures.get(&texture)?.image {
            TextureImage::Color(image) => image.get(x, y),
            TextureImage::Depth(_) => None,
        }
    }

    /// 深度纹理的值
    pub fn depth_value(&self, texture: ResourceId, x: u32, y: u32) -> Option<f32> {
        match &self.textures.get(&texture)?.image {
            TextureImage::Depth(image) => image.get(x, y),
            TextureImage::Color(_) => None,
        }
    }

    fn check_alive(&self) -> Result<()> {
        match &self.lost {
            Some(reason) => Err(GraphicsError::DeviceLost(reason.clone()).into()),
            None => Ok(()),
        }
    }

    fn begin_creation(&mut self, what: &str) -> Result<()> {
        self.check_alive()?;
        if let Some(reason) = self.fail_next.take() {
            warn!(what, reason = %reason, "Injected creation failure");
            return Err(GraphicsError::creation(what, reason).into());
        }
        Ok(())
    }

    fn allocate(&mut self) -> ResourceId {
        let id = self.ids.allocate();
        self.created.push(id);
        id
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn buffer_bytes(&self, id: ResourceId) -> Result<&[u8]> {
        self.buffers
            .get(&id)
            .map(|b| b.bytes.as_slice())
            .ok_or_else(|| stale(id))
    }

    fn live_texture(&self, texture: &TextureHandle) -> Result<()> {
        if self.textures.contains_key(&texture.id) {
            Ok(())
        } else {
            Err(stale(texture.id))
        }
    }

    fn color_target_mut(&mut self, view: &RenderTargetView) -> Result<&mut ColorImage> {
        if let Some(chain) = self.swap_chain.as_mut() {
            if chain.id == view.resource {
                let index = chain.views.iter().position(|v| *v == view.id).ok_or_else(|| stale(view.id))?;
                return Ok(&mut chain.images[index]);
            }
        }

        let texture = match self.views.get(&view.id) {
            Some(ViewStore { kind: ViewKind::RenderTarget, texture }) => *texture,
            _ => return Err(stale(view.id)),
        };
        match self.textures.get_mut(&texture).map(|t| &mut t.image) {
            Some(TextureImage::Color(image)) => Ok(image),
            _ => Err(stale(texture)),
        }
    }

    fn depth_target_mut(&mut self, view: &DepthStencilView) -> Result<&mut DepthImage> {
        let texture = match self.views.get(&view.id) {
            Some(ViewStore { kind: ViewKind::DepthStencil, texture }) => *texture,
            _ => return Err(stale(view.id)),
        };
        match self.textures.get_mut(&texture).map(|t| &mut t.image) {
            Some(TextureImage::Depth(image)) => Ok(image),
            _ => Err(stale(texture)),
        }
    }

    fn sampled_image(&self, view: &ShaderResourceView) -> Result<ColorImage> {
        match self.views.get(&view.id) {
            Some(ViewStore { kind: ViewKind::ShaderResource, .. }) => {}
            _ => return Err(stale(view.id)),
        }
        match self.textures.get(&view.resource).map(|t| &t.image) {
            Some(TextureImage::Color(image)) => Ok(image.clone()),
            _ => Err(stale(view.resource)),
        }
    }

    /// 取出绘制要用的索引序列
    fn fetch_indices(&self, packet: &DrawPacket) -> Result<Vec<u32>> {
        match packet.call {
            DrawCall::Draw { vertex_count, first_vertex } => {
                Ok((0..vertex_count).map(|i| first_vertex.saturating_add(i)).collect())
            }
            DrawCall::DrawIndexed { index_count, first_index, base_vertex } => {
                let binding = packet.index_buffer.ok_or(FrameError::IndexBufferMissing)?;
                let bytes = self.buffer_bytes(binding.buffer.id)?;
                let size = binding.format.size() as usize;

                let mut indices = Vec::with_capacity(index_count as usize);
                for i in 0..index_count as usize {
                    let position = first_index as usize + i;
                    let start = binding.offset as usize + position * size;
                    let raw = bytes.get(start..start + size).ok_or_else(|| {
                        GraphicsError::InvalidUsage(format!("index {} is outside the index buffer", position))
                    })?;
                    let index = match binding.format {
                        IndexFormat::Uint16 => bytemuck::pod_read_unaligned::<u16>(raw) as i64,
                        IndexFormat::Uint32 => bytemuck::pod_read_unaligned::<u32>(raw) as i64,
                    };
                    let vertex = u32::try_from(index + base_vertex as i64).map_err(|_| {
                        GraphicsError::InvalidUsage(format!("base vertex {} makes index {} negative", base_vertex, index))
                    })?;
                    indices.push(vertex);
                }
                Ok(indices)
            }
        }
    }
}

fn stale(id: ResourceId) -> RenderError {
    GraphicsError::InvalidUsage(format!("object {} was released or never created", id)).into()
}

fn read_floats(vertex: &[u8], attribute: &VertexAttribute) -> Option<[f32; 4]> {
    let start = attribute.offset as usize;
    let raw = vertex.get(start..start + attribute.format.size() as usize)?;
    let mut out = [0.0; 4];
    for (slot, chunk) in out.iter_mut().zip(raw.chunks_exact(4)) {
        *slot = bytemuck::pod_read_unaligned::<f32>(chunk);
    }
    Some(out)
}

impl Device for SoftwareDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_swap_chain(&mut self, desc: &SwapChainDescriptor) -> Result<SwapChainInfo> {
        self.begin_creation("swap chain")?;

        if self.swap_chain.is_some() {
            return Err(GraphicsError::InvalidUsage("the surface already has a swap chain".to_string()).into());
        }
        if desc.extent() != self.surface_extent {
            return Err(GraphicsError::creation(
                "swap chain",
                format!("{} does not match the surface extent {}", desc.extent(), self.surface_extent),
            )
            .into());
        }

        let id = self.allocate();
        let views = (0..desc.buffer_count).map(|_| self.ids.allocate()).collect();
        let images = (0..desc.buffer_count).map(|_| ColorImage::new(desc.extent())).collect();

        self.swap_chain = Some(SwapChainStore {
            id,
            extent: desc.extent(),
            format: desc.format,
            images,
            views,
            writable: 0,
        });

        Ok(SwapChainInfo {
            id,
            extent: desc.extent(),
            format: desc.format,
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
        self.begin_creation(desc.label_or_default())?;
        desc.validate(initial)?;

        let id = self.allocate();
        let bytes = match initial {
            Some(data) => data.to_vec(),
            None => vec![0; desc.size as usize],
        };
        let handle = BufferHandle::new(id, desc);
        self.buffers.insert(id, BufferStore { handle, bytes });
        Ok(handle)
    }

    fn update_buffer(&mut self, buffer: &BufferHandle, data: &[u8]) -> Result<()> {
        self.check_alive()?;
        let store = self.buffers.get_mut(&buffer.id).ok_or_else(|| stale(buffer.id))?;

        if store.handle.usage == BufferUsage::Immutable {
            return Err(GraphicsError::InvalidUsage(format!("buffer {} is immutable", buffer.id)).into());
        }
        if data.len() != store.bytes.len() {
            return Err(GraphicsError::InvalidUsage(format!(
                "update of {} bytes does not cover buffer {} of {} bytes",
                data.len(),
                buffer.id,
                store.bytes.len()
            ))
            .into());
        }

        store.bytes.copy_from_slice(data);
        self.next_sequence();
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &BufferHandle) -> Result<Vec<u8>> {
        self.check_alive()?;
        Ok(self.buffer_bytes(buffer.id)?.to_vec())
    }

    fn create_texture2d(&mut self, desc: &TextureDescriptor, initial: Option<&TextureData>) -> Result<TextureHandle> {
        self.begin_creation(desc.label_or_default())?;
        desc.validate(initial, self.info.max_texture_dimension)?;

        let image = match (desc.bind, initial) {
            (TextureBind::DepthStencil, _) => TextureImage::Depth(DepthImage::new(desc.extent())),
            (_, Some(data)) => TextureImage::Color(ColorImage::from_rows(desc.extent(), &data.bytes, data.row_stride)),
            (_, None) => TextureImage::Color(ColorImage::new(desc.extent())),
        };

        let id = self.allocate();
        let handle = TextureHandle::new(id, desc);
        self.textures.insert(id, TextureStore { image });
        Ok(handle)
    }

    fn create_render_target_view(&mut self, texture: &TextureHandle) -> Result<RenderTargetView> {
        self.begin_creation("render target view")?;
        self.live_texture(texture)?;
        check_view_bind(texture, TextureBind::RenderTarget, "render target view")?;

        let id = self.allocate();
        self.views.insert(id, ViewStore { kind: ViewKind::RenderTarget, texture: texture.id });
        Ok(RenderTargetView {
            id,
            resource: texture.id,
            format: texture.format,
            extent: texture.extent,
            sample_count: texture.sample_count,
        })
    }

    fn create_depth_stencil_view(&mut self, texture: &TextureHandle) -> Result<DepthStencilView> {
        self.begin_creation("depth stencil view")?;
        self.live_texture(texture)?;
        check_view_bind(texture, TextureBind::DepthStencil, "depth stencil view")?;

        let id = self.allocate();
        self.views.insert(id, ViewStore { kind: ViewKind::DepthStencil, texture: texture.id });
        Ok(DepthStencilView {
            id,
            resource: texture.id,
            format: texture.format,
            extent: texture.extent,
            sample_count: texture.sample_count,
        })
    }

    fn create_shader_resource_view(&mut self, texture: &TextureHandle) -> Result<ShaderResourceView> {
        self.begin_creation("shader resource view")?;
        self.live_texture(texture)?;
        check_view_bind(texture, TextureBind::ShaderResource, "shader resource view")?;

        let id = self.allocate();
        self.views.insert(id, ViewStore { kind: ViewKind::ShaderResource, texture: texture.id });
        Ok(ShaderResourceView {
            id,
            resource: texture.id,
            format: texture.format,
            extent: texture.extent,
        })
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> Result<SamplerHandle> {
        self.begin_creation("sampler")?;
        let id = self.allocate();
        let handle = SamplerHandle { id, desc: *desc };
        self.samplers.insert(id, handle);
        Ok(handle)
    }

    fn create_depth_stencil_state(&mut self, desc: &DepthStencilDescriptor) -> Result<DepthStencilStateHandle> {
        self.begin_creation("depth stencil state")?;
        let id = self.allocate();
        let handle = DepthStencilStateHandle { id, desc: *desc };
        self.depth_states.insert(id, handle);
        Ok(handle)
    }

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> Result<PipelineHandle> {
        self.begin_creation(&format!("pipeline '{}'", desc.label))?;
        desc.validate()?;

        for shader in [&desc.vertex, &desc.pixel] {
            if shader.bytecode.is_empty() {
                return Err(GraphicsError::CompileFailed {
                    entry_point: shader.entry_point.clone(),
                    log: "empty bytecode".to_string(),
                }
                .into());
            }
        }

        let id = self.allocate();
        let handle = PipelineHandle::new(id, desc);
        self.pipelines.insert(id, handle.clone());
        Ok(handle)
    }

    fn clear_render_target(&mut self, view: &RenderTargetView, color: Color) -> Result<()> {
        self.check_alive()?;
        self.color_target_mut(view)?.fill(color);
        self.next_sequence();
        Ok(())
    }

    fn clear_depth(&mut self, view: &DepthStencilView, depth: f32) -> Result<()> {
        self.check_alive()?;
        self.depth_target_mut(view)?.fill(depth);
        self.next_sequence();
        Ok(())
    }

    fn submit_draw(&mut self, packet: &DrawPacket) -> Result<()> {
        self.check_alive()?;

        let pipeline = self
            .pipelines
            .get(&packet.pipeline.id)
            .cloned()
            .ok_or_else(|| stale(packet.pipeline.id))?;
        let info = pipeline.info();

        if let Some(state) = &packet.depth_state {
            if !self.depth_states.contains_key(&state.id) {
                return Err(stale(state.id));
            }
        }

        // 按声明顺序解析绑定并快照常量缓冲
        let mut constants = Vec::new();
        let mut transform = None;
        let mut palette = None;
        let mut sampled = None;
        let mut sampler = None;
        for (declared, bound) in packet.declared_bindings() {
            match (declared, bound) {
                (ResourceBinding::ConstantBuffer { stage, slot, .. }, BoundResource::ConstantBuffer(buffer)) => {
                    let bytes = self.buffer_bytes(buffer.id)?.to_vec();
                    if *stage == ShaderStage::Vertex && transform.is_none() && bytes.len() >= 64 {
                        transform = Some(bytemuck::pod_read_unaligned::<[f32; 16]>(&bytes[..64]));
                    }
                    if *stage == ShaderStage::Pixel && palette.is_none() {
                        palette = Some(
                            bytes
                                .chunks_exact(16)
                                .map(bytemuck::pod_read_unaligned::<[f32; 4]>)
                                .collect::<Vec<_>>(),
                        );
                    }
                    constants.push(ConstantSnapshot {
                        stage: *stage,
                        slot: *slot,
                        buffer: buffer.id,
                        bytes,
                    });
                }
                (ResourceBinding::Texture { .. }, BoundResource::Texture(view)) => {
                    let image = self.sampled_image(view)?;
                    sampled.get_or_insert(image);
                }
                (ResourceBinding::Sampler { .. }, BoundResource::Sampler(handle)) => {
                    if !self.samplers.contains_key(&handle.id) {
                        return Err(stale(handle.id));
                    }
                    sampler.get_or_insert(handle.desc);
                }
                (declared, bound) => {
                    return Err(FrameError::WrongBinding(format!(
                        "{} bound where {:?} is declared",
                        bound.id(),
                        declared
                    ))
                    .into());
                }
            }
        }

        // 顶点阶段
        let indices = self.fetch_indices(packet)?;
        let vertex_bytes = self.buffer_bytes(packet.vertex_buffer.buffer.id)?;
        let stride = packet.vertex_buffer.stride as usize;
        let base = packet.vertex_buffer.offset as usize;
        let position = info
            .layout
            .position()
            .ok_or_else(|| GraphicsError::InvalidUsage(format!("pipeline '{}' has no POSITION input", info.label)))?;
        let color_attribute = info.layout.attributes.iter().find(|a| a.semantic == "COLOR");
        let uv_attribute = info.layout.attributes.iter().find(|a| a.semantic == "TEXCOORD");
        let mvp = transform
            .map(|m| matrix::from_column_major(&m))
            .unwrap_or_else(Matrix4::identity);

        let mut vertices = Vec::with_capacity(indices.len());
        for &index in &indices {
            let start = base + index as usize * stride;
            let vertex = vertex_bytes.get(start..start + stride).ok_or_else(|| {
                GraphicsError::InvalidUsage(format!("vertex {} is outside the vertex buffer", index))
            })?;

            let p = read_floats(vertex, position)
                .ok_or_else(|| GraphicsError::InvalidUsage(format!("vertex {} has a truncated position", index)))?;
            let local = Vector4::new(p[0], p[1], p[2], 1.0);
            let clip = mvp * local;

            vertices.push(ProcessedVertex {
                clip,
                screen: clip_to_screen(clip, &packet.viewport),
                color: color_attribute
                    .and_then(|a| read_floats(vertex, a))
                    .map(|c| Vector3::new(c[0], c[1], c[2])),
                uv: uv_attribute
                    .and_then(|a| read_floats(vertex, a))
                    .map(|t| Vector2::new(t[0], t[1])),
            });
        }

        // 像素阶段
        let shading = match (&sampled, uv_attribute, palette) {
            _ if color_attribute.is_some() => PixelShading::VertexColor,
            (Some(image), Some(_), _) => PixelShading::Texture {
                image,
                sampler: sampler.unwrap_or_default(),
            },
            (_, _, Some(colors)) => PixelShading::Palette(colors),
            _ => PixelShading::Solid([1.0; 4]),
        };

        // 深度图像先取出，避免与颜色目标同时可变借用
        self.color_target_mut(&packet.render_target)?;
        let mut depth = match &packet.depth_target {
            Some(view) => Some((*view, std::mem::take(self.depth_target_mut(view)?))),
            None => None,
        };

        let depth_state = packet.effective_depth_state();
        let written = match self.color_target_mut(&packet.render_target) {
            Ok(color) => {
                let mut targets = RasterTargets {
                    color,
                    depth: depth.as_mut().map(|(_, image)| image),
                    depth_state,
                };
                rasterize(&vertices, packet.topology, info.raster, &packet.viewport, &shading, &mut targets)
            }
            Err(_) => 0,
        };

        if let Some((view, image)) = depth {
            *self.depth_target_mut(&view)? = image;
        }

        let sequence = self.next_sequence();
        trace!(sequence, pipeline = %pipeline.id, pixels = written, "Software draw");
        push_bounded(&mut self.draws, DrawRecord {
            frame: self.presents_done,
            sequence,
            pipeline: pipeline.id,
            call: packet.call,
            constants,
            screen_positions: vertices
                .iter()
                .map(|v| v.screen.unwrap_or_else(|| Vector3::repeat(f32::NAN)))
                .collect(),
            target: packet.render_target.id,
            pixels_written: written,
        });
        Ok(())
    }

    fn present(&mut self, interval: PresentInterval, image_index: u32) -> Result<()> {
        self.check_alive()?;
        let chain = self
            .swap_chain
            .as_mut()
            .ok_or_else(|| GraphicsError::InvalidUsage("no swap chain has been created".to_string()))?;

        if image_index != chain.writable {
            return Err(GraphicsError::InvalidUsage(format!(
                "presenting back buffer {} but {} is current",
                image_index, chain.writable
            ))
            .into());
        }

        let marker = chain.images[image_index as usize].get(0, 0).unwrap_or_default();
        chain.writable = (chain.writable + 1) % chain.images.len() as u32;

        self.vblank += interval.sync_interval() as u64;
        self.presents_done += 1;
        let sequence = self.next_sequence();
        push_bounded(&mut self.presents, PresentRecord {
            sequence,
            image_index,
            interval,
            vblank: self.vblank,
            marker,
        });
        Ok(())
    }

    fn release(&mut self, id: ResourceId) -> Result<()> {
        let found = if self.swap_chain.as_ref().map(|c| c.id) == Some(id) {
            self.swap_chain = None;
            true
        } else {
            self.buffers.remove(&id).is_some()
                || self.textures.remove(&id).is_some()
                || self.views.remove(&id).is_some()
                || self.samplers.remove(&id).is_some()
                || self.depth_states.remove(&id).is_some()
                || self.pipelines.remove(&id).is_some()
        };

        if !found {
            return Err(stale(id));
        }
        self.released.push(id);
        Ok(())
    }
}

impl Drop for SoftwareDevice {
    fn drop(&mut self) {
        let live = self.live_objects();
        if live > 0 {
            warn!(live, "Software device dropped with live objects");
        }
    }
}
