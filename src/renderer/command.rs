//! 即时上下文模块
//!
//! `ImmediateContext` 保存当前绑定的全部管线状态，绑定在帧之间保持不变。
//! 每一帧通过 `begin_frame` 得到一个 `Frame` 守卫，所有绑定、动态缓冲更新和绘制
//! 都只能通过它进行；`Frame::present` 消耗守卫，因此呈现之后不可能再发出绘制。
//!
//! # 绑定协议
//!
//! 绘制前必须满足六类绑定（见 `BindingCategory`），绘制本身是第七步。
//! 视口、渲染目标、深度模板状态可以先于输入装配、管线和着色器资源设置。
//! 重复绑定同一个对象是幂等的。

use std::collections::BTreeMap;

use tracing::{trace, warn};

use crate::core::error::{FrameError, GraphicsError, Result};
use crate::core::math::Color;
use crate::renderer::device::{
    BoundResource, Device, DrawCall, DrawPacket, IndexBufferBinding, VertexBufferBinding,
};
use crate::renderer::pipeline::{
    DepthStencilStateHandle, IndexFormat, PipelineHandle, PrimitiveTopology, ResourceBinding,
    ShaderStage, Viewport,
};
use crate::renderer::resource::{
    BufferBind, BufferHandle, BufferUsage, DepthStencilView, Extent2d, RenderTargetView,
    SamplerHandle, ShaderResourceView,
};
use crate::renderer::state::{transition, BindingCategory, BindingSet, FrameEvent, FrameState};
use crate::renderer::swapchain::{PresentInterval, PresentationChain};

/// 本帧的清屏目标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTargets {
    pub color: RenderTargetView,
    pub clear_color: Color,
    /// 深度视图与清除值
    pub depth: Option<(DepthStencilView, f32)>,
}

impl FrameTargets {
    pub fn new(color: RenderTargetView, clear_color: Color) -> Self {
        Self {
            color,
            clear_color,
            depth: None,
        }
    }

    pub fn with_depth(mut self, view: DepthStencilView, clear_depth: f32) -> Self {
        self.depth = Some((view, clear_depth));
        self
    }
}

/// 一帧的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// 帧序号，从 0 开始
    pub frame_index: u64,
    /// 被呈现的后备缓冲
    pub image_index: u32,
    pub draw_count: u32,
}

/// 当前绑定的管线状态
#[derive(Debug, Clone, Default)]
struct BoundState {
    vertex_buffer: Option<VertexBufferBinding>,
    index_buffer: Option<IndexBufferBinding>,
    topology: Option<PrimitiveTopology>,
    pipeline: Option<PipelineHandle>,
    constant_buffers: BTreeMap<(ShaderStage, u32), BufferHandle>,
    shader_resources: BTreeMap<u32, ShaderResourceView>,
    samplers: BTreeMap<u32, SamplerHandle>,
    viewport: Option<Viewport>,
    render_target: Option<RenderTargetView>,
    depth_target: Option<DepthStencilView>,
    /// 外层 `Some` 表示已显式设置，内层 `None` 表示使用默认状态
    depth_state: Option<Option<DepthStencilStateHandle>>,
}

impl BoundState {
    fn categories(&self) -> BindingSet {
        let mut set = BindingSet::empty();

        if self.vertex_buffer.is_some() && self.topology.is_some() {
            set.insert(BindingCategory::InputAssembly);
        }
        if let Some(pipeline) = &self.pipeline {
            set.insert(BindingCategory::Shaders);
            if self.resolve_bindings(pipeline).is_some() {
                set.insert(BindingCategory::ShaderResources);
            }
        }
        if self.viewport.is_some() {
            set.insert(BindingCategory::Viewport);
        }
        if self.render_target.is_some() {
            set.insert(BindingCategory::RenderTargets);
        }
        if self.depth_state.is_some() {
            set.insert(BindingCategory::FixedFunction);
        }

        set
    }

    /// 按管线声明顺序解析资源，任何槽位缺失则返回 `None`
    fn resolve_bindings(&self, pipeline: &PipelineHandle) -> Option<Vec<BoundResource>> {
        pipeline
            .info()
            .bindings
            .iter()
            .map(|binding| match binding {
                ResourceBinding::ConstantBuffer { stage, slot, .. } => self
                    .constant_buffers
                    .get(&(*stage, *slot))
                    .map(|b| BoundResource::ConstantBuffer(*b)),
                ResourceBinding::Texture { slot } => {
                    self.shader_resources.get(slot).map(|v| BoundResource::Texture(*v))
                }
                ResourceBinding::Sampler { slot } => {
                    self.samplers.get(slot).map(|s| BoundResource::Sampler(*s))
                }
            })
            .collect()
    }

    /// 组装绘制包，并做绘制前的全部一致性检查
    fn build_packet(&self, call: DrawCall) -> Result<DrawPacket> {
        let categories = self.categories();
        let missing = || FrameError::MissingBindings(categories.missing());

        let (Some(pipeline), Some(vertex_buffer), Some(topology), Some(viewport), Some(render_target), Some(depth_state)) = (
            self.pipeline.as_ref(),
            self.vertex_buffer,
            self.topology,
            self.viewport,
            self.render_target,
            self.depth_state,
        ) else {
            return Err(missing().into());
        };
        let bindings = self.resolve_bindings(pipeline).ok_or_else(missing)?;

        let info = pipeline.info();
        if topology != info.topology {
            return Err(FrameError::TopologyMismatch {
                bound: format!("{:?}", topology),
                expected: format!("{:?}", info.topology),
            }
            .into());
        }

        if vertex_buffer.stride != info.layout.stride {
            return Err(FrameError::StrideMismatch {
                bound: vertex_buffer.stride,
                expected: info.layout.stride,
            }
            .into());
        }

        for (declared, bound) in info.bindings.iter().zip(&bindings) {
            if let (ResourceBinding::ConstantBuffer { size, slot, .. }, BoundResource::ConstantBuffer(buffer)) = (declared, bound) {
                if buffer.size < *size {
                    return Err(FrameError::WrongBinding(format!(
                        "constant buffer in slot {} is {} bytes, pipeline expects {}",
                        slot, buffer.size, size
                    ))
                    .into());
                }
            }
        }

        if let DrawCall::DrawIndexed { index_count, first_index, .. } = call {
            let index_buffer = self.index_buffer.ok_or(FrameError::IndexBufferMissing)?;
            let end = first_index as u64 + index_count as u64;
            let available = index_buffer.available_indices();
            if end > available {
                return Err(FrameError::IndexOutOfRange {
                    first: first_index,
                    end: end.min(u32::MAX as u64) as u32,
                    available: available.min(u32::MAX as u64) as u32,
                }
                .into());
            }
        }

        Ok(DrawPacket {
            pipeline: pipeline.clone(),
            vertex_buffer,
            index_buffer: self.index_buffer,
            topology,
            bindings,
            viewport,
            render_target,
            depth_target: self.depth_target,
            depth_state,
            call,
        })
    }
}

/// 即时上下文
#[derive(Debug)]
pub struct ImmediateContext {
    bound: BoundState,
    state: FrameState,
    frame_index: u64,
}

impl Default for ImmediateContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ImmediateContext {
    pub fn new() -> Self {
        Self {
            bound: BoundState::default(),
            state: FrameState::Idle,
            frame_index: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// 已呈现的帧数
    pub fn frames_presented(&self) -> u64 {
        self.frame_index
    }

    /// 当前满足的绑定类别
    pub fn bound_categories(&self) -> BindingSet {
        self.bound.categories()
    }

    /// 开始一帧：清除颜色目标，给定深度视图时同时清除深度
    ///
    /// 属于呈现链的渲染目标绑定只对获取它的那一帧有效，开始新帧时会被解除。
    pub fn begin_frame<'a, D: Device + ?Sized>(
        &'a mut self,
        device: &'a mut D,
        chain: &'a mut PresentationChain,
        targets: FrameTargets,
    ) -> Result<Frame<'a, D>> {
        let next = transition(self.state, FrameEvent::Begin)?;

        device.clear_render_target(&targets.color, targets.clear_color)?;
        if let Some((view, depth)) = &targets.depth {
            device.clear_depth(view, *depth)?;
        }

        if let Some(bound) = self.bound.render_target {
            if bound.resource == chain.id() && bound.id != targets.color.id {
                self.bound.render_target = None;
                self.bound.depth_target = None;
            }
        }

        self.state = next;
        let image_index = chain.current_index();
        trace!(frame = self.frame_index, image_index, "Frame begin");

        let mut frame = Frame {
            ctx: self,
            device,
            chain,
            image_index,
            finished: false,
        };
        frame.refresh_bound()?;
        Ok(frame)
    }

    /// 解除所有绑定
    pub fn clear_state(&mut self) {
        self.bound = BoundState::default();
    }
}

/// 进行中的一帧
pub struct Frame<'a, D: Device + ?Sized> {
    ctx: &'a mut ImmediateContext,
    device: &'a mut D,
    chain: &'a mut PresentationChain,
    image_index: u32,
    finished: bool,
}

impl<'a, D: Device + ?Sized> Frame<'a, D> {
    pub fn state(&self) -> FrameState {
        self.ctx.state
    }

    pub fn frame_index(&self) -> u64 {
        self.ctx.frame_index
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// 呈现链尺寸
    pub fn extent(&self) -> Extent2d {
        self.chain.extent()
    }

    pub fn bound_categories(&self) -> BindingSet {
        self.ctx.bound.categories()
    }

    pub fn set_vertex_buffer(&mut self, buffer: &BufferHandle, stride: u32, offset: u64) -> Result<()> {
        expect_buffer_bind(buffer, BufferBind::Vertex)?;
        self.ctx.bound.vertex_buffer = Some(VertexBufferBinding {
            buffer: *buffer,
            stride,
            offset,
        });
        self.refresh_bound()
    }

    pub fn set_index_buffer(&mut self, buffer: &BufferHandle, format: IndexFormat, offset: u64) -> Result<()> {
        expect_buffer_bind(buffer, BufferBind::Index)?;
        self.ctx.bound.index_buffer = Some(IndexBufferBinding {
            buffer: *buffer,
            format,
            offset,
        });
        self.refresh_bound()
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> Result<()> {
        self.ctx.bound.topology = Some(topology);
        self.refresh_bound()
    }

    pub fn set_pipeline(&mut self, pipeline: &PipelineHandle) -> Result<()> {
        if self.ctx.bound.pipeline.as_ref() != Some(pipeline) {
            self.ctx.bound.pipeline = Some(pipeline.clone());
        }
        self.refresh_bound()
    }

    pub fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: &BufferHandle) -> Result<()> {
        expect_buffer_bind(buffer, BufferBind::Constant)?;
        self.ctx.bound.constant_buffers.insert((stage, slot), *buffer);
        self.refresh_bound()
    }

    pub fn set_shader_resource(&mut self, slot: u32, view: &ShaderResourceView) -> Result<()> {
        self.ctx.bound.shader_resources.insert(slot, *view);
        self.refresh_bound()
    }

    pub fn set_sampler(&mut self, slot: u32, sampler: &SamplerHandle) -> Result<()> {
        self.ctx.bound.samplers.insert(slot, *sampler);
        self.refresh_bound()
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.ctx.bound.viewport = Some(viewport);
        self.refresh_bound()
    }

    /// 绑定颜色目标和可选的深度目标，两者尺寸与采样数必须一致
    pub fn set_render_targets(&mut self, color: &RenderTargetView, depth: Option<&DepthStencilView>) -> Result<()> {
        if let Some(depth) = depth {
            if depth.extent != color.extent || depth.sample_count != color.sample_count {
                return Err(FrameError::TargetMismatch(format!(
                    "color {} x{} vs depth {} x{}",
                    color.extent, color.sample_count, depth.extent, depth.sample_count
                ))
                .into());
            }
        }

        self.ctx.bound.render_target = Some(*color);
        self.ctx.bound.depth_target = depth.copied();
        self.refresh_bound()
    }

    /// 设置深度模板状态，`None` 表示使用默认状态
    pub fn set_depth_stencil_state(&mut self, state: Option<&DepthStencilStateHandle>) -> Result<()> {
        self.ctx.bound.depth_state = Some(state.copied());
        self.refresh_bound()
    }

    /// 整块覆盖写入动态缓冲区
    pub fn update_buffer(&mut self, buffer: &BufferHandle, data: &[u8]) -> Result<()> {
        if !self.ctx.state.in_frame() {
            return Err(FrameError::OutsideFrame("update_buffer").into());
        }

        if buffer.usage != BufferUsage::Dynamic {
            return Err(GraphicsError::InvalidUsage(format!("buffer {} is immutable", buffer.id)).into());
        }

        if data.len() as u64 != buffer.size {
            return Err(GraphicsError::InvalidUsage(format!(
                "update of {} bytes does not cover buffer {} of {} bytes",
                data.len(),
                buffer.id,
                buffer.size
            ))
            .into());
        }

        self.device.update_buffer(buffer, data)
    }

    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.issue(DrawCall::Draw {
            vertex_count,
            first_vertex,
        })
    }

    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) -> Result<()> {
        self.issue(DrawCall::DrawIndexed {
            index_count,
            first_index,
            base_vertex,
        })
    }

    /// 呈现并结束本帧
    pub fn present(mut self, interval: PresentInterval) -> Result<FrameStats> {
        let next = transition(self.ctx.state, FrameEvent::Present)?;
        let draw_count = self.ctx.state.draw_count();
        self.finished = true;

        match self.chain.present(&mut *self.device, interval) {
            Ok(image_index) => {
                let stats = FrameStats {
                    frame_index: self.ctx.frame_index,
                    image_index,
                    draw_count,
                };
                // Presented 只是瞬态，交换完成后立即复位，下一帧从 Idle 开始
                self.ctx.state = transition(next, FrameEvent::Reset)?;
                self.ctx.frame_index += 1;
                trace!(frame = stats.frame_index, image_index, draw_count, "Frame presented");
                Ok(stats)
            }
            Err(e) => {
                self.ctx.state = FrameState::Idle;
                Err(e)
            }
        }
    }

    fn issue(&mut self, call: DrawCall) -> Result<()> {
        let packet = self.ctx.bound.build_packet(call).map_err(|e| {
            warn!(frame = self.ctx.frame_index, error = %e, "Draw rejected");
            e
        })?;

        // 状态在 `build_packet` 之后推进：绑定齐全时已处于 Bound 或 Drawn
        let next = transition(self.ctx.state, FrameEvent::Draw)?;
        self.device.submit_draw(&packet)?;
        self.ctx.state = next;
        Ok(())
    }

    /// 六类绑定齐全时推进到 Bound
    fn refresh_bound(&mut self) -> Result<()> {
        if self.ctx.bound.categories().is_complete() {
            self.ctx.state = transition(self.ctx.state, FrameEvent::BindingsComplete)?;
        }
        Ok(())
    }
}

impl<'a, D: Device + ?Sized> Drop for Frame<'a, D> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(frame = self.ctx.frame_index, "Frame abandoned without present");
            self.ctx.state = FrameState::Idle;
        }
    }
}

fn expect_buffer_bind(buffer: &BufferHandle, expected: BufferBind) -> Result<()> {
    if buffer.bind != expected {
        return Err(FrameError::WrongBinding(format!(
            "buffer {} is a {:?} buffer, slot expects {:?}",
            buffer.id, buffer.bind, expected
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::error::RenderError;
    use crate::core::math::Vector3;
    use crate::gfx::software::SoftwareDevice;
    use crate::renderer::pipeline::{CompiledShader, PipelineDescriptor, RasterState};
    use crate::renderer::swapchain::SwapChainDescriptor;
    use crate::renderer::tracker::{ResourceBuilder, ResourceTracker};
    use crate::renderer::vertex::{create_default_triangle, ColorVertex};

    const EXTENT: Extent2d = Extent2d::new(64, 64);

    #[derive(Clone)]
    struct Resources {
        pipeline: PipelineHandle,
        vertices: BufferHandle,
        indices: BufferHandle,
        transform: BufferHandle,
    }

    struct Fixture {
        device: SoftwareDevice,
        tracker: ResourceTracker,
        chain: PresentationChain,
        ctx: ImmediateContext,
        res: Resources,
    }

    fn shader(stage: ShaderStage, entry: &str) -> CompiledShader {
        CompiledShader {
            stage,
            entry_point: entry.to_string(),
            bytecode: Arc::from(&b"test"[..]),
        }
    }

    fn fixture() -> Fixture {
        let mut device = SoftwareDevice::new(EXTENT);
        let mut tracker = ResourceTracker::new();
        let chain = PresentationChain::create(
            &mut device,
            &mut tracker,
            &SwapChainDescriptor::new(EXTENT, 2, PresentInterval::VSync),
        )
        .unwrap();

        let res = {
            let mut builder = ResourceBuilder::new(&mut device, &mut tracker);
            let pipeline = builder
                .pipeline(&PipelineDescriptor {
                    label: "colored".into(),
                    vertex: shader(ShaderStage::Vertex, "vs_main"),
                    pixel: shader(ShaderStage::Pixel, "ps_main"),
                    layout: ColorVertex::layout(),
                    topology: PrimitiveTopology::TriangleList,
                    raster: RasterState::default(),
                    bindings: vec![ResourceBinding::ConstantBuffer {
                        stage: ShaderStage::Vertex,
                        slot: 0,
                        size: 64,
                    }],
                })
                .unwrap();
            let vertices = builder
                .immutable_buffer(BufferBind::Vertex, &create_default_triangle(), "triangle")
                .unwrap();
            let indices = builder
                .immutable_buffer(BufferBind::Index, &[0u16, 1, 2, 0], "indices")
                .unwrap();
            let transform = builder.dynamic_buffer(BufferBind::Constant, 64, "transform").unwrap();
            Resources {
                pipeline,
                vertices,
                indices,
                transform,
            }
        };

        Fixture {
            device,
            tracker,
            chain,
            ctx: ImmediateContext::new(),
            res,
        }
    }

    fn bind_all<D: Device + ?Sized>(frame: &mut Frame<'_, D>, res: &Resources, target: &RenderTargetView) -> Result<()> {
        frame.set_vertex_buffer(&res.vertices, ColorVertex::layout().stride, 0)?;
        frame.set_index_buffer(&res.indices, IndexFormat::Uint16, 0)?;
        frame.set_primitive_topology(PrimitiveTopology::TriangleList)?;
        frame.set_pipeline(&res.pipeline)?;
        frame.set_constant_buffer(ShaderStage::Vertex, 0, &res.transform)?;
        frame.set_viewport(Viewport::full(EXTENT))?;
        frame.set_render_targets(target, None)?;
        frame.set_depth_stencil_state(None)
    }

    fn identity_bytes() -> Vec<u8> {
        let identity: [f32; 16] = [
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ];
        bytemuck::cast_slice(&identity).to_vec()
    }

    #[test]
    fn test_draw_without_bindings_reports_all_missing() {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();

        let err = frame.draw(3, 0).unwrap_err();
        match err {
            RenderError::Frame(FrameError::MissingBindings(missing)) => {
                assert_eq!(missing, BindingCategory::ALL.to_vec());
            }
            other => panic!("unexpected error: {other}"),
        }
        drop(frame);
        assert!(fx.device.draws().is_empty());
    }

    #[test]
    fn test_partial_bindings_name_remaining_categories() {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();

        // 视口和渲染目标先于输入装配设置是允许的
        frame.set_viewport(Viewport::full(EXTENT)).unwrap();
        frame.set_render_targets(&target, None).unwrap();
        frame.set_pipeline(&fx.res.pipeline).unwrap();

        let err = frame.draw(3, 0).unwrap_err();
        match err {
            RenderError::Frame(FrameError::MissingBindings(missing)) => assert_eq!(
                missing,
                vec![
                    BindingCategory::InputAssembly,
                    BindingCategory::ShaderResources,
                    BindingCategory::FixedFunction,
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(frame.state(), FrameState::FrameBegin);
    }

    #[test]
    fn test_full_frame_walks_state_machine() {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::RED))
            .unwrap();
        assert_eq!(frame.state(), FrameState::FrameBegin);

        bind_all(&mut frame, &fx.res, &target).unwrap();
        assert_eq!(frame.state(), FrameState::Bound);

        frame.update_buffer(&fx.res.transform, &identity_bytes()).unwrap();
        frame.draw(3, 0).unwrap();
        assert_eq!(frame.state(), FrameState::Drawn(1));

        let stats = frame.present(PresentInterval::VSync).unwrap();
        assert_eq!(stats, FrameStats { frame_index: 0, image_index: 0, draw_count: 1 });
        assert_eq!(fx.ctx.state(), FrameState::Idle);
        assert_eq!(fx.device.presents().len(), 1);
        assert_eq!(fx.device.presents()[0].marker, [255, 0, 0, 255]);
    }

    /// 渲染一帧，返回绘制记录中的屏幕坐标和后备缓冲 0 的全部像素
    fn render_triangle(bind_pipeline_twice: bool) -> (Vec<Vector3>, Vec<[u8; 4]>) {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();

        bind_all(&mut frame, &fx.res, &target).unwrap();
        let before = frame.bound_categories();
        if bind_pipeline_twice {
            frame.set_pipeline(&fx.res.pipeline).unwrap();
            frame.set_pipeline(&fx.res.pipeline).unwrap();
        }
        assert_eq!(frame.bound_categories(), before);
        assert_eq!(frame.state(), FrameState::Bound);

        frame.update_buffer(&fx.res.transform, &identity_bytes()).unwrap();
        frame.draw(3, 0).unwrap();
        frame.present(PresentInterval::VSync).unwrap();

        assert_eq!(fx.device.draws().len(), 1);
        let positions = fx.device.draws()[0].screen_positions.clone();
        let pixels = (0..EXTENT.height)
            .flat_map(|y| (0..EXTENT.width).map(move |x| (x, y)))
            .map(|(x, y)| fx.device.back_buffer_pixel(0, x, y).unwrap())
            .collect();
        (positions, pixels)
    }

    #[test]
    fn test_rebinding_same_pipeline_is_idempotent() {
        let (single_positions, single_pixels) = render_triangle(false);
        let (double_positions, double_pixels) = render_triangle(true);

        assert_eq!(single_positions, double_positions);
        assert_eq!(single_pixels, double_pixels);
        // 三角形确实画到了目标上
        assert!(single_pixels.iter().any(|p| *p != [0, 0, 0, 255]));
    }

    #[test]
    fn test_context_returns_to_idle_between_frames() {
        let mut fx = fixture();
        for (frame_index, color) in [Color::RED, Color::GREEN, Color::BLUE].into_iter().enumerate() {
            assert_eq!(fx.ctx.state(), FrameState::Idle);
            let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
            let frame = fx
                .ctx
                .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, color))
                .unwrap();
            let stats = frame.present(PresentInterval::VSync).unwrap();
            assert_eq!(stats.frame_index, frame_index as u64);
            assert_eq!(fx.ctx.state(), FrameState::Idle);
        }
        assert_eq!(fx.ctx.frames_presented(), 3);
    }

    #[test]
    fn test_updates_between_draws_are_observed_in_order() {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();
        bind_all(&mut frame, &fx.res, &target).unwrap();

        let t1 = identity_bytes();
        let mut t2 = identity_bytes();
        // 第二个变换把 x 平移 0.5
        t2[48..52].copy_from_slice(&0.5f32.to_ne_bytes());

        frame.update_buffer(&fx.res.transform, &t1).unwrap();
        frame.draw(3, 0).unwrap();
        frame.update_buffer(&fx.res.transform, &t2).unwrap();
        frame.draw(3, 0).unwrap();
        frame.present(PresentInterval::VSync).unwrap();

        let draws = fx.device.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].constants[0].bytes, t1);
        assert_eq!(draws[1].constants[0].bytes, t2);
        assert!(draws[0].sequence < draws[1].sequence);
        assert!(draws[1].sequence < fx.device.presents()[0].sequence);

        // 顶部顶点 (0, 0.5) 在第二次绘制中右移了 0.25 个屏幕宽度
        let first = draws[0].screen_positions[0];
        let second = draws[1].screen_positions[0];
        assert!((second.x - first.x - 16.0).abs() < 1e-4);
    }

    #[test]
    fn test_immutable_buffer_cannot_be_updated() {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();

        let err = frame.update_buffer(&fx.res.vertices, &[0u8; 60]).unwrap_err();
        assert!(matches!(err, RenderError::Graphics(GraphicsError::InvalidUsage(_))));

        let err = frame.update_buffer(&fx.res.transform, &[0u8; 32]).unwrap_err();
        assert!(matches!(err, RenderError::Graphics(GraphicsError::InvalidUsage(_))));
    }

    #[test]
    fn test_draw_validation_errors() {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();
        bind_all(&mut frame, &fx.res, &target).unwrap();

        frame.set_primitive_topology(PrimitiveTopology::LineList).unwrap();
        assert!(matches!(
            frame.draw(3, 0),
            Err(RenderError::Frame(FrameError::TopologyMismatch { .. }))
        ));
        frame.set_primitive_topology(PrimitiveTopology::TriangleList).unwrap();

        frame.set_vertex_buffer(&fx.res.vertices, 16, 0).unwrap();
        assert!(matches!(
            frame.draw(3, 0),
            Err(RenderError::Frame(FrameError::StrideMismatch { bound: 16, expected: 20 }))
        ));
        frame.set_vertex_buffer(&fx.res.vertices, 20, 0).unwrap();

        assert!(matches!(
            frame.draw_indexed(6, 0, 0),
            Err(RenderError::Frame(FrameError::IndexOutOfRange { available: 4, .. }))
        ));
        frame.draw_indexed(3, 0, 0).unwrap();

        assert!(matches!(
            frame.set_vertex_buffer(&fx.res.transform, 20, 0),
            Err(RenderError::Frame(FrameError::WrongBinding(_)))
        ));
    }

    #[test]
    fn test_indexed_draw_requires_index_buffer() {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();

        frame.set_vertex_buffer(&fx.res.vertices, 20, 0).unwrap();
        frame.set_primitive_topology(PrimitiveTopology::TriangleList).unwrap();
        frame.set_pipeline(&fx.res.pipeline).unwrap();
        frame.set_constant_buffer(ShaderStage::Vertex, 0, &fx.res.transform).unwrap();
        frame.set_viewport(Viewport::full(EXTENT)).unwrap();
        frame.set_render_targets(&target, None).unwrap();
        frame.set_depth_stencil_state(None).unwrap();

        assert!(matches!(
            frame.draw_indexed(3, 0, 0),
            Err(RenderError::Frame(FrameError::IndexBufferMissing))
        ));
    }

    #[test]
    fn test_mismatched_depth_target_rejected() {
        let mut fx = fixture();
        let (_, small_depth) = ResourceBuilder::new(&mut fx.device, &mut fx.tracker)
            .depth_target(Extent2d::new(32, 32), 1)
            .unwrap();

        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();

        assert!(matches!(
            frame.set_render_targets(&target, Some(&small_depth)),
            Err(RenderError::Frame(FrameError::TargetMismatch(_)))
        ));
    }

    #[test]
    fn test_dropped_frame_returns_to_idle_without_present() {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        {
            let mut frame = fx
                .ctx
                .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
                .unwrap();
            bind_all(&mut frame, &fx.res, &target).unwrap();
        }

        assert_eq!(fx.ctx.state(), FrameState::Idle);
        assert!(fx.device.presents().is_empty());
        assert_eq!(fx.chain.current_index(), 0);
    }

    #[test]
    fn test_back_buffer_binding_does_not_leak_into_next_frame() {
        let mut fx = fixture();

        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();
        bind_all(&mut frame, &fx.res, &target).unwrap();
        frame.draw(3, 0).unwrap();
        frame.present(PresentInterval::VSync).unwrap();

        let next_target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        assert_ne!(next_target.id, target.id);
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(next_target, Color::BLACK))
            .unwrap();

        // 其余绑定保持，只有上一帧的后备缓冲被解除
        assert_eq!(frame.bound_categories().missing(), vec![BindingCategory::RenderTargets]);
        frame.set_render_targets(&next_target, None).unwrap();
        assert_eq!(frame.state(), FrameState::Bound);
        frame.draw(3, 0).unwrap();
        let stats = frame.present(PresentInterval::VSync).unwrap();
        assert_eq!(stats.image_index, 1);
    }

    #[test]
    fn test_clear_state_unbinds_everything() {
        let mut fx = fixture();
        let target = fx.chain.acquire_current_target(&mut fx.device).unwrap();
        let mut frame = fx
            .ctx
            .begin_frame(&mut fx.device, &mut fx.chain, FrameTargets::new(target, Color::BLACK))
            .unwrap();
        bind_all(&mut frame, &fx.res, &target).unwrap();
        frame.present(PresentInterval::VSync).unwrap();

        fx.ctx.clear_state();
        assert_eq!(fx.ctx.bound_categories(), BindingSet::empty());
    }
}
