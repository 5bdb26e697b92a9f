//! 旋转立方体场景
//!
//! 两个立方体共用一条管线、一个顶点/索引缓冲和一个动态变换缓冲。
//! 每帧角度先前进一步，然后对每个立方体：整块改写变换缓冲，再发出一次索引绘制。
//! 第二个立方体以一半的速率旋转。
//!
//! 面颜色放在像素阶段的不可变常量缓冲中，深度测试使用 LESS。

use tracing::trace;

use crate::core::error::Result;
use crate::core::math::Color;
use crate::renderer::command::Frame;
use crate::renderer::device::Device;
use crate::renderer::pipeline::{
    DepthStencilDescriptor, DepthStencilStateHandle, IndexFormat, PipelineHandle,
    PrimitiveTopology, ResourceBinding, ShaderStage, Viewport,
};
use crate::renderer::resource::{BufferBind, BufferHandle, DepthStencilView, RenderTargetView};
use crate::renderer::shaders::BuiltinShader;
use crate::renderer::transform::{AngleAccumulator, ObjectConstants, Projection, SpinningObject};
use crate::renderer::vertex::{face_palette, PositionVertex, CUBE_INDICES, CUBE_VERTICES};
use crate::scene::{Scene, SceneSetup};

/// 每帧开始时深度目标的清除值
pub const CLEAR_DEPTH: f32 = 1.0;

#[derive(Debug)]
pub struct CubesScene {
    pipeline: PipelineHandle,
    vertices: BufferHandle,
    indices: BufferHandle,
    /// 顶点阶段 slot 0，每次绘制前整块改写
    transform: BufferHandle,
    /// 像素阶段 slot 0
    palette: BufferHandle,
    depth_view: DepthStencilView,
    depth_state: DepthStencilStateHandle,

    angle: AngleAccumulator,
    cubes: Vec<SpinningObject>,
    projection: Projection,
    clear_color: Color,
}

impl CubesScene {
    /// 当前基准角度（弧度）
    pub fn angle(&self) -> f32 {
        self.angle.angle()
    }

    pub fn cubes(&self) -> &[SpinningObject] {
        &self.cubes
    }
}

impl Scene for CubesScene {
    fn name(&self) -> &'static str {
        "cubes"
    }

    fn create<D: Device + ?Sized>(setup: &mut SceneSetup<'_, D>) -> Result<Self> {
        let pipeline = setup.builtin_pipeline(
            BuiltinShader::Cubes,
            PositionVertex::layout(),
            PrimitiveTopology::TriangleList,
            vec![
                ResourceBinding::ConstantBuffer {
                    stage: ShaderStage::Vertex,
                    slot: 0,
                    size: std::mem::size_of::<ObjectConstants>() as u64,
                },
                ResourceBinding::ConstantBuffer {
                    stage: ShaderStage::Pixel,
                    slot: 0,
                    size: std::mem::size_of_val(&face_palette()) as u64,
                },
            ],
        )?;

        let vertices = setup
            .builder
            .immutable_buffer(BufferBind::Vertex, &CUBE_VERTICES, "cube vertices")?;
        let indices = setup
            .builder
            .immutable_buffer(BufferBind::Index, &CUBE_INDICES, "cube indices")?;
        let transform = setup.builder.dynamic_buffer(
            BufferBind::Constant,
            std::mem::size_of::<ObjectConstants>() as u64,
            "cube transform",
        )?;
        let palette = setup
            .builder
            .immutable_buffer(BufferBind::Constant, &face_palette(), "cube face colors")?;

        let (_, depth_view) = setup.builder.depth_target(setup.extent, 1)?;
        let depth_state = setup.builder.depth_stencil_state(&DepthStencilDescriptor::default())?;

        let config = setup.config;
        Ok(Self {
            pipeline,
            vertices,
            indices,
            transform,
            palette,
            depth_view,
            depth_state,
            angle: AngleAccumulator::new(config.animation.angle_step),
            cubes: SpinningObject::from_animation(&config.animation),
            projection: Projection::from_config(&config.projection, setup.extent),
            clear_color: setup.clear_color_or(Color::BLACK),
        })
    }

    fn clear_color(&self) -> Color {
        self.clear_color
    }

    fn depth_target(&self) -> Option<(DepthStencilView, f32)> {
        Some((self.depth_view, CLEAR_DEPTH))
    }

    fn record<D: Device + ?Sized>(&mut self, frame: &mut Frame<'_, D>, target: &RenderTargetView) -> Result<()> {
        let angle = self.angle.advance();
        trace!(frame = frame.frame_index(), angle, "Cubes frame");

        frame.set_vertex_buffer(&self.vertices, PositionVertex::layout().stride, 0)?;
        frame.set_index_buffer(&self.indices, IndexFormat::Uint32, 0)?;
        frame.set_primitive_topology(PrimitiveTopology::TriangleList)?;
        frame.set_pipeline(&self.pipeline)?;
        frame.set_constant_buffer(ShaderStage::Vertex, 0, &self.transform)?;
        frame.set_constant_buffer(ShaderStage::Pixel, 0, &self.palette)?;
        frame.set_viewport(Viewport::full(target.extent))?;
        frame.set_render_targets(target, Some(&self.depth_view))?;
        frame.set_depth_stencil_state(Some(&self.depth_state))?;

        for cube in &self.cubes {
            let constants = cube.constants(angle, &self.projection);
            frame.update_buffer(&self.transform, constants.as_bytes())?;
            frame.draw_indexed(CUBE_INDICES.len() as u32, 0, 0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::Vector3;
    use crate::core::scene::{ProjectionConfig, SceneKind};
    use crate::scene::testing::{config, Harness, EXTENT};

    #[test]
    fn test_each_cube_sees_its_own_transform() {
        let mut harness = Harness::<CubesScene>::new(&config(SceneKind::Cubes)).unwrap();
        let stats = harness.frame().unwrap();
        assert_eq!(stats.draw_count, 2);

        let step = harness.scene.angle();
        let projection = Projection::from_config(&ProjectionConfig::default(), EXTENT);
        let translation = Vector3::new(0.0, 0.0, 5.0);
        let first = SpinningObject::new(translation, 1.0).constants(step, &projection);
        let second = SpinningObject::new(translation, 0.5).constants(step, &projection);

        let draws = harness.device.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].constants[0].bytes, first.as_bytes());
        assert_eq!(draws[1].constants[0].bytes, second.as_bytes());
        assert_eq!(draws[0].constants[1].stage, ShaderStage::Pixel);
        assert_eq!(draws[0].constants[1].bytes.len(), 96);
        assert!(draws[0].sequence < draws[1].sequence);
        harness.finish();
    }

    #[test]
    fn test_angle_advances_once_per_frame() {
        let mut harness = Harness::<CubesScene>::new(&config(SceneKind::Cubes)).unwrap();
        for _ in 0..3 {
            harness.frame().unwrap();
        }
        let expected = 3.0 * config(SceneKind::Cubes).animation.angle_step;
        assert!((harness.scene.angle() - expected).abs() < 1e-6);
        assert_eq!(harness.device.draws().len(), 6);
        assert_eq!(harness.device.presents().len(), 3);
        harness.finish();
    }

    #[test]
    fn test_cubes_are_visible_inside_depth_range() {
        let mut harness = Harness::<CubesScene>::new(&config(SceneKind::Cubes)).unwrap();
        harness.frame().unwrap();

        let center = harness.device.back_buffer_pixel(0, EXTENT.width / 2, EXTENT.height / 2).unwrap();
        assert_ne!(center, [0, 0, 0, 255]);
        assert_eq!(harness.device.back_buffer_pixel(0, 0, 0), Some([0, 0, 0, 255]));

        let draws = harness.device.draws();
        assert!(draws[0].pixels_written > 0);
        assert!(draws[0].screen_positions.iter().all(|p| p.z > 0.0 && p.z < 1.0));
        harness.finish();
    }
}
