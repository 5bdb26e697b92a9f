//! 纹理四边形场景
//!
//! 启动时解码纹理图像并创建可采样纹理、着色器资源视图和线性/重复采样器。
//! 图像解码失败对启动是致命的。

use tracing::info;

use crate::core::error::Result;
use crate::core::math::Color;
use crate::renderer::command::Frame;
use crate::renderer::device::Device;
use crate::renderer::pipeline::{IndexFormat, PipelineHandle, PrimitiveTopology, ResourceBinding, Viewport};
use crate::renderer::resource::{
    BufferBind, BufferHandle, RenderTargetView, SamplerDescriptor, SamplerHandle, ShaderResourceView,
};
use crate::renderer::shaders::BuiltinShader;
use crate::renderer::vertex::{TexturedVertex, QUAD_INDICES, QUAD_VERTICES};
use crate::scene::{Scene, SceneSetup};

#[derive(Debug)]
pub struct TexturedQuadScene {
    pipeline: PipelineHandle,
    vertices: BufferHandle,
    indices: BufferHandle,
    texture: ShaderResourceView,
    sampler: SamplerHandle,
    clear_color: Color,
}

impl Scene for TexturedQuadScene {
    fn name(&self) -> &'static str {
        "quad"
    }

    fn create<D: Device + ?Sized>(setup: &mut SceneSetup<'_, D>) -> Result<Self> {
        let path = setup.config.texture.path.clone();
        let image = setup.assets.images.decode(&path)?;
        info!(path = %path.display(), width = image.width, height = image.height, "Texture loaded");

        let desc = image.texture_descriptor("quad texture");
        let texture = setup.builder.texture2d(&desc, Some(&image.into_texture_data()))?;
        let view = setup.builder.shader_resource_view(&texture)?;
        let sampler = setup.builder.sampler(&SamplerDescriptor::default())?;

        let pipeline = setup.builtin_pipeline(
            BuiltinShader::TexturedQuad,
            TexturedVertex::layout(),
            PrimitiveTopology::TriangleList,
            vec![ResourceBinding::Texture { slot: 0 }, ResourceBinding::Sampler { slot: 0 }],
        )?;
        let vertices = setup
            .builder
            .immutable_buffer(BufferBind::Vertex, &QUAD_VERTICES, "quad vertices")?;
        let indices = setup
            .builder
            .immutable_buffer(BufferBind::Index, &QUAD_INDICES, "quad indices")?;

        Ok(Self {
            pipeline,
            vertices,
            indices,
            texture: view,
            sampler,
            clear_color: setup.clear_color_or(Color::BLACK),
        })
    }

    fn clear_color(&self) -> Color {
        self.clear_color
    }

    fn record<D: Device + ?Sized>(&mut self, frame: &mut Frame<'_, D>, target: &RenderTargetView) -> Result<()> {
        frame.set_vertex_buffer(&self.vertices, TexturedVertex::layout().stride, 0)?;
        frame.set_index_buffer(&self.indices, IndexFormat::Uint32, 0)?;
        frame.set_primitive_topology(PrimitiveTopology::TriangleList)?;
        frame.set_pipeline(&self.pipeline)?;
        frame.set_shader_resource(0, &self.texture)?;
        frame.set_sampler(0, &self.sampler)?;
        frame.set_viewport(Viewport::full(target.extent))?;
        frame.set_render_targets(target, None)?;
        frame.set_depth_stencil_state(None)?;
        frame.draw_indexed(QUAD_INDICES.len() as u32, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::scene::SceneKind;
    use crate::scene::testing::{config, Harness, EXTENT};

    #[test]
    fn test_quad_samples_the_texture() {
        let mut harness = Harness::<TexturedQuadScene>::new(&config(SceneKind::Quad)).unwrap();
        harness.frame().unwrap();

        let draw = &harness.device.draws()[0];
        assert_eq!(draw.screen_positions.len(), 6);
        assert!(draw.pixels_written > 0);

        // 四边形覆盖中心，纹理只有黑白两色
        let center = harness.device.back_buffer_pixel(0, EXTENT.width / 2, EXTENT.height / 2).unwrap();
        assert_eq!(center[3], 255);
        assert_eq!(center[0], center[1]);
        harness.finish();
    }

    #[test]
    fn test_missing_texture_aborts_creation() {
        let mut scene = config(SceneKind::Quad);
        scene.texture.path = PathBuf::new();
        let err = Harness::<TexturedQuadScene>::new(&scene).err().unwrap();
        assert_eq!(err.exit_code(), 6);
    }
}
