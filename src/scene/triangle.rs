//! 顶点着色三角形场景

use crate::core::error::Result;
use crate::core::math::Color;
use crate::renderer::command::Frame;
use crate::renderer::device::Device;
use crate::renderer::pipeline::{PipelineHandle, PrimitiveTopology, Viewport};
use crate::renderer::resource::{BufferBind, BufferHandle, RenderTargetView};
use crate::renderer::shaders::BuiltinShader;
use crate::renderer::vertex::{create_default_triangle, ColorVertex};
use crate::scene::{Scene, SceneSetup};

/// 一个不带任何着色器资源的三角形
#[derive(Debug)]
pub struct TriangleScene {
    pipeline: PipelineHandle,
    vertices: BufferHandle,
    clear_color: Color,
}

impl Scene for TriangleScene {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn create<D: Device + ?Sized>(setup: &mut SceneSetup<'_, D>) -> Result<Self> {
        let pipeline = setup.builtin_pipeline(
            BuiltinShader::Triangle,
            ColorVertex::layout(),
            PrimitiveTopology::TriangleList,
            Vec::new(),
        )?;
        let vertices = setup
            .builder
            .immutable_buffer(BufferBind::Vertex, &create_default_triangle(), "triangle vertices")?;

        Ok(Self {
            pipeline,
            vertices,
            clear_color: setup.clear_color_or(Color::BLACK),
        })
    }

    fn clear_color(&self) -> Color {
        self.clear_color
    }

    fn record<D: Device + ?Sized>(&mut self, frame: &mut Frame<'_, D>, target: &RenderTargetView) -> Result<()> {
        frame.set_vertex_buffer(&self.vertices, ColorVertex::layout().stride, 0)?;
        frame.set_primitive_topology(PrimitiveTopology::TriangleList)?;
        frame.set_pipeline(&self.pipeline)?;
        frame.set_viewport(Viewport::full(target.extent))?;
        frame.set_render_targets(target, None)?;
        frame.set_depth_stencil_state(None)?;
        frame.draw(3, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scene::SceneKind;
    use crate::scene::testing::{config, Harness, EXTENT};

    #[test]
    fn test_triangle_covers_center_only() {
        let mut harness = Harness::<TriangleScene>::new(&config(SceneKind::Triangle)).unwrap();
        let stats = harness.frame().unwrap();
        assert_eq!(stats.draw_count, 1);

        let draw = &harness.device.draws()[0];
        assert!(draw.constants.is_empty());
        assert!(draw.pixels_written > 0);

        // 顶点 0 在顶部中心
        let top = draw.screen_positions[0];
        assert_eq!(top.x, EXTENT.width as f32 / 2.0);
        assert_eq!(top.y, EXTENT.height as f32 / 4.0);

        let center = harness.device.back_buffer_pixel(0, EXTENT.width / 2, EXTENT.height / 2).unwrap();
        assert_ne!(center, [0, 0, 0, 255]);
        assert_eq!(harness.device.back_buffer_pixel(0, 0, 0), Some([0, 0, 0, 255]));
        harness.finish();
    }
}
