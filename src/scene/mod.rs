//! 演示场景模块
//!
//! 每个场景在启动时通过 `SceneSetup` 一次性创建自己的全部资源，
//! 之后每帧在 `record` 中完成绑定、动态缓冲更新和绘制。
//!
//! # 场景列表
//!
//! - `ClearScene`：只清屏
//! - `TriangleScene`：顶点着色的三角形
//! - `TexturedQuadScene`：纹理四边形
//! - `CubesScene`：两个旋转的深度测试立方体
//!
//! 场景类型在编译期已知，`DemoScene` 用枚举分发，与渲染器选择后端的方式一致。

mod clear;
mod cubes;
mod quad;
mod triangle;

pub use clear::ClearScene;
pub use cubes::CubesScene;
pub use quad::TexturedQuadScene;
pub use triangle::TriangleScene;

use tracing::info;

use crate::core::error::Result;
use crate::core::math::Color;
use crate::core::scene::{SceneConfig, SceneKind};
use crate::renderer::command::Frame;
use crate::renderer::device::Device;
use crate::renderer::image::ImageDecoder;
use crate::renderer::pipeline::{
    InputLayout, PipelineDescriptor, PipelineHandle, PrimitiveTopology, RasterState,
    ResourceBinding,
};
use crate::renderer::resource::{DepthStencilView, Extent2d, RenderTargetView};
use crate::renderer::shaders::{compile_builtin, BuiltinShader, ShaderCompiler};
use crate::renderer::tracker::ResourceBuilder;

/// 场景创建时需要的外部服务
#[derive(Clone, Copy)]
pub struct SceneAssets<'a> {
    pub compiler: &'a dyn ShaderCompiler,
    pub images: &'a dyn ImageDecoder,
}

/// 场景创建入口
pub struct SceneSetup<'a, D: Device + ?Sized> {
    pub builder: ResourceBuilder<'a, D>,
    pub assets: SceneAssets<'a>,
    /// 呈现链尺寸
    pub extent: Extent2d,
    pub config: &'a SceneConfig,
}

impl<'a, D: Device + ?Sized> SceneSetup<'a, D> {
    /// 编译内置着色器并创建管线
    pub fn builtin_pipeline(
        &mut self,
        shader: BuiltinShader,
        layout: InputLayout,
        topology: PrimitiveTopology,
        bindings: Vec<ResourceBinding>,
    ) -> Result<PipelineHandle> {
        let (vertex, pixel) = compile_builtin(self.assets.compiler, shader)?;
        self.builder.pipeline(&PipelineDescriptor {
            label: shader.name().to_string(),
            vertex,
            pixel,
            layout,
            topology,
            raster: RasterState::default(),
            bindings,
        })
    }

    /// 配置的清屏颜色，未配置时使用 `fallback`
    pub fn clear_color_or(&self, fallback: Color) -> Color {
        self.config.clear_color.map(Color::from_array).unwrap_or(fallback)
    }
}

/// 场景接口
pub trait Scene {
    fn name(&self) -> &'static str;

    /// 创建场景的全部资源，任何一步失败都返回错误
    fn create<D: Device + ?Sized>(setup: &mut SceneSetup<'_, D>) -> Result<Self>
    where
        Self: Sized;

    fn clear_color(&self) -> Color;

    /// 本帧需要清除的深度目标与清除值
    fn depth_target(&self) -> Option<(DepthStencilView, f32)> {
        None
    }

    /// 记录一帧的绑定与绘制
    fn record<D: Device + ?Sized>(&mut self, frame: &mut Frame<'_, D>, target: &RenderTargetView) -> Result<()>;
}

/// 按配置选择的场景
#[derive(Debug)]
pub enum DemoScene {
    Clear(ClearScene),
    Triangle(TriangleScene),
    Quad(TexturedQuadScene),
    Cubes(CubesScene),
}

impl Scene for DemoScene {
    fn name(&self) -> &'static str {
        match self {
            DemoScene::Clear(s) => s.name(),
            DemoScene::Triangle(s) => s.name(),
            DemoScene::Quad(s) => s.name(),
            DemoScene::Cubes(s) => s.name(),
        }
    }

    fn create<D: Device + ?Sized>(setup: &mut SceneSetup<'_, D>) -> Result<Self> {
        let scene = match setup.config.kind {
            SceneKind::Clear => DemoScene::Clear(ClearScene::create(setup)?),
            SceneKind::Triangle => DemoScene::Triangle(TriangleScene::create(setup)?),
            SceneKind::Quad => DemoScene::Quad(TexturedQuadScene::create(setup)?),
            SceneKind::Cubes => DemoScene::Cubes(CubesScene::create(setup)?),
        };
        info!(scene = scene.name(), "Scene resources created");
        Ok(scene)
    }

    fn clear_color(&self) -> Color {
        match self {
            DemoScene::Clear(s) => s.clear_color(),
            DemoScene::Triangle(s) => s.clear_color(),
            DemoScene::Quad(s) => s.clear_color(),
            DemoScene::Cubes(s) => s.clear_color(),
        }
    }

    fn depth_target(&self) -> Option<(DepthStencilView, f32)> {
        match self {
            DemoScene::Clear(s) => s.depth_target(),
            DemoScene::Triangle(s) => s.depth_target(),
            DemoScene::Quad(s) => s.depth_target(),
            DemoScene::Cubes(s) => s.depth_target(),
        }
    }

    fn record<D: Device + ?Sized>(&mut self, frame: &mut Frame<'_, D>, target: &RenderTargetView) -> Result<()> {
        match self {
            DemoScene::Clear(s) => s.record(frame, target),
            DemoScene::Triangle(s) => s.record(frame, target),
            DemoScene::Quad(s) => s.record(frame, target),
            DemoScene::Cubes(s) => s.record(frame, target),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 场景测试共用的夹具

    use std::path::Path;

    use super::*;
    use crate::core::error::AssetError;
    use crate::gfx::software::SoftwareDevice;
    use crate::renderer::command::{FrameStats, FrameTargets, ImmediateContext};
    use crate::renderer::image::DecodedImage;
    use crate::renderer::shaders::WgslCompiler;
    use crate::renderer::swapchain::{PresentInterval, PresentationChain, SwapChainDescriptor};
    use crate::renderer::tracker::ResourceTracker;

    pub const EXTENT: Extent2d = Extent2d::new(64, 48);

    /// 4x4 的棋盘格，左上角为白色
    pub struct CheckerDecoder;

    impl ImageDecoder for CheckerDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedImage> {
            if path.as_os_str().is_empty() {
                return Err(AssetError::FileNotFound(path.to_path_buf()).into());
            }
            let pixels = (0..16u32)
                .flat_map(|i| {
                    let white = (i % 4 + i / 4) % 2 == 0;
                    if white { [255, 255, 255, 255] } else { [0, 0, 0, 255] }
                })
                .collect();
            DecodedImage::from_rgba8(pixels, 4, 4)
        }
    }

    pub struct Harness<S> {
        pub device: SoftwareDevice,
        pub tracker: ResourceTracker,
        pub chain: PresentationChain,
        pub ctx: ImmediateContext,
        pub scene: S,
    }

    impl<S: Scene> Harness<S> {
        pub fn new(config: &SceneConfig) -> Result<Self> {
            let mut device = SoftwareDevice::new(EXTENT);
            let mut tracker = ResourceTracker::new();
            let chain = PresentationChain::create(
                &mut device,
                &mut tracker,
                &SwapChainDescriptor::new(EXTENT, 2, PresentInterval::VSync),
            )?;

            let compiler = WgslCompiler::new();
            let scene = {
                let mut setup = SceneSetup {
                    builder: ResourceBuilder::new(&mut device, &mut tracker),
                    assets: SceneAssets {
                        compiler: &compiler,
                        images: &CheckerDecoder,
                    },
                    extent: EXTENT,
                    config,
                };
                S::create(&mut setup)?
            };

            Ok(Self {
                device,
                tracker,
                chain,
                ctx: ImmediateContext::new(),
                scene,
            })
        }

        pub fn frame(&mut self) -> Result<FrameStats> {
            let target = self.chain.acquire_current_target(&mut self.device)?;
            let mut targets = FrameTargets::new(target, self.scene.clear_color());
            if let Some((view, depth)) = self.scene.depth_target() {
                targets = targets.with_depth(view, depth);
            }
            let mut frame = self.ctx.begin_frame(&mut self.device, &mut self.chain, targets)?;
            self.scene.record(&mut frame, &target)?;
            frame.present(PresentInterval::VSync)
        }

        pub fn finish(mut self) {
            self.ctx.clear_state();
            self.tracker.release_all(&mut self.device).unwrap();
            assert_eq!(self.device.live_objects(), 0);
        }
    }

    pub fn config(kind: SceneKind) -> SceneConfig {
        SceneConfig {
            kind,
            ..SceneConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{config, Harness};
    use super::*;

    #[test]
    fn test_every_kind_creates_and_presents() {
        for kind in [SceneKind::Clear, SceneKind::Triangle, SceneKind::Quad, SceneKind::Cubes] {
            let mut harness = Harness::<DemoScene>::new(&config(kind)).unwrap();
            let stats = harness.frame().unwrap();
            assert_eq!(stats.frame_index, 0);
            harness.finish();
        }
    }

    #[test]
    fn test_configured_clear_color_wins() {
        let mut scene = config(SceneKind::Triangle);
        scene.clear_color = Some([0.0, 0.0, 1.0, 1.0]);
        let harness = Harness::<DemoScene>::new(&scene).unwrap();
        assert_eq!(harness.scene.clear_color(), Color::BLUE);
        harness.finish();
    }
}
