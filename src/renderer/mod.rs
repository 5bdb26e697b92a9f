//! 渲染器模块
//!
//! 本模块提供了与后端无关的渲染核心，以及驱动它的 `Renderer`。
//! 应用程序只通过 `Device` trait 与底层图形 API（wgpu 或软件实现）交互，
//! 而不需要关心具体使用的是哪个后端。
//!
//! # 架构设计
//!
//! - `Renderer`：启动时创建呈现链和场景资源，每帧驱动即时上下文，退出时逆序释放
//! - `Device`：后端能力接口，底层实现在 `gfx` 模块中
//! - `ImmediateContext` / `Frame`：每帧的绑定、更新、绘制和呈现
//! - `ResourceTracker`：按创建顺序登记全部对象

use tracing::{debug, error, info, warn};

use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::scene::SceneConfig;
use crate::scene::{DemoScene, Scene, SceneAssets, SceneSetup};

pub mod command;
pub mod device;
pub mod image;
pub mod pipeline;
pub mod resource;
pub mod shaders;
pub mod state;
pub mod surface;
pub mod swapchain;
pub mod tracker;
pub mod transform;
pub mod vertex;

use command::{FrameStats, FrameTargets, ImmediateContext};
use device::Device;
use surface::SurfaceProvider;
use swapchain::{PresentInterval, PresentationChain, SwapChainDescriptor};
use tracker::{ResourceBuilder, ResourceTracker};

/// 渲染器
///
/// 持有设备、呈现链、即时上下文和当前场景。
/// `shutdown` 可以重复调用，`Drop` 时也会执行一次。
pub struct Renderer<D: Device> {
    device: D,
    tracker: ResourceTracker,
    chain: PresentationChain,
    ctx: ImmediateContext,
    scene: DemoScene,
    interval: PresentInterval,
    frame_budget: Option<u64>,
    shut_down: bool,
}

impl<D: Device> Renderer<D> {
    /// 创建渲染器
    ///
    /// 依次检查表面句柄、创建呈现链、创建场景资源。
    /// 任何一步失败时，已经创建的对象全部按逆序释放，然后返回错误。
    pub fn new(
        mut device: D,
        surface: &dyn SurfaceProvider,
        config: &Config,
        scene_config: &SceneConfig,
        assets: SceneAssets<'_>,
    ) -> Result<Self> {
        surface.surface_handle().ensure_available()?;
        let extent = surface.drawable_extent();

        info!(
            backend = %device.info().backend_name,
            adapter = %device.info().adapter_name,
            extent = %extent,
            "Initializing renderer"
        );

        let mut tracker = ResourceTracker::new();
        let desc = SwapChainDescriptor::new(extent, config.graphics.buffer_count, config.present_interval());

        let created = PresentationChain::create(&mut device, &mut tracker, &desc).and_then(|chain| {
            let mut setup = SceneSetup {
                builder: ResourceBuilder::new(&mut device, &mut tracker),
                assets,
                extent: chain.extent(),
                config: scene_config,
            };
            let scene = DemoScene::create(&mut setup)?;
            Ok((chain, scene))
        });

        let (chain, scene) = match created {
            Ok(parts) => parts,
            Err(e) => {
                error!(error = %e, created = tracker.len(), "Renderer initialization failed, releasing partial state");
                if let Err(release) = tracker.release_all(&mut device) {
                    warn!(error = %release, "Failed to release partially created resources");
                }
                return Err(e);
            }
        };

        info!(scene = scene.name(), objects = tracker.len(), "Renderer initialized");

        Ok(Self {
            device,
            tracker,
            chain,
            ctx: ImmediateContext::new(),
            scene,
            interval: config.present_interval(),
            frame_budget: config.frame_budget(),
            shut_down: false,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn scene(&self) -> &DemoScene {
        &self.scene
    }

    pub fn chain(&self) -> &PresentationChain {
        &self.chain
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    /// 已呈现的帧数
    pub fn frames_presented(&self) -> u64 {
        self.ctx.frames_presented()
    }

    /// 渲染一帧：获取目标、清屏、场景记录、呈现
    pub fn render_frame(&mut self) -> Result<FrameStats> {
        let target = self.chain.acquire_current_target(&mut self.device)?;

        let mut targets = FrameTargets::new(target, self.scene.clear_color());
        if let Some((view, depth)) = self.scene.depth_target() {
            targets = targets.with_depth(view, depth);
        }

        let mut frame = self.ctx.begin_frame(&mut self.device, &mut self.chain, targets)?;
        self.scene.record(&mut frame, &target)?;
        frame.present(self.interval)
    }

    /// 主循环
    ///
    /// 每帧开始前轮询一次关闭请求，进行中的帧总是完整呈现后才会观察到关闭。
    /// 尺寸变化只记录日志，交换链保持创建时的尺寸。
    /// 返回本次运行呈现的帧数。
    pub fn run(&mut self, surface: &mut dyn SurfaceProvider) -> Result<u64> {
        let start = self.frames_presented();
        info!(budget = ?self.frame_budget, "Entering main loop");

        loop {
            if surface.poll_close_requested() {
                info!("Close requested, shutting down...");
                break;
            }

            if let Some(extent) = surface.poll_resize() {
                warn!(
                    requested = %extent,
                    current = %self.chain.extent(),
                    "Window resized, swap chain keeps its original size"
                );
            }

            if let Some(budget) = self.frame_budget {
                if self.frames_presented() >= budget {
                    info!(frames = budget, "Frame budget reached");
                    break;
                }
            }

            self.render_frame().map_err(|e| {
                error!(frame = self.frames_presented(), error = %e, "Frame failed");
                e
            })?;
        }

        Ok(self.frames_presented() - start)
    }

    /// 解除上下文绑定并逆序释放全部对象
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        debug!(objects = self.tracker.len(), "Releasing renderer resources");
        self.ctx.clear_state();
        self.tracker.release_all(&mut self.device)?;
        info!(frames = self.frames_presented(), "Renderer shut down");
        Ok(())
    }
}

impl<D: Device> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Renderer shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GraphicsBackend;
    use crate::core::scene::SceneKind;
    use crate::gfx::software::SoftwareDevice;
    use crate::renderer::resource::Extent2d;
    use crate::renderer::shaders::WgslCompiler;
    use crate::renderer::surface::{HeadlessSurface, SurfaceHandle};
    use crate::scene::testing::CheckerDecoder;

    const EXTENT: Extent2d = Extent2d::new(32, 32);

    fn software_config() -> Config {
        let mut config = Config::default();
        config.graphics.backend = GraphicsBackend::Software;
        config.window.width = EXTENT.width;
        config.window.height = EXTENT.height;
        config
    }

    fn renderer(kind: SceneKind, device: SoftwareDevice) -> Result<Renderer<SoftwareDevice>> {
        let compiler = WgslCompiler::new();
        let surface = HeadlessSurface::new(EXTENT, None);
        let scene = SceneConfig {
            kind,
            ..SceneConfig::default()
        };
        Renderer::new(
            device,
            &surface,
            &software_config(),
            &scene,
            SceneAssets {
                compiler: &compiler,
                images: &CheckerDecoder,
            },
        )
    }

    struct GoneSurface;

    impl SurfaceProvider for GoneSurface {
        fn surface_handle(&self) -> SurfaceHandle {
            SurfaceHandle::Unavailable
        }

        fn drawable_extent(&self) -> Extent2d {
            EXTENT
        }

        fn poll_close_requested(&mut self) -> bool {
            true
        }

        fn poll_resize(&mut self) -> Option<Extent2d> {
            None
        }
    }

    #[test]
    fn test_run_stops_when_surface_closes() {
        let mut renderer = renderer(SceneKind::Cubes, SoftwareDevice::new(EXTENT)).unwrap();
        let mut surface = HeadlessSurface::new(EXTENT, Some(4));
        surface.simulate_resize(Extent2d::new(64, 64));

        let frames = renderer.run(&mut surface).unwrap();
        assert_eq!(frames, 4);
        assert_eq!(renderer.device().presents().len(), 4);
        assert_eq!(renderer.device().draws().len(), 8);
        assert_eq!(renderer.chain().extent(), EXTENT);

        renderer.shutdown().unwrap();
        assert!(renderer.tracker().is_empty());
        assert_eq!(renderer.device().live_objects(), 0);
    }

    #[test]
    fn test_shutdown_releases_in_reverse_creation_order() {
        let mut renderer = renderer(SceneKind::Quad, SoftwareDevice::new(EXTENT)).unwrap();
        renderer.render_frame().unwrap();

        let created = renderer.device().created().to_vec();
        renderer.shutdown().unwrap();
        renderer.shutdown().unwrap();

        let mut expected = created;
        expected.reverse();
        assert_eq!(renderer.device().released(), expected.as_slice());
        // 交换链最先创建，最后释放
        assert_eq!(expected.last(), Some(&renderer.chain().id()));
    }

    #[test]
    fn test_failed_creation_releases_partial_state() {
        let mut device = SoftwareDevice::new(EXTENT);
        device.fail_next_creation("out of memory");
        let err = renderer(SceneKind::Triangle, device).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_unavailable_surface_is_rejected() {
        let compiler = WgslCompiler::new();
        let err = Renderer::new(
            SoftwareDevice::new(EXTENT),
            &GoneSurface,
            &software_config(),
            &SceneConfig::default(),
            SceneAssets {
                compiler: &compiler,
                images: &CheckerDecoder,
            },
        )
        .err()
        .unwrap();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_budget_limits_software_run() {
        let mut config = software_config();
        config.run.max_frames = Some(2);
        let compiler = WgslCompiler::new();
        let surface = HeadlessSurface::new(EXTENT, None);
        let mut renderer = Renderer::new(
            SoftwareDevice::new(EXTENT),
            &surface,
            &config,
            &SceneConfig::default(),
            SceneAssets {
                compiler: &compiler,
                images: &CheckerDecoder,
            },
        )
        .unwrap();

        let mut surface = surface;
        assert_eq!(renderer.run(&mut surface).unwrap(), 2);
        assert_eq!(renderer.frames_presented(), 2);
    }

    #[test]
    fn test_device_loss_ends_the_run() {
        let mut renderer = renderer(SceneKind::Clear, SoftwareDevice::new(EXTENT)).unwrap();
        renderer.render_frame().unwrap();
        renderer.device.lose_device("driver reset");

        let err = renderer.render_frame().unwrap_err();
        assert_eq!(err.exit_code(), 4);
        renderer.shutdown().unwrap();
    }
}
