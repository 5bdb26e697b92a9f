//! render_scratch - 图形设备资源生命周期演示程序
//!
//! 创建设备和交换链，按场景配置创建资源，逐帧清屏、绘制、呈现，
//! 窗口关闭（或软件后端帧数用完）后逆序释放全部对象。
//!
//! # 使用方法
//!
//! ```bash
//! # wgpu 后端，打开窗口
//! cargo run -- --scene cubes
//!
//! # 软件后端，无窗口渲染 10 帧
//! cargo run -- --software --frames 10 --scene quad
//! ```
//!
//! # 架构概览
//!
//! ```text
//! ┌─────────────┐
//! │   main.rs   │  配置、日志、选择后端
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │  Renderer   │  呈现链 + 场景 + 每帧状态机
//! └──────┬──────┘
//!        │ Device trait
//!   ┌────┴─────┐
//!   │          │
//! ┌─▼──┐  ┌────▼────┐
//! │wgpu│  │software │
//! └────┘  └─────────┘
//! ```
//!
//! 启动失败时以最后一个失败调用所属类别的退出码结束进程。

use anyhow::Context;
use tracing::{error, info};

use render_scratch::core::config::{Config, GraphicsBackend};
use render_scratch::core::error::RenderError;
use render_scratch::core::log;
use render_scratch::core::scene::SceneConfig;
use render_scratch::gfx::{SoftwareDevice, WgpuContext, WgpuDevice, WinitSurface};
use render_scratch::renderer::device::Device;
use render_scratch::renderer::image::FileImageDecoder;
use render_scratch::renderer::resource::Extent2d;
use render_scratch::renderer::shaders::WgslCompiler;
use render_scratch::renderer::surface::{HeadlessSurface, SurfaceProvider};
use render_scratch::renderer::Renderer;
use render_scratch::scene::SceneAssets;

fn main() {
    if let Err(e) = run() {
        let code = e.downcast_ref::<RenderError>().map_or(1, RenderError::exit_code);
        error!(code, "{:#}", e);
        eprintln!("render_scratch: {:#}", e);
        std::process::exit(code);
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // 1. 运行配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml").context("loading config.toml")?;
    config.apply_args(&args)?;
    config.validate()?;

    // 2. 日志
    let log_file = config
        .logging
        .file_output
        .then(|| config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!(version = env!("CARGO_PKG_VERSION"), "render_scratch starting...");

    // 3. 场景配置
    let mut scene = SceneConfig::from_file_or_default("scene.toml").context("loading scene.toml")?;
    scene.apply_args(&args)?;
    scene.validate()?;

    info!(
        backend = config.graphics.backend.name(),
        width = config.window.width,
        height = config.window.height,
        vsync = config.graphics.vsync,
        scene = ?scene.kind,
        "Configuration loaded"
    );

    let compiler = WgslCompiler::new();
    let images = FileImageDecoder::new();
    let assets = SceneAssets {
        compiler: &compiler,
        images: &images,
    };

    // 4. 选择后端并运行
    match config.graphics.backend {
        GraphicsBackend::Wgpu => {
            let mut surface = WinitSurface::new(&config.window)?;
            let context = WgpuContext::new(surface.window(), &config)?;
            render(WgpuDevice::new(context), &mut surface, &config, &scene, assets)
        }
        GraphicsBackend::Software => {
            let extent = Extent2d::new(config.window.width, config.window.height);
            let mut surface = HeadlessSurface::new(extent, None);
            let device = SoftwareDevice::with_debug(extent, config.graphics.debug);
            render(device, &mut surface, &config, &scene, assets)
        }
    }
}

fn render<D: Device>(
    device: D,
    surface: &mut dyn SurfaceProvider,
    config: &Config,
    scene: &SceneConfig,
    assets: SceneAssets<'_>,
) -> anyhow::Result<()> {
    let mut renderer = Renderer::new(device, surface, config, scene, assets)?;

    let result = renderer.run(surface);
    // 无论主循环是否出错都先释放资源
    renderer.shutdown()?;
    let frames = result?;

    info!(frames, "render_scratch finished");
    Ok(())
}
