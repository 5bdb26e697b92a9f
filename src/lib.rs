//! render_scratch - 图形设备资源生命周期演示
//!
//! 本库演示一个即时模式图形设备上的完整资源生命周期：
//! 创建设备与交换链、按描述创建缓冲区/纹理/视图/管线、
//! 每帧清屏、绑定、更新动态缓冲、绘制、呈现，退出时逆序释放。
//!
//! # 模块结构
//!
//! - `core`：数学、日志、配置、场景配置、错误处理
//! - `renderer`：与后端无关的渲染核心（`Device` trait、资源、管线、帧状态机、呈现链）
//! - `gfx`：`Device` 的 wgpu 实现和软件实现
//! - `scene`：四个演示场景（清屏、三角形、纹理四边形、旋转立方体）
//!
//! # 使用示例
//!
//! ```no_run
//! use render_scratch::core::config::Config;
//! use render_scratch::core::scene::{SceneConfig, SceneKind};
//! use render_scratch::gfx::SoftwareDevice;
//! use render_scratch::renderer::image::FileImageDecoder;
//! use render_scratch::renderer::resource::Extent2d;
//! use render_scratch::renderer::shaders::WgslCompiler;
//! use render_scratch::renderer::surface::HeadlessSurface;
//! use render_scratch::renderer::Renderer;
//! use render_scratch::scene::SceneAssets;
//!
//! let extent = Extent2d::new(640, 480);
//! let mut surface = HeadlessSurface::new(extent, Some(3));
//! let scene = SceneConfig { kind: SceneKind::Triangle, ..SceneConfig::default() };
//! let assets = SceneAssets { compiler: &WgslCompiler::new(), images: &FileImageDecoder::new() };
//!
//! let mut renderer = Renderer::new(SoftwareDevice::new(extent), &surface, &Config::default(), &scene, assets)?;
//! renderer.run(&mut surface)?;
//! renderer.shutdown()?;
//! # Ok::<(), render_scratch::core::error::RenderError>(())
//! ```

pub mod core;
pub mod gfx;
pub mod renderer;
pub mod scene;
