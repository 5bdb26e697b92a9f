//! 场景配置模块
//!
//! 定义演示场景的选择与参数：场景类型、清屏颜色、纹理路径、动画步进和投影参数。
//!
//! # 配置文件格式 (scene.toml)
//!
//! ```toml
//! kind = "cubes"            # clear, triangle, quad, cubes
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//!
//! [texture]
//! path = "assets/uv_grid.png"
//!
//! [animation]
//! angle_step = 0.016666668
//! cube_rates = [1.0, 0.5]
//! translation = [0.0, 0.0, 5.0]
//!
//! [projection]
//! fov = 60.0
//! near = 0.1
//! far = 100.0
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::parse_flag_value;
use crate::core::error::{ConfigError, RenderError, Result};

/// 演示场景类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    /// 只清屏
    Clear,
    /// 顶点着色三角形
    Triangle,
    /// 纹理四边形
    Quad,
    /// 两个旋转的深度测试立方体
    Cubes,
}

impl std::str::FromStr for SceneKind {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "clear" => Ok(SceneKind::Clear),
            "triangle" => Ok(SceneKind::Triangle),
            "quad" => Ok(SceneKind::Quad),
            "cubes" => Ok(SceneKind::Cubes),
            other => Err(ConfigError::InvalidValue {
                field: "scene.kind".to_string(),
                reason: format!("unknown scene '{}'", other),
            }
            .into()),
        }
    }
}

/// 纹理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureConfig {
    /// 纹理图像路径
    #[serde(default = "default_texture_path")]
    pub path: PathBuf,
}

/// 动画配置
///
/// 旋转角每帧增加固定的 `angle_step`，与实际帧间隔无关。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// 每帧角度增量（弧度）
    #[serde(default = "default_angle_step")]
    pub angle_step: f32,

    /// 每个立方体相对基础角度的倍率
    #[serde(default = "default_cube_rates")]
    pub cube_rates: Vec<f32>,

    /// 立方体的平移
    #[serde(default = "default_translation")]
    pub translation: [f32; 3],
}

/// 投影配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// 垂直视野角度（度数）
    #[serde(default = "default_fov")]
    pub fov: f32,

    /// 近裁剪面距离
    #[serde(default = "default_near")]
    pub near: f32,

    /// 远裁剪面距离
    #[serde(default = "default_far")]
    pub far: f32,
}

fn default_kind() -> SceneKind { SceneKind::Cubes }
fn default_texture_path() -> PathBuf { PathBuf::from("assets/uv_grid.png") }
fn default_angle_step() -> f32 { 1.0 / 60.0 }
fn default_cube_rates() -> Vec<f32> { vec![1.0, 0.5] }
fn default_translation() -> [f32; 3] { [0.0, 0.0, 5.0] }
fn default_fov() -> f32 { 60.0 }
fn default_near() -> f32 { 0.1 }
fn default_far() -> f32 { 100.0 }

impl Default for TextureConfig {
    fn default() -> Self {
        Self { path: default_texture_path() }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            angle_step: default_angle_step(),
            cube_rates: default_cube_rates(),
            translation: default_translation(),
        }
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            fov: default_fov(),
            near: default_near(),
            far: default_far(),
        }
    }
}

impl ProjectionConfig {
    /// 视野角度（弧度）
    pub fn fov_radians(&self) -> f32 {
        self.fov * crate::core::math::constants::DEG_TO_RAD
    }
}

/// 场景配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// 场景类型
    #[serde(default = "default_kind")]
    pub kind: SceneKind,

    /// 清屏颜色，省略时使用场景自己的默认值
    #[serde(default)]
    pub clear_color: Option<[f32; 4]>,

    /// 纹理配置
    #[serde(default)]
    pub texture: TextureConfig,

    /// 动画配置
    #[serde(default)]
    pub animation: AnimationConfig,

    /// 投影配置
    #[serde(default)]
    pub projection: ProjectionConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            clear_color: None,
            texture: TextureConfig::default(),
            animation: AnimationConfig::default(),
            projection: ProjectionConfig::default(),
        }
    }
}

impl SceneConfig {
    /// 从文件加载场景配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            RenderError::Config(ConfigError::FileNotFound(format!(
                "Failed to read scene config file '{}': {}",
                path.display(),
                e
            )))
        })?;

        toml::from_str(&contents).map_err(|e| {
            RenderError::Config(ConfigError::ParseError(format!(
                "Failed to parse scene config: {}",
                e
            )))
        })
    }

    /// 从文件加载，如果文件不存在则返回默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::from_file(path)?;
            tracing::info!("Loaded scene config from: {}", path.display());
            Ok(config)
        } else {
            tracing::info!("Scene config not found, using defaults");
            Ok(Self::default())
        }
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self).map_err(|e| {
            RenderError::Config(ConfigError::ParseError(format!(
                "Failed to serialize scene config: {}",
                e
            )))
        })?;

        fs::write(path, contents)?;

        tracing::info!("Saved scene config to: {}", path.display());
        Ok(())
    }

    /// 从命令行参数覆盖场景选择
    ///
    /// - `--scene <kind>`: 选择场景
    /// - `--texture <path>`: 纹理图像路径
    pub fn apply_args<I>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if let Some(kind) = parse_flag_value::<SceneKind>(&args, "--scene")? {
            self.kind = kind;
        }

        if let Some(path) = parse_flag_value::<PathBuf>(&args, "--texture")? {
            self.texture.path = path;
        }

        Ok(())
    }

    /// 验证场景参数
    pub fn validate(&self) -> Result<()> {
        let projection = &self.projection;
        if !(projection.fov > 0.0 && projection.fov < 180.0) {
            return Err(ConfigError::InvalidValue {
                field: "projection.fov".to_string(),
                reason: "Field of view must be within (0, 180) degrees".to_string(),
            }
            .into());
        }

        if !(projection.near > 0.0 && projection.far > projection.near) {
            return Err(ConfigError::InvalidValue {
                field: "projection.near/far".to_string(),
                reason: "Clip planes must satisfy 0 < near < far".to_string(),
            }
            .into());
        }

        if self.kind == SceneKind::Cubes && self.animation.cube_rates.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "animation.cube_rates".to_string(),
                reason: "At least one cube is required".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scene() {
        let scene = SceneConfig::default();
        assert_eq!(scene.kind, SceneKind::Cubes);
        assert_eq!(scene.projection.fov, 60.0);
        assert_eq!(scene.projection.near, 0.1);
        assert_eq!(scene.projection.far, 100.0);
        assert_eq!(scene.animation.cube_rates, vec![1.0, 0.5]);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn test_scene_args_override() {
        let mut scene = SceneConfig::default();
        scene
            .apply_args(["--scene", "quad", "--texture", "data/uv_grid.jpg"])
            .unwrap();
        assert_eq!(scene.kind, SceneKind::Quad);
        assert_eq!(scene.texture.path, PathBuf::from("data/uv_grid.jpg"));

        assert!(scene.apply_args(["--scene", "teapot"]).is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let scene: SceneConfig = toml::from_str(
            "kind = \"triangle\"\nclear_color = [0.1, 0.2, 0.3, 1.0]\n[projection]\nfov = 45.0\n",
        )
        .unwrap();
        assert_eq!(scene.kind, SceneKind::Triangle);
        assert_eq!(scene.clear_color, Some([0.1, 0.2, 0.3, 1.0]));
        assert_eq!(scene.projection.fov, 45.0);
        assert_eq!(scene.projection.far, 100.0);
    }

    #[test]
    fn test_invalid_clip_planes_rejected() {
        let mut scene = SceneConfig::default();
        scene.projection.near = 10.0;
        scene.projection.far = 1.0;
        assert!(scene.validate().is_err());
    }
}
