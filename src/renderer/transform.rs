//! 投影与物体变换
//!
//! 物体的模型矩阵依次绕 X、Y、Z 轴旋转同一角度，再平移到观察空间；
//! 与左手透视投影相乘后按列主序写入顶点着色器的常量缓冲。
//!
//! 动画角度每帧按固定步长累加，与实际帧时间无关。

use bytemuck::{Pod, Zeroable};

use crate::core::math::{matrix, Matrix4, Vector3, Vector4};
use crate::core::scene::{AnimationConfig, ProjectionConfig};
use crate::renderer::pipeline::Viewport;
use crate::renderer::resource::Extent2d;

/// 透视投影参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// 垂直视场角（弧度）
    pub fov_y: f32,
    /// 宽高比（宽 / 高）
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self { fov_y, aspect, near, far }
    }

    /// 按场景配置和视口尺寸构建
    pub fn from_config(config: &ProjectionConfig, extent: Extent2d) -> Self {
        Self::new(config.fov_radians(), extent.aspect_ratio(), config.near, config.far)
    }

    /// 左手透视矩阵，深度范围 0..1
    pub fn matrix(&self) -> Matrix4 {
        matrix::perspective_fov_lh(self.fov_y, self.aspect, self.near, self.far)
    }
}

/// 模型矩阵：先绕 X、Y、Z 依次旋转 `angle`，再平移
pub fn model_matrix(angle: f32, translation: Vector3) -> Matrix4 {
    matrix::translation(translation.x, translation.y, translation.z)
        * matrix::rotation_z(angle)
        * matrix::rotation_y(angle)
        * matrix::rotation_x(angle)
}

/// 顶点着色器的变换常量（64 字节）
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    /// 列主序的 model-view-projection 矩阵
    pub mvp: [f32; 16],
}

impl ObjectConstants {
    pub fn new(mvp: &Matrix4) -> Self {
        Self {
            mvp: matrix::to_column_major(mvp),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// 着色器使用的组合变换：P · M
pub fn object_transform(model: &Matrix4, projection: &Projection) -> ObjectConstants {
    ObjectConstants::new(&(projection.matrix() * model))
}

/// 固定步长的角度累加器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleAccumulator {
    angle: f32,
    step: f32,
}

impl AngleAccumulator {
    pub fn new(step: f32) -> Self {
        Self { angle: 0.0, step }
    }

    /// 前进一帧并返回新的角度
    pub fn advance(&mut self) -> f32 {
        self.angle += self.step;
        self.angle
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn step(&self) -> f32 {
        self.step
    }
}

/// 绕自身中心旋转的物体
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinningObject {
    pub translation: Vector3,
    /// 相对基准角度的倍率
    pub rate: f32,
}

impl SpinningObject {
    pub fn new(translation: Vector3, rate: f32) -> Self {
        Self { translation, rate }
    }

    /// 按动画配置生成所有物体
    pub fn from_animation(config: &AnimationConfig) -> Vec<Self> {
        let [x, y, z] = config.translation;
        config
            .cube_rates
            .iter()
            .map(|&rate| Self::new(Vector3::new(x, y, z), rate))
            .collect()
    }

    pub fn model(&self, base_angle: f32) -> Matrix4 {
        model_matrix(base_angle * self.rate, self.translation)
    }

    pub fn constants(&self, base_angle: f32, projection: &Projection) -> ObjectConstants {
        object_transform(&self.model(base_angle), projection)
    }
}

/// 点经过列主序矩阵变换后的裁剪空间坐标
pub fn transform_point(mvp: &[f32; 16], position: Vector3) -> Vector4 {
    matrix::from_column_major(mvp) * Vector4::new(position.x, position.y, position.z, 1.0)
}

/// 裁剪空间到屏幕空间（透视除法 + 视口映射）
///
/// `w` 不为正的点位于观察者身后，返回 `None`。
pub fn clip_to_screen(clip: Vector4, viewport: &Viewport) -> Option<Vector3> {
    if clip.w <= f32::EPSILON {
        return None;
    }
    let ndc = Vector3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w);
    Some(viewport.to_screen(ndc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::constants::DEG_TO_RAD;

    fn projection() -> Projection {
        Projection::new(60.0 * DEG_TO_RAD, 640.0 / 480.0, 0.1, 100.0)
    }

    #[test]
    fn test_origin_at_depth_projects_to_viewport_center() {
        let viewport = Viewport::full(Extent2d::new(640, 480));
        let constants = object_transform(&model_matrix(0.0, Vector3::new(0.0, 0.0, 5.0)), &projection());

        let clip = transform_point(&constants.mvp, Vector3::zeros());
        let screen = clip_to_screen(clip, &viewport).unwrap();
        assert!((screen.x - 320.0).abs() < 1e-3);
        assert!((screen.y - 240.0).abs() < 1e-3);
        assert!(screen.z > 0.0 && screen.z < 1.0);
    }

    #[test]
    fn test_sixty_steps_reach_one_radian() {
        let mut angle = AngleAccumulator::new(1.0 / 60.0);
        for _ in 0..60 {
            angle.advance();
        }
        assert!((angle.angle() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_rotation_order_is_x_then_y_then_z() {
        let angle = 0.3;
        let model = model_matrix(angle, Vector3::zeros());
        let expected = matrix::rotation_z(angle) * matrix::rotation_y(angle) * matrix::rotation_x(angle);
        assert!((model - expected).abs().max() < 1e-6);

        // +Y 绕 X 轴转 90° 到 +Z
        let quarter = matrix::rotation_x(std::f32::consts::FRAC_PI_2) * Vector4::new(0.0, 1.0, 0.0, 0.0);
        assert!((quarter.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_half_rate_object_lags() {
        let objects = SpinningObject::from_animation(&AnimationConfig::default());
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].model(2.0), model_matrix(1.0, objects[1].translation));
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 64);
    }

    #[test]
    fn test_point_behind_viewer_is_rejected() {
        let viewport = Viewport::full(Extent2d::new(640, 480));
        let constants = object_transform(&Matrix4::identity(), &projection());
        let clip = transform_point(&constants.mvp, Vector3::new(0.0, 0.0, -1.0));
        assert!(clip_to_screen(clip, &viewport).is_none());
    }
}
