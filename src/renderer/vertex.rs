//! 顶点数据定义
//!
//! 本模块定义了演示场景使用的顶点结构体及其输入布局，以及内置的几何数据。
//!
//! # 设计说明
//!
//! - 使用 `#[repr(C)]` 确保内存布局与着色器输入一致
//! - 实现 `Pod` 和 `Zeroable` trait 以支持零拷贝上传
//! - 每种顶点都提供与之匹配的 `InputLayout`

use bytemuck::{Pod, Zeroable};

use crate::core::math::{Color, Vector2, Vector3};
use crate::renderer::pipeline::{InputLayout, VertexFormat, POSITION_SEMANTIC};

/// 顶点着色的二维顶点
///
/// # 内存布局
///
/// - `position`：前 8 字节（2 个 f32）
/// - `color`：后 12 字节（3 个 f32）
///
/// 总大小：20 字节
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    /// 顶点位置（2D 坐标）
    pub position: [f32; 2],
    /// 顶点颜色（RGB，范围 0.0-1.0）
    pub color: [f32; 3],
}

impl ColorVertex {
    /// 从数学库的 Vector 类型创建顶点
    pub fn from_vectors(position: Vector2, color: Vector3) -> Self {
        Self {
            position: [position.x, position.y],
            color: [color.x, color.y, color.z],
        }
    }

    /// 输入布局：POSITION (float2) + COLOR (float3)
    pub fn layout() -> InputLayout {
        InputLayout::new()
            .append(POSITION_SEMANTIC, VertexFormat::Float32x2)
            .append("COLOR", VertexFormat::Float32x3)
    }
}

/// 带纹理坐标的二维顶点
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 2],
    /// 纹理坐标，(0, 0) 为图像左上角
    pub uv: [f32; 2],
}

impl TexturedVertex {
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y],
            uv: [u, v],
        }
    }

    /// 输入布局：POSITION (float2) + TEXCOORD (float2)
    pub fn layout() -> InputLayout {
        InputLayout::new()
            .append(POSITION_SEMANTIC, VertexFormat::Float32x2)
            .append("TEXCOORD", VertexFormat::Float32x2)
    }
}

/// 只有位置的三维顶点
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PositionVertex {
    pub position: [f32; 3],
}

impl PositionVertex {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { position: [x, y, z] }
    }

    /// 输入布局：POSITION (float3)
    pub fn layout() -> InputLayout {
        InputLayout::new().append(POSITION_SEMANTIC, VertexFormat::Float32x3)
    }
}

/// 创建默认的彩色三角形顶点数据
///
/// - 顶点 1：顶部中心 (0.0, 0.5)，红色
/// - 顶点 2：右下角 (0.5, -0.5)，绿色
/// - 顶点 3：左下角 (-0.5, -0.5)，蓝色
///
/// 顶点按顺时针排列。
pub fn create_default_triangle() -> [ColorVertex; 3] {
    [
        ColorVertex::from_vectors(Vector2::new(0.0, 0.5), Vector3::new(1.0, 0.0, 0.0)),
        ColorVertex::from_vectors(Vector2::new(0.5, -0.5), Vector3::new(0.0, 1.0, 0.0)),
        ColorVertex::from_vectors(Vector2::new(-0.5, -0.5), Vector3::new(0.0, 0.0, 1.0)),
    ]
}

/// 单位四边形：左上、右上、右下、左下
pub const QUAD_VERTICES: [TexturedVertex; 4] = [
    TexturedVertex::new(-0.5, 0.5, 0.0, 0.0),
    TexturedVertex::new(0.5, 0.5, 1.0, 0.0),
    TexturedVertex::new(0.5, -0.5, 1.0, 1.0),
    TexturedVertex::new(-0.5, -0.5, 0.0, 1.0),
];

/// 四边形索引（顺时针）
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// 立方体的 8 个角点，边长 2，中心在原点
pub const CUBE_VERTICES: [PositionVertex; 8] = [
    PositionVertex::new(-1.0, -1.0, -1.0),
    PositionVertex::new(1.0, -1.0, -1.0),
    PositionVertex::new(-1.0, 1.0, -1.0),
    PositionVertex::new(1.0, 1.0, -1.0),
    PositionVertex::new(-1.0, -1.0, 1.0),
    PositionVertex::new(1.0, -1.0, 1.0),
    PositionVertex::new(-1.0, 1.0, 1.0),
    PositionVertex::new(1.0, 1.0, 1.0),
];

/// 立方体索引（顺时针），每两个三角形一个面
///
/// 面的顺序：-Z、+X、+Z、-X、+Y、-Y，与 `FACE_COLORS` 一一对应。
#[rustfmt::skip]
pub const CUBE_INDICES: [u32; 36] = [
    0, 2, 3,  0, 3, 1,
    1, 3, 7,  1, 7, 5,
    5, 7, 6,  5, 6, 4,
    4, 6, 2,  4, 2, 0,
    2, 6, 7,  2, 7, 3,
    0, 1, 5,  0, 5, 4,
];

/// 立方体六个面的颜色
pub const FACE_COLORS: [Color; 6] = [
    Color::RED,
    Color::GREEN,
    Color::BLUE,
    Color::YELLOW,
    Color::CYAN,
    Color::MAGENTA,
];

/// 面颜色常量缓冲的内容（6 个 float4，96 字节）
pub fn face_palette() -> [[f32; 4]; 6] {
    FACE_COLORS.map(|c| c.to_array())
}
