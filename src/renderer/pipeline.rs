//! 管线状态模块
//!
//! 描述一个不可变的图形管线：编译后的顶点/像素着色器、输入布局、图元拓扑、
//! 光栅化状态，以及管线声明的资源槽位（常量缓冲、纹理、采样器）。
//!
//! 管线一旦创建就不再修改；每帧只是重新绑定。

use std::sync::Arc;

use crate::core::error::{GraphicsError, Result};
use crate::core::math::Vector3;
use crate::renderer::resource::{Extent2d, ResourceId, CONSTANT_BUFFER_GRANULARITY};

/// 着色器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderStage {
    /// 顶点着色器
    Vertex,
    /// 像素（片段）着色器
    Pixel,
}

/// 编译后的着色器
///
/// 通常由 `CompiledShader::from_output` 从编译结果得到。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub bytecode: Arc<[u8]>,
}

/// 顶点属性格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    /// 字节大小
    pub fn size(&self) -> u32 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }

    /// 分量数
    pub fn components(&self) -> usize {
        (self.size() / 4) as usize
    }
}

/// 顶点属性
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// 语义名（POSITION、COLOR、TEXCOORD）
    pub semantic: &'static str,
    pub format: VertexFormat,
    /// 相对顶点起始的字节偏移
    pub offset: u32,
}

/// 位置属性的语义名
pub const POSITION_SEMANTIC: &str = "POSITION";

/// 输入布局
///
/// 每个属性按追加对齐方式紧跟在上一个属性之后。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct InputLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

impl InputLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加属性，偏移紧随上一个属性
    pub fn append(mut self, semantic: &'static str, format: VertexFormat) -> Self {
        let offset = self.stride;
        self.attributes.push(VertexAttribute { semantic, format, offset });
        self.stride += format.size();
        self
    }

    /// 位置属性
    pub fn position(&self) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.semantic == POSITION_SEMANTIC)
    }
}

/// 图元拓扑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

/// 索引格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    /// 每个索引的字节数
    pub fn size(&self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// 深度比较函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    LessEqual,
    Equal,
    Greater,
    GreaterEqual,
    NotEqual,
    Always,
}

impl CompareFunction {
    /// 对新值 `incoming` 与已存值 `stored` 做比较
    pub fn passes(&self, incoming: f32, stored: f32) -> bool {
        match self {
            CompareFunction::Never => false,
            CompareFunction::Less => incoming < stored,
            CompareFunction::LessEqual => incoming <= stored,
            CompareFunction::Equal => incoming == stored,
            CompareFunction::Greater => incoming > stored,
            CompareFunction::GreaterEqual => incoming >= stored,
            CompareFunction::NotEqual => incoming != stored,
            CompareFunction::Always => true,
        }
    }
}

/// 深度模板状态描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDescriptor {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthStencilDescriptor {
    /// 深度测试开启，写入全部，LESS
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write: true,
            compare: CompareFunction::Less,
        }
    }
}

/// 深度模板状态句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilStateHandle {
    pub id: ResourceId,
    pub desc: DepthStencilDescriptor,
}

/// 剔除模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// 正面朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

/// 光栅化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub cull: CullMode,
    pub front_face: FrontFace,
}

impl Default for RasterState {
    /// 背面剔除，顺时针为正面
    fn default() -> Self {
        Self {
            cull: CullMode::Back,
            front_face: FrontFace::Clockwise,
        }
    }
}

/// 管线声明的资源槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceBinding {
    /// 常量缓冲，`size` 为着色器期望的最小字节数
    ConstantBuffer { stage: ShaderStage, slot: u32, size: u64 },
    /// 像素着色器纹理
    Texture { slot: u32 },
    /// 像素着色器采样器
    Sampler { slot: u32 },
}

/// 管线描述
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub label: String,
    pub vertex: CompiledShader,
    pub pixel: CompiledShader,
    pub layout: InputLayout,
    pub topology: PrimitiveTopology,
    pub raster: RasterState,
    pub bindings: Vec<ResourceBinding>,
}

impl PipelineDescriptor {
    /// 校验描述
    pub fn validate(&self) -> Result<()> {
        let what = || format!("pipeline '{}'", self.label);

        if self.vertex.stage != ShaderStage::Vertex || self.pixel.stage != ShaderStage::Pixel {
            return Err(GraphicsError::creation(what(), "shader stages are swapped").into());
        }

        if self.layout.attributes.is_empty() || self.layout.stride == 0 {
            return Err(GraphicsError::creation(what(), "input layout is empty").into());
        }

        if self.layout.position().is_none() {
            return Err(GraphicsError::creation(what(), "input layout has no POSITION attribute").into());
        }

        for attribute in &self.layout.attributes {
            if attribute.offset + attribute.format.size() > self.layout.stride {
                return Err(GraphicsError::creation(
                    what(),
                    format!("attribute {} overruns the vertex stride", attribute.semantic),
                )
                .into());
            }
        }

        for (i, binding) in self.bindings.iter().enumerate() {
            if self.bindings[..i].iter().any(|other| other.same_slot(binding)) {
                return Err(GraphicsError::creation(
                    what(),
                    format!("slot declared twice: {:?}", binding),
                )
                .into());
            }

            if let ResourceBinding::ConstantBuffer { size, .. } = binding {
                if *size == 0 || size % CONSTANT_BUFFER_GRANULARITY != 0 {
                    return Err(GraphicsError::creation(
                        what(),
                        format!("constant buffer size {} is not a multiple of 16", size),
                    )
                    .into());
                }
            }
        }

        Ok(())
    }
}

impl ResourceBinding {
    fn same_slot(&self, other: &ResourceBinding) -> bool {
        match (self, other) {
            (
                ResourceBinding::ConstantBuffer { stage: a, slot: x, .. },
                ResourceBinding::ConstantBuffer { stage: b, slot: y, .. },
            ) => a == b && x == y,
            (ResourceBinding::Texture { slot: x }, ResourceBinding::Texture { slot: y }) => x == y,
            (ResourceBinding::Sampler { slot: x }, ResourceBinding::Sampler { slot: y }) => x == y,
            _ => false,
        }
    }
}

/// 创建后的管线信息，绑定校验时使用
#[derive(Debug)]
pub struct PipelineInfo {
    pub label: String,
    pub layout: InputLayout,
    pub topology: PrimitiveTopology,
    pub raster: RasterState,
    pub bindings: Vec<ResourceBinding>,
}

/// 管线句柄
///
/// 克隆只是增加引用计数，比较只看 id。
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    pub id: ResourceId,
    info: Arc<PipelineInfo>,
}

impl PipelineHandle {
    pub fn new(id: ResourceId, desc: &PipelineDescriptor) -> Self {
        Self {
            id,
            info: Arc::new(PipelineInfo {
                label: desc.label.clone(),
                layout: desc.layout.clone(),
                topology: desc.topology,
                raster: desc.raster,
                bindings: desc.bindings.clone(),
            }),
        }
    }

    pub fn info(&self) -> &PipelineInfo {
        &self.info
    }
}

impl PartialEq for PipelineHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PipelineHandle {}

/// 视口
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub top_left_x: f32,
    pub top_left_y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// 覆盖整个目标的视口，深度范围 0..1
    pub fn full(extent: Extent2d) -> Self {
        Self {
            top_left_x: 0.0,
            top_left_y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// 归一化设备坐标映射到屏幕坐标
    ///
    /// NDC 的 +Y 朝上，屏幕的 +Y 朝下。
    pub fn to_screen(&self, ndc: Vector3) -> Vector3 {
        Vector3::new(
            self.top_left_x + (ndc.x + 1.0) * 0.5 * self.width,
            self.top_left_y + (1.0 - ndc.y) * 0.5 * self.height,
            self.min_depth + ndc.z * (self.max_depth - self.min_depth),
        )
    }
}
