//! 资源描述与句柄模块
//!
//! 定义缓冲区、纹理、采样器和视图的描述符与句柄类型，以及创建前的参数校验。
//!
//! # 设计原则
//!
//! - **句柄不拥有资源**：所有句柄都是 `Copy` 的轻量值，资源的生命周期由
//!   `ResourceTracker` 统一管理，按创建的逆序释放
//! - **视图不拥有资源**：视图只记录它所观察的资源 id，资源在仍有视图存活时不能释放
//! - **快速失败**：描述符校验失败立即返回 `CreationFailed`，不做任何部分创建

use std::fmt;

use crate::core::error::{GraphicsError, Result};

/// 常量缓冲区的上传对齐要求（字节）
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// 常量缓冲区大小必须是该值的倍数
pub const CONSTANT_BUFFER_GRANULARITY: u64 = 16;

/// 设备对象的不透明标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    /// 由原始值构造
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始值
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 单调递增的 id 分配器
///
/// 每个后端持有一个，id 从 1 开始，永不复用。
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    /// 分配下一个 id
    pub fn allocate(&mut self) -> ResourceId {
        let id = ResourceId(self.next);
        self.next += 1;
        id
    }
}

/// 缓冲区绑定类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferBind {
    /// 顶点缓冲区
    Vertex,
    /// 索引缓冲区
    Index,
    /// 常量缓冲区
    Constant,
}

/// 缓冲区使用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// 创建时写入，之后只读
    Immutable,
    /// CPU 每帧整块覆盖写入
    Dynamic,
}

/// 缓冲区描述信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// 缓冲区大小（字节）
    pub size: u64,
    /// 绑定类型
    pub bind: BufferBind,
    /// 使用方式
    pub usage: BufferUsage,
    /// 调试名称（可选）
    pub label: Option<String>,
}

impl BufferDescriptor {
    /// 创建新的缓冲区描述符
    pub fn new(size: u64, bind: BufferBind, usage: BufferUsage) -> Self {
        Self {
            size,
            bind,
            usage,
            label: None,
        }
    }

    /// 设置调试名称
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// 调试名称或占位
    pub fn label_or_default(&self) -> &str {
        self.label.as_deref().unwrap_or("unnamed buffer")
    }

    /// 计算上传时对齐后的大小
    pub fn aligned_size(&self) -> u64 {
        if self.bind == BufferBind::Constant {
            aligned_constant_size(self.size)
        } else {
            self.size
        }
    }

    /// 校验描述符与初始数据
    ///
    /// - 大小不能为 0
    /// - 常量缓冲区大小必须是 16 的倍数
    /// - 不可变缓冲区必须提供初始数据
    /// - 提供的初始数据必须与描述的大小完全一致
    pub fn validate(&self, initial: Option<&[u8]>) -> Result<()> {
        let what = || format!("buffer '{}'", self.label_or_default());

        if self.size == 0 {
            return Err(GraphicsError::creation(what(), "size must be greater than 0").into());
        }

        if self.bind == BufferBind::Constant && self.size % CONSTANT_BUFFER_GRANULARITY != 0 {
            return Err(GraphicsError::creation(
                what(),
                format!("constant buffer size {} is not a multiple of 16", self.size),
            )
            .into());
        }

        match (self.usage, initial) {
            (BufferUsage::Immutable, None) => {
                Err(GraphicsError::creation(what(), "immutable buffer requires initial data").into())
            }
            (_, Some(data)) if data.len() as u64 != self.size => Err(GraphicsError::creation(
                what(),
                format!("initial data is {} bytes, descriptor says {}", data.len(), self.size),
            )
            .into()),
            _ => Ok(()),
        }
    }
}

/// 计算常量缓冲区按 256 字节对齐后的大小
pub fn aligned_constant_size(size: u64) -> u64 {
    (size + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
}

/// 纹理格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// RGBA 8位无符号归一化
    Rgba8Unorm,
    /// BGRA 8位无符号归一化
    Bgra8Unorm,
    /// 深度 32位浮点
    Depth32Float,
}

impl TextureFormat {
    /// 每个像素的字节数
    pub fn bytes_per_pixel(&self) -> u32 {
        4
    }

    /// 是否为深度格式
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }
}

/// 纹理绑定类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureBind {
    /// 着色器采样
    ShaderResource,
    /// 颜色渲染目标
    RenderTarget,
    /// 深度模板目标
    DepthStencil,
}

/// 二维尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 宽高比
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// 像素数量
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Extent2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 二维纹理描述信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
    /// 纹理格式
    pub format: TextureFormat,
    /// Mip 等级数量（初始数据只覆盖第 0 级）
    pub mip_levels: u32,
    /// 采样数
    pub sample_count: u32,
    /// 绑定类型
    pub bind: TextureBind,
    /// 调试名称
    pub label: Option<String>,
}

impl TextureDescriptor {
    /// 可采样的 RGBA8 纹理
    pub fn shader_resource(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            mip_levels: 1,
            sample_count: 1,
            bind: TextureBind::ShaderResource,
            label: None,
        }
    }

    /// 深度目标纹理
    pub fn depth_stencil(extent: Extent2d, sample_count: u32) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
            format: TextureFormat::Depth32Float,
            mip_levels: 1,
            sample_count,
            bind: TextureBind::DepthStencil,
            label: None,
        }
    }

    /// 设置调试名称
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn extent(&self) -> Extent2d {
        Extent2d::new(self.width, self.height)
    }

    /// 调试名称或占位
    pub fn label_or_default(&self) -> &str {
        self.label.as_deref().unwrap_or("unnamed texture")
    }

    /// 校验描述符与初始数据
    pub fn validate(&self, initial: Option<&TextureData>, max_dimension: u32) -> Result<()> {
        let what = || format!("texture '{}'", self.label_or_default());

        if self.width == 0 || self.height == 0 {
            return Err(GraphicsError::creation(what(), "dimensions must be greater than 0").into());
        }

        if self.width > max_dimension || self.height > max_dimension {
            return Err(GraphicsError::creation(
                what(),
                format!("{} exceeds the device limit of {}", self.extent(), max_dimension),
            )
            .into());
        }

        if self.mip_levels == 0 {
            return Err(GraphicsError::creation(what(), "at least one mip level is required").into());
        }

        if !matches!(self.sample_count, 1 | 2 | 4 | 8) {
            return Err(GraphicsError::creation(
                what(),
                format!("unsupported sample count {}", self.sample_count),
            )
            .into());
        }

        let depth_bind = self.bind == TextureBind::DepthStencil;
        if depth_bind != self.format.is_depth() {
            return Err(GraphicsError::creation(
                what(),
                format!("format {:?} cannot be bound as {:?}", self.format, self.bind),
            )
            .into());
        }

        match (self.bind, initial) {
            (TextureBind::ShaderResource, None) => {
                Err(GraphicsError::creation(what(), "shader resource texture requires initial data").into())
            }
            (TextureBind::ShaderResource, Some(data)) => data.validate_for(self).map_err(|reason| {
                GraphicsError::creation(what(), reason).into()
            }),
            (_, Some(_)) => {
                Err(GraphicsError::creation(what(), "render and depth targets take no initial data").into())
            }
            (_, None) => Ok(()),
        }
    }
}

/// 纹理初始像素数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    /// 紧密按行排列的像素字节
    pub bytes: Vec<u8>,
    /// 每行字节数
    pub row_stride: u32,
}

impl TextureData {
    pub fn new(bytes: Vec<u8>, row_stride: u32) -> Self {
        Self { bytes, row_stride }
    }

    /// 读取指定像素（仅第 0 级）
    pub fn pixel(&self, x: u32, y: u32, bytes_per_pixel: u32) -> Option<&[u8]> {
        let start = (y * self.row_stride + x * bytes_per_pixel) as usize;
        self.bytes.get(start..start + bytes_per_pixel as usize)
    }

    fn validate_for(&self, desc: &TextureDescriptor) -> std::result::Result<(), String> {
        let min_stride = desc.width * desc.format.bytes_per_pixel();
        if self.row_stride < min_stride {
            return Err(format!("row stride {} is smaller than {}", self.row_stride, min_stride));
        }

        let expected = self.row_stride as usize * desc.height as usize;
        if self.bytes.len() != expected {
            return Err(format!(
                "initial data is {} bytes, expected {}",
                self.bytes.len(),
                expected
            ));
        }

        Ok(())
    }
}

/// 过滤模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Point,
    Linear,
}

/// 寻址模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Mirror,
}

/// 采样器描述信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDescriptor {
    pub filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
}

impl Default for SamplerDescriptor {
    /// 线性过滤 + 重复寻址
    fn default() -> Self {
        Self {
            filter: FilterMode::Linear,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
        }
    }
}

/// 缓冲区句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub id: ResourceId,
    pub size: u64,
    pub bind: BufferBind,
    pub usage: BufferUsage,
}

impl BufferHandle {
    pub fn new(id: ResourceId, desc: &BufferDescriptor) -> Self {
        Self {
            id,
            size: desc.size,
            bind: desc.bind,
            usage: desc.usage,
        }
    }
}

/// 纹理句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    pub id: ResourceId,
    pub extent: Extent2d,
    pub format: TextureFormat,
    pub sample_count: u32,
    pub bind: TextureBind,
}

impl TextureHandle {
    pub fn new(id: ResourceId, desc: &TextureDescriptor) -> Self {
        Self {
            id,
            extent: desc.extent(),
            format: desc.format,
            sample_count: desc.sample_count,
            bind: desc.bind,
        }
    }
}

/// 采样器句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle {
    pub id: ResourceId,
    pub desc: SamplerDescriptor,
}

/// 颜色渲染目标视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetView {
    pub id: ResourceId,
    /// 被观察的资源（纹理或交换链）
    pub resource: ResourceId,
    pub format: TextureFormat,
    pub extent: Extent2d,
    pub sample_count: u32,
}

/// 深度模板视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilView {
    pub id: ResourceId,
    pub resource: ResourceId,
    pub format: TextureFormat,
    pub extent: Extent2d,
    pub sample_count: u32,
}

/// 着色器资源视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderResourceView {
    pub id: ResourceId,
    pub resource: ResourceId,
    pub format: TextureFormat,
    pub extent: Extent2d,
}

/// 视图创建前检查纹理的绑定类型
pub fn check_view_bind(texture: &TextureHandle, expected: TextureBind, view: &str) -> Result<()> {
    if texture.bind != expected {
        return Err(GraphicsError::creation(
            view.to_string(),
            format!("texture {} is bound as {:?}, not {:?}", texture.id, texture.bind, expected),
        )
        .into());
    }
    Ok(())
}
