//! 软件光栅化
//!
//! 只覆盖演示场景需要的部分：三角形列表/条带、背面剔除、深度测试，
//! 以及由输入布局推断的像素着色（顶点颜色、纹理采样、按图元序号取调色板）。
//! 不做近平面裁剪，任一顶点位于观察者身后的三角形整个丢弃。

use crate::core::math::{Color, Vector2, Vector3, Vector4};
use crate::renderer::pipeline::{
    CullMode, DepthStencilDescriptor, FrontFace, PrimitiveTopology, RasterState, Viewport,
};
use crate::renderer::resource::{AddressMode, Extent2d, FilterMode, SamplerDescriptor};

/// RGBA8 颜色图像
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    pub extent: Extent2d,
    pub pixels: Vec<[u8; 4]>,
}

impl ColorImage {
    pub fn new(extent: Extent2d) -> Self {
        Self {
            extent,
            pixels: vec![[0, 0, 0, 0]; extent.area()],
        }
    }

    /// 由紧密或带行跨度的 RGBA8 字节构造
    pub fn from_rows(extent: Extent2d, bytes: &[u8], row_stride: u32) -> Self {
        let mut image = Self::new(extent);
        for y in 0..extent.height as usize {
            let row = y * row_stride as usize;
            for x in 0..extent.width as usize {
                let start = row + x * 4;
                if let Some(texel) = bytes.get(start..start + 4) {
                    image.pixels[y * extent.width as usize + x] = [texel[0], texel[1], texel[2], texel[3]];
                }
            }
        }
        image
    }

    pub fn fill(&mut self, color: Color) {
        let texel = color.to_rgba_u8();
        self.pixels.iter_mut().for_each(|p| *p = texel);
    }

    pub fn get(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.extent.width || y >= self.extent.height {
            return None;
        }
        self.pixels.get(y as usize * self.extent.width as usize + x as usize).copied()
    }

    fn set(&mut self, x: u32, y: u32, texel: [u8; 4]) {
        let index = y as usize * self.extent.width as usize + x as usize;
        if let Some(p) = self.pixels.get_mut(index) {
            *p = texel;
        }
    }

    /// 按采样器设置采样，返回归一化颜色
    pub fn sample(&self, uv: Vector2, sampler: &SamplerDescriptor) -> [f32; 4] {
        let (w, h) = (self.extent.width.max(1) as f32, self.extent.height.max(1) as f32);
        let u = address(uv.x, sampler.address_u);
        let v = address(uv.y, sampler.address_v);

        match sampler.filter {
            FilterMode::Point => {
                let x = ((u * w) as u32).min(self.extent.width.saturating_sub(1));
                let y = ((v * h) as u32).min(self.extent.height.saturating_sub(1));
                texel_to_f32(self.get(x, y).unwrap_or_default())
            }
            FilterMode::Linear => {
                let fx = u * w - 0.5;
                let fy = v * h - 0.5;
                let (x0, y0) = (fx.floor(), fy.floor());
                let (tx, ty) = (fx - x0, fy - y0);

                let fetch = |x: f32, y: f32| {
                    let x = wrap_index(x as i64, self.extent.width, sampler.address_u);
                    let y = wrap_index(y as i64, self.extent.height, sampler.address_v);
                    texel_to_f32(self.get(x, y).unwrap_or_default())
                };

                let (a, b) = (fetch(x0, y0), fetch(x0 + 1.0, y0));
                let (c, d) = (fetch(x0, y0 + 1.0), fetch(x0 + 1.0, y0 + 1.0));
                let mut out = [0.0; 4];
                for i in 0..4 {
                    let top = a[i] + (b[i] - a[i]) * tx;
                    let bottom = c[i] + (d[i] - c[i]) * tx;
                    out[i] = top + (bottom - top) * ty;
                }
                out
            }
        }
    }
}

/// 32 位浮点深度图像
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DepthImage {
    pub extent: Extent2d,
    pub values: Vec<f32>,
}

impl DepthImage {
    pub fn new(extent: Extent2d) -> Self {
        Self {
            extent,
            values: vec![1.0; extent.area()],
        }
    }

    pub fn fill(&mut self, depth: f32) {
        self.values.iter_mut().for_each(|v| *v = depth);
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.extent.width || y >= self.extent.height {
            return None;
        }
        self.values.get(y as usize * self.extent.width as usize + x as usize).copied()
    }

    fn set(&mut self, x: u32, y: u32, depth: f32) {
        let index = y as usize * self.extent.width as usize + x as usize;
        if let Some(v) = self.values.get_mut(index) {
            *v = depth;
        }
    }
}

/// 顶点阶段的输出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessedVertex {
    pub clip: Vector4,
    /// 透视除法与视口映射后的坐标，`w <= 0` 时为 `None`
    pub screen: Option<Vector3>,
    pub color: Option<Vector3>,
    pub uv: Option<Vector2>,
}

/// 由管线输入推断的像素着色方式
#[derive(Debug, Clone)]
pub enum PixelShading<'a> {
    /// 插值顶点颜色
    VertexColor,
    /// 采样纹理
    Texture {
        image: &'a ColorImage,
        sampler: SamplerDescriptor,
    },
    /// 按 `图元序号 / 2` 取调色板颜色（每个面两个三角形）
    Palette(Vec<[f32; 4]>),
    /// 单一颜色
    Solid([f32; 4]),
}

/// 光栅化目标
pub struct RasterTargets<'a> {
    pub color: &'a mut ColorImage,
    pub depth: Option<&'a mut DepthImage>,
    pub depth_state: DepthStencilDescriptor,
}

/// 光栅化一次绘制，返回写入的像素数
pub fn rasterize(
    vertices: &[ProcessedVertex],
    topology: PrimitiveTopology,
    raster: RasterState,
    viewport: &Viewport,
    shading: &PixelShading<'_>,
    targets: &mut RasterTargets<'_>,
) -> u32 {
    let triangles: Vec<[usize; 3]> = match topology {
        PrimitiveTopology::TriangleList => (0..vertices.len() / 3).map(|t| [t * 3, t * 3 + 1, t * 3 + 2]).collect(),
        PrimitiveTopology::TriangleStrip => (0..vertices.len().saturating_sub(2))
            .map(|t| if t % 2 == 0 { [t, t + 1, t + 2] } else { [t + 1, t, t + 2] })
            .collect(),
        PrimitiveTopology::LineList | PrimitiveTopology::PointList => Vec::new(),
    };

    let mut written = 0;
    for (primitive, corners) in triangles.iter().enumerate() {
        let tri = [vertices[corners[0]], vertices[corners[1]], vertices[corners[2]]];
        written += draw_triangle(&tri, primitive as u32, raster, viewport, shading, targets);
    }
    written
}

fn draw_triangle(
    tri: &[ProcessedVertex; 3],
    primitive: u32,
    raster: RasterState,
    viewport: &Viewport,
    shading: &PixelShading<'_>,
    targets: &mut RasterTargets<'_>,
) -> u32 {
    let (Some(a), Some(b), Some(c)) = (tri[0].screen, tri[1].screen, tri[2].screen) else {
        return 0;
    };

    // 屏幕坐标 y 朝下，面积为正即屏幕上顺时针
    let area = edge(a, b, c);
    if area.abs() <= f32::EPSILON {
        return 0;
    }
    let clockwise = area > 0.0;
    let front = clockwise == (raster.front_face == FrontFace::Clockwise);
    let culled = match raster.cull {
        CullMode::None => false,
        CullMode::Back => !front,
        CullMode::Front => front,
    };
    if culled {
        return 0;
    }

    let extent = targets.color.extent;
    let min_x = a.x.min(b.x).min(c.x).max(viewport.top_left_x).max(0.0).floor() as i64;
    let min_y = a.y.min(b.y).min(c.y).max(viewport.top_left_y).max(0.0).floor() as i64;
    let max_x = (a.x.max(b.x).max(c.x).min(viewport.top_left_x + viewport.width).ceil() as i64)
        .min(extent.width as i64 - 1);
    let max_y = (a.y.max(b.y).max(c.y).min(viewport.top_left_y + viewport.height).ceil() as i64)
        .min(extent.height as i64 - 1);

    let mut written = 0;
    for y in min_y.max(0)..=max_y {
        for x in min_x.max(0)..=max_x {
            let p = Vector3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
            let w0 = edge(b, c, p) / area;
            let w1 = edge(c, a, p) / area;
            let w2 = edge(a, b, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let z = a.z * w0 + b.z * w1 + c.z * w2;
            if z < viewport.min_depth || z > viewport.max_depth {
                continue;
            }

            let (x, y) = (x as u32, y as u32);
            if !depth_test(targets, x, y, z) {
                continue;
            }

            let color = shade(tri, [w0, w1, w2], primitive, shading);
            targets.color.set(x, y, Color::from_array(color).to_rgba_u8());
            written += 1;
        }
    }
    written
}

fn depth_test(targets: &mut RasterTargets<'_>, x: u32, y: u32, z: f32) -> bool {
    let state = targets.depth_state;
    let Some(depth) = targets.depth.as_deref_mut() else {
        return true;
    };
    if !state.depth_enable {
        return true;
    }

    let stored = depth.get(x, y).unwrap_or(1.0);
    if !state.compare.passes(z, stored) {
        return false;
    }
    if state.depth_write {
        depth.set(x, y, z);
    }
    true
}

fn shade(tri: &[ProcessedVertex; 3], weights: [f32; 3], primitive: u32, shading: &PixelShading<'_>) -> [f32; 4] {
    match shading {
        PixelShading::VertexColor => {
            let mut rgb = Vector3::zeros();
            for (vertex, w) in tri.iter().zip(weights) {
                rgb += vertex.color.unwrap_or_else(Vector3::zeros) * w;
            }
            [rgb.x, rgb.y, rgb.z, 1.0]
        }
        PixelShading::Texture { image, sampler } => {
            let mut uv = Vector2::zeros();
            for (vertex, w) in tri.iter().zip(weights) {
                uv += vertex.uv.unwrap_or_else(Vector2::zeros) * w;
            }
            image.sample(uv, sampler)
        }
        PixelShading::Palette(colors) => {
            if colors.is_empty() {
                return [1.0; 4];
            }
            colors[(primitive as usize / 2) % colors.len()]
        }
        PixelShading::Solid(color) => *color,
    }
}

fn edge(a: Vector3, b: Vector3, p: Vector3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn address(t: f32, mode: AddressMode) -> f32 {
    match mode {
        AddressMode::Wrap => t - t.floor(),
        AddressMode::Clamp => t.clamp(0.0, 1.0),
        AddressMode::Mirror => {
            let m = t.rem_euclid(2.0);
            if m > 1.0 {
                2.0 - m
            } else {
                m
            }
        }
    }
}

fn wrap_index(i: i64, size: u32, mode: AddressMode) -> u32 {
    let n = size.max(1) as i64;
    let index = match mode {
        AddressMode::Wrap => i.rem_euclid(n),
        AddressMode::Clamp => i.clamp(0, n - 1),
        AddressMode::Mirror => {
            let m = i.rem_euclid(2 * n);
            if m >= n {
                2 * n - 1 - m
            } else {
                m
            }
        }
    };
    index as u32
}

fn texel_to_f32(texel: [u8; 4]) -> [f32; 4] {
    texel.map(|c| c as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::pipeline::CompareFunction;

    fn vertex(x: f32, y: f32, z: f32, extent: Extent2d) -> ProcessedVertex {
        let clip = Vector4::new(x, y, z, 1.0);
        let screen = Viewport::full(extent).to_screen(Vector3::new(x, y, z));
        ProcessedVertex {
            clip,
            screen: Some(screen),
            color: Some(Vector3::new(0.0, 1.0, 0.0)),
            uv: None,
        }
    }

    fn fullscreen(z: f32, extent: Extent2d) -> Vec<ProcessedVertex> {
        // 顺时针覆盖全屏的两个三角形
        vec![
            vertex(-1.0, 1.0, z, extent),
            vertex(1.0, 1.0, z, extent),
            vertex(1.0, -1.0, z, extent),
            vertex(-1.0, 1.0, z, extent),
            vertex(1.0, -1.0, z, extent),
            vertex(-1.0, -1.0, z, extent),
        ]
    }

    #[test]
    fn test_clockwise_fullscreen_covers_every_pixel() {
        let extent = Extent2d::new(8, 8);
        let mut color = ColorImage::new(extent);
        let mut targets = RasterTargets {
            color: &mut color,
            depth: None,
            depth_state: DepthStencilDescriptor::default(),
        };

        let written = rasterize(
            &fullscreen(0.5, extent),
            PrimitiveTopology::TriangleList,
            RasterState::default(),
            &Viewport::full(extent),
            &PixelShading::VertexColor,
            &mut targets,
        );
        // 对角线上的像素中心被两个三角形共享
        assert!(written >= 64);
        assert!(color.pixels.iter().all(|p| *p == [0, 255, 0, 255]));
    }

    #[test]
    fn test_back_faces_are_culled() {
        let extent = Extent2d::new(8, 8);
        let mut vertices = fullscreen(0.5, extent);
        vertices.swap(1, 2);
        vertices.swap(4, 5);

        let mut color = ColorImage::new(extent);
        let mut targets = RasterTargets {
            color: &mut color,
            depth: None,
            depth_state: DepthStencilDescriptor::default(),
        };
        let written = rasterize(
            &vertices,
            PrimitiveTopology::TriangleList,
            RasterState::default(),
            &Viewport::full(extent),
            &PixelShading::VertexColor,
            &mut targets,
        );
        assert_eq!(written, 0);
    }

    #[test]
    fn test_depth_less_rejects_farther_surface() {
        let extent = Extent2d::new(4, 4);
        let mut color = ColorImage::new(extent);
        let mut depth = DepthImage::new(extent);
        let viewport = Viewport::full(extent);

        let mut targets = RasterTargets {
            color: &mut color,
            depth: Some(&mut depth),
            depth_state: DepthStencilDescriptor::default(),
        };
        let near = PixelShading::Solid([1.0, 0.0, 0.0, 1.0]);
        let far = PixelShading::Solid([0.0, 0.0, 1.0, 1.0]);
        let raster = RasterState::default();

        rasterize(&fullscreen(0.3, extent), PrimitiveTopology::TriangleList, raster, &viewport, &near, &mut targets);
        let written = rasterize(&fullscreen(0.6, extent), PrimitiveTopology::TriangleList, raster, &viewport, &far, &mut targets);

        assert_eq!(written, 0);
        assert_eq!(color.get(1, 1), Some([255, 0, 0, 255]));
        assert!((depth.get(1, 1).unwrap() - 0.3).abs() < 1e-6);

        // ALWAYS 时后画的覆盖先画的
        let mut targets = RasterTargets {
            color: &mut color,
            depth: Some(&mut depth),
            depth_state: DepthStencilDescriptor {
                compare: CompareFunction::Always,
                ..Default::default()
            },
        };
        rasterize(&fullscreen(0.6, extent), PrimitiveTopology::TriangleList, raster, &viewport, &far, &mut targets);
        assert_eq!(color.get(1, 1), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_palette_uses_pair_of_triangles_per_face() {
        let extent = Extent2d::new(8, 8);
        let mut color = ColorImage::new(extent);
        let mut targets = RasterTargets {
            color: &mut color,
            depth: None,
            depth_state: DepthStencilDescriptor::default(),
        };
        let shading = PixelShading::Palette(vec![[1.0, 1.0, 0.0, 1.0], [0.0, 1.0, 1.0, 1.0]]);
        rasterize(
            &fullscreen(0.5, extent),
            PrimitiveTopology::TriangleList,
            RasterState::default(),
            &Viewport::full(extent),
            &shading,
            &mut targets,
        );
        // 两个三角形是同一个面
        assert!(color.pixels.iter().all(|p| *p == [255, 255, 0, 255]));
    }

    #[test]
    fn test_wrap_sampling_repeats() {
        let extent = Extent2d::new(2, 1);
        let image = ColorImage::from_rows(extent, &[255, 0, 0, 255, 0, 0, 255, 255], 8);
        let sampler = SamplerDescriptor {
            filter: FilterMode::Point,
            ..Default::default()
        };
        assert_eq!(image.sample(Vector2::new(0.25, 0.5), &sampler), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(image.sample(Vector2::new(1.75, 0.5), &sampler), [0.0, 0.0, 1.0, 1.0]);

        let linear = SamplerDescriptor::default();
        let mid = image.sample(Vector2::new(0.5, 0.5), &linear);
        assert!((mid[0] - 0.5).abs() < 1e-6 && (mid[2] - 0.5).abs() < 1e-6);
    }
}
