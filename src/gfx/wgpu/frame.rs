//! 帧录制
//!
//! 即时模式的清除和绘制先录成命令，呈现时再合并成尽量少的渲染通道回放。
//! 每次绘制引用的常量缓冲内容在录制时复制进上传环，
//! 所以同一帧内两次绘制之间改写常量缓冲，各自看到的是录制当时的数据。

use crate::core::math::Color;
use crate::renderer::device::DrawCall;
use crate::renderer::pipeline::{DepthStencilDescriptor, Viewport};
use crate::renderer::resource::{aligned_constant_size, ResourceId};

/// 管线变体的键：wgpu 把目标格式和深度状态编进管线对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct VariantKey {
    pub color: wgpu::TextureFormat,
    pub depth: Option<DepthStencilDescriptor>,
}

pub(super) enum Recorded {
    ClearColor { target: ResourceId, color: Color },
    ClearDepth { target: ResourceId, depth: f32 },
    Draw(RecordedDraw),
}

pub(super) struct RecordedDraw {
    pub pipeline: ResourceId,
    pub key: VariantKey,
    pub color: ResourceId,
    pub depth: Option<ResourceId>,
    /// (缓冲, 字节偏移)
    pub vertex: (ResourceId, u64),
    pub index: Option<(ResourceId, wgpu::IndexFormat, u64)>,
    pub bindings: Vec<RecordedBinding>,
    pub viewport: Viewport,
    pub call: DrawCall,
}

impl RecordedDraw {
    /// 是否以顶点或索引缓冲的身份引用了 `buffer`
    pub fn reads_geometry(&self, buffer: ResourceId) -> bool {
        self.vertex.0 == buffer || self.index.map_or(false, |(id, _, _)| id == buffer)
    }
}

pub(super) enum RecordedBinding {
    /// 上传环中的一段
    Constant { offset: u64, size: u64 },
    Texture(ResourceId),
    Sampler(ResourceId),
}

/// 一个渲染通道
///
/// 附件的第二项为 `Some` 时通道以清除开始，否则保留原内容。
#[derive(Debug, Clone, PartialEq)]
pub(super) struct PassPlan {
    pub color: Option<(ResourceId, Option<Color>)>,
    pub depth: Option<(ResourceId, Option<f32>)>,
    /// 命令列表中的绘制下标
    pub draws: Vec<usize>,
}

impl PassPlan {
    fn accepts(&self, color: ResourceId, depth: Option<ResourceId>) -> bool {
        let fresh = self.draws.is_empty();
        let color_ok = match self.color {
            Some((id, _)) => id == color,
            None => fresh,
        };
        let depth_ok = match (self.depth, depth) {
            (Some((id, _)), Some(wanted)) => id == wanted,
            (None, None) => true,
            (None, Some(_)) => fresh,
            (Some(_), None) => false,
        };
        color_ok && depth_ok
    }
}

/// 把录制的命令按顺序切分成渲染通道
///
/// 清除并入紧随其后、目标相同的绘制通道的加载操作；
/// 目标相同的连续绘制共用一个通道。命令间的先后顺序保持不变。
pub(super) fn plan_passes(commands: &[Recorded]) -> Vec<PassPlan> {
    let mut plans: Vec<PassPlan> = Vec::new();

    for (index, command) in commands.iter().enumerate() {
        match command {
            Recorded::ClearColor { target, color } => {
                match plans.last_mut() {
                    Some(plan) if plan.draws.is_empty() && plan.color.map_or(true, |(id, _)| id == *target) => {
                        plan.color = Some((*target, Some(*color)));
                    }
                    _ => plans.push(PassPlan {
                        color: Some((*target, Some(*color))),
                        depth: None,
                        draws: Vec::new(),
                    }),
                }
            }
            Recorded::ClearDepth { target, depth } => {
                match plans.last_mut() {
                    Some(plan) if plan.draws.is_empty() && plan.depth.map_or(true, |(id, _)| id == *target) => {
                        plan.depth = Some((*target, Some(*depth)));
                    }
                    _ => plans.push(PassPlan {
                        color: None,
                        depth: Some((*target, Some(*depth))),
                        draws: Vec::new(),
                    }),
                }
            }
            Recorded::Draw(draw) => {
                match plans.last_mut() {
                    Some(plan) if plan.accepts(draw.color, draw.depth) => {
                        plan.color.get_or_insert((draw.color, None));
                        if let Some(depth) = draw.depth {
                            plan.depth.get_or_insert((depth, None));
                        }
                        plan.draws.push(index);
                    }
                    _ => plans.push(PassPlan {
                        color: Some((draw.color, None)),
                        depth: draw.depth.map(|id| (id, None)),
                        draws: vec![index],
                    }),
                }
            }
        }
    }

    plans
}

/// 常量上传环
///
/// 录制期间在 CPU 侧累积，回放前一次写入 GPU 缓冲，容量不足时按 2 的幂增长。
#[derive(Default)]
pub(super) struct UploadRing {
    staging: Vec<u8>,
    buffer: Option<wgpu::Buffer>,
}

impl UploadRing {
    const MIN_CAPACITY: u64 = 64 * 1024;

    /// 追加一段常量数据，返回其 256 字节对齐的偏移
    pub fn push(&mut self, bytes: &[u8]) -> u64 {
        let offset = aligned_constant_size(self.staging.len() as u64);
        self.staging.resize(offset as usize, 0);
        self.staging.extend_from_slice(bytes);
        offset
    }

    pub fn staged(&self) -> u64 {
        self.staging.len() as u64
    }

    /// 把本帧累积的数据写入 GPU，必要时先扩容
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if self.staging.is_empty() {
            return;
        }

        let needed = self.staged();
        if self.buffer.as_ref().map_or(0, wgpu::Buffer::size) < needed {
            let size = needed.next_power_of_two().max(Self::MIN_CAPACITY);
            if let Some(old) = self.buffer.take() {
                old.destroy();
            }
            self.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("constant upload ring"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }

        if let Some(buffer) = &self.buffer {
            queue.write_buffer(buffer, 0, &self.staging);
        }
    }

    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    /// 回放结束后清空 CPU 侧数据，GPU 缓冲留给下一帧
    pub fn reset(&mut self) {
        self.staging.clear();
    }
}
