//! 软件后端
//!
//! 不依赖 GPU 的设备实现：资源保存在内存中，绘制由一个简单的三角形光栅化器完成。
//! 用于无头运行和测试。

mod device;
mod raster;

pub use device::{ConstantSnapshot, DrawRecord, PresentRecord, SoftwareDevice, SOFTWARE_MAX_TEXTURE_DIMENSION};
pub use raster::{ColorImage, DepthImage};
