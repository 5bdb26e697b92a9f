//! 图像解码
//!
//! 渲染核心只接受原始像素（RGBA8、宽、高、行跨度），
//! 文件格式的解析由 `ImageDecoder` 的实现负责。解码失败在启动阶段是致命的。

use std::path::Path;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, error};

use crate::core::error::{AssetError, Result};
use crate::renderer::resource::{TextureData, TextureDescriptor};

/// 解码后的 RGBA8 图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 恒为 4
    pub channel_count: u32,
    /// 每行字节数
    pub row_stride: u32,
}

impl DecodedImage {
    /// 由紧密排列的 RGBA8 像素构造
    pub fn from_rgba8(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let image = Self {
            pixels,
            width,
            height,
            channel_count: 4,
            row_stride: width * 4,
        };
        image.validate()?;
        Ok(image)
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AssetError::InvalidImage("image has zero extent".to_string()).into());
        }
        let expected = self.row_stride as usize * self.height as usize;
        if self.pixels.len() != expected {
            return Err(AssetError::InvalidImage(format!(
                "{} bytes of pixels for {}x{} RGBA8 (expected {})",
                self.pixels.len(),
                self.width,
                self.height,
                expected
            ))
            .into());
        }
        Ok(())
    }

    /// 对应的着色器资源纹理描述
    pub fn texture_descriptor(&self, label: &str) -> TextureDescriptor {
        TextureDescriptor::shader_resource(self.width, self.height).with_label(label)
    }

    /// 转为纹理初始数据
    pub fn into_texture_data(self) -> TextureData {
        TextureData::new(self.pixels, self.row_stride)
    }
}

/// 图像解码器接口
pub trait ImageDecoder {
    /// 解码文件
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// 基于 `image` crate 的解码器，统一转为 RGBA8
#[derive(Debug, Default, Clone, Copy)]
pub struct FileImageDecoder;

impl FileImageDecoder {
    pub fn new() -> Self {
        Self
    }

    /// 从内存中的文件内容解码
    pub fn decode_bytes(&self, bytes: &[u8], path: &Path) -> Result<DecodedImage> {
        let image = image::load_from_memory(bytes).map_err(|e| AssetError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::to_rgba8(image)
    }

    fn to_rgba8(image: DynamicImage) -> Result<DecodedImage> {
        let (width, height) = image.dimensions();
        let pixels = image.to_rgba8().into_raw();
        DecodedImage::from_rgba8(pixels, width, height)
    }
}

impl ImageDecoder for FileImageDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        if !path.exists() {
            error!(path = %path.display(), "Texture file not found");
            return Err(AssetError::FileNotFound(path.to_path_buf()).into());
        }

        let image = image::open(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to decode texture");
            AssetError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        let decoded = Self::to_rgba8(image)?;
        debug!(path = %path.display(), width = decoded.width, height = decoded.height, "Texture decoded");
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let image = image::RgbImage::from_fn(3, 2, |x, y| image::Rgb([x as u8 * 100, y as u8 * 200, 7]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageOutputFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_decode_expands_to_rgba() {
        let decoded = FileImageDecoder::new()
            .decode_bytes(&png_bytes(), Path::new("memory.png"))
            .unwrap();

        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.channel_count, 4);
        assert_eq!(decoded.row_stride, 12);

        let data = decoded.clone().into_texture_data();
        assert_eq!(data.pixel(2, 1, 4), Some(&[200u8, 200, 7, 255][..]));
        assert!(decoded.texture_descriptor("grid").validate(Some(&data), 8192).is_ok());
    }

    #[test]
    fn test_missing_file_is_asset_error() {
        let err = FileImageDecoder::new()
            .decode(Path::new("definitely/not/here.png"))
            .unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let err = FileImageDecoder::new()
            .decode_bytes(b"not an image", Path::new("garbage.png"))
            .unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_pixel_count_must_match_extent() {
        assert!(DecodedImage::from_rgba8(vec![0; 15], 2, 2).is_err());
        assert!(DecodedImage::from_rgba8(vec![0; 16], 2, 2).is_ok());
    }
}
