//! Texture decoding and upload

use ash::vk;
use std::path::Path;

use super::{AssetError, AssetResult};
use crate::render::vulkan::{Image, ImageInfo, Sampler, SamplerInfo};
use crate::render::RenderContext;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Tightly packed RGBA rows
    pub pixels: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageData {
    /// Decode an image file into RGBA8
    pub fn from_file(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| AssetError::ImageDecode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::info!("Loaded image {}x{} from {}", width, height, path.display());
        Ok(Self {
            pixels: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Single-color image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixels = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self { pixels, width, height }
    }

    /// Size as a Vulkan extent
    pub const fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// Sampled image plus its sampler
pub struct Texture {
    /// Image in SHADER_READ_ONLY_OPTIMAL layout
    pub image: Image,
    /// Sampler to bind with it
    pub sampler: Sampler,
}

impl Texture {
    /// Upload `data` into a new sRGB image
    pub fn upload(context: &RenderContext, data: &ImageData, sampler: SamplerInfo) -> AssetResult<Self> {
        let image = context.create_image(ImageInfo::texture(data.extent()))?;
        context.upload_texture(&image, &data.pixels)?;
        let sampler = Sampler::new(context.device().clone(), sampler)?;
        Ok(Self { image, sampler })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color() {
        let data = ImageData::solid_color(2, 3, [10, 20, 30, 255]);
        assert_eq!(data.pixels.len(), 24);
        assert_eq!(&data.pixels[20..24], &[10, 20, 30, 255]);
        assert_eq!(data.extent().height, 3);
    }

    #[test]
    fn test_decode_png_round_trip() {
        let dir = std::env::temp_dir().join(format!("subpass_engine_texture_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("checker.png");

        let img = image::RgbaImage::from_fn(2, 2, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        img.save(&path).unwrap();

        let data = ImageData::from_file(&path).unwrap();
        assert_eq!((data.width, data.height), (2, 2));
        assert_eq!(&data.pixels[4..8], &[0, 0, 0, 255]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        assert!(matches!(
            ImageData::from_file("no/such/texture.png"),
            Err(AssetError::ImageDecode { .. })
        ));
    }
}
