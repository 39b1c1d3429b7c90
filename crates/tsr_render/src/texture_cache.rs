//! Image decoding behind the `TextureCache` seam.
//!
//! Decoding happens on the CPU when an atlas asks for an image. The GPU side
//! collects the decoded pixels later through `take_pending_uploads`, so the
//! tile loader never needs a device handle.

use glam::UVec2;
use image::RgbaImage;
use std::collections::HashMap;
use tsr_core::ResourceSource;
use tsr_tiles::{TextureCache, TextureId, TextureInfo};

/// Decoded pixels waiting for GPU upload.
pub struct DecodedImage {
    pub id: TextureId,
    pub name: String,
    pub rgba: RgbaImage,
    pub original_size: UVec2,
}

pub struct ImageTextureCache<S: ResourceSource> {
    source: S,
    entries: HashMap<String, TextureInfo>,
    pending: Vec<DecodedImage>,
    pad_to_power_of_two: bool,
    next_id: u32,
}

impl<S: ResourceSource> ImageTextureCache<S> {
    pub fn new(source: S, pad_to_power_of_two: bool) -> Self {
        Self {
            source,
            entries: HashMap::new(),
            pending: Vec::new(),
            pad_to_power_of_two,
            next_id: 1,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn take_pending_uploads(&mut self) -> Vec<DecodedImage> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Texture memory of every loaded image, in bytes.
    pub fn byte_size(&self) -> usize {
        self.entries
            .values()
            .map(|info| info.size.x as usize * info.size.y as usize * 4)
            .sum()
    }

    fn decode(&self, name: &str) -> Result<(RgbaImage, UVec2), String> {
        let bytes = self.source.read(name)?;
        let rgba = image::load_from_memory(&bytes)
            .map_err(|e| format!("Failed to decode texture '{name}': {e}"))?
            .to_rgba8();
        let original_size = UVec2::new(rgba.width(), rgba.height());
        if original_size.x == 0 || original_size.y == 0 {
            return Err(format!("Texture '{name}' is empty"));
        }
        if !self.pad_to_power_of_two {
            return Ok((rgba, original_size));
        }

        let padded_size = UVec2::new(
            original_size.x.next_power_of_two(),
            original_size.y.next_power_of_two(),
        );
        if padded_size == original_size {
            return Ok((rgba, original_size));
        }
        log::debug!(
            "Padding texture '{}' from {}x{} to {}x{}",
            name,
            original_size.x,
            original_size.y,
            padded_size.x,
            padded_size.y
        );
        let mut padded = RgbaImage::new(padded_size.x, padded_size.y);
        image::imageops::replace(&mut padded, &rgba, 0, 0);
        Ok((padded, original_size))
    }
}

impl<S: ResourceSource> TextureCache for ImageTextureCache<S> {
    fn load_image(&mut self, name: &str) -> Result<TextureInfo, String> {
        if let Some(info) = self.entries.get(name) {
            return Ok(*info);
        }
        let (rgba, original_size) = self.decode(name)?;
        let info = TextureInfo {
            id: TextureId(self.next_id),
            size: UVec2::new(rgba.width(), rgba.height()),
            original_size,
        };
        self.next_id += 1;
        log::info!(
            "Loaded texture '{}' ({}x{})",
            name,
            original_size.x,
            original_size.y
        );
        self.entries.insert(name.to_string(), info);
        self.pending.push(DecodedImage {
            id: info.id,
            name: name.to_string(),
            rgba,
            original_size,
        });
        Ok(info)
    }

    fn get(&self, name: &str) -> Option<TextureInfo> {
        self.entries.get(name).copied()
    }

    fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name) || self.source.exists(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;
    use tsr_core::MemorySource;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .expect("encode png");
        bytes.into_inner()
    }

    fn source_with(name: &str, width: u32, height: u32) -> MemorySource {
        let mut source = MemorySource::new();
        source.insert(name, png_bytes(width, height));
        source
    }

    #[test]
    fn loads_once_and_queues_one_upload() {
        let mut cache = ImageTextureCache::new(source_with("tiles.png", 64, 32), false);
        let first = cache.load_image("tiles.png").expect("loads");
        let second = cache.load_image("tiles.png").expect("cached");

        assert_eq!(first, second);
        assert_eq!(first.id, TextureId(1));
        assert_eq!(first.size, UVec2::new(64, 32));
        let uploads = cache.take_pending_uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name, "tiles.png");
        assert!(cache.take_pending_uploads().is_empty());
    }

    #[test]
    fn pads_to_power_of_two_and_keeps_original_size() {
        let mut cache = ImageTextureCache::new(source_with("odd.png", 100, 50), true);
        let info = cache.load_image("odd.png").expect("loads");
        assert_eq!(info.size, UVec2::new(128, 64));
        assert_eq!(info.original_size, UVec2::new(100, 50));

        let upload = cache.take_pending_uploads().pop().expect("upload queued");
        assert_eq!(upload.rgba.dimensions(), (128, 64));
        assert_eq!(upload.rgba.get_pixel(99, 49), &Rgba([10, 20, 30, 255]));
        assert_eq!(upload.rgba.get_pixel(100, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(cache.byte_size(), 128 * 64 * 4);
    }

    #[test]
    fn missing_and_corrupt_images_are_errors() {
        let mut source = MemorySource::new();
        source.insert("bad.png", b"not a png".to_vec());
        let mut cache = ImageTextureCache::new(source, false);

        assert!(!cache.exists("gone.png"));
        assert!(cache.load_image("gone.png").is_err());
        assert!(cache.exists("bad.png"));
        let err = cache.load_image("bad.png").expect_err("corrupt image");
        assert!(err.contains("Failed to decode texture 'bad.png'"));
        assert!(cache.is_empty());
    }

    #[test]
    fn distinct_images_get_distinct_ids() {
        let mut source = source_with("a.png", 8, 8);
        source.insert("b.png", png_bytes(16, 16));
        let mut cache = ImageTextureCache::new(source, false);
        let a = cache.load_image("a.png").expect("a");
        let b = cache.load_image("b.png").expect("b");
        assert_ne!(a.id, b.id);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b.png"), Some(b));
    }
}
