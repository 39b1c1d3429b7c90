use glam::UVec2;

use crate::primitive::TextureId;

/// A loaded image as the atlas builder sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub id: TextureId,
    /// Size of the GPU texture, after any power-of-two padding.
    pub size: UVec2,
    /// Size of the decoded image before padding.
    pub original_size: UVec2,
}

/// Name-keyed image cache. Entries are loaded on first request and shared by
/// every atlas that names the same image.
pub trait TextureCache {
    fn load_image(&mut self, name: &str) -> Result<TextureInfo, String>;

    fn get(&self, name: &str) -> Option<TextureInfo>;

    /// Whether `name` is loaded or loadable.
    fn exists(&self, name: &str) -> bool;
}
