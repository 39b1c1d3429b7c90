//! Multi-layer composition with parallax scrolling.
//!
//! The primary layer defines the scrollable world: its offset is clamped so
//! the viewport never leaves the map. Every other layer scrolls in proportion
//! to how much bigger than the viewport it is compared to the primary, so all
//! layers reach their far edges at the same moment.

use glam::{UVec2, Vec2};
use std::path::Path;
use tsr_core::level::LevelNode;
use tsr_core::Viewport;

use crate::atlas::AtlasCache;
use crate::layer::TileLayer;
use crate::primitive::{PrimitiveArena, PrimitiveRange, TileCanvas};
use crate::texture::TextureCache;
use crate::tileset::TileSet;

/// Scrollable excess below this is treated as "not scrollable".
pub const RATIO_EPSILON: f32 = 1e-4;

/// Clamp a scroll offset so `[-offset, -offset + viewport]` stays within the
/// map. Axes where the map fits entirely get offset 0.
pub fn clamp_scroll(offset: Vec2, viewport_size: Vec2, map_size: Vec2) -> Vec2 {
    let axis = |offset: f32, viewport: f32, map: f32| {
        if map <= viewport || !offset.is_finite() {
            0.0
        } else {
            offset.clamp(viewport - map, 0.0)
        }
    };
    Vec2::new(
        axis(offset.x, viewport_size.x, map_size.x),
        axis(offset.y, viewport_size.y, map_size.y),
    )
}

/// Per-axis divisor that maps the primary offset onto a layer offset.
pub fn parallax_ratio(primary_size: Vec2, layer_size: Vec2, viewport_size: Vec2) -> Vec2 {
    let axis = |primary: f32, layer: f32, viewport: f32| {
        let primary_excess = primary - viewport;
        let layer_excess = layer - viewport;
        if primary_excess.abs() < RATIO_EPSILON || layer_excess.abs() < RATIO_EPSILON {
            1.0
        } else {
            primary_excess / layer_excess
        }
    };
    Vec2::new(
        axis(primary_size.x, layer_size.x, viewport_size.x),
        axis(primary_size.y, layer_size.y, viewport_size.y),
    )
}

/// Offset of a layer sized `layer_size` given the clamped primary offset.
pub fn layer_offset(primary_offset: Vec2, primary_size: Vec2, layer_size: Vec2, viewport_size: Vec2) -> Vec2 {
    let ratio = parallax_ratio(primary_size, layer_size, viewport_size);
    clamp_scroll(primary_offset / ratio, viewport_size, layer_size)
}

#[derive(Debug, Default)]
pub struct TileScene {
    /// Sorted by ascending depth; equal depths keep insertion order.
    layers: Vec<TileSet>,
    primary: Option<usize>,
}

impl TileScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `tileSetList/tileset` under `root`. Returns the number of
    /// tilesets read.
    pub fn read_scene<N: LevelNode>(
        &mut self,
        root: &N,
        base_dir: &Path,
        map_index: usize,
        textures: &mut dyn TextureCache,
        atlases: &mut AtlasCache,
    ) -> usize {
        let nodes = root
            .first_child("tileSetList")
            .map(|list| list.children("tileset"))
            .unwrap_or_default();
        if nodes.is_empty() {
            log::warn!("Level has no tileSetList/tileset entries");
        }
        for node in &nodes {
            let set = TileSet::read_tileset(node, base_dir, map_index, textures, atlases);
            self.add_tile_set(set);
        }
        log::info!(
            "Scene loaded: {} layers, primary '{}'",
            self.layers.len(),
            self.primary().map(|set| set.identifier.as_str()).unwrap_or("none")
        );
        nodes.len()
    }

    /// Insert by depth. Returns the layer's position in draw order.
    pub fn add_tile_set(&mut self, set: TileSet) -> usize {
        let depth = set.depth();
        let position = self.layers.partition_point(|existing| existing.depth() <= depth);
        self.layers.insert(position, set);

        self.primary = match self.primary {
            None => Some(position),
            Some(current) => {
                let current = if position <= current { current + 1 } else { current };
                if depth == 0 && self.layers[current].depth() != 0 {
                    Some(position)
                } else {
                    Some(current)
                }
            }
        };
        position
    }

    pub fn add_tile_map(
        &mut self,
        identifier: impl Into<String>,
        layer: TileLayer,
        primitives: Option<PrimitiveRange>,
    ) -> usize {
        self.add_tile_set(TileSet::from_layer(identifier, layer, primitives))
    }

    pub fn generate_default_tileset(
        &mut self,
        texture_name: &str,
        tile_size: UVec2,
        tile_count: u32,
        textures: &mut dyn TextureCache,
        atlases: &mut AtlasCache,
    ) -> Result<usize, String> {
        let set = TileSet::generate_default(texture_name, tile_size, tile_count, textures, atlases)?;
        Ok(self.add_tile_set(set))
    }

    pub fn primary(&self) -> Option<&TileSet> {
        self.primary.and_then(|i| self.layers.get(i))
    }

    pub fn primary_index(&self) -> Option<usize> {
        self.primary
    }

    pub fn layers(&self) -> &[TileSet] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn sequence_count(&self) -> usize {
        self.layers.iter().map(TileSet::sequence_count).sum()
    }

    pub fn update(&mut self, elapsed_us: u64) {
        for set in &mut self.layers {
            set.update(elapsed_us);
        }
    }

    /// Offsets each layer would be drawn with. Clamps `primary_offset` in
    /// place.
    pub fn layer_offsets(&self, primary_offset: &mut Vec2, viewport: &Viewport) -> Vec<Vec2> {
        let Some(primary) = self.primary() else {
            return Vec::new();
        };
        let primary_size = primary.map_size();
        *primary_offset = clamp_scroll(*primary_offset, viewport.size, primary_size);
        self.layers
            .iter()
            .map(|set| layer_offset(*primary_offset, primary_size, set.map_size(), viewport.size))
            .collect()
    }

    /// Draw all layers back to front; returns the number of tiles drawn.
    /// `primary_offset` is clamped in place.
    pub fn render(
        &self,
        primary_offset: &mut Vec2,
        viewport: &Viewport,
        primitives: &PrimitiveArena,
        canvas: &mut dyn TileCanvas,
    ) -> usize {
        let offsets = self.layer_offsets(primary_offset, viewport);
        self.layers
            .iter()
            .zip(offsets)
            .map(|(set, offset)| set.render(offset, viewport, primitives, canvas))
            .sum()
    }

    /// Drop every layer and release the atlases they generated.
    pub fn clear(&mut self, atlases: &mut AtlasCache) {
        for set in self.layers.drain(..) {
            if let Some(id) = set.atlas_id() {
                atlases.remove(id);
            }
        }
        self.primary = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Cell;

    fn layer(depth: i32, grid: UVec2, tile: f32) -> TileSet {
        let mut layer = TileLayer::generate(format!("d{depth}"), Vec2::splat(tile), grid, |_| Cell::plain(0));
        layer.depth = depth;
        TileSet::from_layer(format!("d{depth}"), layer, None)
    }

    fn depths(scene: &TileScene) -> Vec<i32> {
        scene.layers().iter().map(TileSet::depth).collect()
    }

    #[test]
    fn clamp_scroll_keeps_viewport_inside_map() {
        let viewport = Vec2::new(640.0, 480.0);
        let map = Vec2::new(3200.0, 3200.0);
        assert_eq!(clamp_scroll(Vec2::new(10.0, 5.0), viewport, map), Vec2::ZERO);
        assert_eq!(
            clamp_scroll(Vec2::new(-5000.0, -100.0), viewport, map),
            Vec2::new(-2560.0, -100.0)
        );
        assert_eq!(
            clamp_scroll(Vec2::new(-50.0, -50.0), viewport, Vec2::new(320.0, 3200.0)),
            Vec2::new(0.0, -50.0)
        );
        assert_eq!(clamp_scroll(Vec2::new(f32::NAN, 0.0), viewport, map), Vec2::ZERO);
    }

    #[test]
    fn parallax_ratio_compares_scrollable_excess() {
        let viewport = Vec2::new(640.0, 480.0);
        let ratio = parallax_ratio(Vec2::new(3200.0, 3200.0), Vec2::new(1600.0, 1600.0), viewport);
        assert_eq!(ratio, Vec2::new(2560.0 / 960.0, 2720.0 / 1120.0));
        assert_eq!(parallax_ratio(Vec2::new(640.0, 500.0), Vec2::new(900.0, 480.0), viewport), Vec2::ONE);
    }

    #[test]
    fn parallax_layer_reaches_far_edge_with_primary() {
        let viewport = Vec2::new(640.0, 480.0);
        let primary = Vec2::new(3200.0, 3200.0);
        let background = Vec2::new(1600.0, 1600.0);

        let far = layer_offset(Vec2::new(-2560.0, -2720.0), primary, background, viewport);
        assert!((far.x - -960.0).abs() < 1e-3);
        assert!((far.y - -1120.0).abs() < 1e-3);
        assert_eq!(layer_offset(Vec2::ZERO, primary, background, viewport), Vec2::ZERO);
    }

    #[test]
    fn layers_sort_by_depth_stably() {
        let mut scene = TileScene::new();
        scene.add_tile_set(layer(2, UVec2::ONE, 1.0));
        scene.add_tile_set(layer(-1, UVec2::ONE, 1.0));
        scene.add_tile_set(layer(2, UVec2::new(2, 1), 1.0));
        scene.add_tile_set(layer(0, UVec2::ONE, 1.0));
        assert_eq!(depths(&scene), vec![-1, 0, 2, 2]);
        assert_eq!(scene.layers()[2].layer().grid_size(), UVec2::ONE);
        assert_eq!(scene.layers()[3].layer().grid_size(), UVec2::new(2, 1));
    }

    #[test]
    fn first_layer_is_primary_until_a_depth_zero_layer_arrives() {
        let mut scene = TileScene::new();
        scene.add_tile_set(layer(3, UVec2::ONE, 1.0));
        assert_eq!(scene.primary().map(TileSet::depth), Some(3));

        scene.add_tile_set(layer(-2, UVec2::ONE, 1.0));
        assert_eq!(scene.primary().map(TileSet::depth), Some(3));

        scene.add_tile_set(layer(0, UVec2::new(5, 5), 1.0));
        assert_eq!(scene.primary().map(TileSet::depth), Some(0));

        scene.add_tile_set(layer(0, UVec2::ONE, 1.0));
        assert_eq!(scene.primary().map(|s| s.layer().grid_size()), Some(UVec2::new(5, 5)));
    }

    #[test]
    fn empty_scene_renders_nothing() {
        let scene = TileScene::new();
        let mut offset = Vec2::new(-10.0, -10.0);
        let mut commands: Vec<crate::primitive::DrawCommand> = Vec::new();
        let drawn = scene.render(
            &mut offset,
            &Viewport::new(0.0, 0.0, 64.0, 64.0),
            &PrimitiveArena::default(),
            &mut commands,
        );
        assert_eq!(drawn, 0);
        assert!(scene.primary().is_none());
    }

    #[test]
    fn layer_offsets_clamp_primary_in_place() {
        let mut scene = TileScene::new();
        scene.add_tile_set(layer(0, UVec2::new(100, 100), 32.0));
        scene.add_tile_set(layer(1, UVec2::new(10, 10), 32.0));
        let mut offset = Vec2::new(-9999.0, 40.0);
        let offsets = scene.layer_offsets(&mut offset, &Viewport::new(0.0, 0.0, 640.0, 480.0));
        assert_eq!(offset, Vec2::new(-2560.0, 0.0));
        assert_eq!(offsets[0], offset);
        assert_eq!(offsets[1], Vec2::ZERO);
    }
}
