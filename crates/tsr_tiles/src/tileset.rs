//! A tileset: one atlas, one tile map and the sequences its cells refer to.

use glam::{UVec2, Vec2};
use std::path::Path;
use tsr_core::level::{item_number, item_value, LevelNode};
use tsr_core::Viewport;

use crate::atlas::{AtlasCache, AtlasOutcome, GridAtlasRequest};
use crate::layer::{Cell, CellKind, LayerResources, TileLayer};
use crate::primitive::{PrimitiveArena, PrimitiveRange, TileCanvas};
use crate::sequence::{AnimatedSequence, FrameTiming, DEFAULT_FRAME_RATE};
use crate::texture::TextureCache;

/// Sequence numbers above this are rejected at load.
pub const MAX_SEQUENCE_INDEX: usize = 4096;

#[derive(Debug, Clone)]
pub struct TileSet {
    pub index: i32,
    pub identifier: String,
    pub tile_size: UVec2,
    /// Resolved image name as passed to the texture cache.
    pub image: String,
    pub image_size: UVec2,
    pub grid_size: UVec2,
    pub overlap: u32,
    pub tile_count: u32,
    atlas_id: Option<String>,
    primitives: Option<PrimitiveRange>,
    layer: TileLayer,
    sequences: Vec<Option<AnimatedSequence>>,
}

impl TileSet {
    /// Load a `tileset` node. Failures degrade: a set without an atlas keeps
    /// its map and sequences but draws nothing.
    pub fn read_tileset<N: LevelNode>(
        node: &N,
        base_dir: &Path,
        map_index: usize,
        textures: &mut dyn TextureCache,
        atlases: &mut AtlasCache,
    ) -> Self {
        let index: i32 = item_number(node, "index");
        let identifier = item_value(node, "identifier");
        let tile_size = UVec2::new(item_number(node, "tileWidth"), item_number(node, "tileHeight"));
        let bitmap = item_value(node, "tileBitmap");
        let grid_size = UVec2::new(
            item_number(node, "horizontalTileCount"),
            item_number(node, "verticalTileCount"),
        );
        let overlap: u32 = item_number(node, "overlap");
        let tile_count: u32 = item_number(node, "tileCount");
        let frame_rate = match item_number::<_, u32>(node, "frameRate") {
            0 => DEFAULT_FRAME_RATE,
            rate => rate,
        };
        let timing = FrameTiming::parse(&item_value(node, "frameTiming"));

        let image = if bitmap.is_empty() {
            String::new()
        } else {
            resolve_image_name(base_dir, &bitmap)
        };
        let set_id = if identifier.is_empty() {
            format!("{image}#{index}")
        } else {
            identifier.clone()
        };

        let primitives = if image.is_empty() {
            log::warn!("Tileset '{set_id}' has no tileBitmap, it will not draw");
            None
        } else {
            let request = GridAtlasRequest {
                image: &image,
                set_id: &set_id,
                tile_size,
                grid_size,
                tile_count,
                overlap,
            };
            match atlases.generate_grid(textures, &request) {
                AtlasOutcome::Created(range) | AtlasOutcome::AlreadyExists(range) => Some(range),
                AtlasOutcome::Failed(reason) => {
                    log::error!("Tileset '{set_id}' has no atlas: {reason}");
                    None
                }
            }
        };
        let image_size = textures
            .get(&image)
            .map(|info| info.original_size)
            .unwrap_or(UVec2::ZERO);

        let sequences = read_sequences(node, &set_id, frame_rate, timing);

        let maps = node
            .first_child("mapList")
            .map(|list| list.children("map"))
            .unwrap_or_default();
        let mut layer = match maps.get(map_index) {
            Some(map) => TileLayer::read_map(map, tile_size.as_vec2()),
            None => {
                log::warn!(
                    "Tileset '{}' has {} maps, map {} not found; using an empty map",
                    set_id,
                    maps.len(),
                    map_index
                );
                TileLayer::new(identifier.clone(), tile_size.as_vec2(), UVec2::ZERO)
            }
        };
        layer.depth = index;

        let set = Self {
            index,
            identifier,
            tile_size,
            image,
            image_size,
            grid_size,
            overlap,
            tile_count,
            atlas_id: primitives.map(|_| set_id.clone()),
            primitives,
            layer,
            sequences,
        };
        set.warn_dangling_references();
        log::info!(
            "Tileset '{}' loaded: depth {}, {}x{} cells, {} sequences",
            set_id,
            set.depth(),
            set.layer.grid_size().x,
            set.layer.grid_size().y,
            set.sequence_count()
        );
        set
    }

    /// Wrap an already-built map. `primitives` is the atlas its plain cells
    /// index into.
    pub fn from_layer(
        identifier: impl Into<String>,
        layer: TileLayer,
        primitives: Option<PrimitiveRange>,
    ) -> Self {
        let tile_size = layer.tile_size().as_uvec2();
        Self {
            index: layer.depth,
            identifier: identifier.into(),
            tile_size,
            image: String::new(),
            image_size: UVec2::ZERO,
            grid_size: UVec2::ZERO,
            overlap: 0,
            tile_count: primitives.map(|r| r.count.saturating_sub(1)).unwrap_or(0),
            atlas_id: None,
            primitives,
            layer,
            sequences: vec![None],
        }
    }

    /// A single layer laying out every tile of `texture_name` as a palette.
    pub fn generate_default(
        texture_name: &str,
        tile_size: UVec2,
        tile_count: u32,
        textures: &mut dyn TextureCache,
        atlases: &mut AtlasCache,
    ) -> Result<Self, String> {
        if tile_size.x == 0 || tile_size.y == 0 {
            return Err(format!(
                "Default tileset failed: tile size must be > 0 (got {}x{})",
                tile_size.x, tile_size.y
            ));
        }
        let columns = match textures.load_image(texture_name) {
            Ok(info) => (info.original_size.x / tile_size.x).max(1),
            Err(e) if atlases.debug_fallback() => {
                log::warn!("Default tileset texture unavailable ({e}), drawing outlines");
                square_columns(tile_count)
            }
            Err(e) => return Err(format!("Default tileset failed: {e}")),
        };
        let grid_size = UVec2::new(columns, tile_count.div_ceil(columns));

        let set_id = format!("default:{texture_name}");
        let request = GridAtlasRequest {
            image: texture_name,
            set_id: &set_id,
            tile_size,
            grid_size,
            tile_count,
            overlap: 0,
        };
        let primitives = match atlases.generate_grid(textures, &request) {
            AtlasOutcome::Created(range) | AtlasOutcome::AlreadyExists(range) => range,
            AtlasOutcome::Failed(reason) => return Err(format!("Default tileset failed: {reason}")),
        };

        let layer = TileLayer::generate(set_id.clone(), tile_size.as_vec2(), grid_size, |cell| {
            let tile = cell.y * columns + cell.x + 1;
            Cell::plain(if tile <= tile_count { tile } else { 0 })
        });

        Ok(Self {
            index: 0,
            identifier: set_id.clone(),
            tile_size,
            image: texture_name.to_string(),
            image_size: textures
                .get(texture_name)
                .map(|info| info.original_size)
                .unwrap_or(UVec2::ZERO),
            grid_size,
            overlap: 0,
            tile_count,
            atlas_id: Some(set_id),
            primitives: Some(primitives),
            layer,
            sequences: vec![None],
        })
    }

    pub fn depth(&self) -> i32 {
        self.layer.depth
    }

    pub fn map_size(&self) -> Vec2 {
        self.layer.map_size()
    }

    pub fn layer(&self) -> &TileLayer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut TileLayer {
        &mut self.layer
    }

    pub fn primitives(&self) -> Option<PrimitiveRange> {
        self.primitives
    }

    /// Set id of the atlas this set generated or shares.
    pub fn atlas_id(&self) -> Option<&str> {
        self.atlas_id.as_deref()
    }

    pub fn sequence(&self, index: usize) -> Option<&AnimatedSequence> {
        if index == 0 {
            return None;
        }
        self.sequences.get(index).and_then(Option::as_ref)
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.iter().flatten().count()
    }

    /// Install sequence `index`; 0 is reserved.
    pub fn set_sequence(&mut self, index: usize, sequence: AnimatedSequence) -> bool {
        if index == 0 || index > MAX_SEQUENCE_INDEX {
            return false;
        }
        if self.sequences.len() <= index {
            self.sequences.resize_with(index + 1, || None);
        }
        self.sequences[index] = Some(sequence);
        true
    }

    pub fn update(&mut self, elapsed_us: u64) {
        for sequence in self.sequences.iter_mut().flatten() {
            sequence.prepare(elapsed_us);
        }
    }

    pub fn render(
        &self,
        offset: Vec2,
        viewport: &Viewport,
        primitives: &PrimitiveArena,
        canvas: &mut dyn TileCanvas,
    ) -> usize {
        let Some(atlas) = self.primitives else {
            return 0;
        };
        let resources = LayerResources {
            primitives,
            atlas,
            sequences: &self.sequences,
        };
        self.layer.render(&resources, offset, viewport, canvas)
    }

    fn warn_dangling_references(&self) {
        let tiles = self.primitives.map(|r| r.count).unwrap_or(0);
        let mut bad_tiles = 0usize;
        let mut bad_sequences = 0usize;
        for cell in self.layer.cells() {
            match cell.kind {
                CellKind::Plain { tile } if tile != 0 && tile >= tiles => bad_tiles += 1,
                CellKind::Sequence { sequence } if self.sequence(sequence).is_none() => {
                    bad_sequences += 1
                }
                _ => {}
            }
        }
        if self.primitives.is_some() && bad_tiles > 0 {
            log::warn!(
                "Tileset '{}': {} cells reference tiles beyond {}, they will not draw",
                self.identifier,
                bad_tiles,
                tiles.saturating_sub(1)
            );
        }
        if bad_sequences > 0 {
            log::warn!(
                "Tileset '{}': {} cells reference undefined sequences",
                self.identifier,
                bad_sequences
            );
        }
    }
}

fn read_sequences<N: LevelNode>(
    node: &N,
    set_id: &str,
    frame_rate: u32,
    timing: FrameTiming,
) -> Vec<Option<AnimatedSequence>> {
    let declared: usize = item_number(node, "sequenceCount");
    let nodes = node
        .first_child("sequenceList")
        .map(|list| list.children("sequence"))
        .unwrap_or_default();

    let mut sequences: Vec<Option<AnimatedSequence>> = vec![None];
    for sequence_node in &nodes {
        let index: usize = item_number(sequence_node, "index");
        if index == 0 || index > MAX_SEQUENCE_INDEX {
            log::warn!("Tileset '{set_id}': skipping sequence with index {index}");
            continue;
        }
        let frames = sequence_node
            .first_child("frameList")
            .map(|list| list.children("frame"))
            .unwrap_or_default();
        if frames.is_empty() {
            log::warn!("Tileset '{set_id}': sequence {index} has no frames");
        }
        let sequence = AnimatedSequence::read_sequence(&frames, frame_rate).with_timing(timing);
        if sequences.len() <= index {
            sequences.resize_with(index + 1, || None);
        }
        if sequences[index].replace(sequence).is_some() {
            log::warn!("Tileset '{set_id}': sequence {index} defined twice, keeping the last");
        }
    }

    let loaded = sequences.iter().flatten().count();
    if declared != loaded {
        log::debug!("Tileset '{set_id}': sequenceCount is {declared} but {loaded} sequences loaded");
    }
    sequences
}

fn resolve_image_name(base_dir: &Path, bitmap: &str) -> String {
    if base_dir.as_os_str().is_empty() {
        return bitmap.to_string();
    }
    base_dir.join(bitmap).to_string_lossy().replace('\\', "/")
}

fn square_columns(tile_count: u32) -> u32 {
    (f64::from(tile_count).sqrt().ceil() as u32).max(1)
}
