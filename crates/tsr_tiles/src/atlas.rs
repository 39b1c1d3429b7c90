//! Atlas generation: slicing one image into per-tile draw primitives.
//!
//! Grid atlases reserve primitive 0 as the blank tile, so a layer cell with
//! tile number `k` maps straight onto `range.base + k`.

use glam::{UVec2, Vec2};
use std::collections::HashMap;

use crate::primitive::{DrawPrimitive, PrimitiveArena, PrimitiveRange, UvRect};
use crate::texture::{TextureCache, TextureInfo};

/// Color of untextured debug tiles.
pub const OUTLINE_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

#[derive(Debug, Clone, Copy)]
pub struct GridAtlasRequest<'a> {
    pub image: &'a str,
    pub set_id: &'a str,
    pub tile_size: UVec2,
    pub grid_size: UVec2,
    pub tile_count: u32,
    /// Pixels between adjacent tiles in the source image.
    pub overlap: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RegionAtlasRequest<'a> {
    pub image: &'a str,
    pub set_id: &'a str,
    pub positions: &'a [UVec2],
    pub sizes: &'a [UVec2],
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtlasOutcome {
    Created(PrimitiveRange),
    AlreadyExists(PrimitiveRange),
    Failed(String),
}

impl AtlasOutcome {
    pub fn primitives(&self) -> Option<PrimitiveRange> {
        match self {
            Self::Created(range) | Self::AlreadyExists(range) => Some(*range),
            Self::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtlasLayout {
    Grid {
        tile_size: UVec2,
        grid_size: UVec2,
        overlap: u32,
    },
    Regions,
}

#[derive(Debug, Clone)]
pub struct TileAtlas {
    pub image: String,
    /// `None` for untextured debug atlases.
    pub texture: Option<TextureInfo>,
    pub layout: AtlasLayout,
    pub tile_count: u32,
    pub primitives: PrimitiveRange,
}

impl TileAtlas {
    pub fn has_blank_tile(&self) -> bool {
        matches!(self.layout, AtlasLayout::Grid { .. })
    }

    pub fn is_textured(&self) -> bool {
        self.texture.is_some()
    }
}

/// Atlases keyed by set id, plus the arena their primitives live in.
#[derive(Debug, Default)]
pub struct AtlasCache {
    atlases: HashMap<String, TileAtlas>,
    primitives: PrimitiveArena,
    debug_fallback: bool,
}

impl AtlasCache {
    pub fn new(primitives: PrimitiveArena) -> Self {
        Self {
            atlases: HashMap::new(),
            primitives,
            debug_fallback: false,
        }
    }

    /// When enabled, a missing image produces outline primitives instead of a
    /// failed atlas.
    pub fn with_debug_fallback(mut self, enabled: bool) -> Self {
        self.debug_fallback = enabled;
        self
    }

    pub fn debug_fallback(&self) -> bool {
        self.debug_fallback
    }

    pub fn generate_grid(
        &mut self,
        textures: &mut dyn TextureCache,
        request: &GridAtlasRequest<'_>,
    ) -> AtlasOutcome {
        if let Some(existing) = self.atlases.get(request.set_id) {
            log::debug!("Atlas '{}' already generated", request.set_id);
            return AtlasOutcome::AlreadyExists(existing.primitives);
        }
        let checked = validate_grid(request).and_then(|()| {
            self.check_room(request.set_id, u64::from(request.tile_count) + 1)
        });
        if let Err(reason) = checked {
            log::error!("{reason}");
            return AtlasOutcome::Failed(reason);
        }

        let texture = match self.resolve_texture(textures, request.image, request.set_id) {
            Ok(texture) => texture,
            Err(reason) => return AtlasOutcome::Failed(reason),
        };
        let primitives = match texture {
            Some(info) => grid_primitives(request, info),
            None => outline_grid_primitives(request),
        };

        self.store(request.set_id, primitives, |range| TileAtlas {
            image: request.image.to_string(),
            texture,
            layout: AtlasLayout::Grid {
                tile_size: request.tile_size,
                grid_size: request.grid_size,
                overlap: request.overlap,
            },
            tile_count: request.tile_count,
            primitives: range,
        })
    }

    pub fn generate_regions(
        &mut self,
        textures: &mut dyn TextureCache,
        request: &RegionAtlasRequest<'_>,
    ) -> AtlasOutcome {
        if let Some(existing) = self.atlases.get(request.set_id) {
            log::debug!("Atlas '{}' already generated", request.set_id);
            return AtlasOutcome::AlreadyExists(existing.primitives);
        }
        let count = request.positions.len().min(request.sizes.len());
        if request.positions.len() != request.sizes.len() {
            log::warn!(
                "Atlas '{}': {} positions but {} sizes, using {}",
                request.set_id,
                request.positions.len(),
                request.sizes.len(),
                count
            );
        }
        if count == 0 {
            let reason = format!(
                "Atlas validation failed: '{}' has no regions",
                request.set_id
            );
            log::error!("{reason}");
            return AtlasOutcome::Failed(reason);
        }
        if let Err(reason) = self.check_room(request.set_id, count as u64) {
            log::error!("{reason}");
            return AtlasOutcome::Failed(reason);
        }

        let texture = match self.resolve_texture(textures, request.image, request.set_id) {
            Ok(texture) => texture,
            Err(reason) => return AtlasOutcome::Failed(reason),
        };
        let regions = request.positions.iter().zip(request.sizes).take(count);
        let primitives: Vec<DrawPrimitive> = match texture {
            Some(info) => {
                let extent = info.original_size.as_vec2();
                regions
                    .map(|(position, size)| DrawPrimitive::Textured {
                        texture: info.id,
                        uv: UvRect::from_pixels(position.as_vec2(), size.as_vec2(), extent),
                        size: size.as_vec2(),
                    })
                    .collect()
            }
            None => regions
                .map(|(_, size)| DrawPrimitive::Outline {
                    size: size.as_vec2(),
                    color: OUTLINE_COLOR,
                })
                .collect(),
        };

        self.store(request.set_id, primitives, |range| TileAtlas {
            image: request.image.to_string(),
            texture,
            layout: AtlasLayout::Regions,
            tile_count: range.count,
            primitives: range,
        })
    }

    pub fn get(&self, set_id: &str) -> Option<&TileAtlas> {
        self.atlases.get(set_id)
    }

    /// Drop an atlas and release its primitives.
    pub fn remove(&mut self, set_id: &str) -> bool {
        match self.atlases.remove(set_id) {
            Some(atlas) => {
                self.primitives.free(atlas.primitives);
                log::debug!("Atlas '{set_id}' released");
                true
            }
            None => false,
        }
    }

    pub fn primitives(&self) -> &PrimitiveArena {
        &self.primitives
    }

    pub fn len(&self) -> usize {
        self.atlases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atlases.is_empty()
    }

    /// Primitive blocks are built only once the arena could hold them.
    fn check_room(&self, set_id: &str, count: u64) -> Result<(), String> {
        let available = self.primitives.available();
        if count > u64::from(available) {
            return Err(format!(
                "Atlas '{set_id}' failed: needs {count} primitives but only {available} are free"
            ));
        }
        Ok(())
    }

    fn resolve_texture(
        &self,
        textures: &mut dyn TextureCache,
        image: &str,
        set_id: &str,
    ) -> Result<Option<TextureInfo>, String> {
        if self.debug_fallback && !textures.exists(image) {
            log::warn!("Atlas '{set_id}': image '{image}' missing, using untextured tiles");
            return Ok(None);
        }
        textures.load_image(image).map(Some).map_err(|e| {
            let reason = format!("Atlas '{set_id}' failed: {e}");
            log::error!("{reason}");
            reason
        })
    }

    fn store(
        &mut self,
        set_id: &str,
        primitives: Vec<DrawPrimitive>,
        build: impl FnOnce(PrimitiveRange) -> TileAtlas,
    ) -> AtlasOutcome {
        let Some(range) = self.primitives.allocate(primitives) else {
            let reason = format!("Atlas '{set_id}' failed: primitive allocation failed");
            log::error!("{reason}");
            return AtlasOutcome::Failed(reason);
        };
        let atlas = build(range);
        log::info!(
            "Atlas '{}' generated: {} tiles from '{}'{}",
            set_id,
            atlas.tile_count,
            atlas.image,
            if atlas.is_textured() { "" } else { " (untextured)" }
        );
        self.atlases.insert(set_id.to_string(), atlas);
        AtlasOutcome::Created(range)
    }
}

fn validate_grid(request: &GridAtlasRequest<'_>) -> Result<(), String> {
    if request.tile_size.x == 0 || request.tile_size.y == 0 {
        return Err(format!(
            "Atlas validation failed: '{}' tile size must be > 0 (got {}x{})",
            request.set_id, request.tile_size.x, request.tile_size.y
        ));
    }
    let cells = u64::from(request.grid_size.x) * u64::from(request.grid_size.y);
    if u64::from(request.tile_count) > cells {
        return Err(format!(
            "Atlas validation failed: '{}' declares {} tiles but the grid holds {}",
            request.set_id, request.tile_count, cells
        ));
    }
    Ok(())
}

fn grid_primitives(request: &GridAtlasRequest<'_>, info: TextureInfo) -> Vec<DrawPrimitive> {
    let extent = info.size.as_vec2();
    let tile = request.tile_size.as_vec2();
    let stride = (request.tile_size + UVec2::splat(request.overlap)).as_vec2();

    let mut primitives = Vec::with_capacity(request.tile_count as usize + 1);
    primitives.push(DrawPrimitive::Blank);
    for cell in 0..request.tile_count {
        let col = cell % request.grid_size.x;
        let row = cell / request.grid_size.x;
        let origin = Vec2::new(col as f32 * stride.x, row as f32 * stride.y);
        primitives.push(DrawPrimitive::Textured {
            texture: info.id,
            uv: UvRect::from_pixels(origin, tile, extent),
            size: tile,
        });
    }
    primitives
}

fn outline_grid_primitives(request: &GridAtlasRequest<'_>) -> Vec<DrawPrimitive> {
    let outline = DrawPrimitive::Outline {
        size: request.tile_size.as_vec2(),
        color: OUTLINE_COLOR,
    };
    std::iter::once(DrawPrimitive::Blank)
        .chain(std::iter::repeat(outline).take(request.tile_count as usize))
        .collect()
}
