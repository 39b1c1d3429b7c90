//! Tile engine core: atlases, animated sequences, tile maps and parallax
//! scene composition.
//!
//! Nothing here talks to the GPU. Atlases compile into `DrawPrimitive`s held
//! in a `PrimitiveArena`; rendering walks the visible cells and emits
//! `DrawCommand`s into a `TileCanvas`.

pub mod atlas;
pub mod layer;
pub mod primitive;
pub mod scene;
pub mod sequence;
pub mod texture;
pub mod tileset;

pub use atlas::{AtlasCache, AtlasOutcome, GridAtlasRequest, RegionAtlasRequest, TileAtlas};
pub use layer::{Cell, CellKind, TileLayer, TileSpan, MAX_MAP_CELLS};
pub use primitive::{
    DrawCommand, DrawKind, DrawPrimitive, PrimitiveArena, PrimitiveId, PrimitiveRange, TextureId,
    TileCanvas, UvRect,
};
pub use scene::{clamp_scroll, parallax_ratio, TileScene};
pub use sequence::{AnimatedSequence, FrameTiming, SequenceFrame};
pub use texture::{TextureCache, TextureInfo};
pub use tileset::TileSet;
