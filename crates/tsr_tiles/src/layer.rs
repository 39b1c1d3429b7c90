//! A rectangular grid of tile cells and its visible-window renderer.

use glam::{UVec2, Vec2};
use tsr_core::level::{item_number, item_value, LevelNode};
use tsr_core::Viewport;

use crate::primitive::{PrimitiveArena, PrimitiveRange, TileCanvas};
use crate::sequence::AnimatedSequence;

/// Largest grid a layer will allocate; bigger maps load as empty layers.
pub const MAX_MAP_CELLS: usize = 1 << 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Atlas tile `tile`; 0 is the blank tile.
    Plain { tile: u32 },
    /// Animated sequence `sequence` (always >= 1).
    Sequence { sequence: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub kind: CellKind,
    /// Collision flags, carried but not interpreted here.
    pub bounds: u32,
    /// Gameplay code, carried but not interpreted here.
    pub map_code: u32,
}

impl Default for Cell {
    fn default() -> Self {
        Self::plain(0)
    }
}

impl Cell {
    pub fn plain(tile: u32) -> Self {
        Self {
            kind: CellKind::Plain { tile },
            bounds: 0,
            map_code: 0,
        }
    }

    pub fn sequence(sequence: usize) -> Self {
        Self {
            kind: CellKind::Sequence { sequence },
            bounds: 0,
            map_code: 0,
        }
    }

    /// Decode the level-file tile number: negative values name sequences.
    pub fn from_signed(tile_number: i32, bounds: u32, map_code: u32) -> Self {
        let kind = if tile_number < 0 {
            CellKind::Sequence {
                sequence: tile_number.unsigned_abs() as usize,
            }
        } else {
            CellKind::Plain {
                tile: tile_number as u32,
            }
        };
        Self {
            kind,
            bounds,
            map_code,
        }
    }

    pub fn to_signed(&self) -> i32 {
        match self.kind {
            CellKind::Plain { tile } => i32::try_from(tile).unwrap_or(i32::MAX),
            CellKind::Sequence { sequence } => -i32::try_from(sequence).unwrap_or(i32::MAX),
        }
    }
}

/// Inclusive range of visible cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpan {
    pub start: UVec2,
    pub end: UVec2,
}

impl TileSpan {
    pub fn columns(&self) -> u32 {
        self.end.x - self.start.x + 1
    }

    pub fn rows(&self) -> u32 {
        self.end.y - self.start.y + 1
    }

    pub fn cell_count(&self) -> u32 {
        self.columns() * self.rows()
    }

    pub fn contains(&self, cell: UVec2) -> bool {
        cell.cmpge(self.start).all() && cell.cmple(self.end).all()
    }
}

/// What a layer needs to turn cells into draws.
#[derive(Debug, Clone, Copy)]
pub struct LayerResources<'a> {
    pub primitives: &'a PrimitiveArena,
    pub atlas: PrimitiveRange,
    /// Indexed by sequence number; slot 0 is unused.
    pub sequences: &'a [Option<AnimatedSequence>],
}

impl<'a> LayerResources<'a> {
    pub fn sequence(&self, index: usize) -> Option<&'a AnimatedSequence> {
        if index == 0 {
            return None;
        }
        self.sequences.get(index).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone)]
pub struct TileLayer {
    pub identifier: String,
    pub index: i32,
    /// Draw order; lower depths are drawn first.
    pub depth: i32,
    tile_size: Vec2,
    grid_size: UVec2,
    cells: Vec<Cell>,
}

impl TileLayer {
    pub fn new(identifier: impl Into<String>, tile_size: Vec2, grid_size: UVec2) -> Self {
        Self::from_cells(identifier, tile_size, grid_size, Vec::new())
    }

    /// Row-major cells. Short lists are padded with blank cells and long ones
    /// truncated to `width * height`. Grids over `MAX_MAP_CELLS` give an
    /// empty layer.
    pub fn from_cells(
        identifier: impl Into<String>,
        tile_size: Vec2,
        grid_size: UVec2,
        mut cells: Vec<Cell>,
    ) -> Self {
        let identifier = identifier.into();
        let Some(expected) = checked_cell_count(&identifier, grid_size) else {
            return Self::empty(identifier, tile_size);
        };
        if !cells.is_empty() && cells.len() != expected {
            log::warn!(
                "Map '{}' has {} cells for a {}x{} grid, {} to fit",
                identifier,
                cells.len(),
                grid_size.x,
                grid_size.y,
                if cells.len() < expected { "padding" } else { "truncating" }
            );
        }
        cells.resize(expected, Cell::default());
        Self {
            identifier,
            index: 0,
            depth: 0,
            tile_size,
            grid_size,
            cells,
        }
    }

    /// Fill a `grid_size` map cell by cell.
    pub fn generate(
        identifier: impl Into<String>,
        tile_size: Vec2,
        grid_size: UVec2,
        mut fill: impl FnMut(UVec2) -> Cell,
    ) -> Self {
        let identifier = identifier.into();
        if checked_cell_count(&identifier, grid_size).is_none() {
            return Self::empty(identifier, tile_size);
        }
        let cells = (0..grid_size.y)
            .flat_map(|y| (0..grid_size.x).map(move |x| UVec2::new(x, y)))
            .map(&mut fill)
            .collect();
        Self::from_cells(identifier, tile_size, grid_size, cells)
    }

    /// Read a `map` node: `identifier`, `index`, `width`, `height` and a
    /// `cellList` of `cell { tileNumber, bounds, mapCode }`.
    pub fn read_map<N: LevelNode>(node: &N, tile_size: Vec2) -> Self {
        let grid_size = UVec2::new(item_number(node, "width"), item_number(node, "height"));
        let cells: Vec<Cell> = node
            .first_child("cellList")
            .map(|list| list.children("cell"))
            .unwrap_or_default()
            .iter()
            .map(|cell| {
                Cell::from_signed(
                    item_number(cell, "tileNumber"),
                    item_number(cell, "bounds"),
                    item_number(cell, "mapCode"),
                )
            })
            .collect();

        let mut layer = Self::from_cells(item_value(node, "identifier"), tile_size, grid_size, cells);
        layer.index = item_number(node, "index");
        layer
    }

    fn empty(identifier: String, tile_size: Vec2) -> Self {
        Self {
            identifier,
            index: 0,
            depth: 0,
            tile_size,
            grid_size: UVec2::ZERO,
            cells: Vec::new(),
        }
    }

    pub fn tile_size(&self) -> Vec2 {
        self.tile_size
    }

    pub fn grid_size(&self) -> UVec2 {
        self.grid_size
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, x: u32, y: u32) -> Option<&Cell> {
        self.cell_index(x, y).map(|i| &self.cells[i])
    }

    pub fn set_cell(&mut self, x: u32, y: u32, cell: Cell) -> bool {
        match self.cell_index(x, y) {
            Some(i) => {
                self.cells[i] = cell;
                true
            }
            None => false,
        }
    }

    /// Pixel size of the whole map.
    pub fn map_size(&self) -> Vec2 {
        self.grid_size.as_vec2() * self.tile_size
    }

    /// Cells whose window covers the viewport at `offset`, or `None` when the
    /// layer or the viewport is empty.
    pub fn visible_span(&self, offset: Vec2, viewport: &Viewport) -> Option<TileSpan> {
        let effective = self.screen_origin(offset, viewport) - viewport.position;
        let (x0, x1) = axis_span(effective.x, viewport.size.x, self.tile_size.x, self.grid_size.x)?;
        let (y0, y1) = axis_span(effective.y, viewport.size.y, self.tile_size.y, self.grid_size.y)?;
        Some(TileSpan {
            start: UVec2::new(x0, y0),
            end: UVec2::new(x1, y1),
        })
    }

    /// Screen position of cell (0, 0). Axes where the map fits inside the
    /// viewport are centered and ignore `offset`.
    pub fn screen_origin(&self, offset: Vec2, viewport: &Viewport) -> Vec2 {
        let map = self.map_size();
        let axis = |offset: f32, position: f32, size: f32, map: f32| {
            if map <= size {
                position + (size - map) / 2.0
            } else {
                position + offset
            }
        };
        Vec2::new(
            axis(offset.x, viewport.position.x, viewport.size.x, map.x),
            axis(offset.y, viewport.position.y, viewport.size.y, map.y),
        )
    }

    /// Draw the visible window; returns the number of tiles drawn.
    pub fn render(
        &self,
        resources: &LayerResources<'_>,
        offset: Vec2,
        viewport: &Viewport,
        canvas: &mut dyn TileCanvas,
    ) -> usize {
        let Some(span) = self.visible_span(offset, viewport) else {
            return 0;
        };
        let origin = self.screen_origin(offset, viewport);
        let width = self.grid_size.x as usize;
        let mut drawn = 0;

        for row in span.start.y..=span.end.y {
            let row_start = row as usize * width;
            let Some(cells) = self
                .cells
                .get(row_start + span.start.x as usize..=row_start + span.end.x as usize)
            else {
                break;
            };
            let mut position = origin + Vec2::new(span.start.x as f32, row as f32) * self.tile_size;
            for cell in cells {
                let visible = match cell.kind {
                    CellKind::Plain { tile } => resources
                        .atlas
                        .get(tile)
                        .is_some_and(|id| resources.primitives.invoke(id, position, canvas)),
                    CellKind::Sequence { sequence } => {
                        resources.sequence(sequence).is_some_and(|seq| {
                            seq.render(resources.atlas, position, resources.primitives, canvas)
                        })
                    }
                };
                if visible {
                    drawn += 1;
                }
                position.x += self.tile_size.x;
            }
        }
        drawn
    }

    fn cell_index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.grid_size.x && y < self.grid_size.y)
            .then(|| y as usize * self.grid_size.x as usize + x as usize)
    }
}

fn checked_cell_count(identifier: &str, grid_size: UVec2) -> Option<usize> {
    let count = (grid_size.x as usize)
        .checked_mul(grid_size.y as usize)
        .filter(|&count| count <= MAX_MAP_CELLS);
    if count.is_none() {
        log::error!(
            "Map '{}' grid {}x{} exceeds {} cells, loading it empty",
            identifier,
            grid_size.x,
            grid_size.y,
            MAX_MAP_CELLS
        );
    }
    count
}

/// Inclusive first/last cell on one axis. Rounding happens in f64 and the
/// clamp in integers so the end never passes the last cell.
fn axis_span(offset: f32, viewport: f32, tile: f32, cells: u32) -> Option<(u32, u32)> {
    if cells == 0 || tile <= 0.0 || viewport <= 0.0 || !offset.is_finite() {
        return None;
    }
    let (offset, viewport, tile) = (f64::from(offset), f64::from(viewport), f64::from(tile));
    let count = i64::from(cells);
    let shown = ((viewport / tile).ceil() as i64).min(count);
    let start = ((-offset / tile).floor() as i64).clamp(0, count - shown);
    let end = (((viewport - offset) / tile).ceil() as i64).clamp(0, count - 1);
    Some((start as u32, end.max(start) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{DrawCommand, DrawPrimitive, TextureId, UvRect};
    use tsr_core::LevelDocument;

    fn numbered_layer(grid: UVec2) -> TileLayer {
        TileLayer::generate("numbered", Vec2::splat(32.0), grid, |cell| {
            Cell::plain(cell.y * grid.x + cell.x + 1)
        })
    }

    fn atlas(arena: &mut PrimitiveArena, tiles: u32) -> PrimitiveRange {
        let prims = std::iter::once(DrawPrimitive::Blank)
            .chain((1..=tiles).map(|t| DrawPrimitive::Textured {
                texture: TextureId(t),
                uv: UvRect::from_pixels(Vec2::ZERO, Vec2::ONE, Vec2::ONE),
                size: Vec2::splat(32.0),
            }))
            .collect();
        arena.allocate(prims).expect("allocates")
    }

    #[test]
    fn signed_tile_numbers_round_trip() {
        assert_eq!(Cell::from_signed(5, 1, 2).kind, CellKind::Plain { tile: 5 });
        assert_eq!(Cell::from_signed(-3, 0, 0).kind, CellKind::Sequence { sequence: 3 });
        assert_eq!(Cell::from_signed(-3, 0, 0).to_signed(), -3);
        assert_eq!(Cell::from_signed(i32::MIN, 0, 0).kind, CellKind::Sequence { sequence: 2_147_483_648 });
    }

    #[test]
    fn cell_lists_are_padded_or_truncated() {
        let short = TileLayer::from_cells("s", Vec2::ONE, UVec2::new(2, 2), vec![Cell::plain(3)]);
        assert_eq!(short.cells().len(), 4);
        assert_eq!(short.cell(1, 1), Some(&Cell::plain(0)));

        let long = TileLayer::from_cells("l", Vec2::ONE, UVec2::new(1, 1), vec![Cell::plain(1); 5]);
        assert_eq!(long.cells().len(), 1);
        assert_eq!(long.cell(1, 0), None);
    }

    #[test]
    fn visible_span_at_origin_covers_one_extra_cell() {
        let layer = numbered_layer(UVec2::new(100, 100));
        let span = layer
            .visible_span(Vec2::ZERO, &Viewport::new(0.0, 0.0, 640.0, 480.0))
            .expect("visible");
        assert_eq!(span.start, UVec2::ZERO);
        assert_eq!(span.end, UVec2::new(20, 15));
        assert_eq!(span.columns(), 21);
    }

    #[test]
    fn visible_span_follows_offset_and_clamps_at_far_edge() {
        let layer = numbered_layer(UVec2::new(100, 100));
        let viewport = Viewport::new(0.0, 0.0, 640.0, 480.0);

        let span = layer.visible_span(Vec2::new(-48.0, -16.0), &viewport).expect("visible");
        assert_eq!(span.start, UVec2::new(1, 0));
        assert_eq!(span.end, UVec2::new(22, 16));

        let far = layer
            .visible_span(Vec2::new(-2560.0, -2720.0), &viewport)
            .expect("visible");
        assert_eq!(far.start, UVec2::new(80, 85));
        assert_eq!(far.end, UVec2::new(99, 99));
    }

    #[test]
    fn span_end_stays_inside_very_wide_grids() {
        let cells = 33_554_435;
        let (start, end) = axis_span(-33_554_400.0, 64.0, 1.0, cells).expect("visible");
        assert_eq!(end, cells - 1);
        assert_eq!(start, cells - 64);

        let (start, end) = axis_span(-1.0e12, 640.0, 32.0, u32::MAX).expect("visible");
        assert_eq!(end, u32::MAX - 1);
        assert_eq!(start, u32::MAX - 20);
    }

    #[test]
    fn oversized_grids_load_as_empty_layers() {
        let doc = LevelDocument::from_json_str(
            r#"{ "identifier": "huge", "index": "1", "width": "4294967295", "height": "4294967295",
                 "cellList": { "cell": [ { "tileNumber": "1" } ] } }"#,
        )
        .expect("parses");
        let layer = TileLayer::read_map(&doc.root(), Vec2::splat(16.0));
        assert_eq!(layer.identifier, "huge");
        assert_eq!(layer.index, 1);
        assert_eq!(layer.grid_size(), UVec2::ZERO);
        assert!(layer.cells().is_empty());
        assert!(layer
            .visible_span(Vec2::ZERO, &Viewport::new(0.0, 0.0, 64.0, 64.0))
            .is_none());

        let wide = TileLayer::generate("wide", Vec2::ONE, UVec2::new(200_000, 200_000), |_| {
            panic!("oversized grid must not be filled")
        });
        assert!(wide.cells().is_empty());

        assert_eq!(checked_cell_count("limit", UVec2::new(2048, 2048)), Some(MAX_MAP_CELLS));
        assert_eq!(checked_cell_count("over", UVec2::new(2049, 2048)), None);
    }

    #[test]
    fn empty_layer_or_viewport_has_no_span() {
        let empty = TileLayer::new("e", Vec2::splat(32.0), UVec2::ZERO);
        assert!(empty.visible_span(Vec2::ZERO, &Viewport::new(0.0, 0.0, 64.0, 64.0)).is_none());
        let layer = numbered_layer(UVec2::new(4, 4));
        assert!(layer.visible_span(Vec2::ZERO, &Viewport::default()).is_none());
    }

    #[test]
    fn small_map_is_centered_and_fully_visible() {
        let layer = numbered_layer(UVec2::new(4, 2));
        let viewport = Viewport::new(10.0, 20.0, 256.0, 256.0);
        assert_eq!(
            layer.screen_origin(Vec2::new(-500.0, 0.0), &viewport),
            Vec2::new(10.0 + 64.0, 20.0 + 96.0)
        );
        let span = layer.visible_span(Vec2::ZERO, &viewport).expect("visible");
        assert_eq!(span.start, UVec2::ZERO);
        assert_eq!(span.end, UVec2::new(3, 1));
    }

    #[test]
    fn render_places_tiles_on_the_grid() {
        let mut arena = PrimitiveArena::default();
        let range = atlas(&mut arena, 16);
        let layer = numbered_layer(UVec2::new(4, 4));
        let resources = LayerResources {
            primitives: &arena,
            atlas: range,
            sequences: &[],
        };
        let mut commands: Vec<DrawCommand> = Vec::new();
        let drawn = layer.render(&resources, Vec2::ZERO, &Viewport::new(0.0, 0.0, 128.0, 128.0), &mut commands);

        assert_eq!(drawn, 16);
        assert_eq!(commands[0].position, Vec2::ZERO);
        assert_eq!(commands[5].position, Vec2::new(32.0, 32.0));
        assert_eq!(commands[5].primitive, range.get(6).expect("tile 6"));
    }

    #[test]
    fn render_skips_blank_and_out_of_range_cells() {
        let mut arena = PrimitiveArena::default();
        let range = atlas(&mut arena, 2);
        let layer = TileLayer::from_cells(
            "mixed",
            Vec2::splat(32.0),
            UVec2::new(4, 1),
            vec![Cell::plain(0), Cell::plain(2), Cell::plain(9), Cell::sequence(1)],
        );
        let resources = LayerResources {
            primitives: &arena,
            atlas: range,
            sequences: &[None],
        };
        let mut commands: Vec<DrawCommand> = Vec::new();
        let drawn = layer.render(&resources, Vec2::ZERO, &Viewport::new(0.0, 0.0, 128.0, 32.0), &mut commands);
        assert_eq!(drawn, 1);
        assert_eq!(commands[0].position, Vec2::new(32.0, 0.0));
    }

    #[test]
    fn sequence_cells_draw_current_frame() {
        let mut arena = PrimitiveArena::default();
        let range = atlas(&mut arena, 4);
        let sequence = AnimatedSequence::new(
            vec![crate::sequence::SequenceFrame { tile: 3, delay_us: 0 }],
            10,
        );
        let sequences = [None, Some(sequence)];
        let layer = TileLayer::from_cells("anim", Vec2::splat(32.0), UVec2::new(1, 1), vec![Cell::sequence(1)]);
        let resources = LayerResources {
            primitives: &arena,
            atlas: range,
            sequences: &sequences,
        };
        let mut commands: Vec<DrawCommand> = Vec::new();
        assert_eq!(layer.render(&resources, Vec2::ZERO, &Viewport::new(0.0, 0.0, 64.0, 64.0), &mut commands), 1);
        assert_eq!(commands[0].primitive, range.get(3).expect("tile 3"));
    }

    #[test]
    fn read_map_reads_grid_and_cells() {
        let doc = LevelDocument::from_json_str(
            r#"{ "identifier": "ground", "index": "2", "width": "2", "height": "2",
                 "cellList": { "cell": [
                    { "tileNumber": "1", "bounds": "3", "mapCode": "7" },
                    { "tileNumber": "-2" },
                    { "tileNumber": "0" }
                 ] } }"#,
        )
        .expect("parses");
        let layer = TileLayer::read_map(&doc.root(), Vec2::splat(16.0));
        assert_eq!(layer.identifier, "ground");
        assert_eq!(layer.index, 2);
        assert_eq!(layer.grid_size(), UVec2::new(2, 2));
        assert_eq!(layer.map_size(), Vec2::splat(32.0));
        assert_eq!(
            layer.cell(0, 0),
            Some(&Cell { kind: CellKind::Plain { tile: 1 }, bounds: 3, map_code: 7 })
        );
        assert_eq!(layer.cell(1, 0).map(|c| c.kind), Some(CellKind::Sequence { sequence: 2 }));
        assert_eq!(layer.cell(1, 1), Some(&Cell::default()));
    }

    #[test]
    fn set_cell_rejects_out_of_bounds() {
        let mut layer = numbered_layer(UVec2::new(2, 2));
        assert!(layer.set_cell(1, 1, Cell::sequence(4)));
        assert!(!layer.set_cell(2, 0, Cell::plain(1)));
        assert_eq!(layer.cell(1, 1).map(Cell::to_signed), Some(-4));
    }
}
