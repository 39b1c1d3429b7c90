//! Precompiled per-tile draw primitives.
//!
//! An atlas is turned into a contiguous block of `DrawPrimitive`s once, at
//! load time. Rendering a tile is then a lookup by `PrimitiveId` plus a screen
//! position; the arena interprets the primitive and hands a `DrawCommand` to
//! whatever `TileCanvas` the frame is being built for (the GPU quad batcher in
//! the game, a plain `Vec` in tests).
//!
//! Id 0 is never handed out, mirroring the "0 means no list" convention of
//! display-list renderers.

use glam::Vec2;

pub const DEFAULT_PRIMITIVE_CAPACITY: u32 = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Normalized texture rectangle, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl UvRect {
    /// Normalize a pixel rectangle against an image extent.
    pub fn from_pixels(origin: Vec2, size: Vec2, extent: Vec2) -> Self {
        let norm = |v: f32, e: f32| if e > 0.0 { v / e } else { 0.0 };
        let max = origin + size;
        Self {
            u0: norm(origin.x, extent.x),
            v0: norm(origin.y, extent.y),
            u1: norm(max.x, extent.x),
            v1: norm(max.y, extent.y),
        }
    }

    pub fn width(&self) -> f32 {
        self.u1 - self.u0
    }

    pub fn height(&self) -> f32 {
        self.v1 - self.v0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawPrimitive {
    /// Reserved empty tile: occupies a cell, draws nothing.
    Blank,
    Textured {
        texture: TextureId,
        uv: UvRect,
        size: Vec2,
    },
    /// Untextured debug tile drawn as a line loop.
    Outline { size: Vec2, color: [f32; 4] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId(u32);

impl PrimitiveId {
    pub fn get(self) -> u32 {
        self.0
    }
}

/// A contiguous block of primitives: `base + 0 .. base + count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveRange {
    pub base: PrimitiveId,
    pub count: u32,
}

impl PrimitiveRange {
    pub fn get(&self, offset: u32) -> Option<PrimitiveId> {
        (offset < self.count).then(|| PrimitiveId(self.base.0 + offset))
    }

    pub fn contains(&self, id: PrimitiveId) -> bool {
        id.0 >= self.base.0 && id.0 - self.base.0 < self.count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawKind {
    Textured { texture: TextureId, uv: UvRect },
    Outline { color: [f32; 4] },
}

/// One tile-sized draw, in screen space (top-left origin, y down).
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub primitive: PrimitiveId,
    pub position: Vec2,
    pub size: Vec2,
    pub kind: DrawKind,
}

/// Receiver of draw commands for one frame.
pub trait TileCanvas {
    fn draw(&mut self, command: DrawCommand);
}

impl TileCanvas for Vec<DrawCommand> {
    fn draw(&mut self, command: DrawCommand) {
        self.push(command);
    }
}

/// Arena of compiled primitives addressed by `PrimitiveId`.
#[derive(Debug, Clone)]
pub struct PrimitiveArena {
    // Slot 0 is permanently empty.
    slots: Vec<Option<DrawPrimitive>>,
    capacity: u32,
}

impl PrimitiveArena {
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: vec![None],
            capacity,
        }
    }

    /// Store `primitives` contiguously. `None` when the block is empty or the
    /// handle space is exhausted.
    pub fn allocate(&mut self, primitives: Vec<DrawPrimitive>) -> Option<PrimitiveRange> {
        let count = u32::try_from(primitives.len()).ok()?;
        if count == 0 {
            return None;
        }

        let base = match self.find_free_run(primitives.len()) {
            Some(start) => start,
            None => {
                let used = self.slots.len() as u64 - 1;
                if used + u64::from(count) > u64::from(self.capacity) {
                    log::error!(
                        "Primitive allocation of {} failed: {} of {} handles in use",
                        count,
                        self.live_count(),
                        self.capacity
                    );
                    return None;
                }
                let start = self.slots.len();
                self.slots.resize(start + primitives.len(), None);
                start
            }
        };

        for (slot, primitive) in self.slots[base..base + primitives.len()]
            .iter_mut()
            .zip(primitives)
        {
            *slot = Some(primitive);
        }

        Some(PrimitiveRange {
            base: PrimitiveId(base as u32),
            count,
        })
    }

    pub fn free(&mut self, range: PrimitiveRange) {
        let start = range.base.0 as usize;
        let end = (start + range.count as usize).min(self.slots.len());
        for slot in self.slots.iter_mut().take(end).skip(start.max(1)) {
            *slot = None;
        }
    }

    pub fn get(&self, id: PrimitiveId) -> Option<&DrawPrimitive> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Execute primitive `id` with its top-left corner at `position`.
    /// Returns whether anything was drawn.
    pub fn invoke(&self, id: PrimitiveId, position: Vec2, canvas: &mut dyn TileCanvas) -> bool {
        let Some(primitive) = self.get(id) else {
            log::trace!("Primitive {} is not allocated", id.0);
            return false;
        };
        let (size, kind) = match primitive {
            DrawPrimitive::Blank => return false,
            DrawPrimitive::Textured { texture, uv, size } => (
                *size,
                DrawKind::Textured {
                    texture: *texture,
                    uv: *uv,
                },
            ),
            DrawPrimitive::Outline { size, color } => (*size, DrawKind::Outline { color: *color }),
        };
        canvas.draw(DrawCommand {
            primitive: id,
            position,
            size,
            kind,
        });
        true
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Handles not currently in use. A block larger than this can never be
    /// allocated.
    pub fn available(&self) -> u32 {
        let live = u32::try_from(self.live_count()).unwrap_or(u32::MAX);
        self.capacity.saturating_sub(live)
    }

    fn find_free_run(&self, len: usize) -> Option<usize> {
        let mut run_start = 1;
        let mut run_len = 0;
        for (i, slot) in self.slots.iter().enumerate().skip(1) {
            if slot.is_some() {
                run_start = i + 1;
                run_len = 0;
                continue;
            }
            run_len += 1;
            if run_len == len {
                return Some(run_start);
            }
        }
        None
    }
}

impl Default for PrimitiveArena {
    fn default() -> Self {
        Self::new(DEFAULT_PRIMITIVE_CAPACITY)
    }
}
