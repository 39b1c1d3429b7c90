//! CPU-side quad batching for one frame of tile draws.
//!
//! Tiles arrive in layer order. Consecutive quads that sample the same texture
//! and occupy contiguous index ranges collapse into a single draw call, so a
//! layer drawn from one atlas costs one `draw_indexed`.

use glam::Vec2;
use tsr_tiles::{DrawCommand, DrawKind, TextureId, TileCanvas, UvRect};

use crate::vertex::TileVertex;

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const OUTLINE_THICKNESS: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchTexture {
    Atlas(TextureId),
    /// 1x1 white texture used for untextured quads.
    White,
}

/// A contiguous run of indices that share the same texture binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    pub texture: BatchTexture,
    pub index_start: u32,
    pub index_count: u32,
}

#[derive(Debug, Default)]
pub struct QuadBatch {
    vertices: Vec<TileVertex>,
    indices: Vec<u32>,
    draw_calls: Vec<DrawCall>,
}

impl QuadBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.draw_calls.clear();
    }

    /// Axis-aligned quad with its top-left corner at `position`.
    pub fn add_quad(
        &mut self,
        texture: BatchTexture,
        position: Vec2,
        size: Vec2,
        uv: UvRect,
        color: [f32; 4],
    ) {
        let base_index = self.vertices.len() as u32;
        let max = position + size;
        self.vertices.extend_from_slice(&[
            TileVertex::new(position, Vec2::new(uv.u0, uv.v0), color),
            TileVertex::new(Vec2::new(max.x, position.y), Vec2::new(uv.u1, uv.v0), color),
            TileVertex::new(max, Vec2::new(uv.u1, uv.v1), color),
            TileVertex::new(Vec2::new(position.x, max.y), Vec2::new(uv.u0, uv.v1), color),
        ]);

        let draw_start = self.indices.len() as u32;
        self.indices.extend_from_slice(&[
            base_index,
            base_index + 1,
            base_index + 2,
            base_index,
            base_index + 2,
            base_index + 3,
        ]);
        push_draw_call(&mut self.draw_calls, texture, draw_start, 6);
    }

    /// Rectangle outline as four thin quads.
    pub fn add_outline(&mut self, position: Vec2, size: Vec2, color: [f32; 4]) {
        let t = OUTLINE_THICKNESS.min(size.x * 0.5).min(size.y * 0.5);
        let full = UvRect {
            u0: 0.0,
            v0: 0.0,
            u1: 1.0,
            v1: 1.0,
        };
        let side_height = (size.y - 2.0 * t).max(0.0);
        let edges = [
            (position, Vec2::new(size.x, t)),
            (position + Vec2::new(0.0, size.y - t), Vec2::new(size.x, t)),
            (position + Vec2::new(0.0, t), Vec2::new(t, side_height)),
            (position + Vec2::new(size.x - t, t), Vec2::new(t, side_height)),
        ];
        for (origin, extent) in edges {
            self.add_quad(BatchTexture::White, origin, extent, full, color);
        }
    }

    pub fn vertices(&self) -> &[TileVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    pub fn quad_count(&self) -> usize {
        self.vertices.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Bind-group switches needed to issue the current draw calls in order.
    pub fn texture_binds(&self) -> usize {
        count_texture_binds(&self.draw_calls)
    }
}

impl TileCanvas for QuadBatch {
    fn draw(&mut self, command: DrawCommand) {
        match command.kind {
            DrawKind::Textured { texture, uv } => self.add_quad(
                BatchTexture::Atlas(texture),
                command.position,
                command.size,
                uv,
                WHITE,
            ),
            DrawKind::Outline { color } => self.add_outline(command.position, command.size, color),
        }
    }
}

fn push_draw_call(
    draw_calls: &mut Vec<DrawCall>,
    texture: BatchTexture,
    index_start: u32,
    index_count: u32,
) {
    if let Some(last) = draw_calls.last_mut() {
        let contiguous = last.index_start + last.index_count == index_start;
        if last.texture == texture && contiguous {
            last.index_count += index_count;
            return;
        }
    }
    draw_calls.push(DrawCall {
        texture,
        index_start,
        index_count,
    });
}

fn count_texture_binds(draw_calls: &[DrawCall]) -> usize {
    let mut binds = 0usize;
    let mut current: Option<BatchTexture> = None;
    for draw in draw_calls {
        if current != Some(draw.texture) {
            current = Some(draw.texture);
            binds += 1;
        }
    }
    binds
}
