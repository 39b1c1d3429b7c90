//! Animated tile sequences.
//!
//! Time is kept in integer microseconds so that advancing by many small steps
//! lands on exactly the same frame as one large step.

use glam::Vec2;
use tsr_core::level::{item_number, LevelNode};

use crate::primitive::{PrimitiveArena, PrimitiveRange, TileCanvas};

pub const DEFAULT_FRAME_RATE: u32 = 10;

/// How long each frame is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameTiming {
    /// Every frame lasts `1 / frame_rate` seconds.
    #[default]
    Uniform,
    /// Each frame lasts its own `frameDelay`; zero delays fall back to the
    /// uniform duration.
    PerFrame,
}

impl FrameTiming {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "perFrame" | "per_frame" => Self::PerFrame,
            "" | "uniform" => Self::Uniform,
            other => {
                log::warn!("Unknown frame timing '{other}', using uniform");
                Self::Uniform
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceFrame {
    pub tile: u32,
    pub delay_us: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimatedSequence {
    frames: Vec<SequenceFrame>,
    current_frame: usize,
    frame_time_us: u64,
    frame_us: u64,
    timing: FrameTiming,
}

impl AnimatedSequence {
    pub fn new(frames: Vec<SequenceFrame>, frame_rate: u32) -> Self {
        Self {
            frames,
            current_frame: 0,
            frame_time_us: 0,
            frame_us: frame_duration_us(frame_rate),
            timing: FrameTiming::Uniform,
        }
    }

    pub fn with_timing(mut self, timing: FrameTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Build from `frame` nodes carrying `frameDelay` (milliseconds) and
    /// `tileNumber`.
    pub fn read_sequence<N: LevelNode>(frame_nodes: &[N], frame_rate: u32) -> Self {
        let frames = frame_nodes
            .iter()
            .map(|node| SequenceFrame {
                tile: item_number(node, "tileNumber"),
                delay_us: item_number::<_, u64>(node, "frameDelay").saturating_mul(1_000),
            })
            .collect();
        Self::new(frames, frame_rate)
    }

    pub fn frames(&self) -> &[SequenceFrame] {
        &self.frames
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn current_tile(&self) -> Option<u32> {
        self.frames.get(self.current_frame).map(|f| f.tile)
    }

    pub fn frame_us(&self) -> u64 {
        self.frame_us
    }

    pub fn timing(&self) -> FrameTiming {
        self.timing
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn reset(&mut self) {
        self.current_frame = 0;
        self.frame_time_us = 0;
    }

    /// Advance the clock by `elapsed_us`.
    pub fn prepare(&mut self, elapsed_us: u64) {
        if self.frames.is_empty() {
            return;
        }
        self.frame_time_us = self.frame_time_us.saturating_add(elapsed_us);
        match self.timing {
            FrameTiming::Uniform => self.advance_uniform(),
            FrameTiming::PerFrame => self.advance_per_frame(),
        }
    }

    /// Draw the current frame's tile from `atlas` at `position`.
    pub fn render(
        &self,
        atlas: PrimitiveRange,
        position: Vec2,
        primitives: &PrimitiveArena,
        canvas: &mut dyn TileCanvas,
    ) -> bool {
        debug_assert!(self.frames.is_empty() || self.current_frame < self.frames.len());
        let Some(frame) = self.frames.get(self.current_frame) else {
            return false;
        };
        match atlas.get(frame.tile) {
            Some(id) => primitives.invoke(id, position, canvas),
            None => false,
        }
    }

    fn advance_uniform(&mut self) {
        let steps = self.frame_time_us / self.frame_us;
        self.frame_time_us %= self.frame_us;
        let len = self.frames.len() as u64;
        self.current_frame = ((self.current_frame as u64 + steps % len) % len) as usize;
    }

    fn advance_per_frame(&mut self) {
        // A full cycle returns to the same frame from any start.
        let cycle: u64 = self.frames.iter().map(|f| self.hold_us(f)).sum();
        if self.frame_time_us >= cycle {
            self.frame_time_us %= cycle;
        }
        loop {
            let hold = self.hold_us(&self.frames[self.current_frame]);
            if self.frame_time_us < hold {
                break;
            }
            self.frame_time_us -= hold;
            self.current_frame = (self.current_frame + 1) % self.frames.len();
        }
    }

    fn hold_us(&self, frame: &SequenceFrame) -> u64 {
        if frame.delay_us > 0 {
            frame.delay_us
        } else {
            self.frame_us
        }
    }
}

fn frame_duration_us(frame_rate: u32) -> u64 {
    let rate = if frame_rate == 0 {
        DEFAULT_FRAME_RATE
    } else {
        frame_rate
    };
    (1_000_000 / u64::from(rate)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{DrawCommand, DrawKind, DrawPrimitive, TextureId, UvRect};
    use tsr_core::LevelDocument;

    fn frames(tiles: &[u32]) -> Vec<SequenceFrame> {
        tiles
            .iter()
            .map(|&tile| SequenceFrame { tile, delay_us: 0 })
            .collect()
    }

    #[test]
    fn default_rate_holds_each_frame_100ms() {
        let mut seq = AnimatedSequence::new(frames(&[4, 5, 6]), 0);
        assert_eq!(seq.frame_us(), 100_000);
        seq.prepare(99_999);
        assert_eq!(seq.current_tile(), Some(4));
        seq.prepare(1);
        assert_eq!(seq.current_tile(), Some(5));
    }

    #[test]
    fn wraps_after_last_frame() {
        let mut seq = AnimatedSequence::new(frames(&[4, 5, 6]), 10);
        seq.prepare(300_000);
        assert_eq!(seq.current_frame(), 0);
        seq.prepare(250_000);
        assert_eq!(seq.current_frame(), 2);
    }

    #[test]
    fn split_and_single_steps_agree() {
        let total: u64 = 1_234_567;
        let mut single = AnimatedSequence::new(frames(&[1, 2, 3]), 10);
        single.prepare(total);

        let mut split = AnimatedSequence::new(frames(&[1, 2, 3]), 10);
        let parts = [16_667u64, 1, 99_999, 500_000, 3];
        let mut spent = 0;
        for part in parts {
            split.prepare(part);
            spent += part;
        }
        split.prepare(total - spent);

        let expected = ((total / 100_000) % 3) as usize;
        assert_eq!(single.current_frame(), expected);
        assert_eq!(split.current_frame(), expected);
    }

    #[test]
    fn huge_elapsed_time_stays_in_range() {
        let mut seq = AnimatedSequence::new(frames(&[1, 2, 3]), 60);
        seq.prepare(u64::MAX / 2);
        assert!(seq.current_frame() < 3);
        let mut per_frame = AnimatedSequence::new(frames(&[1, 2]), 60).with_timing(FrameTiming::PerFrame);
        per_frame.prepare(u64::MAX / 2);
        assert!(per_frame.current_frame() < 2);
    }

    #[test]
    fn per_frame_timing_honours_delays() {
        let mut seq = AnimatedSequence::new(
            vec![
                SequenceFrame { tile: 1, delay_us: 50_000 },
                SequenceFrame { tile: 2, delay_us: 0 },
                SequenceFrame { tile: 3, delay_us: 200_000 },
            ],
            10,
        )
        .with_timing(FrameTiming::PerFrame);

        seq.prepare(50_000);
        assert_eq!(seq.current_tile(), Some(2));
        seq.prepare(99_999);
        assert_eq!(seq.current_tile(), Some(2));
        seq.prepare(1);
        assert_eq!(seq.current_tile(), Some(3));
        // Full 350ms cycle lands back on the same frame.
        seq.prepare(350_000);
        assert_eq!(seq.current_tile(), Some(3));
        seq.prepare(200_000);
        assert_eq!(seq.current_tile(), Some(1));
    }

    #[test]
    fn empty_sequence_is_inert() {
        let mut seq = AnimatedSequence::new(Vec::new(), 10);
        seq.prepare(1_000_000);
        assert_eq!(seq.current_tile(), None);
        let mut arena = PrimitiveArena::default();
        let range = arena
            .allocate(vec![DrawPrimitive::Blank])
            .expect("allocates");
        let mut commands: Vec<DrawCommand> = Vec::new();
        assert!(!seq.render(range, Vec2::ZERO, &arena, &mut commands));
        assert!(commands.is_empty());
    }

    #[test]
    fn renders_current_frame_tile() {
        let mut arena = PrimitiveArena::default();
        let tiles: Vec<DrawPrimitive> = (0..4)
            .map(|t| DrawPrimitive::Textured {
                texture: TextureId(t),
                uv: UvRect::from_pixels(Vec2::ZERO, Vec2::ONE, Vec2::ONE),
                size: Vec2::splat(16.0),
            })
            .collect();
        let range = arena.allocate(tiles).expect("allocates");

        let mut seq = AnimatedSequence::new(frames(&[2, 3, 9]), 10);
        let mut commands: Vec<DrawCommand> = Vec::new();
        assert!(seq.render(range, Vec2::new(8.0, 8.0), &arena, &mut commands));
        seq.prepare(100_000);
        assert!(seq.render(range, Vec2::ZERO, &arena, &mut commands));
        seq.prepare(100_000);
        // Tile 9 is outside the atlas.
        assert!(!seq.render(range, Vec2::ZERO, &arena, &mut commands));

        let textures: Vec<_> = commands
            .iter()
            .map(|c| match c.kind {
                DrawKind::Textured { texture, .. } => texture,
                DrawKind::Outline { .. } => panic!("unexpected outline"),
            })
            .collect();
        assert_eq!(textures, vec![TextureId(2), TextureId(3)]);
        assert_eq!(commands[0].position, Vec2::new(8.0, 8.0));
    }

    #[test]
    fn read_sequence_parses_frames_in_order() {
        let doc = LevelDocument::from_json_str(
            r#"{ "frameList": { "frame": [
                { "frameDelay": "40", "tileNumber": "7" },
                { "frameDelay": 0, "tileNumber": 8 },
                { "tileNumber": "x" }
            ] } }"#,
        )
        .expect("parses");
        let nodes = doc
            .root()
            .first_child("frameList")
            .expect("frame list")
            .children("frame");
        let seq = AnimatedSequence::read_sequence(&nodes, 25);

        assert_eq!(seq.frame_us(), 40_000);
        assert_eq!(
            seq.frames(),
            &[
                SequenceFrame { tile: 7, delay_us: 40_000 },
                SequenceFrame { tile: 8, delay_us: 0 },
                SequenceFrame { tile: 0, delay_us: 0 },
            ]
        );
    }

    #[test]
    fn frame_timing_parses_known_names() {
        assert_eq!(FrameTiming::parse("perFrame"), FrameTiming::PerFrame);
        assert_eq!(FrameTiming::parse(""), FrameTiming::Uniform);
        assert_eq!(FrameTiming::parse("bouncy"), FrameTiming::Uniform);
    }
}
