//! Engine-wide building blocks shared by the tile renderer and the shell:
//! input tracking, the fixed-step clock, screen geometry, level-description
//! node access and resource byte sources.

pub mod geometry;
pub mod input;
pub mod level;
pub mod resource;
pub mod time;

pub use geometry::Viewport;
pub use level::{LevelDocument, LevelNode};
pub use resource::{DirectorySource, MemorySource, ResourceSource};
