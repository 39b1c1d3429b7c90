pub mod batch;
pub mod camera;
pub mod gpu_context;
pub mod texture;
pub mod texture_cache;
pub mod tile_pipeline;
pub mod vertex;

pub use batch::{BatchTexture, DrawCall, QuadBatch};
pub use camera::{CameraUniform, ScreenCamera};
pub use gpu_context::GpuContext;
pub use texture::GpuTexture;
pub use texture_cache::{DecodedImage, ImageTextureCache};
pub use tile_pipeline::TilePipeline;
pub use vertex::TileVertex;
