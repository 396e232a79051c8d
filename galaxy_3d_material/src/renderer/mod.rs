/// Renderer module - backend-facing traits consumed by the material system
///
/// The material system never talks to a graphics API directly. It only needs
/// a way to create constant buffers, and opaque texture/sampler references
/// it can cache and hand over to bound parameter sets.

pub mod renderer;
pub mod buffer;
pub mod texture;
pub mod sampler;
pub mod shader_stage;

pub use renderer::*;
pub use buffer::*;
pub use texture::*;
pub use sampler::*;
pub use shader_stage::*;

// Mock renderer for tests (no GPU required)
#[cfg(test)]
pub mod mock_renderer;
