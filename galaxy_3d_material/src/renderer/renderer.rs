/// Renderer trait - buffer-creation capability used by materials

use crate::error::Result;
use crate::renderer::{Buffer, BufferDesc};

/// Main renderer trait
///
/// Implemented by backend-specific renderers. Materials only use it to
/// allocate constant buffers for their parameter blocks and to pick the
/// technique matching the active graphics API.
pub trait Renderer: Send + Sync {
    /// Name of the graphics API this renderer drives (e.g. "vulkan")
    ///
    /// Matched against `Technique::render_api()` when a material picks
    /// the best technique of its shader.
    fn api_name(&self) -> &str;

    /// Create a GPU-visible constant buffer
    ///
    /// # Arguments
    ///
    /// * `desc` - Buffer size in bytes and usage hint
    ///
    /// # Returns
    ///
    /// The created buffer, exclusively owned by the caller. The GPU
    /// resource is destroyed when the returned box is dropped.
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<Box<dyn Buffer>>;
}
