/// Buffer trait and buffer descriptor

use crate::error::Result;

/// Buffer usage hint
///
/// Tells the backend how often the CPU is expected to rewrite the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    /// Written rarely (material constants)
    #[default]
    Static,
    /// Rewritten often, possibly every frame
    Dynamic,
}

/// Descriptor for creating a constant buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Usage hint
    pub usage: BufferUsage,
}

/// Constant buffer resource trait
///
/// Implemented by backend-specific buffer types.
/// The buffer is automatically destroyed when dropped.
pub trait Buffer: Send + Sync {
    /// Upload data into the buffer
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset into the buffer in bytes
    /// * `data` - Data to write
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Size of the buffer in bytes
    fn size(&self) -> u64;
}
