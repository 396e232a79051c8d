/// Texture trait and texture info
///
/// Materials treat textures as opaque references: they cache them and pass
/// them to every bound parameter set that samples the matching variable.

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
    Cube,
}

/// Read-only properties of a created texture
#[derive(Debug, Clone)]
pub struct TextureInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Dimensionality
    pub dimension: TextureDimension,
}

/// Texture resource trait
///
/// Implemented by backend-specific texture types.
pub trait Texture: Send + Sync {
    /// Get texture properties
    fn info(&self) -> &TextureInfo;
}
