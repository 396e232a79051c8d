/// Shader stages and stage masks

use bitflags::bitflags;

/// Programmable pipeline stage
///
/// Each pass binds at most one GPU program per stage. The discriminant is
/// the stage's fixed slot index in per-pass arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex = 0,
    /// Fragment/Pixel shader
    Fragment = 1,
    /// Geometry shader
    Geometry = 2,
    /// Hull/Tessellation control shader
    Hull = 3,
    /// Domain/Tessellation evaluation shader
    Domain = 4,
    /// Compute shader
    Compute = 5,
}

/// Number of shader stages a pass can bind
pub const SHADER_STAGE_COUNT: usize = 6;

impl ShaderStage {
    /// All stages, in binding order
    pub const ALL: [ShaderStage; SHADER_STAGE_COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::Fragment,
        ShaderStage::Geometry,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Compute,
    ];

    /// Slot index of this stage in per-pass arrays
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stage flag for this stage
    pub fn flag(self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Geometry => ShaderStageFlags::GEOMETRY,
            ShaderStage::Hull => ShaderStageFlags::HULL,
            ShaderStage::Domain => ShaderStageFlags::DOMAIN,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
        }
    }
}

bitflags! {
    /// Set of shader stages
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0x01;
        const FRAGMENT = 0x02;
        const GEOMETRY = 0x04;
        const HULL = 0x08;
        const DOMAIN = 0x10;
        const COMPUTE = 0x20;
        const VERTEX_FRAGMENT = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

impl ShaderStageFlags {
    /// Build a mask from a list of stages
    pub fn from_stages(stages: &[ShaderStage]) -> Self {
        stages.iter().fold(Self::empty(), |flags, stage| flags | stage.flag())
    }
}
