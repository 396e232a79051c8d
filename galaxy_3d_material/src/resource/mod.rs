//! Material resources
//!
//! Shaders, techniques and GPU program layouts describe what a material
//! can bind; `Material` resolves them and owns the resulting buffers.

pub mod gpu_program;
pub mod technique;
pub mod shader;
pub mod param_reconciler;
pub mod param_block;
pub mod stage_params;
pub mod param_value;
pub mod material;

pub use gpu_program::{
    GpuProgram, ProgramParamDesc,
    DataParamDesc, DataParamType,
    ObjectParamDesc, ObjectParamType,
    ParamBlockDesc,
};
pub use technique::{Technique, Pass, RENDER_API_ANY};
pub use shader::{
    Shader,
    ShaderDataParamDesc, ShaderObjectParamDesc, ShaderParamBlockDesc,
};
pub use param_reconciler::{reconcile, ReconciledParams, ParamExclusion, ExclusionReason};
pub use param_block::{ParamBlock, ParamBlockKey, ParamBlockTable};
pub use stage_params::{StageParams, PassParameters};
pub use param_value::{MaterialParamValue, ParamValueKind, ParamElement, StructData, Color};
pub use material::{Material, MaterialState};
