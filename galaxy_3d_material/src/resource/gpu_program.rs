/// GPU program resource and its parameter layout.
///
/// A GpuProgram is one compiled shader stage. Its `ProgramParamDesc` is the
/// reflected layout of everything the stage reads: data parameters (with
/// byte offsets inside their parameter block), parameter blocks, samplers,
/// textures and buffers.
///
/// Programs may still be compiling on a loader thread when a material asks
/// for them. `GpuProgram::synchronize()` blocks until the layout is available.
///
/// All sizes and offsets are in bytes.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use crate::error::Result;
use crate::engine_bail;
use crate::renderer::ShaderStage;
use crate::resource::stage_params::StageParams;

// ===== DATA PARAMETERS =====

/// Type of a data (constant buffer) parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataParamType {
    Float1,
    Float2,
    Float3,
    Float4,
    Matrix3x3,
    Matrix4x4,
    /// Opaque user struct, size given by the element size
    Struct,
}

impl DataParamType {
    /// Default GPU element size in bytes
    ///
    /// 3x3 matrices are laid out as three 16-byte columns. Structs have no
    /// default size and must be described explicitly.
    pub fn default_element_size(self) -> u32 {
        match self {
            DataParamType::Float1 => 4,
            DataParamType::Float2 => 8,
            DataParamType::Float3 => 12,
            DataParamType::Float4 => 16,
            DataParamType::Matrix3x3 => 48,
            DataParamType::Matrix4x4 => 64,
            DataParamType::Struct => 0,
        }
    }
}

/// Reflected description of one data parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataParamDesc {
    pub name: String,
    pub param_type: DataParamType,
    /// Number of array elements (1 for non-array parameters)
    pub array_size: u32,
    /// Size of one element
    pub element_size: u32,
    /// Distance between two consecutive array elements
    pub array_element_stride: u32,
    /// Offset in the CPU-side copy of the block
    pub cpu_mem_offset: u32,
    /// Offset in the GPU buffer of the block
    pub gpu_mem_offset: u32,
    /// Slot of the parameter block owning this parameter
    pub param_block_slot: u32,
}

impl DataParamDesc {
    /// Describe a non-array parameter stored at `offset` in the block bound to `slot`
    pub fn new(name: &str, param_type: DataParamType, slot: u32, offset: u32) -> Self {
        let element_size = param_type.default_element_size();
        Self {
            name: name.to_string(),
            param_type,
            array_size: 1,
            element_size,
            array_element_stride: element_size,
            cpu_mem_offset: offset,
            gpu_mem_offset: offset,
            param_block_slot: slot,
        }
    }

    /// Override the element size (required for structs); the stride follows
    pub fn with_element_size(mut self, element_size: u32) -> Self {
        self.element_size = element_size;
        self.array_element_stride = element_size;
        self
    }

    /// Turn the parameter into an array
    pub fn with_array(mut self, array_size: u32, stride: u32) -> Self {
        self.array_size = array_size;
        self.array_element_stride = stride;
        self
    }

    /// Use a different offset for the GPU buffer than for the CPU copy
    pub fn with_gpu_offset(mut self, gpu_mem_offset: u32) -> Self {
        self.gpu_mem_offset = gpu_mem_offset;
        self
    }

    /// Bytes spanned by the parameter inside its block
    pub fn byte_span(&self) -> u32 {
        if self.array_size == 0 {
            return 0;
        }
        (self.array_size - 1) * self.array_element_stride + self.element_size
    }
}

// ===== OBJECT PARAMETERS =====

/// Type of an object (sampler, texture or buffer) parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectParamType {
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Texture1D,
    Texture2D,
    Texture3D,
    TextureCube,
    ByteBuffer,
    StructuredBuffer,
    RwByteBuffer,
    RwStructuredBuffer,
    /// Reflection could not classify the object
    Undefined,
}

impl ObjectParamType {
    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            ObjectParamType::Sampler1D
                | ObjectParamType::Sampler2D
                | ObjectParamType::Sampler3D
                | ObjectParamType::SamplerCube
        )
    }

    pub fn is_texture(self) -> bool {
        matches!(
            self,
            ObjectParamType::Texture1D
                | ObjectParamType::Texture2D
                | ObjectParamType::Texture3D
                | ObjectParamType::TextureCube
        )
    }

    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            ObjectParamType::ByteBuffer
                | ObjectParamType::StructuredBuffer
                | ObjectParamType::RwByteBuffer
                | ObjectParamType::RwStructuredBuffer
        )
    }
}

/// Reflected description of one object parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectParamDesc {
    pub name: String,
    pub object_type: ObjectParamType,
    /// Binding slot
    pub slot: u32,
}

impl ObjectParamDesc {
    pub fn new(name: &str, object_type: ObjectParamType, slot: u32) -> Self {
        Self { name: name.to_string(), object_type, slot }
    }
}

// ===== PARAMETER BLOCKS =====

/// Reflected description of a parameter block (constant buffer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamBlockDesc {
    pub name: String,
    pub slot: u32,
    /// Total size of the block
    pub block_size: u32,
    /// Whether one buffer may be shared by every program declaring this block
    pub is_shareable: bool,
}

impl ParamBlockDesc {
    pub fn new(name: &str, slot: u32, block_size: u32, is_shareable: bool) -> Self {
        Self { name: name.to_string(), slot, block_size, is_shareable }
    }
}

// ===== PROGRAM PARAMETER LAYOUT =====

/// Full parameter layout of a compiled program
///
/// Immutable once the program is loaded. Maps are ordered by name so that
/// every walk over a layout is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramParamDesc {
    pub params: BTreeMap<String, DataParamDesc>,
    pub samplers: BTreeMap<String, ObjectParamDesc>,
    pub textures: BTreeMap<String, ObjectParamDesc>,
    pub buffers: BTreeMap<String, ObjectParamDesc>,
    pub param_blocks: BTreeMap<String, ParamBlockDesc>,
}

impl ProgramParamDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, param: DataParamDesc) -> Self {
        self.params.insert(param.name.clone(), param);
        self
    }

    pub fn with_sampler(mut self, sampler: ObjectParamDesc) -> Self {
        self.samplers.insert(sampler.name.clone(), sampler);
        self
    }

    pub fn with_texture(mut self, texture: ObjectParamDesc) -> Self {
        self.textures.insert(texture.name.clone(), texture);
        self
    }

    pub fn with_buffer(mut self, buffer: ObjectParamDesc) -> Self {
        self.buffers.insert(buffer.name.clone(), buffer);
        self
    }

    pub fn with_param_block(mut self, block: ParamBlockDesc) -> Self {
        self.param_blocks.insert(block.name.clone(), block);
        self
    }

    /// Get a data parameter by name
    pub fn param(&self, name: &str) -> Option<&DataParamDesc> {
        self.params.get(name)
    }

    /// Get a parameter block by name
    pub fn param_block(&self, name: &str) -> Option<&ParamBlockDesc> {
        self.param_blocks.get(name)
    }

    /// Get the parameter block bound to `slot`
    pub fn param_block_by_slot(&self, slot: u32) -> Option<&ParamBlockDesc> {
        self.param_blocks.values().find(|block| block.slot == slot)
    }

    /// Data parameters stored in the block bound to `slot`
    pub fn params_in_slot(&self, slot: u32) -> impl Iterator<Item = &DataParamDesc> {
        self.params.values().filter(move |param| param.param_block_slot == slot)
    }
}

// ===== GPU PROGRAM =====

enum LoadState {
    Pending,
    Ready(Arc<ProgramParamDesc>),
    Failed(String),
}

/// Compiled program for one shader stage
///
/// Shared between passes (and materials) through `Arc`.
pub struct GpuProgram {
    name: String,
    stage: ShaderStage,
    state: Mutex<LoadState>,
    ready: Condvar,
}

impl GpuProgram {
    /// Create a program whose layout is already known
    pub fn new(name: &str, stage: ShaderStage, desc: ProgramParamDesc) -> Self {
        Self {
            name: name.to_string(),
            stage,
            state: Mutex::new(LoadState::Ready(Arc::new(desc))),
            ready: Condvar::new(),
        }
    }

    /// Create a program still being compiled
    ///
    /// A loader must later call `complete()` or `fail()`.
    pub fn new_pending(name: &str, stage: ShaderStage) -> Self {
        Self {
            name: name.to_string(),
            stage,
            state: Mutex::new(LoadState::Pending),
            ready: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Publish the reflected layout and wake every waiter
    pub fn complete(&self, desc: ProgramParamDesc) -> Result<()> {
        self.finish(LoadState::Ready(Arc::new(desc)))
    }

    /// Mark the program as failed to compile and wake every waiter
    pub fn fail(&self, reason: &str) -> Result<()> {
        self.finish(LoadState::Failed(reason.to_string()))
    }

    fn finish(&self, new_state: LoadState) -> Result<()> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => engine_bail!("galaxy3d::GpuProgram", BackendError,
                "GPU program '{}' state lock poisoned", self.name),
        };
        if !matches!(*state, LoadState::Pending) {
            engine_bail!("galaxy3d::GpuProgram", InvalidState,
                "GPU program '{}' already finished loading", self.name);
        }
        *state = new_state;
        self.ready.notify_all();
        Ok(())
    }

    /// Whether the program finished loading successfully
    pub fn is_ready(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(*state, LoadState::Ready(_)))
            .unwrap_or(false)
    }

    /// Block until the program is loaded and return its layout
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the program failed to compile.
    pub fn synchronize(&self) -> Result<Arc<ProgramParamDesc>> {
        let guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => engine_bail!("galaxy3d::GpuProgram", BackendError,
                "GPU program '{}' state lock poisoned", self.name),
        };
        let state = match self.ready.wait_while(guard, |s| matches!(s, LoadState::Pending)) {
            Ok(state) => state,
            Err(_) => engine_bail!("galaxy3d::GpuProgram", BackendError,
                "GPU program '{}' state lock poisoned", self.name),
        };

        match &*state {
            LoadState::Ready(desc) => Ok(desc.clone()),
            LoadState::Failed(reason) => engine_bail!("galaxy3d::GpuProgram", BackendError,
                "GPU program '{}' failed to load: {}", self.name, reason),
            LoadState::Pending => engine_bail!("galaxy3d::GpuProgram", InternalError,
                "GPU program '{}' woke up while still pending", self.name),
        }
    }

    /// Get the layout without waiting (None until loaded)
    pub fn param_desc(&self) -> Option<Arc<ProgramParamDesc>> {
        match self.state.lock() {
            Ok(state) => match &*state {
                LoadState::Ready(desc) => Some(desc.clone()),
                _ => None,
            },
            Err(_) => None,
        }
    }

    /// Create an empty bound-parameter set for this program
    ///
    /// Waits for the program to finish loading.
    pub fn create_parameters(&self) -> Result<StageParams> {
        let desc = self.synchronize()?;
        Ok(StageParams::new(self.stage, desc))
    }
}

impl std::fmt::Debug for GpuProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuProgram")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
#[path = "gpu_program_tests.rs"]
mod tests;
