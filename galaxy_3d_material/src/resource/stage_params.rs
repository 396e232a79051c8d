/// Bound parameters of one program within one pass.
///
/// A `StageParams` is created from a program's layout and holds what that
/// stage will read at draw time: the parameter blocks bound to its slots
/// (as keys into the material's `ParamBlockTable`), and its textures and
/// sampler states.
///
/// `PassParameters` gathers the stage parameters of one pass, one optional
/// slot per shader stage.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::error::Result;
use crate::{engine_bail, engine_err, engine_warn};
use crate::renderer::{SamplerState, ShaderStage, Texture, SHADER_STAGE_COUNT};
use crate::resource::gpu_program::ProgramParamDesc;
use crate::resource::param_block::{ParamBlockKey, ParamBlockTable};

const SOURCE: &str = "galaxy3d::StageParams";

// ===== STAGE PARAMS =====

/// Parameters bound to one program of one pass
pub struct StageParams {
    stage: ShaderStage,
    desc: Arc<ProgramParamDesc>,
    /// Block key bound to each block slot
    block_bindings: FxHashMap<u32, ParamBlockKey>,
    textures: FxHashMap<String, Arc<dyn Texture>>,
    samplers: FxHashMap<String, Arc<dyn SamplerState>>,
}

impl StageParams {
    /// Create empty bindings for a program layout
    pub fn new(stage: ShaderStage, desc: Arc<ProgramParamDesc>) -> Self {
        Self {
            stage,
            desc,
            block_bindings: FxHashMap::default(),
            textures: FxHashMap::default(),
            samplers: FxHashMap::default(),
        }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Layout of the program these parameters were created from
    pub fn desc(&self) -> &ProgramParamDesc {
        &self.desc
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.desc.params.contains_key(name)
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.desc.textures.contains_key(name)
    }

    pub fn has_sampler_state(&self, name: &str) -> bool {
        self.desc.samplers.contains_key(name)
    }

    pub fn has_param_block(&self, name: &str) -> bool {
        self.desc.param_blocks.contains_key(name)
    }

    /// Whether this program declares block `name` as shareable
    pub fn is_param_block_shareable(&self, name: &str) -> bool {
        self.desc.param_block(name).is_some_and(|block| block.is_shareable)
    }

    // ===== PARAMETER BLOCKS =====

    /// Bind a block of the material's table to block `name`
    pub fn set_param_block_buffer(&mut self, name: &str, key: ParamBlockKey) -> Result<()> {
        let slot = self.desc.param_block(name)
            .map(|block| block.slot)
            .ok_or_else(|| engine_err!(SOURCE, NotFound,
                "{:?} program has no parameter block named '{}'", self.stage, name))?;
        self.block_bindings.insert(slot, key);
        Ok(())
    }

    /// Block bound to block `name`, if any
    pub fn param_block_buffer(&self, name: &str) -> Option<ParamBlockKey> {
        let block = self.desc.param_block(name)?;
        self.block_bindings.get(&block.slot).copied()
    }

    /// Number of blocks with a bound buffer
    pub fn bound_block_count(&self) -> usize {
        self.block_bindings.len()
    }

    // ===== DATA PARAMETERS =====

    /// Write one array element of data parameter `name` into its block
    ///
    /// `bytes` longer than the declared element size are truncated.
    /// Returns false (and writes nothing) if the owning block has no buffer.
    pub fn set_param(
        &self,
        name: &str,
        bytes: &[u8],
        array_idx: u32,
        blocks: &mut ParamBlockTable,
    ) -> Result<bool> {
        let param = self.desc.param(name)
            .ok_or_else(|| engine_err!(SOURCE, NotFound,
                "{:?} program has no data parameter named '{}'", self.stage, name))?;

        if array_idx >= param.array_size {
            engine_bail!(SOURCE, OutOfRange,
                "Array index {} out of range for '{}' (array size {})",
                array_idx, name, param.array_size);
        }

        let Some(&key) = self.block_bindings.get(&param.param_block_slot) else {
            return Ok(false);
        };

        let element_size = param.element_size as usize;
        let bytes = if bytes.len() > element_size {
            engine_warn!(SOURCE,
                "Value for '{}' is {} bytes but the {:?} program expects {}, truncating",
                name, bytes.len(), self.stage, element_size);
            &bytes[..element_size]
        } else {
            bytes
        };

        let offset = param.gpu_mem_offset as usize
            + array_idx as usize * param.array_element_stride as usize;

        let block = blocks.get_mut(key)
            .ok_or_else(|| engine_err!(SOURCE, InternalError,
                "Parameter block bound to slot {} of the {:?} program was released",
                param.param_block_slot, self.stage))?;
        block.write(offset, bytes)?;
        Ok(true)
    }

    // ===== TEXTURES / SAMPLERS =====

    /// Bind (or unbind with None) texture `name`
    pub fn set_texture(&mut self, name: &str, texture: Option<Arc<dyn Texture>>) -> Result<()> {
        if !self.has_texture(name) {
            engine_bail!(SOURCE, NotFound,
                "{:?} program has no texture named '{}'", self.stage, name);
        }
        match texture {
            Some(texture) => { self.textures.insert(name.to_string(), texture); }
            None => { self.textures.remove(name); }
        }
        Ok(())
    }

    pub fn texture(&self, name: &str) -> Option<&Arc<dyn Texture>> {
        self.textures.get(name)
    }

    /// Bind (or unbind with None) sampler state `name`
    pub fn set_sampler_state(&mut self, name: &str, sampler: Option<Arc<dyn SamplerState>>) -> Result<()> {
        if !self.has_sampler_state(name) {
            engine_bail!(SOURCE, NotFound,
                "{:?} program has no sampler state named '{}'", self.stage, name);
        }
        match sampler {
            Some(sampler) => { self.samplers.insert(name.to_string(), sampler); }
            None => { self.samplers.remove(name); }
        }
        Ok(())
    }

    pub fn sampler_state(&self, name: &str) -> Option<&Arc<dyn SamplerState>> {
        self.samplers.get(name)
    }
}

// ===== PASS PARAMETERS =====

/// Stage parameters of one pass, indexed by shader stage
#[derive(Default)]
pub struct PassParameters {
    stages: [Option<StageParams>; SHADER_STAGE_COUNT],
}

impl PassParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store parameters in the slot of their stage
    pub fn set(&mut self, params: StageParams) {
        let index = params.stage().index();
        self.stages[index] = Some(params);
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&StageParams> {
        self.stages[stage.index()].as_ref()
    }

    pub fn stage_mut(&mut self, stage: ShaderStage) -> Option<&mut StageParams> {
        self.stages[stage.index()].as_mut()
    }

    /// Present stages, in stage order
    pub fn iter(&self) -> impl Iterator<Item = &StageParams> {
        self.stages.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StageParams> {
        self.stages.iter_mut().flatten()
    }

    /// Number of present stages
    pub fn stage_count(&self) -> usize {
        self.iter().count()
    }
}

#[cfg(test)]
#[path = "stage_params_tests.rs"]
mod tests;
