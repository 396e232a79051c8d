/// Material: a shader's parameters resolved against the GPU programs of its
/// best technique.
///
/// Setting a shader runs the whole resolution:
/// - pick the best technique for the renderer's API
/// - wait for every program of every pass and reconcile their layouts
/// - keep the shader parameters the programs agree on
/// - allocate one buffer per valid shareable block, then one private buffer
///   per non-shareable block of each stage
///
/// Afterwards `set_*` calls write into every stage that reads the matching
/// GPU variable and update a CPU-side cache read back by `get_*`.
/// Names the current technique doesn't know are ignored with a warning.
///
/// States:
/// - `Uninitialized`: no shader
/// - `Resolved`: shader set and a technique found
/// - `Unsupported`: shader set but no technique runs on this renderer
///
/// Parameter access requires `Resolved`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use crate::engine::Engine;
use crate::error::Result;
use crate::{engine_bail, engine_debug, engine_err, engine_warn};
use crate::renderer::{BufferUsage, Renderer, SamplerState, Texture};
use crate::resource::gpu_program::ProgramParamDesc;
use crate::resource::param_block::{ParamBlock, ParamBlockKey, ParamBlockTable};
use crate::resource::param_reconciler::{reconcile, ExclusionReason, ParamExclusion};
use crate::resource::param_value::{
    Color, MaterialParamValue, ParamElement, ParamValueKind, StructData,
};
use crate::resource::shader::Shader;
use crate::resource::stage_params::PassParameters;
use crate::resource::technique::{Pass, Technique};

const SOURCE: &str = "galaxy3d::Material";

// ===== STATE =====

/// Resolution state of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialState {
    /// No shader set
    Uninitialized,
    /// Shader set and resolved against its best technique
    Resolved,
    /// Shader set but none of its techniques runs on the renderer
    Unsupported,
}

/// Where a material parameter goes on the GPU
#[derive(Debug, Clone)]
struct ParamBinding {
    gpu_variable_name: String,
    /// Element size declared by the shader
    element_size: u32,
    /// Element size declared by the programs
    gpu_element_size: u32,
}

fn lock_renderer(renderer: &Mutex<dyn Renderer>) -> Result<MutexGuard<'_, dyn Renderer + 'static>> {
    renderer
        .lock()
        .map_err(|_| engine_err!(SOURCE, BackendError, "Renderer lock poisoned"))
}

/// Every data parameter must fit inside the block of its slot
fn check_block_bounds(program_name: &str, desc: &ProgramParamDesc) -> Result<()> {
    for param in desc.params.values() {
        let Some(block) = desc.param_block_by_slot(param.param_block_slot) else {
            continue;
        };
        let end = param.gpu_mem_offset as u64 + param.byte_span() as u64;
        if end > block.block_size as u64 {
            engine_bail!(SOURCE, InternalError,
                "Parameter '{}' of program '{}' ends at byte {} but block '{}' is {} bytes",
                param.name, program_name, end, block.name, block.block_size);
        }
    }
    Ok(())
}

// ===== MATERIAL =====

/// Material resource
pub struct Material {
    renderer: Arc<Mutex<dyn Renderer>>,
    shader: Option<Arc<Shader>>,
    technique: Option<Arc<Technique>>,
    state: MaterialState,
    bindings: BTreeMap<String, ParamBinding>,
    values: FxHashMap<String, MaterialParamValue>,
    passes: Vec<PassParameters>,
    param_blocks: ParamBlockTable,
    exclusions: Vec<ParamExclusion>,
}

impl Material {
    /// Create a material without shader
    pub fn new(renderer: Arc<Mutex<dyn Renderer>>) -> Self {
        Self {
            renderer,
            shader: None,
            technique: None,
            state: MaterialState::Uninitialized,
            bindings: BTreeMap::new(),
            values: FxHashMap::default(),
            passes: Vec::new(),
            param_blocks: ParamBlockTable::new(),
            exclusions: Vec::new(),
        }
    }

    /// Create a material and resolve `shader`
    pub fn with_shader(renderer: Arc<Mutex<dyn Renderer>>, shader: Arc<Shader>) -> Result<Self> {
        let mut material = Self::new(renderer);
        material.set_shader(shader)?;
        Ok(material)
    }

    /// Create a material on the engine renderer and resolve `shader`
    ///
    /// # Errors
    ///
    /// Fails if the engine has no renderer, or if resolution fails.
    pub fn create(shader: Arc<Shader>) -> Result<Self> {
        Self::with_shader(Engine::renderer()?, shader)
    }

    // ===== SHADER RESOLUTION =====

    /// Set the shader and resolve it against its best technique
    ///
    /// Releases every buffer and cached value of the previous shader first.
    /// If no technique runs on the renderer, the material becomes
    /// `Unsupported` and this still returns Ok.
    ///
    /// # Errors
    ///
    /// - `BackendError` if a program failed to load or a buffer could not be created
    /// - `InternalError` if the reconciled layout is inconsistent
    /// - `NotImplemented` for buffer object parameters
    ///
    /// On error the material is left `Uninitialized`, without shader.
    pub fn set_shader(&mut self, shader: Arc<Shader>) -> Result<()> {
        self.clear();

        match self.resolve(&shader) {
            Ok(state) => {
                self.shader = Some(shader);
                self.state = state;
                Ok(())
            }
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }

    /// Release everything and go back to `Uninitialized`
    pub fn destroy(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        self.param_blocks.release_all();
        self.passes.clear();
        self.values.clear();
        self.bindings.clear();
        self.exclusions.clear();
        self.technique = None;
        self.shader = None;
        self.state = MaterialState::Uninitialized;
    }

    fn resolve(&mut self, shader: &Shader) -> Result<MaterialState> {
        let renderer = self.renderer.clone();
        let render_api = lock_renderer(&renderer)?.api_name().to_string();

        let Some(technique) = shader.best_technique(&render_api) else {
            engine_warn!(SOURCE,
                "Shader '{}' has no technique supported by render API '{}'",
                shader.name(), render_api);
            return Ok(MaterialState::Unsupported);
        };

        // ========== RECONCILE PROGRAM LAYOUTS ==========
        let mut descs: Vec<Arc<ProgramParamDesc>> = Vec::new();
        for pass in technique.passes() {
            for program in pass.programs() {
                let desc = program.synchronize()?;
                check_block_bounds(program.name(), &desc)?;
                descs.push(desc);
            }
        }
        let desc_refs: Vec<&ProgramParamDesc> = descs.iter().map(|d| d.as_ref()).collect();
        let reconciled = reconcile(&desc_refs);
        let mut exclusions = reconciled.exclusions.clone();

        // ========== DATA PARAMETERS ==========
        for (name, param) in shader.data_params() {
            let Some(gpu_param) = reconciled.valid_data_params.get(&param.gpu_variable_name) else {
                continue;
            };

            if gpu_param.param_type != param.param_type {
                engine_warn!(SOURCE,
                    "Ignoring shader parameter '{}': its type doesn't match GPU variable '{}'",
                    name, param.gpu_variable_name);
                exclusions.push(ParamExclusion::new(name, ExclusionReason::ShaderTypeMismatch));
                continue;
            }
            if gpu_param.array_size != param.array_size {
                engine_warn!(SOURCE,
                    "Ignoring shader parameter '{}': array size {} doesn't match GPU variable '{}' ({})",
                    name, param.array_size, param.gpu_variable_name, gpu_param.array_size);
                exclusions.push(ParamExclusion::new(name, ExclusionReason::ShaderArraySizeMismatch));
                continue;
            }
            if !reconciled.param_to_block.contains_key(&param.gpu_variable_name) {
                engine_bail!(SOURCE, InternalError,
                    "GPU variable '{}' is valid but belongs to no parameter block",
                    param.gpu_variable_name);
            }

            self.bindings.insert(name.clone(), ParamBinding {
                gpu_variable_name: param.gpu_variable_name.clone(),
                element_size: param.element_size,
                gpu_element_size: gpu_param.element_size,
            });
            self.values.insert(
                name.clone(),
                MaterialParamValue::zeroed(param.param_type, param.array_size, param.element_size),
            );
        }

        // ========== OBJECT PARAMETERS ==========
        for (name, param) in shader.object_params() {
            if !reconciled.valid_object_params.contains(&param.gpu_variable_name) {
                continue;
            }

            let value = if param.object_type.is_sampler() {
                MaterialParamValue::SamplerState(None)
            } else if param.object_type.is_texture() {
                MaterialParamValue::Texture(None)
            } else if param.object_type.is_buffer() {
                engine_bail!(SOURCE, NotImplemented,
                    "Buffer parameter '{}' is not supported by materials", name);
            } else {
                engine_bail!(SOURCE, InternalError,
                    "Parameter '{}' has invalid object type {:?}", name, param.object_type);
            };

            self.bindings.insert(name.clone(), ParamBinding {
                gpu_variable_name: param.gpu_variable_name.clone(),
                element_size: 0,
                gpu_element_size: 0,
            });
            self.values.insert(name.clone(), value);
        }

        let mut renderer = lock_renderer(&renderer)?;

        // ========== SHARED BUFFERS ==========
        let mut shared_blocks: BTreeMap<&str, ParamBlockKey> = BTreeMap::new();
        for (name, block) in &reconciled.valid_shareable_blocks {
            let key = self.param_blocks.allocate(
                &mut *renderer,
                name,
                block.block_size,
                shader.param_block_usage(name),
                true,
            )?;
            shared_blocks.insert(name.as_str(), key);
        }

        // ========== PASS PARAMETERS ==========
        for pass in technique.passes() {
            let mut pass_params = PassParameters::new();
            for program in pass.programs() {
                pass_params.set(program.create_parameters()?);
            }
            self.passes.push(pass_params);
        }

        // Shared blocks first, so a block name never gets both kinds of buffer
        for pass_params in &mut self.passes {
            for params in pass_params.iter_mut() {
                for (&name, &key) in &shared_blocks {
                    if !params.has_param_block(name) {
                        continue;
                    }
                    if !params.is_param_block_shareable(name) {
                        engine_debug!(SOURCE,
                            "{:?} program declares block '{}' as non-shareable, giving it a private buffer",
                            params.stage(), name);
                        continue;
                    }
                    params.set_param_block_buffer(name, key)?;
                }
            }
        }

        for pass_params in &mut self.passes {
            for params in pass_params.iter_mut() {
                let private: Vec<(String, u32)> = params.desc().param_blocks.values()
                    .filter(|block| !params.is_param_block_shareable(&block.name))
                    .map(|block| (block.name.clone(), block.block_size))
                    .collect();
                for (name, size) in private {
                    let key = self.param_blocks.allocate(
                        &mut *renderer,
                        &name,
                        size,
                        BufferUsage::default(),
                        false,
                    )?;
                    params.set_param_block_buffer(&name, key)?;
                }
            }
        }

        engine_debug!(SOURCE,
            "Resolved shader '{}' for '{}': {} pass(es), {} parameter(s), {} shared / {} private buffer(s), {} exclusion(s)",
            shader.name(), render_api, self.passes.len(), self.bindings.len(),
            self.param_blocks.shared_count(), self.param_blocks.private_count(), exclusions.len());

        self.technique = Some(technique);
        self.exclusions = exclusions;
        Ok(MaterialState::Resolved)
    }

    fn require_resolved(&self) -> Result<()> {
        if self.state != MaterialState::Resolved {
            engine_bail!(SOURCE, InvalidState,
                "Material is {:?}; set a shader with a supported technique first", self.state);
        }
        Ok(())
    }

    // ===== SETTERS =====

    /// Binding of `name`, or None (with a warning) if the technique doesn't use it
    fn lookup_binding(&self, name: &str) -> Option<ParamBinding> {
        let binding = self.bindings.get(name).cloned();
        if binding.is_none() {
            engine_warn!(SOURCE, "Material doesn't have parameter '{}', ignoring", name);
        }
        binding
    }

    fn cached_value(&self, name: &str) -> Result<&MaterialParamValue> {
        self.values
            .get(name)
            .ok_or_else(|| engine_err!(SOURCE, NotFound, "Material has no parameter named '{}'", name))
    }

    fn check_kind(&self, name: &str, kind: ParamValueKind) -> Result<()> {
        let cached = self.cached_value(name)?;
        if cached.kind() != kind {
            engine_bail!(SOURCE, InvalidArgument,
                "Parameter '{}' holds {} values, not {}", name, cached.kind(), kind);
        }
        Ok(())
    }

    fn set_element<T: ParamElement>(&mut self, name: &str, value: T, array_idx: u32) -> Result<()> {
        self.require_resolved()?;
        let Some(binding) = self.lookup_binding(name) else {
            return Ok(());
        };
        self.write_element(name, &binding, value, array_idx)
    }

    fn write_element<T: ParamElement>(
        &mut self,
        name: &str,
        binding: &ParamBinding,
        value: T,
        array_idx: u32,
    ) -> Result<()> {
        self.check_kind(name, T::KIND)?;
        let array_size = self.cached_value(name)?.len();
        if array_idx as usize >= array_size {
            engine_bail!(SOURCE, OutOfRange,
                "Array index {} out of range for parameter '{}' (array size {})",
                array_idx, name, array_size);
        }

        let bytes = value.gpu_bytes(binding.gpu_element_size);
        self.write_to_passes(&binding.gpu_variable_name, &bytes, array_idx)?;

        if let Some(elements) = self.values.get_mut(name).and_then(|v| T::elements_mut(v)) {
            elements[array_idx as usize] = value;
        }
        Ok(())
    }

    fn write_to_passes(&mut self, gpu_variable_name: &str, bytes: &[u8], array_idx: u32) -> Result<()> {
        for (pass_index, pass_params) in self.passes.iter().enumerate() {
            for params in pass_params.iter() {
                if !params.has_param(gpu_variable_name) {
                    continue;
                }
                if !params.set_param(gpu_variable_name, bytes, array_idx, &mut self.param_blocks)? {
                    engine_debug!(SOURCE,
                        "Skipping '{}' for the {:?} stage of pass {}: its parameter block has no buffer",
                        gpu_variable_name, params.stage(), pass_index);
                }
            }
        }
        Ok(())
    }

    pub fn set_float(&mut self, name: &str, value: f32, array_idx: u32) -> Result<()> {
        self.set_element(name, value, array_idx)
    }

    pub fn set_vec2(&mut self, name: &str, value: Vec2, array_idx: u32) -> Result<()> {
        self.set_element(name, value, array_idx)
    }

    pub fn set_vec3(&mut self, name: &str, value: Vec3, array_idx: u32) -> Result<()> {
        self.set_element(name, value, array_idx)
    }

    pub fn set_vec4(&mut self, name: &str, value: Vec4, array_idx: u32) -> Result<()> {
        self.set_element(name, value, array_idx)
    }

    /// Set a float4 parameter from a color
    pub fn set_color(&mut self, name: &str, color: Color, array_idx: u32) -> Result<()> {
        self.set_element(name, Vec4::from(color), array_idx)
    }

    pub fn set_mat3(&mut self, name: &str, value: Mat3, array_idx: u32) -> Result<()> {
        self.set_element(name, value, array_idx)
    }

    pub fn set_mat4(&mut self, name: &str, value: Mat4, array_idx: u32) -> Result<()> {
        self.set_element(name, value, array_idx)
    }

    /// Set a struct parameter
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the value size differs from the element size
    /// declared by the shader. The cached value is left unchanged.
    pub fn set_struct_data(&mut self, name: &str, value: &StructData, array_idx: u32) -> Result<()> {
        self.require_resolved()?;
        let Some(binding) = self.lookup_binding(name) else {
            return Ok(());
        };
        if value.size() != binding.element_size as usize {
            engine_bail!(SOURCE, InvalidArgument,
                "Struct parameter '{}' expects {} bytes, got {}",
                name, binding.element_size, value.size());
        }
        self.write_element(name, &binding, value.clone(), array_idx)
    }

    /// Bind a texture (None unbinds it)
    pub fn set_texture(&mut self, name: &str, texture: Option<Arc<dyn Texture>>) -> Result<()> {
        self.require_resolved()?;
        let Some(binding) = self.lookup_binding(name) else {
            return Ok(());
        };
        self.check_kind(name, ParamValueKind::Texture)?;

        let gpu_name = binding.gpu_variable_name.as_str();
        for pass_params in &mut self.passes {
            for params in pass_params.iter_mut() {
                if params.has_texture(gpu_name) {
                    params.set_texture(gpu_name, texture.clone())?;
                }
            }
        }

        self.values.insert(name.to_string(), MaterialParamValue::Texture(texture));
        Ok(())
    }

    /// Bind a sampler state (None unbinds it)
    pub fn set_sampler_state(
        &mut self,
        name: &str,
        sampler: Option<Arc<dyn SamplerState>>,
    ) -> Result<()> {
        self.require_resolved()?;
        let Some(binding) = self.lookup_binding(name) else {
            return Ok(());
        };
        self.check_kind(name, ParamValueKind::SamplerState)?;

        let gpu_name = binding.gpu_variable_name.as_str();
        for pass_params in &mut self.passes {
            for params in pass_params.iter_mut() {
                if params.has_sampler_state(gpu_name) {
                    params.set_sampler_state(gpu_name, sampler.clone())?;
                }
            }
        }

        self.values.insert(name.to_string(), MaterialParamValue::SamplerState(sampler));
        Ok(())
    }

    // ===== GETTERS =====

    fn get_element<T: ParamElement>(&self, name: &str, array_idx: u32) -> Result<T> {
        self.require_resolved()?;
        let cached = self.cached_value(name)?;
        let elements = T::elements(cached).ok_or_else(|| engine_err!(SOURCE, InvalidArgument,
            "Parameter '{}' holds {} values, not {}", name, cached.kind(), T::KIND))?;

        elements.get(array_idx as usize).cloned().ok_or_else(|| engine_err!(SOURCE, OutOfRange,
            "Array index {} out of range for parameter '{}' (array size {})",
            array_idx, name, elements.len()))
    }

    pub fn get_float(&self, name: &str, array_idx: u32) -> Result<f32> {
        self.get_element(name, array_idx)
    }

    pub fn get_vec2(&self, name: &str, array_idx: u32) -> Result<Vec2> {
        self.get_element(name, array_idx)
    }

    pub fn get_vec3(&self, name: &str, array_idx: u32) -> Result<Vec3> {
        self.get_element(name, array_idx)
    }

    pub fn get_vec4(&self, name: &str, array_idx: u32) -> Result<Vec4> {
        self.get_element(name, array_idx)
    }

    pub fn get_color(&self, name: &str, array_idx: u32) -> Result<Color> {
        self.get_vec4(name, array_idx).map(Color::from)
    }

    pub fn get_mat3(&self, name: &str, array_idx: u32) -> Result<Mat3> {
        self.get_element(name, array_idx)
    }

    pub fn get_mat4(&self, name: &str, array_idx: u32) -> Result<Mat4> {
        self.get_element(name, array_idx)
    }

    pub fn get_struct_data(&self, name: &str, array_idx: u32) -> Result<StructData> {
        self.get_element(name, array_idx)
    }

    pub fn get_texture(&self, name: &str) -> Result<Option<Arc<dyn Texture>>> {
        self.require_resolved()?;
        match self.cached_value(name)? {
            MaterialParamValue::Texture(texture) => Ok(texture.clone()),
            other => engine_bail!(SOURCE, InvalidArgument,
                "Parameter '{}' holds {} values, not texture", name, other.kind()),
        }
    }

    pub fn get_sampler_state(&self, name: &str) -> Result<Option<Arc<dyn SamplerState>>> {
        self.require_resolved()?;
        match self.cached_value(name)? {
            MaterialParamValue::SamplerState(sampler) => Ok(sampler.clone()),
            other => engine_bail!(SOURCE, InvalidArgument,
                "Parameter '{}' holds {} values, not sampler state", name, other.kind()),
        }
    }

    // ===== PASSES =====

    fn resolved_technique(&self) -> Result<&Arc<Technique>> {
        self.require_resolved()?;
        self.technique
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, InternalError, "Resolved material has no technique"))
    }

    /// Number of passes of the resolved technique
    pub fn num_passes(&self) -> Result<usize> {
        Ok(self.resolved_technique()?.pass_count())
    }

    pub fn pass(&self, index: usize) -> Result<&Pass> {
        let technique = self.resolved_technique()?;
        technique.pass(index).ok_or_else(|| engine_err!(SOURCE, InvalidArgument,
            "Invalid pass index {} (material has {} pass(es))", index, technique.pass_count()))
    }

    /// Bound parameters of pass `index`
    pub fn pass_parameters(&self, index: usize) -> Result<&PassParameters> {
        self.require_resolved()?;
        self.passes.get(index).ok_or_else(|| engine_err!(SOURCE, InvalidArgument,
            "Invalid pass index {} (material has {} pass(es))", index, self.passes.len()))
    }

    // ===== BUFFERS =====

    /// Upload every parameter block changed since the last flush
    ///
    /// Returns the number of uploaded blocks.
    pub fn flush_param_blocks(&mut self) -> Result<usize> {
        self.param_blocks.flush_dirty()
    }

    pub fn param_block(&self, key: ParamBlockKey) -> Option<&ParamBlock> {
        self.param_blocks.get(key)
    }

    pub fn param_block_count(&self) -> usize {
        self.param_blocks.len()
    }

    pub fn param_blocks(&self) -> &ParamBlockTable {
        &self.param_blocks
    }

    // ===== INTROSPECTION =====

    pub fn state(&self) -> MaterialState {
        self.state
    }

    pub fn renderer(&self) -> &Arc<Mutex<dyn Renderer>> {
        &self.renderer
    }

    pub fn shader(&self) -> Option<&Arc<Shader>> {
        self.shader.as_ref()
    }

    pub fn technique(&self) -> Option<&Arc<Technique>> {
        self.technique.as_ref()
    }

    /// Whether the resolved technique uses parameter `name`
    pub fn has_param(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// GPU variable written by parameter `name`
    pub fn gpu_variable_name(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(|b| b.gpu_variable_name.as_str())
    }

    /// Cached values, sorted by parameter name
    pub fn param_values(&self) -> Vec<(&str, &MaterialParamValue)> {
        let mut values: Vec<(&str, &MaterialParamValue)> =
            self.values.iter().map(|(name, value)| (name.as_str(), value)).collect();
        values.sort_by(|a, b| a.0.cmp(b.0));
        values
    }

    /// Parameters and blocks left out by the last resolution
    pub fn reconcile_report(&self) -> &[ParamExclusion] {
        &self.exclusions
    }
}

#[cfg(test)]
#[path = "material_tests.rs"]
mod tests;
