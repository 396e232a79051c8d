/// Shader resource.
///
/// A Shader groups the techniques implementing one surface model, and
/// declares the material-level parameters users can set. Every material
/// parameter maps to a GPU variable name, the identifier the compiled
/// programs use for it.

use std::collections::BTreeMap;
use std::sync::Arc;
use crate::renderer::BufferUsage;
use crate::resource::gpu_program::{DataParamType, ObjectParamType};
use crate::resource::technique::Technique;

// ===== PARAMETER DECLARATIONS =====

/// Material-level data parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDataParamDesc {
    pub name: String,
    pub gpu_variable_name: String,
    pub param_type: DataParamType,
    pub array_size: u32,
    /// Size of one element in bytes (checked against struct writes)
    pub element_size: u32,
}

impl ShaderDataParamDesc {
    pub fn new(name: &str, gpu_variable_name: &str, param_type: DataParamType) -> Self {
        Self {
            name: name.to_string(),
            gpu_variable_name: gpu_variable_name.to_string(),
            param_type,
            array_size: 1,
            element_size: param_type.default_element_size(),
        }
    }

    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }

    pub fn with_element_size(mut self, element_size: u32) -> Self {
        self.element_size = element_size;
        self
    }
}

/// Material-level object parameter (texture, sampler or buffer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderObjectParamDesc {
    pub name: String,
    pub gpu_variable_name: String,
    pub object_type: ObjectParamType,
}

impl ShaderObjectParamDesc {
    pub fn new(name: &str, gpu_variable_name: &str, object_type: ObjectParamType) -> Self {
        Self {
            name: name.to_string(),
            gpu_variable_name: gpu_variable_name.to_string(),
            object_type,
        }
    }
}

/// Buffer policy for a parameter block, by block name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderParamBlockDesc {
    pub name: String,
    pub usage: BufferUsage,
}

impl ShaderParamBlockDesc {
    pub fn new(name: &str, usage: BufferUsage) -> Self {
        Self { name: name.to_string(), usage }
    }
}

// ===== SHADER =====

/// Shader: techniques plus material parameter declarations
#[derive(Debug, Clone)]
pub struct Shader {
    name: String,
    techniques: Vec<Arc<Technique>>,
    data_params: BTreeMap<String, ShaderDataParamDesc>,
    object_params: BTreeMap<String, ShaderObjectParamDesc>,
    param_blocks: BTreeMap<String, ShaderParamBlockDesc>,
}

impl Shader {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            techniques: Vec::new(),
            data_params: BTreeMap::new(),
            object_params: BTreeMap::new(),
            param_blocks: BTreeMap::new(),
        }
    }

    pub fn with_technique(mut self, technique: Technique) -> Self {
        self.techniques.push(Arc::new(technique));
        self
    }

    pub fn with_data_param(mut self, param: ShaderDataParamDesc) -> Self {
        self.data_params.insert(param.name.clone(), param);
        self
    }

    pub fn with_object_param(mut self, param: ShaderObjectParamDesc) -> Self {
        self.object_params.insert(param.name.clone(), param);
        self
    }

    pub fn with_param_block(mut self, block: ShaderParamBlockDesc) -> Self {
        self.param_blocks.insert(block.name.clone(), block);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn techniques(&self) -> &[Arc<Technique>] {
        &self.techniques
    }

    pub fn data_params(&self) -> &BTreeMap<String, ShaderDataParamDesc> {
        &self.data_params
    }

    pub fn object_params(&self) -> &BTreeMap<String, ShaderObjectParamDesc> {
        &self.object_params
    }

    pub fn param_blocks(&self) -> &BTreeMap<String, ShaderParamBlockDesc> {
        &self.param_blocks
    }

    /// Buffer usage for block `name` (Static when not declared)
    pub fn param_block_usage(&self, name: &str) -> BufferUsage {
        self.param_blocks.get(name).map(|b| b.usage).unwrap_or_default()
    }

    /// Pick the technique to use with `render_api`
    ///
    /// The first technique targeting exactly `render_api` wins; otherwise the
    /// first API-agnostic technique. Returns None if neither exists.
    pub fn best_technique(&self, render_api: &str) -> Option<Arc<Technique>> {
        self.techniques
            .iter()
            .find(|t| t.targets(render_api))
            .or_else(|| self.techniques.iter().find(|t| t.is_api_agnostic()))
            .cloned()
    }
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
