/// Techniques and passes.
///
/// A Technique is one implementation variant of a shader for a given render
/// API. It is made of ordered passes, each binding at most one GpuProgram per
/// shader stage.

use std::sync::Arc;
use crate::renderer::{ShaderStage, ShaderStageFlags, SHADER_STAGE_COUNT};
use crate::resource::gpu_program::GpuProgram;

// ===== PASS =====

/// One rendering step of a technique
#[derive(Debug, Clone, Default)]
pub struct Pass {
    programs: [Option<Arc<GpuProgram>>; SHADER_STAGE_COUNT],
}

impl Pass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a program to the stage it was compiled for
    ///
    /// Replaces any program previously bound to that stage.
    pub fn with_program(mut self, program: Arc<GpuProgram>) -> Self {
        self.set_program(program);
        self
    }

    pub fn set_program(&mut self, program: Arc<GpuProgram>) {
        let index = program.stage().index();
        self.programs[index] = Some(program);
    }

    /// Program bound to `stage`, if any
    pub fn program(&self, stage: ShaderStage) -> Option<&Arc<GpuProgram>> {
        self.programs[stage.index()].as_ref()
    }

    /// Bound programs in stage order
    pub fn programs(&self) -> impl Iterator<Item = &Arc<GpuProgram>> {
        self.programs.iter().flatten()
    }

    /// Stages that have a program
    pub fn stages(&self) -> ShaderStageFlags {
        self.programs().fold(ShaderStageFlags::empty(), |flags, p| flags | p.stage().flag())
    }
}

// ===== TECHNIQUE =====

/// Render API name matching every renderer
pub const RENDER_API_ANY: &str = "any";

/// Implementation variant of a shader
#[derive(Debug, Clone)]
pub struct Technique {
    render_api: String,
    passes: Vec<Pass>,
}

impl Technique {
    /// Create a technique targeting `render_api` (or `RENDER_API_ANY`)
    pub fn new(render_api: &str) -> Self {
        Self { render_api: render_api.to_string(), passes: Vec::new() }
    }

    pub fn with_pass(mut self, pass: Pass) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn render_api(&self) -> &str {
        &self.render_api
    }

    /// Whether the technique targets exactly `render_api`
    pub fn targets(&self, render_api: &str) -> bool {
        self.render_api == render_api
    }

    /// Whether the technique runs on any render API
    pub fn is_api_agnostic(&self) -> bool {
        self.render_api == RENDER_API_ANY
    }

    pub fn is_supported(&self, render_api: &str) -> bool {
        self.targets(render_api) || self.is_api_agnostic()
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn pass(&self, index: usize) -> Option<&Pass> {
        self.passes.get(index)
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }
}

#[cfg(test)]
#[path = "technique_tests.rs"]
mod tests;
