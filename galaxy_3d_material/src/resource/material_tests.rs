/// Tests for Material resolution, buffer wiring and the get/set API
///
/// Programs are described by hand and rendered through MockRenderer, whose
/// tracker counts live buffers and records uploaded bytes.

use super::*;
use crate::error::Error;
use crate::galaxy3d::log::{LogEntry, LogSeverity, MemoryLogger};
use crate::renderer::mock_renderer::{MockBufferTracker, MockRenderer, MockSampler, MockTexture};
use crate::renderer::{BufferUsage, ShaderStage};
use crate::resource::gpu_program::{
    DataParamDesc, DataParamType, GpuProgram, ObjectParamDesc, ObjectParamType, ParamBlockDesc,
};
use crate::resource::shader::{ShaderDataParamDesc, ShaderObjectParamDesc, ShaderParamBlockDesc};
use crate::resource::technique::RENDER_API_ANY;
use serial_test::serial;
use std::thread;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn mock_renderer() -> (Arc<Mutex<dyn Renderer>>, MockBufferTracker) {
    let mock = MockRenderer::new();
    let tracker = mock.tracker();
    (Arc::new(Mutex::new(mock)), tracker)
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Shareable PerMaterial block: tintColor (float4 @0), roughness (float @16)
fn per_material(desc: ProgramParamDesc) -> ProgramParamDesc {
    desc.with_param_block(ParamBlockDesc::new("PerMaterial", 0, 32, true))
        .with_param(DataParamDesc::new("tintColor", DataParamType::Float4, 0, 0))
        .with_param(DataParamDesc::new("roughness", DataParamType::Float1, 0, 16))
}

/// Vertex layout: PerMaterial + private PerObject block + height map
fn vertex_desc() -> ProgramParamDesc {
    per_material(ProgramParamDesc::new())
        .with_param_block(ParamBlockDesc::new("PerObject", 1, 128, false))
        .with_param(DataParamDesc::new("world", DataParamType::Matrix4x4, 1, 0))
        .with_param(DataParamDesc::new("normalMatrix", DataParamType::Matrix3x3, 1, 64))
        .with_param(DataParamDesc::new("uvOffsets", DataParamType::Float2, 1, 112).with_array(2, 8))
        .with_texture(ObjectParamDesc::new("heightMap", ObjectParamType::Texture2D, 0))
}

/// Fragment layout: PerMaterial + albedo texture and sampler
fn fragment_desc() -> ProgramParamDesc {
    per_material(ProgramParamDesc::new())
        .with_texture(ObjectParamDesc::new("albedoTex", ObjectParamType::Texture2D, 0))
        .with_sampler(ObjectParamDesc::new("albedoSamp", ObjectParamType::Sampler2D, 0))
}

fn lit_pass() -> Pass {
    Pass::new()
        .with_program(Arc::new(GpuProgram::new("lit_vs", ShaderStage::Vertex, vertex_desc())))
        .with_program(Arc::new(GpuProgram::new("lit_fs", ShaderStage::Fragment, fragment_desc())))
}

fn lit_declarations(shader: Shader) -> Shader {
    shader
        .with_data_param(ShaderDataParamDesc::new("tint", "tintColor", DataParamType::Float4))
        .with_data_param(ShaderDataParamDesc::new("roughness", "roughness", DataParamType::Float1))
        .with_data_param(ShaderDataParamDesc::new("world", "world", DataParamType::Matrix4x4))
        .with_data_param(ShaderDataParamDesc::new("normalMatrix", "normalMatrix", DataParamType::Matrix3x3))
        .with_data_param(
            ShaderDataParamDesc::new("uvOffsets", "uvOffsets", DataParamType::Float2).with_array_size(2),
        )
        .with_object_param(ShaderObjectParamDesc::new("albedo", "albedoTex", ObjectParamType::Texture2D))
        .with_object_param(ShaderObjectParamDesc::new("albedoSampler", "albedoSamp", ObjectParamType::Sampler2D))
        .with_object_param(ShaderObjectParamDesc::new("height", "heightMap", ObjectParamType::Texture2D))
}

/// One pass, vertex + fragment
fn lit_shader() -> Arc<Shader> {
    Arc::new(lit_declarations(Shader::new("lit")).with_technique(Technique::new(RENDER_API_ANY).with_pass(lit_pass())))
}

/// Two passes, vertex + fragment each
fn two_pass_shader() -> Arc<Shader> {
    let technique = Technique::new(RENDER_API_ANY).with_pass(lit_pass()).with_pass(lit_pass());
    Arc::new(lit_declarations(Shader::new("lit_two_pass")).with_technique(technique))
}

/// Shader over a single vertex + fragment pass built from the given layouts
fn shader_from(vs: ProgramParamDesc, fs: ProgramParamDesc, shader: Shader) -> Arc<Shader> {
    let pass = Pass::new()
        .with_program(Arc::new(GpuProgram::new("vs", ShaderStage::Vertex, vs)))
        .with_program(Arc::new(GpuProgram::new("fs", ShaderStage::Fragment, fs)));
    Arc::new(shader.with_technique(Technique::new(RENDER_API_ANY).with_pass(pass)))
}

fn resolved_lit() -> (Material, MockBufferTracker) {
    let (renderer, tracker) = mock_renderer();
    let material = Material::with_shader(renderer, lit_shader()).unwrap();
    (material, tracker)
}

fn block_key(material: &Material, pass: usize, stage: ShaderStage, block: &str) -> Option<ParamBlockKey> {
    material.pass_parameters(pass).unwrap().stage(stage)?.param_block_buffer(block)
}

fn material_entries(logger: &MemoryLogger) -> Vec<LogEntry> {
    logger.entries().into_iter().filter(|e| e.source == SOURCE).collect()
}

// ============================================================================
// Resolution tests
// ============================================================================

#[test]
fn test_set_shader_resolves() {
    let (material, tracker) = resolved_lit();

    assert_eq!(material.state(), MaterialState::Resolved);
    assert_eq!(material.shader().map(|s| s.name()), Some("lit"));
    assert!(material.technique().is_some());
    assert_eq!(material.num_passes().unwrap(), 1);
    assert!(material.reconcile_report().is_empty());

    // PerMaterial shared, PerObject private to the vertex stage
    assert_eq!(material.param_block_count(), 2);
    assert_eq!(material.param_blocks().shared_count(), 1);
    assert_eq!(material.param_blocks().private_count(), 1);
    assert_eq!(tracker.live_count(), 2);
}

#[test]
fn test_valid_params_and_gpu_names() {
    let (material, _tracker) = resolved_lit();

    assert!(material.has_param("tint"));
    assert!(material.has_param("albedoSampler"));
    assert!(!material.has_param("tintColor"));
    assert_eq!(material.gpu_variable_name("tint"), Some("tintColor"));
    assert_eq!(material.gpu_variable_name("metallic"), None);

    let names: Vec<&str> = material.param_values().iter().map(|(n, _)| *n).collect();
    assert_eq!(
        names,
        vec!["albedo", "albedoSampler", "height", "normalMatrix", "roughness", "tint", "uvOffsets", "world"]
    );
}

#[test]
fn test_values_start_zeroed() {
    let (material, _tracker) = resolved_lit();

    assert_eq!(material.get_vec4("tint", 0).unwrap(), Vec4::ZERO);
    assert_eq!(material.get_float("roughness", 0).unwrap(), 0.0);
    assert_eq!(material.get_mat4("world", 0).unwrap(), Mat4::ZERO);
    assert!(material.get_texture("albedo").unwrap().is_none());
    assert!(material.get_sampler_state("albedoSampler").unwrap().is_none());
}

#[test]
fn test_set_shader_is_idempotent_without_leaks() {
    let (renderer, tracker) = mock_renderer();
    let shader = lit_shader();
    let mut material = Material::with_shader(renderer, shader.clone()).unwrap();
    let first_params: Vec<String> = material.param_values().iter().map(|(n, _)| n.to_string()).collect();
    let first_blocks = material.param_block_count();

    material.set_shader(shader).unwrap();
    let second_params: Vec<String> = material.param_values().iter().map(|(n, _)| n.to_string()).collect();

    assert_eq!(first_params, second_params);
    assert_eq!(material.param_block_count(), first_blocks);
    assert_eq!(tracker.live_count(), first_blocks);
    assert_eq!(tracker.created_count(), 2 * first_blocks);
}

#[test]
fn test_set_shader_resets_cached_values() {
    let (mut material, _tracker) = resolved_lit();
    material.set_float("roughness", 0.7, 0).unwrap();

    material.set_shader(lit_shader()).unwrap();
    assert_eq!(material.get_float("roughness", 0).unwrap(), 0.0);
}

#[test]
fn test_shared_buffer_usage_from_shader() {
    let (renderer, tracker) = mock_renderer();
    let shader = lit_declarations(Shader::new("lit"))
        .with_param_block(ShaderParamBlockDesc::new("PerMaterial", BufferUsage::Dynamic))
        .with_technique(Technique::new(RENDER_API_ANY).with_pass(lit_pass()));
    let _material = Material::with_shader(renderer, Arc::new(shader)).unwrap();

    // Shared buffers are created first
    let records = tracker.records();
    assert_eq!(records[0].size, 32);
    assert_eq!(records[0].usage, BufferUsage::Dynamic);
    assert_eq!(records[1].size, 128);
    assert_eq!(records[1].usage, BufferUsage::Static);
}

#[test]
fn test_private_buffer_ignores_shader_usage() {
    let (renderer, tracker) = mock_renderer();
    let shader = lit_declarations(Shader::new("lit"))
        .with_param_block(ShaderParamBlockDesc::new("PerObject", BufferUsage::Dynamic))
        .with_technique(Technique::new(RENDER_API_ANY).with_pass(lit_pass()));
    let _material = Material::with_shader(renderer, Arc::new(shader)).unwrap();

    let records = tracker.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].usage, BufferUsage::Static);
    assert_eq!(records[1].size, 128);
    assert_eq!(records[1].usage, BufferUsage::Static);
}

// ============================================================================
// Buffer wiring tests
// ============================================================================

#[test]
fn test_shared_block_bound_to_both_stages() {
    let (material, _tracker) = resolved_lit();

    let vs_key = block_key(&material, 0, ShaderStage::Vertex, "PerMaterial").unwrap();
    let fs_key = block_key(&material, 0, ShaderStage::Fragment, "PerMaterial").unwrap();
    assert_eq!(vs_key, fs_key);
    assert!(material.param_block(vs_key).unwrap().is_shared());

    let private = block_key(&material, 0, ShaderStage::Vertex, "PerObject").unwrap();
    assert!(!material.param_block(private).unwrap().is_shared());
    assert!(block_key(&material, 0, ShaderStage::Fragment, "PerObject").is_none());
}

#[test]
fn test_one_shared_buffer_and_private_buffer_per_stage() {
    let (renderer, tracker) = mock_renderer();
    let material = Material::with_shader(renderer, two_pass_shader()).unwrap();

    assert_eq!(material.num_passes().unwrap(), 2);
    assert_eq!(material.param_blocks().shared_count(), 1);
    assert_eq!(material.param_blocks().private_count(), 2);
    assert_eq!(tracker.live_count(), 3);

    let shared: Vec<ParamBlockKey> = (0..2)
        .flat_map(|pass| [ShaderStage::Vertex, ShaderStage::Fragment].map(move |s| (pass, s)))
        .map(|(pass, stage)| block_key(&material, pass, stage, "PerMaterial").unwrap())
        .collect();
    assert!(shared.iter().all(|key| *key == shared[0]));

    let private_0 = block_key(&material, 0, ShaderStage::Vertex, "PerObject").unwrap();
    let private_1 = block_key(&material, 1, ShaderStage::Vertex, "PerObject").unwrap();
    assert_ne!(private_0, private_1);
}

fn tint_block(block_size: u32, shareable: bool) -> ProgramParamDesc {
    ProgramParamDesc::new()
        .with_param_block(ParamBlockDesc::new("PerMaterial", 0, block_size, shareable))
        .with_param(DataParamDesc::new("tintColor", DataParamType::Float4, 0, 0))
}

fn tint_shader(name: &str) -> Shader {
    Shader::new(name).with_data_param(ShaderDataParamDesc::new("tint", "tintColor", DataParamType::Float4))
}

#[test]
fn test_shared_block_padding_uses_largest_size() {
    let (renderer, tracker) = mock_renderer();
    let shader = shader_from(tint_block(16, true), tint_block(32, true), tint_shader("padded"));
    let mut material = Material::with_shader(renderer, shader).unwrap();

    assert!(material.reconcile_report().is_empty());
    assert_eq!(material.param_blocks().shared_count(), 1);
    assert_eq!(tracker.records()[0].size, 32);

    material.set_vec4("tint", Vec4::ONE, 0).unwrap();
    let vs_key = block_key(&material, 0, ShaderStage::Vertex, "PerMaterial").unwrap();
    let fs_key = block_key(&material, 0, ShaderStage::Fragment, "PerMaterial").unwrap();
    assert_eq!(vs_key, fs_key);
    assert_eq!(material.flush_param_blocks().unwrap(), 1);
    assert_eq!(floats(&tracker.contents(0)[0..16]), vec![1.0; 4]);
}

#[test]
fn test_block_shareable_in_one_stage_only() {
    let (renderer, tracker) = mock_renderer();
    let shader = shader_from(tint_block(32, true), tint_block(32, false), tint_shader("mixed"));
    let mut material = Material::with_shader(renderer, shader).unwrap();

    assert_eq!(material.param_blocks().shared_count(), 1);
    assert_eq!(material.param_blocks().private_count(), 1);
    assert_eq!(tracker.live_count(), 2);

    let vs_key = block_key(&material, 0, ShaderStage::Vertex, "PerMaterial").unwrap();
    let fs_key = block_key(&material, 0, ShaderStage::Fragment, "PerMaterial").unwrap();
    assert_ne!(vs_key, fs_key);
    assert!(material.param_block(vs_key).unwrap().is_shared());
    assert!(!material.param_block(fs_key).unwrap().is_shared());

    // Both copies receive the write
    material.set_vec4("tint", Vec4::ONE, 0).unwrap();
    assert_eq!(material.flush_param_blocks().unwrap(), 2);
}

// ============================================================================
// Set / get tests
// ============================================================================

#[test]
fn test_tint_color_reaches_both_stages() {
    let (mut material, tracker) = resolved_lit();

    material.set_color("tint", Color::new(1.0, 0.0, 0.0, 1.0), 0).unwrap();
    assert_eq!(material.get_vec4("tint", 0).unwrap(), Vec4::new(1.0, 0.0, 0.0, 1.0));
    assert_eq!(material.get_color("tint", 0).unwrap(), Color::RED);

    for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
        let key = block_key(&material, 0, stage, "PerMaterial").unwrap();
        let block = material.param_block(key).unwrap();
        assert_eq!(floats(&block.data()[0..16]), vec![1.0, 0.0, 0.0, 1.0]);
    }

    // Shared PerMaterial buffer is the first one created
    assert_eq!(material.flush_param_blocks().unwrap(), 1);
    assert_eq!(floats(&tracker.contents(0)[0..16]), vec![1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_set_propagates_to_every_pass() {
    let (renderer, _tracker) = mock_renderer();
    let mut material = Material::with_shader(renderer, two_pass_shader()).unwrap();

    material.set_mat4("world", Mat4::IDENTITY, 0).unwrap();

    for pass in 0..2 {
        let key = block_key(&material, pass, ShaderStage::Vertex, "PerObject").unwrap();
        let data = material.param_block(key).unwrap().data();
        assert_eq!(floats(&data[0..64]), Mat4::IDENTITY.to_cols_array().to_vec());
    }
    assert_eq!(material.get_mat4("world", 0).unwrap(), Mat4::IDENTITY);
}

#[test]
fn test_set_float_writes_at_offset() {
    let (mut material, _tracker) = resolved_lit();

    material.set_float("roughness", 0.25, 0).unwrap();

    let key = block_key(&material, 0, ShaderStage::Fragment, "PerMaterial").unwrap();
    let data = material.param_block(key).unwrap().data();
    assert_eq!(floats(&data[16..20]), vec![0.25]);
    assert_eq!(material.get_float("roughness", 0).unwrap(), 0.25);
}

#[test]
fn test_set_mat3_uses_padded_columns() {
    let (mut material, _tracker) = resolved_lit();
    let m = Mat3::from_cols_array(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);

    material.set_mat3("normalMatrix", m, 0).unwrap();

    let key = block_key(&material, 0, ShaderStage::Vertex, "PerObject").unwrap();
    let data = material.param_block(key).unwrap().data();
    assert_eq!(
        floats(&data[64..112]),
        vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0, 7.0, 8.0, 9.0, 0.0]
    );
    assert_eq!(material.get_mat3("normalMatrix", 0).unwrap(), m);
}

#[test]
fn test_set_array_element() {
    let (mut material, _tracker) = resolved_lit();

    material.set_vec2("uvOffsets", Vec2::new(0.5, 0.75), 1).unwrap();

    assert_eq!(material.get_vec2("uvOffsets", 0).unwrap(), Vec2::ZERO);
    assert_eq!(material.get_vec2("uvOffsets", 1).unwrap(), Vec2::new(0.5, 0.75));

    let key = block_key(&material, 0, ShaderStage::Vertex, "PerObject").unwrap();
    let data = material.param_block(key).unwrap().data();
    assert_eq!(floats(&data[120..128]), vec![0.5, 0.75]);
}

#[test]
fn test_array_index_out_of_range() {
    let (mut material, _tracker) = resolved_lit();

    let result = material.set_vec2("uvOffsets", Vec2::ONE, 2);
    assert!(matches!(result, Err(Error::OutOfRange(_))));
    assert!(matches!(material.get_vec2("uvOffsets", 2), Err(Error::OutOfRange(_))));
    assert!(matches!(material.set_vec4("tint", Vec4::ONE, 1), Err(Error::OutOfRange(_))));
    assert_eq!(material.get_vec4("tint", 0).unwrap(), Vec4::ZERO);
}

#[test]
fn test_wrong_value_kind_fails() {
    let (mut material, _tracker) = resolved_lit();

    let result = material.set_float("tint", 1.0, 0);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert!(matches!(material.get_float("tint", 0), Err(Error::InvalidArgument(_))));
    assert!(matches!(material.get_texture("tint"), Err(Error::InvalidArgument(_))));
    assert_eq!(material.get_vec4("tint", 0).unwrap(), Vec4::ZERO);
}

#[test]
fn test_unknown_name_is_ignored() {
    let (mut material, _tracker) = resolved_lit();
    let before = material.param_values().len();

    assert!(material.set_float("metallic", 1.0, 0).is_ok());
    assert!(material.set_texture("normalMap", None).is_ok());
    assert!(material.set_struct_data("light", &StructData::zeroed(4), 0).is_ok());

    assert_eq!(material.param_values().len(), before);
    assert!(matches!(material.get_float("metallic", 0), Err(Error::NotFound(_))));
}

#[test]
#[serial]
fn test_unknown_name_logs_warning() {
    let logger = Arc::new(MemoryLogger::new());
    Engine::set_logger(logger.clone());
    Engine::set_min_log_severity(LogSeverity::Trace);

    let (mut material, _tracker) = resolved_lit();
    material.set_float("sheen", 1.0, 0).unwrap();

    // Other tests may log through the same logger meanwhile
    let warnings: Vec<LogEntry> = material_entries(&logger)
        .into_iter()
        .filter(|e| e.severity == LogSeverity::Warn && e.message.contains("'sheen'"))
        .collect();
    assert_eq!(warnings.len(), 1);

    Engine::reset_logger();
}

// ============================================================================
// Struct tests
// ============================================================================

fn struct_shader() -> Arc<Shader> {
    let desc = || {
        ProgramParamDesc::new()
            .with_param_block(ParamBlockDesc::new("Lights", 0, 64, true))
            .with_param(
                DataParamDesc::new("gLights", DataParamType::Struct, 0, 0)
                    .with_element_size(32)
                    .with_array(2, 32),
            )
    };
    let shader = Shader::new("lights").with_data_param(
        ShaderDataParamDesc::new("lights", "gLights", DataParamType::Struct)
            .with_element_size(32)
            .with_array_size(2),
    );
    shader_from(desc(), desc(), shader)
}

#[test]
fn test_set_struct_data() {
    let (renderer, _tracker) = mock_renderer();
    let mut material = Material::with_shader(renderer, struct_shader()).unwrap();
    let light = StructData::new(&[7u8; 32]);

    material.set_struct_data("lights", &light, 1).unwrap();

    assert_eq!(material.get_struct_data("lights", 1).unwrap(), light);
    assert_eq!(material.get_struct_data("lights", 0).unwrap(), StructData::zeroed(32));

    let key = block_key(&material, 0, ShaderStage::Fragment, "Lights").unwrap();
    let data = material.param_block(key).unwrap().data();
    assert_eq!(&data[32..64], &[7u8; 32]);
}

#[test]
fn test_struct_size_mismatch_keeps_cached_value() {
    let (renderer, _tracker) = mock_renderer();
    let mut material = Material::with_shader(renderer, struct_shader()).unwrap();
    let light = StructData::new(&[3u8; 32]);
    material.set_struct_data("lights", &light, 0).unwrap();

    let result = material.set_struct_data("lights", &StructData::new(&[9u8; 16]), 0);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(material.get_struct_data("lights", 0).unwrap(), light);

    let key = block_key(&material, 0, ShaderStage::Vertex, "Lights").unwrap();
    assert_eq!(&material.param_block(key).unwrap().data()[0..32], &[3u8; 32]);
}

// ============================================================================
// Texture / sampler tests
// ============================================================================

#[test]
fn test_set_texture_reaches_declaring_stage_only() {
    let (mut material, _tracker) = resolved_lit();
    let texture: Arc<dyn Texture> = Arc::new(MockTexture::new(256, 256, "albedo"));

    material.set_texture("albedo", Some(texture.clone())).unwrap();

    let pass = material.pass_parameters(0).unwrap();
    let fs = pass.stage(ShaderStage::Fragment).unwrap();
    assert!(Arc::ptr_eq(fs.texture("albedoTex").unwrap(), &texture));
    assert!(pass.stage(ShaderStage::Vertex).unwrap().texture("albedoTex").is_none());

    let cached = material.get_texture("albedo").unwrap().unwrap();
    assert!(Arc::ptr_eq(&cached, &texture));

    material.set_texture("albedo", None).unwrap();
    assert!(material.get_texture("albedo").unwrap().is_none());
}

#[test]
fn test_object_param_declared_by_one_stage_is_valid() {
    let (mut material, _tracker) = resolved_lit();
    let texture: Arc<dyn Texture> = Arc::new(MockTexture::new(64, 64, "height"));

    // heightMap only exists in the vertex program
    material.set_texture("height", Some(texture.clone())).unwrap();

    let vs = material.pass_parameters(0).unwrap().stage(ShaderStage::Vertex).unwrap();
    assert!(Arc::ptr_eq(vs.texture("heightMap").unwrap(), &texture));
}

#[test]
fn test_set_sampler_state() {
    let (mut material, _tracker) = resolved_lit();
    let sampler: Arc<dyn SamplerState> = Arc::new(MockSampler::default());

    material.set_sampler_state("albedoSampler", Some(sampler.clone())).unwrap();

    let fs = material.pass_parameters(0).unwrap().stage(ShaderStage::Fragment).unwrap();
    assert!(Arc::ptr_eq(fs.sampler_state("albedoSamp").unwrap(), &sampler));
    assert!(material.get_sampler_state("albedoSampler").unwrap().is_some());

    let result = material.set_texture("albedoSampler", None);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    let result = material.set_sampler_state("albedo", None);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

// ============================================================================
// Mismatch tests
// ============================================================================

fn globals(time_offset: u32) -> ProgramParamDesc {
    ProgramParamDesc::new()
        .with_param_block(ParamBlockDesc::new("Globals", 2, 32, true))
        .with_param(DataParamDesc::new("viewPos", DataParamType::Float4, 2, 0))
        .with_param(DataParamDesc::new("time", DataParamType::Float1, 2, time_offset))
}

#[test]
fn test_globals_layout_mismatch_skips_writes() {
    let (renderer, tracker) = mock_renderer();
    let shader = Shader::new("globals")
        .with_data_param(ShaderDataParamDesc::new("time", "time", DataParamType::Float1));
    let mut material = Material::with_shader(renderer, shader_from(globals(16), globals(20), shader)).unwrap();

    assert_eq!(material.state(), MaterialState::Resolved);
    assert_eq!(
        material.reconcile_report(),
        &[ParamExclusion::new("Globals", ExclusionReason::BlockLayoutMismatch)]
    );
    assert_eq!(material.param_block_count(), 0);
    assert_eq!(tracker.live_count(), 0);
    assert!(block_key(&material, 0, ShaderStage::Vertex, "Globals").is_none());

    // Silently skipped on the GPU side, still cached
    assert!(material.set_float("time", 2.0, 0).is_ok());
    assert_eq!(material.get_float("time", 0).unwrap(), 2.0);
    assert_eq!(material.flush_param_blocks().unwrap(), 0);
}

#[test]
fn test_cross_stage_type_mismatch_excludes_param() {
    let (renderer, _tracker) = mock_renderer();
    let vs = ProgramParamDesc::new()
        .with_param_block(ParamBlockDesc::new("Locals", 0, 16, false))
        .with_param(DataParamDesc::new("tintColor", DataParamType::Float4, 0, 0));
    let fs = ProgramParamDesc::new()
        .with_param_block(ParamBlockDesc::new("Locals", 0, 16, false))
        .with_param(DataParamDesc::new("tintColor", DataParamType::Float3, 0, 0));
    let shader = Shader::new("broken")
        .with_data_param(ShaderDataParamDesc::new("tint", "tintColor", DataParamType::Float4));
    let mut material = Material::with_shader(renderer, shader_from(vs, fs, shader)).unwrap();

    assert!(!material.has_param("tint"));
    assert_eq!(material.reconcile_report()[0].reason, ExclusionReason::TypeMismatch);
    assert!(material.set_vec4("tint", Vec4::ONE, 0).is_ok());
    assert!(matches!(material.get_vec4("tint", 0), Err(Error::NotFound(_))));
}

#[test]
fn test_shader_declaration_mismatch_excludes_param() {
    let (renderer, _tracker) = mock_renderer();
    let shader = Shader::new("lit")
        .with_data_param(ShaderDataParamDesc::new("tint", "tintColor", DataParamType::Float3))
        .with_data_param(
            ShaderDataParamDesc::new("roughness", "roughness", DataParamType::Float1).with_array_size(4),
        )
        .with_technique(Technique::new(RENDER_API_ANY).with_pass(lit_pass()));
    let material = Material::with_shader(renderer, Arc::new(shader)).unwrap();

    assert!(!material.has_param("tint"));
    assert!(!material.has_param("roughness"));
    assert_eq!(
        material.reconcile_report(),
        &[
            ParamExclusion::new("roughness", ExclusionReason::ShaderArraySizeMismatch),
            ParamExclusion::new("tint", ExclusionReason::ShaderTypeMismatch),
        ]
    );
}

#[test]
fn test_shader_param_missing_from_programs_is_ignored() {
    let (renderer, _tracker) = mock_renderer();
    let shader = lit_declarations(Shader::new("lit"))
        .with_data_param(ShaderDataParamDesc::new("emissive", "emissiveColor", DataParamType::Float4))
        .with_technique(Technique::new(RENDER_API_ANY).with_pass(lit_pass()));
    let material = Material::with_shader(renderer, Arc::new(shader)).unwrap();

    assert!(!material.has_param("emissive"));
    assert!(material.reconcile_report().is_empty());
}

// ============================================================================
// Failure tests
// ============================================================================

#[test]
fn test_buffer_object_param_not_implemented() {
    let (renderer, tracker) = mock_renderer();
    let fs = fragment_desc()
        .with_buffer(ObjectParamDesc::new("instances", ObjectParamType::StructuredBuffer, 1));
    let shader = Shader::new("instanced")
        .with_object_param(ShaderObjectParamDesc::new("instances", "instances", ObjectParamType::StructuredBuffer));
    let shader = shader_from(vertex_desc(), fs, shader);

    let mut material = Material::new(renderer);
    let result = material.set_shader(shader);

    assert!(matches!(result, Err(Error::NotImplemented(_))));
    assert_eq!(material.state(), MaterialState::Uninitialized);
    assert!(material.shader().is_none());
    assert_eq!(tracker.live_count(), 0);
}

#[test]
fn test_undefined_object_param_is_internal_error() {
    let (renderer, _tracker) = mock_renderer();
    let shader = Shader::new("odd")
        .with_object_param(ShaderObjectParamDesc::new("albedo", "albedoTex", ObjectParamType::Undefined));
    let shader = shader_from(vertex_desc(), fragment_desc(), shader);

    let result = Material::with_shader(renderer, shader);
    assert!(matches!(result, Err(Error::InternalError(_))));
}

#[test]
fn test_valid_param_without_block_is_internal_error() {
    let (renderer, _tracker) = mock_renderer();
    let orphan = ProgramParamDesc::new()
        .with_param(DataParamDesc::new("tintColor", DataParamType::Float4, 7, 0));
    let shader = Shader::new("orphan")
        .with_data_param(ShaderDataParamDesc::new("tint", "tintColor", DataParamType::Float4));
    let shader = shader_from(orphan.clone(), orphan, shader);

    let mut material = Material::new(renderer);
    let result = material.set_shader(shader);
    assert!(matches!(result, Err(Error::InternalError(_))));
    assert_eq!(material.state(), MaterialState::Uninitialized);
}

#[test]
fn test_param_past_block_end_fails_resolution() {
    let (renderer, tracker) = mock_renderer();
    let locals = |block_size| {
        ProgramParamDesc::new()
            .with_param_block(ParamBlockDesc::new("Locals", 1, block_size, false))
            .with_param(DataParamDesc::new("tintColor", DataParamType::Float4, 1, 0))
    };
    let shader = shader_from(locals(16), locals(8), tint_shader("short_block"));

    let mut material = Material::new(renderer);
    let result = material.set_shader(shader);

    assert!(matches!(result, Err(Error::InternalError(_))));
    assert_eq!(material.state(), MaterialState::Uninitialized);
    assert_eq!(tracker.created_count(), 0);
    assert!(matches!(material.set_vec4("tint", Vec4::ONE, 0), Err(Error::InvalidState(_))));
}

#[test]
fn test_buffer_creation_failure_releases_buffers() {
    let mock = MockRenderer::new().with_buffer_limit(1);
    let tracker = mock.tracker();
    let renderer: Arc<Mutex<dyn Renderer>> = Arc::new(Mutex::new(mock));

    let mut material = Material::new(renderer);
    let result = material.set_shader(lit_shader());

    assert_eq!(result.err(), Some(Error::OutOfMemory));
    assert_eq!(material.state(), MaterialState::Uninitialized);
    assert_eq!(tracker.created_count(), 1);
    assert_eq!(tracker.live_count(), 0);
}

#[test]
fn test_failed_program_leaves_material_unresolved() {
    let (renderer, _tracker) = mock_renderer();
    let broken = Arc::new(GpuProgram::new_pending("broken_fs", ShaderStage::Fragment));
    broken.fail("compile error").unwrap();
    let pass = Pass::new()
        .with_program(Arc::new(GpuProgram::new("lit_vs", ShaderStage::Vertex, vertex_desc())))
        .with_program(broken);
    let shader = lit_declarations(Shader::new("lit")).with_technique(Technique::new(RENDER_API_ANY).with_pass(pass));

    let mut material = Material::new(renderer);
    let result = material.set_shader(Arc::new(shader));

    assert!(matches!(result, Err(Error::BackendError(_))));
    assert_eq!(material.state(), MaterialState::Uninitialized);
    assert!(matches!(material.num_passes(), Err(Error::InvalidState(_))));
}

#[test]
fn test_set_shader_waits_for_pending_programs() {
    let (renderer, _tracker) = mock_renderer();
    let pending = Arc::new(GpuProgram::new_pending("lit_fs", ShaderStage::Fragment));
    let pass = Pass::new()
        .with_program(Arc::new(GpuProgram::new("lit_vs", ShaderStage::Vertex, vertex_desc())))
        .with_program(pending.clone());
    let shader = lit_declarations(Shader::new("lit")).with_technique(Technique::new(RENDER_API_ANY).with_pass(pass));

    let loader = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        pending.complete(fragment_desc()).unwrap();
    });

    let material = Material::with_shader(renderer, Arc::new(shader)).unwrap();
    loader.join().unwrap();

    assert_eq!(material.state(), MaterialState::Resolved);
    assert!(material.has_param("albedo"));
    assert!(material.pass_parameters(0).unwrap().stage(ShaderStage::Fragment).is_some());
}

// ============================================================================
// State tests
// ============================================================================

#[test]
fn test_uninitialized_material_rejects_access() {
    let (renderer, _tracker) = mock_renderer();
    let mut material = Material::new(renderer);

    assert_eq!(material.state(), MaterialState::Uninitialized);
    assert!(matches!(material.set_float("roughness", 1.0, 0), Err(Error::InvalidState(_))));
    assert!(matches!(material.get_float("roughness", 0), Err(Error::InvalidState(_))));
    assert!(matches!(material.set_texture("albedo", None), Err(Error::InvalidState(_))));
    assert!(matches!(material.num_passes(), Err(Error::InvalidState(_))));
    assert!(matches!(material.pass(0), Err(Error::InvalidState(_))));
    assert!(matches!(material.pass_parameters(0), Err(Error::InvalidState(_))));
}

#[test]
fn test_unsupported_shader() {
    let (renderer, tracker) = mock_renderer();
    let shader = lit_declarations(Shader::new("d3d_only"))
        .with_technique(Technique::new("d3d12").with_pass(lit_pass()));

    let mut material = Material::with_shader(renderer, Arc::new(shader)).unwrap();

    assert_eq!(material.state(), MaterialState::Unsupported);
    assert!(material.shader().is_some());
    assert!(material.technique().is_none());
    assert_eq!(tracker.created_count(), 0);
    assert!(matches!(material.set_float("roughness", 1.0, 0), Err(Error::InvalidState(_))));

    // A supported shader brings it back
    material.set_shader(lit_shader()).unwrap();
    assert_eq!(material.state(), MaterialState::Resolved);
}

#[test]
fn test_technique_matching_renderer_api() {
    let mock = MockRenderer::new().with_api_name("vulkan");
    let renderer: Arc<Mutex<dyn Renderer>> = Arc::new(Mutex::new(mock));
    let shader = lit_declarations(Shader::new("lit"))
        .with_technique(Technique::new(RENDER_API_ANY).with_pass(lit_pass()))
        .with_technique(Technique::new("vulkan").with_pass(lit_pass()).with_pass(lit_pass()));

    let material = Material::with_shader(renderer, Arc::new(shader)).unwrap();
    assert_eq!(material.technique().unwrap().render_api(), "vulkan");
    assert_eq!(material.num_passes().unwrap(), 2);
}

#[test]
fn test_pass_index_bounds() {
    let (material, _tracker) = resolved_lit();

    assert!(material.pass(0).is_ok());
    assert!(matches!(material.pass(1), Err(Error::InvalidArgument(_))));
    assert!(material.pass_parameters(0).is_ok());
    assert!(matches!(material.pass_parameters(5), Err(Error::InvalidArgument(_))));
}

// ============================================================================
// Flush / release tests
// ============================================================================

#[test]
fn test_flush_uploads_dirty_blocks_once() {
    let (mut material, tracker) = resolved_lit();
    assert_eq!(material.flush_param_blocks().unwrap(), 0);

    material.set_float("roughness", 0.5, 0).unwrap();
    material.set_mat4("world", Mat4::IDENTITY, 0).unwrap();

    assert_eq!(material.flush_param_blocks().unwrap(), 2);
    assert_eq!(material.flush_param_blocks().unwrap(), 0);
    assert_eq!(floats(&tracker.contents(0)[16..20]), vec![0.5]);
    assert_eq!(floats(&tracker.contents(1)[0..4]), vec![1.0]);
}

#[test]
fn test_destroy_releases_buffers() {
    let (mut material, tracker) = resolved_lit();
    assert_eq!(tracker.live_count(), 2);

    material.destroy();
    assert_eq!(tracker.live_count(), 0);
    assert_eq!(material.state(), MaterialState::Uninitialized);
    assert!(material.shader().is_none());
    assert!(material.param_values().is_empty());
}

#[test]
fn test_drop_releases_buffers() {
    let (material, tracker) = resolved_lit();
    assert_eq!(tracker.live_count(), 2);

    drop(material);
    assert_eq!(tracker.live_count(), 0);
}

// ============================================================================
// Engine integration
// ============================================================================

#[test]
#[serial]
fn test_create_uses_engine_renderer() {
    Engine::reset_for_testing();
    Engine::initialize().unwrap();

    assert!(Material::create(lit_shader()).is_err());

    let mock = MockRenderer::new();
    let tracker = mock.tracker();
    let renderer = Engine::create_renderer(mock).unwrap();

    let material = Material::create(lit_shader()).unwrap();
    assert!(Arc::ptr_eq(material.renderer(), &renderer));
    assert_eq!(tracker.live_count(), 2);

    // The material keeps the renderer alive after it leaves the engine
    Engine::destroy_renderer().unwrap();
    drop(renderer);
    assert_eq!(material.num_passes().unwrap(), 1);
    drop(material);
    assert_eq!(tracker.live_count(), 0);

    Engine::reset_for_testing();
}
