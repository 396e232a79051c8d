/// Cross-stage parameter reconciliation.
///
/// Every program of every pass of a technique reflects its own parameter
/// layout. Before a material can expose one parameter set, those layouts are
/// merged:
///
/// - Data parameters are kept only if every declaring program agrees on type,
///   array size, element size and array stride. Offsets may differ between
///   programs. The first conflict excludes the name for good.
/// - Object parameters (samplers, textures, buffers) are kept if any program
///   declares them.
/// - Shareable parameter blocks are kept only if every declaration has the
///   same member layout (offsets included) and size. A conflicting block is
///   excluded, never split in two.
/// - Each data parameter is mapped to the block of the first program
///   declaring it.
///
/// Conflicts are not errors. They are logged and returned as exclusions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use crate::engine_warn;
use crate::resource::gpu_program::{DataParamDesc, ParamBlockDesc, ProgramParamDesc};

const SOURCE: &str = "galaxy3d::ParamReconciler";

// ===== EXCLUSIONS =====

/// Why a name was dropped from the reconciled set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Data parameter declared with different types
    TypeMismatch,
    /// Data parameter declared with different array sizes
    ArraySizeMismatch,
    /// Data parameter declared with different element sizes
    ElementSizeMismatch,
    /// Data parameter declared with different array strides
    StrideMismatch,
    /// Shareable block declared with different sizes or member layouts
    BlockLayoutMismatch,
    /// Shareable block declared under different names
    BlockNameMismatch,
    /// Shader declares a type the programs disagree with
    ShaderTypeMismatch,
    /// Shader declares an array size the programs disagree with
    ShaderArraySizeMismatch,
}

impl ExclusionReason {
    /// Whether the exclusion concerns a parameter block
    pub fn is_block(self) -> bool {
        matches!(self, ExclusionReason::BlockLayoutMismatch | ExclusionReason::BlockNameMismatch)
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExclusionReason::TypeMismatch => "type mismatch between programs",
            ExclusionReason::ArraySizeMismatch => "array size mismatch between programs",
            ExclusionReason::ElementSizeMismatch => "element size mismatch between programs",
            ExclusionReason::StrideMismatch => "array stride mismatch between programs",
            ExclusionReason::BlockLayoutMismatch => "block layout mismatch between programs",
            ExclusionReason::BlockNameMismatch => "block name mismatch between programs",
            ExclusionReason::ShaderTypeMismatch => "shader type differs from program type",
            ExclusionReason::ShaderArraySizeMismatch => "shader array size differs from program array size",
        };
        f.write_str(text)
    }
}

/// A parameter or block left out of the reconciled set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamExclusion {
    pub name: String,
    pub reason: ExclusionReason,
}

impl ParamExclusion {
    pub fn new(name: &str, reason: ExclusionReason) -> Self {
        Self { name: name.to_string(), reason }
    }
}

// ===== RECONCILED SET =====

/// Result of reconciling the layouts of all programs of a technique
///
/// Borrows the program layouts it was built from.
#[derive(Debug, Default)]
pub struct ReconciledParams<'a> {
    /// Data parameters every declaring program agrees on, by GPU variable name
    pub valid_data_params: BTreeMap<String, &'a DataParamDesc>,
    /// Sampler, texture and buffer names declared by at least one program
    pub valid_object_params: BTreeSet<String>,
    /// Shareable blocks with one consistent layout, by block name
    pub valid_shareable_blocks: BTreeMap<String, &'a ParamBlockDesc>,
    /// Owning block name of each data parameter (first declaration wins)
    pub param_to_block: BTreeMap<String, String>,
    /// Everything dropped along the way, in discovery order
    pub exclusions: Vec<ParamExclusion>,
}

impl<'a> ReconciledParams<'a> {
    /// Whether `name` was excluded for any reason
    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclusions.iter().any(|e| e.name == name)
    }
}

/// Reconcile the layouts of all programs participating in a technique
///
/// `descs` must list programs pass by pass, in stage order; the order decides
/// which declaration seeds each comparison.
pub fn reconcile<'a>(descs: &[&'a ProgramParamDesc]) -> ReconciledParams<'a> {
    let mut exclusions = Vec::new();

    let valid_data_params = determine_valid_data_params(descs, &mut exclusions);
    let valid_object_params = determine_valid_object_params(descs);
    let valid_shareable_blocks = determine_valid_shareable_blocks(descs, &mut exclusions);
    let param_to_block = determine_param_to_block(descs);

    ReconciledParams {
        valid_data_params,
        valid_object_params,
        valid_shareable_blocks,
        param_to_block,
        exclusions,
    }
}

// ===== DATA PARAMETERS =====

/// Compare two declarations of a data parameter, ignoring offsets
fn compare_data_params(first: &DataParamDesc, other: &DataParamDesc) -> Option<ExclusionReason> {
    if first.param_type != other.param_type {
        Some(ExclusionReason::TypeMismatch)
    } else if first.array_size != other.array_size {
        Some(ExclusionReason::ArraySizeMismatch)
    } else if first.element_size != other.element_size {
        Some(ExclusionReason::ElementSizeMismatch)
    } else if first.array_element_stride != other.array_element_stride {
        Some(ExclusionReason::StrideMismatch)
    } else {
        None
    }
}

/// Data parameters every declaring program agrees on
pub fn determine_valid_data_params<'a>(
    descs: &[&'a ProgramParamDesc],
    exclusions: &mut Vec<ParamExclusion>,
) -> BTreeMap<String, &'a DataParamDesc> {
    let mut valid: BTreeMap<String, &'a DataParamDesc> = BTreeMap::new();
    let mut excluded: BTreeSet<&'a str> = BTreeSet::new();

    for &desc in descs {
        for (name, param) in &desc.params {
            if excluded.contains(name.as_str()) {
                continue;
            }

            let reason = match valid.get(name) {
                None => {
                    valid.insert(name.clone(), param);
                    continue;
                }
                Some(first) => match compare_data_params(first, param) {
                    Some(reason) => reason,
                    None => continue,
                },
            };

            engine_warn!(SOURCE, "Excluding data parameter '{}': {}", name, reason);
            valid.remove(name);
            excluded.insert(name.as_str());
            exclusions.push(ParamExclusion::new(name, reason));
        }
    }

    valid
}

// ===== OBJECT PARAMETERS =====

/// Object parameter names declared by any program
pub fn determine_valid_object_params(descs: &[&ProgramParamDesc]) -> BTreeSet<String> {
    descs
        .iter()
        .flat_map(|desc| {
            desc.samplers
                .keys()
                .chain(desc.textures.keys())
                .chain(desc.buffers.keys())
        })
        .cloned()
        .collect()
}

// ===== SHAREABLE BLOCKS =====

/// Compare two declarations of a shareable block
///
/// Members are the data parameters stored in each block's slot. Both blocks
/// must hold the same member names, with identical layout including offsets.
/// Block sizes may differ by trailing padding.
fn compare_blocks(
    first_desc: &ProgramParamDesc,
    first: &ParamBlockDesc,
    other_desc: &ProgramParamDesc,
    other: &ParamBlockDesc,
) -> Option<ExclusionReason> {
    if first.name != other.name {
        return Some(ExclusionReason::BlockNameMismatch);
    }

    let first_members: BTreeMap<&str, &DataParamDesc> = first_desc
        .params_in_slot(first.slot)
        .map(|p| (p.name.as_str(), p))
        .collect();
    let other_members: BTreeMap<&str, &DataParamDesc> = other_desc
        .params_in_slot(other.slot)
        .map(|p| (p.name.as_str(), p))
        .collect();

    if first_members.len() != other_members.len() {
        return Some(ExclusionReason::BlockLayoutMismatch);
    }

    for (name, a) in &first_members {
        let Some(b) = other_members.get(name) else {
            return Some(ExclusionReason::BlockLayoutMismatch);
        };
        if compare_data_params(a, b).is_some()
            || a.cpu_mem_offset != b.cpu_mem_offset
            || a.gpu_mem_offset != b.gpu_mem_offset
        {
            return Some(ExclusionReason::BlockLayoutMismatch);
        }
    }

    None
}

/// Shareable blocks with one consistent layout across all programs
///
/// Non-shareable blocks are not checked; every program owns its own copy.
pub fn determine_valid_shareable_blocks<'a>(
    descs: &[&'a ProgramParamDesc],
    exclusions: &mut Vec<ParamExclusion>,
) -> BTreeMap<String, &'a ParamBlockDesc> {
    let mut first_seen: BTreeMap<&'a str, (&'a ProgramParamDesc, &'a ParamBlockDesc)> = BTreeMap::new();
    let mut excluded: BTreeSet<&'a str> = BTreeSet::new();

    for &desc in descs {
        for (name, block) in &desc.param_blocks {
            if !block.is_shareable || excluded.contains(name.as_str()) {
                continue;
            }

            let (first_desc, first_block) = match first_seen.get(name.as_str()).copied() {
                Some(first) => first,
                None => {
                    first_seen.insert(name.as_str(), (desc, block));
                    continue;
                }
            };

            if let Some(reason) = compare_blocks(first_desc, first_block, desc, block) {
                engine_warn!(SOURCE,
                    "Found two shareable parameter blocks named '{}' with different layouts, excluding it: {}",
                    name, reason);
                first_seen.remove(name.as_str());
                excluded.insert(name.as_str());
                exclusions.push(ParamExclusion::new(name, reason));
            } else if block.block_size > first_block.block_size {
                // Same members, so the largest declaration covers every stage
                first_seen.insert(name.as_str(), (desc, block));
            }
        }
    }

    first_seen
        .into_iter()
        .map(|(name, (_, block))| (name.to_string(), block))
        .collect()
}

// ===== PARAMETER TO BLOCK =====

/// Owning block name of each data parameter, first declaration wins
pub fn determine_param_to_block(descs: &[&ProgramParamDesc]) -> BTreeMap<String, String> {
    let mut param_to_block = BTreeMap::new();

    for desc in descs {
        for (name, param) in &desc.params {
            if param_to_block.contains_key(name) {
                continue;
            }
            if let Some(block) = desc.param_block_by_slot(param.param_block_slot) {
                param_to_block.insert(name.clone(), block.name.clone());
            }
        }
    }

    param_to_block
}

#[cfg(test)]
#[path = "param_reconciler_tests.rs"]
mod tests;
