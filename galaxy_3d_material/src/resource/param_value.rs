/// Cached material parameter values.
///
/// A material keeps one `MaterialParamValue` per parameter name. Data values
/// hold one element per array slot; texture and sampler values hold the
/// currently bound reference, if any.

use std::fmt;
use std::sync::Arc;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::renderer::{SamplerState, Texture};
use crate::resource::gpu_program::DataParamType;

// ===== COLOR =====

/// RGBA color, stored as a float4 parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl From<Color> for Vec4 {
    fn from(color: Color) -> Self {
        Vec4::new(color.r, color.g, color.b, color.a)
    }
}

impl From<Vec4> for Color {
    fn from(v: Vec4) -> Self {
        Color::new(v.x, v.y, v.z, v.w)
    }
}

// ===== STRUCT DATA =====

/// Raw bytes of a user struct parameter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructData {
    bytes: Vec<u8>,
}

impl StructData {
    /// Copy raw bytes
    pub fn new(bytes: &[u8]) -> Self {
        Self { bytes: bytes.to_vec() }
    }

    /// Zero-filled struct of `size` bytes
    pub fn zeroed(size: usize) -> Self {
        Self { bytes: vec![0u8; size] }
    }

    /// Copy the bytes of a plain-old-data value
    pub fn from_pod<T: bytemuck::Pod>(value: &T) -> Self {
        Self::new(bytemuck::bytes_of(value))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

// ===== VALUE KIND =====

/// Kind of a cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamValueKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Struct,
    Texture,
    SamplerState,
}

impl fmt::Display for ParamValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamValueKind::Float => "float",
            ParamValueKind::Vec2 => "vec2",
            ParamValueKind::Vec3 => "vec3",
            ParamValueKind::Vec4 => "vec4",
            ParamValueKind::Mat3 => "mat3",
            ParamValueKind::Mat4 => "mat4",
            ParamValueKind::Struct => "struct",
            ParamValueKind::Texture => "texture",
            ParamValueKind::SamplerState => "sampler state",
        };
        f.write_str(name)
    }
}

// ===== MATERIAL PARAM VALUE =====

/// Cached value of one material parameter
#[derive(Clone)]
pub enum MaterialParamValue {
    Float(Vec<f32>),
    Vec2(Vec<Vec2>),
    Vec3(Vec<Vec3>),
    Vec4(Vec<Vec4>),
    Mat3(Vec<Mat3>),
    Mat4(Vec<Mat4>),
    Struct(Vec<StructData>),
    Texture(Option<Arc<dyn Texture>>),
    SamplerState(Option<Arc<dyn SamplerState>>),
}

impl MaterialParamValue {
    /// Zero value for a data parameter of `array_size` elements
    ///
    /// `element_size` is only used for structs.
    pub fn zeroed(param_type: DataParamType, array_size: u32, element_size: u32) -> Self {
        let n = array_size as usize;
        match param_type {
            DataParamType::Float1 => MaterialParamValue::Float(vec![0.0; n]),
            DataParamType::Float2 => MaterialParamValue::Vec2(vec![Vec2::ZERO; n]),
            DataParamType::Float3 => MaterialParamValue::Vec3(vec![Vec3::ZERO; n]),
            DataParamType::Float4 => MaterialParamValue::Vec4(vec![Vec4::ZERO; n]),
            DataParamType::Matrix3x3 => MaterialParamValue::Mat3(vec![Mat3::ZERO; n]),
            DataParamType::Matrix4x4 => MaterialParamValue::Mat4(vec![Mat4::ZERO; n]),
            DataParamType::Struct => {
                MaterialParamValue::Struct(vec![StructData::zeroed(element_size as usize); n])
            }
        }
    }

    pub fn kind(&self) -> ParamValueKind {
        match self {
            MaterialParamValue::Float(_) => ParamValueKind::Float,
            MaterialParamValue::Vec2(_) => ParamValueKind::Vec2,
            MaterialParamValue::Vec3(_) => ParamValueKind::Vec3,
            MaterialParamValue::Vec4(_) => ParamValueKind::Vec4,
            MaterialParamValue::Mat3(_) => ParamValueKind::Mat3,
            MaterialParamValue::Mat4(_) => ParamValueKind::Mat4,
            MaterialParamValue::Struct(_) => ParamValueKind::Struct,
            MaterialParamValue::Texture(_) => ParamValueKind::Texture,
            MaterialParamValue::SamplerState(_) => ParamValueKind::SamplerState,
        }
    }

    /// Number of array elements (1 for textures and samplers)
    pub fn len(&self) -> usize {
        match self {
            MaterialParamValue::Float(v) => v.len(),
            MaterialParamValue::Vec2(v) => v.len(),
            MaterialParamValue::Vec3(v) => v.len(),
            MaterialParamValue::Vec4(v) => v.len(),
            MaterialParamValue::Mat3(v) => v.len(),
            MaterialParamValue::Mat4(v) => v.len(),
            MaterialParamValue::Struct(v) => v.len(),
            MaterialParamValue::Texture(_) | MaterialParamValue::SamplerState(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MaterialParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialParamValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            MaterialParamValue::Vec2(v) => f.debug_tuple("Vec2").field(v).finish(),
            MaterialParamValue::Vec3(v) => f.debug_tuple("Vec3").field(v).finish(),
            MaterialParamValue::Vec4(v) => f.debug_tuple("Vec4").field(v).finish(),
            MaterialParamValue::Mat3(v) => f.debug_tuple("Mat3").field(v).finish(),
            MaterialParamValue::Mat4(v) => f.debug_tuple("Mat4").field(v).finish(),
            MaterialParamValue::Struct(v) => f.debug_tuple("Struct").field(v).finish(),
            MaterialParamValue::Texture(t) => {
                f.debug_tuple("Texture").field(&t.as_ref().map(|t| t.info().width)).finish()
            }
            MaterialParamValue::SamplerState(s) => {
                f.debug_tuple("SamplerState").field(&s.as_ref().map(|s| *s.desc())).finish()
            }
        }
    }
}

// ===== ELEMENT ACCESS =====

/// A data value type that can be stored in a `MaterialParamValue`
///
/// Gives typed access to the matching variant and the bytes written to the
/// GPU for one element.
pub trait ParamElement: Clone {
    const KIND: ParamValueKind;

    fn elements(value: &MaterialParamValue) -> Option<&[Self]>;

    fn elements_mut(value: &mut MaterialParamValue) -> Option<&mut [Self]>;

    /// Bytes of one element for a GPU element of `gpu_element_size` bytes
    fn gpu_bytes(&self, gpu_element_size: u32) -> Vec<u8>;
}

macro_rules! impl_pod_param_element {
    ($ty:ty, $variant:ident) => {
        impl ParamElement for $ty {
            const KIND: ParamValueKind = ParamValueKind::$variant;

            fn elements(value: &MaterialParamValue) -> Option<&[Self]> {
                match value {
                    MaterialParamValue::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn elements_mut(value: &mut MaterialParamValue) -> Option<&mut [Self]> {
                match value {
                    MaterialParamValue::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn gpu_bytes(&self, _gpu_element_size: u32) -> Vec<u8> {
                bytemuck::bytes_of(self).to_vec()
            }
        }
    };
}

impl_pod_param_element!(f32, Float);
impl_pod_param_element!(Vec2, Vec2);
impl_pod_param_element!(Vec3, Vec3);
impl_pod_param_element!(Vec4, Vec4);
impl_pod_param_element!(Mat4, Mat4);

/// Size of a 3x3 matrix laid out as three 16-byte columns
const PADDED_MAT3_SIZE: u32 = 48;

impl ParamElement for Mat3 {
    const KIND: ParamValueKind = ParamValueKind::Mat3;

    fn elements(value: &MaterialParamValue) -> Option<&[Self]> {
        match value {
            MaterialParamValue::Mat3(v) => Some(v),
            _ => None,
        }
    }

    fn elements_mut(value: &mut MaterialParamValue) -> Option<&mut [Self]> {
        match value {
            MaterialParamValue::Mat3(v) => Some(v),
            _ => None,
        }
    }

    fn gpu_bytes(&self, gpu_element_size: u32) -> Vec<u8> {
        if gpu_element_size >= PADDED_MAT3_SIZE {
            let columns = [
                self.x_axis.extend(0.0),
                self.y_axis.extend(0.0),
                self.z_axis.extend(0.0),
            ];
            bytemuck::cast_slice(&columns).to_vec()
        } else {
            bytemuck::bytes_of(self).to_vec()
        }
    }
}

impl ParamElement for StructData {
    const KIND: ParamValueKind = ParamValueKind::Struct;

    fn elements(value: &MaterialParamValue) -> Option<&[Self]> {
        match value {
            MaterialParamValue::Struct(v) => Some(v),
            _ => None,
        }
    }

    fn elements_mut(value: &mut MaterialParamValue) -> Option<&mut [Self]> {
        match value {
            MaterialParamValue::Struct(v) => Some(v),
            _ => None,
        }
    }

    fn gpu_bytes(&self, _gpu_element_size: u32) -> Vec<u8> {
        self.bytes.clone()
    }
}

#[cfg(test)]
#[path = "param_value_tests.rs"]
mod tests;
