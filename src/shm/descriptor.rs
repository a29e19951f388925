//! Descriptors for named shared-memory regions.

use serde::{Deserialize, Serialize};

use crate::error::ShmError;

/// Element type of the array stored in a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    U8,
    U16,
    F32,
}

impl ElementType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::U16 => 2,
            ElementType::F32 => 4,
        }
    }
}

/// Plain-old-data element that can be published into a region.
pub trait Element: bytemuck::Pod {
    const TYPE: ElementType;
}

impl Element for u8 {
    const TYPE: ElementType = ElementType::U8;
}

impl Element for u16 {
    const TYPE: ElementType = ElementType::U16;
}

impl Element for f32 {
    const TYPE: ElementType = ElementType::F32;
}

/// Handle to one named shared-memory region.
///
/// Carries only what is needed to locate and interpret the region, never the
/// payload. Not `Clone`: releasing consumes the descriptor, so a released
/// handle cannot be resolved or released again.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedBufferDescriptor {
    name: String,
    element_type: ElementType,
    shape: Vec<usize>,
}

impl SharedBufferDescriptor {
    pub(crate) fn new(name: String, element_type: ElementType, shape: Vec<usize>) -> Self {
        Self {
            name,
            element_type,
            shape,
        }
    }

    /// System-wide region name, e.g. `/mc_1f2a_3_9c41`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Shape product times element size.
    pub fn size_bytes(&self) -> Result<usize, ShmError> {
        byte_len(&self.shape, self.element_type)
    }
}

/// Byte length of an array, rejecting empty shapes, zero dimensions and overflow.
pub(crate) fn byte_len(shape: &[usize], element_type: ElementType) -> Result<usize, ShmError> {
    let invalid = || ShmError::InvalidShape {
        shape: shape.to_vec(),
    };
    if shape.is_empty() || shape.contains(&0) {
        return Err(invalid());
    }
    shape
        .iter()
        .try_fold(element_type.size(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(invalid)
}
