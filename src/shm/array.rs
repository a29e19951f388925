//! Process-local copy of a resolved region.

use image::{ImageBuffer, Luma, RgbImage};

use crate::error::ShmError;
use crate::shm::{Element, ElementType};

/// 16-bit single-channel depth image.
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Bytes copied out of a shared region, plus the shape and type needed to interpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedArray {
    element_type: ElementType,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl SharedArray {
    pub(crate) fn new(element_type: ElementType, shape: Vec<usize>, bytes: Vec<u8>) -> Self {
        Self {
            element_type,
            shape,
            bytes,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Copy the elements out as `T`. The byte buffer carries no alignment
    /// guarantee, so this always collects into a fresh vector.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, ShmError> {
        if T::TYPE != self.element_type {
            return Err(self.mismatch(T::TYPE, "[..]"));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.bytes))
    }

    /// Interpret a `u8` array shaped `[height, width, 3]` as an RGB image.
    pub fn into_rgb_image(self) -> Result<RgbImage, ShmError> {
        match (self.element_type, self.shape.as_slice()) {
            (ElementType::U8, &[h, w, 3]) => {
                let (w, h) = (dim(w)?, dim(h)?);
                let shape = self.shape.clone();
                RgbImage::from_raw(w, h, self.bytes).ok_or(ShmError::InvalidShape { shape })
            }
            _ => Err(self.mismatch(ElementType::U8, "[h, w, 3]")),
        }
    }

    /// Interpret a `u16` array shaped `[height, width]` as a depth image.
    pub fn into_depth_image(self) -> Result<DepthImage, ShmError> {
        match (self.element_type, self.shape.as_slice()) {
            (ElementType::U16, &[h, w]) => {
                let (w, h) = (dim(w)?, dim(h)?);
                let pixels: Vec<u16> = bytemuck::pod_collect_to_vec(&self.bytes);
                DepthImage::from_raw(w, h, pixels).ok_or(ShmError::InvalidShape {
                    shape: self.shape.clone(),
                })
            }
            _ => Err(self.mismatch(ElementType::U16, "[h, w]")),
        }
    }

    fn mismatch(&self, expected: ElementType, layout: &'static str) -> ShmError {
        ShmError::ElementMismatch {
            expected,
            layout,
            actual: self.element_type,
            shape: self.shape.clone(),
        }
    }
}

fn dim(value: usize) -> Result<u32, ShmError> {
    u32::try_from(value).map_err(|_| ShmError::InvalidShape {
        shape: vec![value],
    })
}
