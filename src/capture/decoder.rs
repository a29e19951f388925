use image::RgbImage;

use super::frame::{FrameMetadata, PixelFormat, RawFrame};
use crate::error::CaptureError;
use crate::shm::DepthImage;

pub fn decode_color(frame: &RawFrame) -> Result<RgbImage, CaptureError> {
    let meta = &frame.meta;
    let rgb = match meta.format {
        PixelFormat::Mjpeg => {
            let mut decoder = zune_jpeg::JpegDecoder::new(&frame.data[..]);
            let pixels = decoder
                .decode()
                .map_err(|e| CaptureError::Format(format!("MJPEG decode failed: {e:?}")))?;
            return image_from(meta.width, meta.height, pixels);
        }
        PixelFormat::Rgb24 => packed_rows(&frame.data, meta)?,
        PixelFormat::Yuyv => yuyv_to_rgb(&packed_rows(&frame.data, meta)?),
        PixelFormat::Z16 => {
            return Err(CaptureError::Format("Z16 is not a color format".into()));
        }
    };
    image_from(meta.width, meta.height, rgb)
}

pub fn decode_depth(frame: &RawFrame) -> Result<DepthImage, CaptureError> {
    let meta = &frame.meta;
    if meta.format != PixelFormat::Z16 {
        return Err(CaptureError::Format(format!(
            "expected Z16 depth, got {:?}",
            meta.format
        )));
    }
    let bytes = packed_rows(&frame.data, meta)?;
    let depth: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|px| u16::from_le_bytes([px[0], px[1]]))
        .collect();
    DepthImage::from_raw(meta.width, meta.height, depth)
        .ok_or_else(|| CaptureError::Format("depth buffer too small".into()))
}

fn image_from(width: u32, height: u32, rgb: Vec<u8>) -> Result<RgbImage, CaptureError> {
    let len = rgb.len();
    RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        CaptureError::Format(format!(
            "{len} bytes do not fill a {width}x{height} RGB frame"
        ))
    })
}

/// Strip per-line padding so rows are tightly packed.
fn packed_rows(data: &[u8], meta: &FrameMetadata) -> Result<Vec<u8>, CaptureError> {
    let bpp = meta.format.bytes_per_pixel().ok_or_else(|| {
        CaptureError::Format(format!("{:?} is not a packed format", meta.format))
    })?;
    let row = meta.width as usize * bpp as usize;
    let stride = (meta.stride as usize).max(row);
    let rows = meta.height as usize;
    if rows == 0 || row == 0 {
        return Err(CaptureError::Format("zero-sized frame".into()));
    }
    if data.len() < stride * (rows - 1) + row {
        return Err(CaptureError::Format(format!(
            "short frame: {} bytes for {}x{} at stride {}",
            data.len(),
            meta.width,
            meta.height,
            stride
        )));
    }
    if stride == row {
        return Ok(data[..row * rows].to_vec());
    }
    let mut out = Vec::with_capacity(row * rows);
    for y in 0..rows {
        out.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    Ok(out)
}

/// BT.601 YUYV 4:2:2 to packed RGB.
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
    for px in yuyv.chunks_exact(4) {
        let (y0, u, y1, v) = (px[0] as i32, px[1] as i32 - 128, px[2] as i32, px[3] as i32 - 128);
        for y in [y0, y1] {
            let c = 298 * (y - 16);
            rgb.push(clamp((c + 409 * v + 128) >> 8));
            rgb.push(clamp((c - 100 * u - 208 * v + 128) >> 8));
            rgb.push(clamp((c + 516 * u + 128) >> 8));
        }
    }
    rgb
}

fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
