use bytes::Bytes;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::shm::DepthImage;

/// Raw buffer dequeued from one device node, before decoding
#[derive(Clone)]
pub struct RawFrame {
    /// Copied out of the driver's mmap'd buffer
    pub data: Bytes,

    pub meta: FrameMetadata,

    /// Dequeue time
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Bytes per line as negotiated with the driver
    pub stride: u32,
    pub format: PixelFormat,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Yuyv,
    Mjpeg,
    /// 16-bit little-endian depth
    Z16,
}

impl PixelFormat {
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            PixelFormat::Rgb24 => *b"RGB3",
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::Mjpeg => *b"MJPG",
            PixelFormat::Z16 => *b"Z16 ",
        }
    }

    /// Bytes per pixel for packed formats, `None` for compressed ones.
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            PixelFormat::Rgb24 => Some(3),
            PixelFormat::Yuyv | PixelFormat::Z16 => Some(2),
            PixelFormat::Mjpeg => None,
        }
    }
}

/// One decoded color + depth capture
pub struct FramePair {
    pub color: RgbImage,
    pub depth: DepthImage,
    pub sequence: u64,
    pub captured_at: Instant,
}
