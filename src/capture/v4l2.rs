//! V4L2 capture of a color node and a Z16 depth node

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::decoder;
use crate::capture::frame::{FrameMetadata, FramePair, PixelFormat, RawFrame};
use crate::capture::CaptureSource;
use crate::error::CaptureError;
use crate::pipeline::SourceConfiguration;
use crate::SourceSettings;

/// One streaming device node
struct V4l2Node {
    path: String,
    _device: Box<Device>,
    stream: MmapStream<'static>,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    bus: String,
    version: (u8, u8, u8),
}

impl V4l2Node {
    fn open(
        path: &str,
        format: PixelFormat,
        (width, height): (u32, u32),
        fps: u32,
        buffer_count: u32,
    ) -> Result<Self, CaptureError> {
        let device_err = |e: std::io::Error| CaptureError::Device(format!("{path}: {e}"));

        let device = Device::with_path(path).map_err(device_err)?;

        // Query capabilities
        let caps = device.query_caps().map_err(device_err)?;
        info!("Device {}: {} ({}) on {}", path, caps.card, caps.driver, caps.bus);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::Device(format!(
                "{path} doesn't support video capture"
            )));
        }

        // Set format
        let fourcc = FourCC::new(&format.fourcc());
        let mut fmt = device.format().map_err(device_err)?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = fourcc;
        let fmt = device.set_format(&fmt).map_err(device_err)?;

        if fmt.fourcc != fourcc || fmt.width != width || fmt.height != height {
            return Err(CaptureError::Format(format!(
                "{path} negotiated {}x{} {} instead of {}x{} {:?}",
                fmt.width, fmt.height, fmt.fourcc, width, height, format
            )));
        }

        device
            .set_params(&Parameters::with_fps(fps))
            .map_err(device_err)?;

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, buffer_count)
            .map_err(device_err)?;

        Ok(Self {
            path: path.to_owned(),
            _device: Box::new(device),
            stream,
            width,
            height,
            stride: fmt.stride,
            format,
            bus: caps.bus,
            version: caps.version,
        })
    }

    fn next(&mut self, timeout: Duration, sequence: u64) -> Result<RawFrame, CaptureError> {
        self.stream.set_timeout(timeout);
        let timestamp = Instant::now();

        let (buf, meta) = self.stream.next().map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => CaptureError::Timeout(timeout),
            _ => CaptureError::Device(format!("{}: {e}", self.path)),
        })?;

        // Compressed frames only fill part of the buffer
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };

        Ok(RawFrame {
            data: Bytes::copy_from_slice(&buf[..used]),
            meta: FrameMetadata {
                sequence,
                width: self.width,
                height: self.height,
                stride: self.stride,
                format: self.format,
                device_timestamp: Some(
                    Duration::from_secs(meta.timestamp.sec as u64)
                        + Duration::from_micros(meta.timestamp.usec as u64),
                ),
            },
            timestamp,
        })
    }
}

/// Color + depth source backed by two V4L2 nodes of the same camera
pub struct V4l2Source {
    color_device: Option<String>,
    depth_device: Option<String>,
    color_format: PixelFormat,
    buffer_count: u32,
    required_connection: Option<String>,
    nodes: Option<(V4l2Node, V4l2Node)>,
    sequence: u64,
}

impl V4l2Source {
    pub fn new(settings: &SourceSettings, buffer_count: u32) -> Self {
        Self {
            color_device: settings.color_device.clone(),
            depth_device: settings.depth_device.clone(),
            color_format: settings.color_format,
            buffer_count,
            required_connection: settings.require_connection_prefix.clone(),
            nodes: None,
            sequence: 0,
        }
    }
}

impl CaptureSource for V4l2Source {
    #[instrument(skip_all, fields(alias = config.alias()))]
    fn open(&mut self, config: &mut SourceConfiguration) -> Result<(), CaptureError> {
        let missing = |node: &str| {
            CaptureError::Device(format!(
                "no {node} device configured for serial {}",
                config.serial_number()
            ))
        };
        let color_path = self.color_device.clone().ok_or_else(|| missing("color"))?;
        let depth_path = self.depth_device.clone().ok_or_else(|| missing("depth"))?;

        let dims = config.frame_dimensions();
        let color = V4l2Node::open(&color_path, self.color_format, dims, config.fps(), self.buffer_count)?;
        let depth = V4l2Node::open(&depth_path, PixelFormat::Z16, dims, config.fps(), self.buffer_count)?;

        let (major, minor, patch) = color.version;
        config.describe(color.bus.clone(), format!("{major}.{minor}.{patch}"));

        if let Some(prefix) = &self.required_connection {
            if !color.bus.starts_with(prefix.as_str()) {
                return Err(CaptureError::Device(format!(
                    "camera {}({}) is connected via {}, expected {}",
                    config.alias(),
                    config.serial_number(),
                    color.bus,
                    prefix
                )));
            }
        }

        info!(
            "Capture streams started with {} buffers each ({} + {})",
            self.buffer_count, color.path, depth.path
        );
        self.nodes = Some((color, depth));
        Ok(())
    }

    #[instrument(skip(self))]
    fn wait_for_frame_pair(&mut self, timeout: Duration) -> Result<FramePair, CaptureError> {
        let (color_node, depth_node) = self.nodes.as_mut().ok_or(CaptureError::NotStarted)?;

        // Both dequeues share one deadline
        let deadline = Instant::now() + timeout;
        self.sequence += 1;

        let color_raw = color_node.next(timeout, self.sequence)?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CaptureError::Timeout(timeout));
        }
        let depth_raw = depth_node.next(remaining, self.sequence)?;

        Ok(FramePair {
            color: decoder::decode_color(&color_raw)?,
            depth: decoder::decode_depth(&depth_raw)?,
            sequence: self.sequence,
            captured_at: color_raw.timestamp,
        })
    }

    fn close(&mut self) {
        if let Some((color, depth)) = self.nodes.take() {
            info!("Stopping capture streams {} and {}", color.path, depth.path);
        }
    }
}
