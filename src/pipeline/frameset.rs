//! One producer-to-consumer unit and its ownership protocol.
//!
//! The only legal lifecycle is
//! `published by producer -> enqueued -> dequeued -> resolved -> released`.
//! [`Frameset::release_all`] takes the frameset by value, so releasing twice
//! or resolving after release does not compile.

use std::time::SystemTime;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::ShmError;
use crate::pipeline::SourceConfiguration;
use crate::shm::{self, DepthImage, SharedBufferDescriptor};

#[derive(Debug, Serialize, Deserialize)]
pub struct Frameset {
    color: SharedBufferDescriptor,
    depth: SharedBufferDescriptor,
    source: SourceConfiguration,
    timestamp: SystemTime,
}

impl Frameset {
    pub fn new(
        color: SharedBufferDescriptor,
        depth: SharedBufferDescriptor,
        source: SourceConfiguration,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            color,
            depth,
            source,
            timestamp,
        }
    }

    /// Copy a captured pair into two fresh regions and stamp it with the current time.
    ///
    /// If the depth publish fails the color region is unlinked again, so a
    /// failed publish leaves nothing behind.
    pub fn publish(
        color: &RgbImage,
        depth: &DepthImage,
        source: &SourceConfiguration,
    ) -> Result<Self, ShmError> {
        let (w, h) = (color.width() as usize, color.height() as usize);
        let color_desc = shm::publish(color.as_raw(), &[h, w, 3])?;

        let (dw, dh) = (depth.width() as usize, depth.height() as usize);
        let depth_desc = match shm::publish(depth.as_raw(), &[dh, dw]) {
            Ok(desc) => desc,
            Err(err) => {
                let _ = shm::release(color_desc);
                return Err(err);
            }
        };

        Ok(Self::new(
            color_desc,
            depth_desc,
            source.clone(),
            SystemTime::now(),
        ))
    }

    pub fn alias(&self) -> &str {
        self.source.alias()
    }

    pub fn source(&self) -> &SourceConfiguration {
        &self.source
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn color(&self) -> &SharedBufferDescriptor {
        &self.color
    }

    pub fn depth(&self) -> &SharedBufferDescriptor {
        &self.depth
    }

    /// Names of both backing regions, color first.
    pub fn region_names(&self) -> [&str; 2] {
        [self.color.name(), self.depth.name()]
    }

    /// Copy of the color frame.
    pub fn resolve_color(&self) -> Result<RgbImage, ShmError> {
        shm::resolve_and_copy(&self.color)?.into_rgb_image()
    }

    /// Copy of the depth frame.
    pub fn resolve_depth(&self) -> Result<DepthImage, ShmError> {
        shm::resolve_and_copy(&self.depth)?.into_depth_image()
    }

    /// Unlink both regions. Both unlinks are attempted; the first failure is returned.
    pub fn release_all(self) -> Result<(), ShmError> {
        let color = shm::release(self.color);
        let depth = shm::release(self.depth);
        color.and(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RotationAngle;
    use crate::shm::region_exists;

    fn source() -> SourceConfiguration {
        SourceConfiguration::new("A", "000001", (4, 2), 30, RotationAngle::Deg0)
    }

    #[test]
    fn publish_resolve_release() {
        let color = RgbImage::from_fn(4, 2, |x, y| image::Rgb([x as u8, y as u8, 7]));
        let depth = DepthImage::from_fn(4, 2, |x, y| image::Luma([(x * 100 + y) as u16]));

        let fs = Frameset::publish(&color, &depth, &source()).unwrap();
        assert_eq!(fs.alias(), "A");
        assert_eq!(fs.color().shape(), &[2, 4, 3]);
        assert_eq!(fs.depth().shape(), &[2, 4]);

        assert_eq!(fs.resolve_color().unwrap(), color);
        assert_eq!(fs.resolve_depth().unwrap(), depth);

        let names: Vec<String> = fs.region_names().iter().map(|n| n.to_string()).collect();
        fs.release_all().unwrap();
        for name in names {
            assert!(!region_exists(&name));
        }
    }

    #[test]
    fn frameset_crosses_the_wire_as_metadata_only() {
        let color = RgbImage::new(4, 2);
        let depth = DepthImage::new(4, 2);
        let fs = Frameset::publish(&color, &depth, &source()).unwrap();

        let line = serde_json::to_string(&fs).unwrap();
        assert!(line.len() < 1024);
        let back: Frameset = serde_json::from_str(&line).unwrap();
        assert_eq!(back.region_names(), fs.region_names());
        assert_eq!(back.timestamp(), fs.timestamp());

        // Either copy may release; only one does.
        drop(fs);
        back.release_all().unwrap();
    }
}
