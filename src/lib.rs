pub mod app;
pub mod capture;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod shm;
pub mod utils;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use error::{MulticamError, Result};
use pipeline::{RotationAngle, SourceConfiguration};

/// Prefix for environment overrides, e.g. `MULTICAM__VIEWER__HEADLESS=true`.
pub const ENV_PREFIX: &str = "MULTICAM";

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: Vec<SourceSettings>,
    pub capture: CaptureSettings,
    pub viewer: ViewerSettings,
}

/// One capture source as configured by the user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Human-assigned name, unique across sources
    pub alias: String,
    pub serial: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Clockwise degrees: 0, 90, 180 or 270
    pub rotation: u16,
    /// V4L2 node delivering color frames
    pub color_device: Option<String>,
    /// V4L2 node delivering Z16 depth frames
    pub depth_device: Option<String>,
    pub color_format: PixelFormat,
    /// Reject the device unless its bus info starts with this
    pub require_connection_prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    V4l2,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub backend: CaptureBackend,
    pub frame_timeout_ms: u64,
    pub buffer_count: u32,
    /// Synthetic backend only: stop after this many frame pairs
    pub frame_limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// A source with no frame for this long is shown as NO SIGNAL
    pub stale_after_ms: u64,
    pub font_path: Option<PathBuf>,
    pub headless: bool,
    pub headless_max_frames: Option<u64>,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        // Name the cameras to easily identify them in the real world.
        let cameras = [
            ("CAM_1", "010203"),
            ("CAM_2", "040506"),
            ("CAM_3", "070809"),
            ("CAM_4", "101112"),
            ("CAM_5", "131415"),
            ("CAM_6", "161718"),
        ];
        Self {
            sources: cameras
                .iter()
                .map(|(alias, serial)| SourceSettings {
                    alias: (*alias).into(),
                    serial: (*serial).into(),
                    ..SourceSettings::default()
                })
                .collect(),
            capture: CaptureSettings::default(),
            viewer: ViewerSettings::default(),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            alias: String::new(),
            serial: String::new(),
            width: 424,
            height: 240,
            fps: 5,
            rotation: 0,
            color_device: None,
            depth_device: None,
            color_format: PixelFormat::Rgb24,
            require_connection_prefix: None,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::Synthetic,
            frame_timeout_ms: pipeline::DEFAULT_FRAME_TIMEOUT.as_millis() as u64,
            buffer_count: 4,
            frame_limit: None,
        }
    }
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            title: "Real-time view of Cameras".into(),
            width: 1284,
            height: 488,
            stale_after_ms: 2000,
            font_path: None,
            headless: false,
            headless_max_frames: None,
            snapshot_path: None,
        }
    }
}

impl Config {
    /// Defaults, overlaid with the TOML file (if any), overlaid with
    /// `MULTICAM__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let loaded: Config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MulticamError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Aliases must be non-empty and unique, and every stream parameter sane.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.alias.is_empty() {
                return Err(MulticamError::Config("source alias must not be empty".into()));
            }
            if !seen.insert(source.alias.as_str()) {
                return Err(MulticamError::Config(format!(
                    "duplicate source alias {}",
                    source.alias
                )));
            }
            source.to_source_configuration()?;
        }
        if self.capture.frame_timeout_ms == 0 {
            return Err(MulticamError::Config("frame_timeout_ms must be positive".into()));
        }
        if self.viewer.stale_after_ms == 0 {
            return Err(MulticamError::Config("stale_after_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn source(&self, alias: &str) -> Option<&SourceSettings> {
        self.sources.iter().find(|s| s.alias == alias)
    }
}

impl SourceSettings {
    pub fn to_source_configuration(&self) -> Result<SourceConfiguration> {
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(MulticamError::Config(format!(
                "{}: width, height and fps must be positive",
                self.alias
            )));
        }
        Ok(SourceConfiguration::new(
            self.alias.clone(),
            self.serial.clone(),
            (self.width, self.height),
            self.fps,
            RotationAngle::from_degrees(self.rotation)?,
        ))
    }
}

impl CaptureSettings {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

impl ViewerSettings {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_describe_six_cameras() {
        let config = Config::default();
        assert_eq!(config.sources.len(), 6);
        assert_eq!(config.sources[0].alias, "CAM_1");
        assert_eq!(config.sources[5].serial, "161718");
        assert_eq!(config.capture.frame_timeout(), Duration::from_secs(5));
        config.validate().unwrap();
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[capture]
backend = "synthetic"
frame_limit = 5

[viewer]
headless = true

[[sources]]
alias = "A"
serial = "1"
rotation = 90

[[sources]]
alias = "B"
serial = "2"
fps = 30
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.capture.frame_limit, Some(5));
        assert!(config.viewer.headless);
        assert_eq!(config.viewer.stale_after_ms, 2000);

        let a = config.source("A").unwrap().to_source_configuration().unwrap();
        assert_eq!(a.rotation(), RotationAngle::Deg90);
        assert_eq!(a.frame_dimensions(), (424, 240));
        assert_eq!(config.source("B").unwrap().fps, 30);
    }

    #[test]
    fn duplicate_aliases_are_rejected() {
        let mut config = Config::default();
        config.sources[1].alias = "CAM_1".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_rotation_is_rejected() {
        let mut config = Config::default();
        config.sources[0].rotation = 45;
        assert!(matches!(config.validate(), Err(MulticamError::Config(_))));
    }
}
