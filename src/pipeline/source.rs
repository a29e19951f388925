//! Per-source configuration carried with every frameset.

use serde::{Deserialize, Serialize};

use crate::error::MulticamError;

/// Clockwise rotation applied to a source's frames before display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum RotationAngle {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl RotationAngle {
    pub fn from_degrees(degrees: u16) -> Result<Self, MulticamError> {
        match degrees {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            other => Err(MulticamError::Config(format!(
                "rotation must be one of 0, 90, 180, 270 (got {other})"
            ))),
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Quarter turns needed to undo this rotation.
    pub fn inverse_quarter_turns(self) -> u16 {
        (4 - self.degrees() / 90) % 4
    }
}

impl TryFrom<u16> for RotationAngle {
    type Error = MulticamError;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        Self::from_degrees(degrees)
    }
}

impl From<RotationAngle> for u16 {
    fn from(angle: RotationAngle) -> Self {
        angle.degrees()
    }
}

/// Identity and negotiated stream parameters of one capture source.
///
/// Fixed at construction, except for the descriptive fields a capture device
/// reports once opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfiguration {
    alias: String,
    serial_number: String,
    width: u32,
    height: u32,
    fps: u32,
    rotation: RotationAngle,
    #[serde(default)]
    connection_class: Option<String>,
    #[serde(default)]
    firmware_version: Option<String>,
}

impl SourceConfiguration {
    pub fn new(
        alias: impl Into<String>,
        serial_number: impl Into<String>,
        (width, height): (u32, u32),
        fps: u32,
        rotation: RotationAngle,
    ) -> Self {
        Self {
            alias: alias.into(),
            serial_number: serial_number.into(),
            width,
            height,
            fps,
            rotation,
            connection_class: None,
            firmware_version: None,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// `(width, height)` shared by the color and depth streams.
    pub fn frame_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn rotation(&self) -> RotationAngle {
        self.rotation
    }

    /// Bus or port class the device reported, e.g. `"3.2"` or `"usb-0000:00:14.0-2"`.
    pub fn connection_class(&self) -> Option<&str> {
        self.connection_class.as_deref()
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref()
    }

    /// Fill in what the device reported after it was opened.
    pub fn describe(&mut self, connection_class: impl Into<String>, firmware_version: impl Into<String>) {
        self.connection_class = Some(connection_class.into());
        self.firmware_version = Some(firmware_version.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_accepts_right_angles_only() {
        for deg in [0, 90, 180, 270] {
            assert_eq!(RotationAngle::from_degrees(deg).unwrap().degrees(), deg);
        }
        assert!(RotationAngle::from_degrees(45).is_err());
        assert!(RotationAngle::from_degrees(360).is_err());
    }

    #[test]
    fn inverse_turns() {
        assert_eq!(RotationAngle::Deg0.inverse_quarter_turns(), 0);
        assert_eq!(RotationAngle::Deg90.inverse_quarter_turns(), 3);
        assert_eq!(RotationAngle::Deg270.inverse_quarter_turns(), 1);
    }

    #[test]
    fn rotation_serializes_as_degrees() {
        let cfg = SourceConfiguration::new("CAM_1", "010203", (424, 240), 5, RotationAngle::Deg180);
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains(r#""rotation":180"#));

        let bad = json.replace(r#""rotation":180"#, r#""rotation":45"#);
        assert!(serde_json::from_str::<SourceConfiguration>(&bad).is_err());
    }

    #[test]
    fn describe_fills_lazy_fields() {
        let mut cfg = SourceConfiguration::new("CAM_1", "010203", (424, 240), 5, RotationAngle::Deg0);
        assert_eq!(cfg.connection_class(), None);
        cfg.describe("3.2", "5.13.0.50");
        assert_eq!(cfg.connection_class(), Some("3.2"));
        assert_eq!(cfg.firmware_version(), Some("5.13.0.50"));
    }
}
