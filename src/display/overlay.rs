//! Border and label decoration for grid cells.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{imageops, DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use tracing::{info, warn};

use crate::pipeline::RotationAngle;

pub const BORDER: u32 = 2;

const LIVE_BORDER: Rgb<u8> = Rgb([0, 255, 0]);
const STALE_BORDER: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const FPS_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Tried in order when no font is configured.
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

pub struct Overlay {
    font: Option<FontVec>,
}

impl Overlay {
    /// Load the configured font, or the first system font that parses.
    /// Without any font, cells still get borders but no text.
    pub fn load(font_path: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match font_path {
            Some(path) => vec![path.to_path_buf()],
            None => FALLBACK_FONTS.iter().map(PathBuf::from).collect(),
        };

        for path in &candidates {
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    info!("overlay font: {}", path.display());
                    return Self { font: Some(font) };
                }
                Err(err) => warn!("cannot parse font {}: {}", path.display(), err),
            }
        }

        warn!("no usable overlay font found, labels disabled");
        Self::without_text()
    }

    pub fn without_text() -> Self {
        Self { font: None }
    }

    pub fn has_text(&self) -> bool {
        self.font.is_some()
    }

    /// Bordered copy of `image` with the alias and, for live sources, the
    /// frame rate. A stale source is shown in grayscale with a red border and
    /// a `NO SIGNAL` label.
    pub fn decorate(&self, image: &RgbImage, label: &str, fps: f32, stale: bool) -> RgbImage {
        let (base, border, label) = if stale {
            let gray = DynamicImage::ImageLuma8(imageops::grayscale(image)).to_rgb8();
            (gray, STALE_BORDER, format!("{label}: NO SIGNAL"))
        } else {
            (image.clone(), LIVE_BORDER, label.to_owned())
        };

        let mut out = with_border(&base, border);
        if let Some(font) = &self.font {
            draw_text_mut(&mut out, LABEL_COLOR, 10, 8, PxScale::from(24.0), font, &label);
            if !stale {
                let fps = format!("FPS: {fps:.1}");
                draw_text_mut(&mut out, FPS_COLOR, 10, 38, PxScale::from(21.0), font, &fps);
            }
        }
        out
    }
}

/// Constant-color frame of `BORDER` pixels around the image.
pub fn with_border(image: &RgbImage, color: Rgb<u8>) -> RgbImage {
    let mut out = RgbImage::from_pixel(image.width() + 2 * BORDER, image.height() + 2 * BORDER, color);
    imageops::replace(&mut out, image, i64::from(BORDER), i64::from(BORDER));
    out
}

/// Rotate clockwise by the source's configured angle.
pub fn rotate(image: RgbImage, angle: RotationAngle) -> RgbImage {
    match angle {
        RotationAngle::Deg0 => image,
        RotationAngle::Deg90 => imageops::rotate90(&image),
        RotationAngle::Deg180 => imageops::rotate180(&image),
        RotationAngle::Deg270 => imageops::rotate270(&image),
    }
}
