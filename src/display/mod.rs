pub mod cache;
#[cfg(feature = "sdl-display")]
pub mod display;
pub mod grid;
pub mod headless;
pub mod overlay;
pub mod viewer;

pub use cache::{FpsStats, FrameCacheEntry};
#[cfg(feature = "sdl-display")]
pub use display::Sdl2Display;
pub use grid::{compose_grid, pad_cells, GRID_CAPACITY};
pub use headless::HeadlessRenderer;
pub use overlay::Overlay;
pub use viewer::{Viewer, ViewerExit};

use color_eyre::Result;
use image::RgbImage;

/// Puts composites on screen.
pub trait Renderer {
    /// Present one composite. Returns true when the user asked to quit.
    fn show(&mut self, composite: &RgbImage) -> Result<bool>;

    /// Called instead of `show` while there is nothing to draw yet.
    fn idle(&mut self) -> Result<bool> {
        Ok(false)
    }
}
